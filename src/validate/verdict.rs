//! Verdicts and the violations they carry.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role an agent plays in a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Emits every transaction.
    Source,
    /// Receives every transaction.
    Sink,
}

impl AgentRole {
    /// Lower-case role name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Sink => "sink",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction whose endpoints are not the expected pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FlowMismatch {
    /// Row position in the Transactions table.
    pub index: usize,
    pub sender: i64,
    pub receiver: i64,
}

/// A transaction id out of sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct IdMismatch {
    pub index: usize,
    pub expected: i64,
    pub observed: i64,
}

/// A broken domain invariant with enough detail to localize it.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Violation {
    #[error("expected exactly one {role} with spec '{spec}', found {}: {matches:?}", matches.len())]
    CardinalityError {
        role: AgentRole,
        spec: String,
        matches: Vec<i64>,
    },

    #[error("{} transaction(s) do not flow from {source_id} to {sink_id}: {offending:?}", offending.len())]
    UnexpectedFlow {
        source_id: i64,
        sink_id: i64,
        offending: Vec<FlowMismatch>,
    },

    #[error("transaction ids are not 0..{len}: {offending:?}")]
    NonMonotonicIds {
        len: usize,
        offending: Vec<IdMismatch>,
    },

    #[error("quantities are not uniform: {distinct:?}")]
    QuantityMismatch {
        distinct: Vec<f64>,
    },

    #[error("duplicate values in {table}.{column}: {duplicates:?}")]
    DuplicateIds {
        table: String,
        column: String,
        duplicates: Vec<i64>,
    },

    #[error("{table}.{column} references ids missing from {target_table}: {offending:?}")]
    DanglingReference {
        table: String,
        column: String,
        target_table: String,
        offending: Vec<i64>,
    },

    #[error("agents belong to {} simulations: {distinct:?}", distinct.len())]
    MixedSimulations {
        distinct: Vec<String>,
    },

    #[error("table {table} must not exist")]
    UnexpectedTable {
        table: String,
    },
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// The invariant holds.
    Pass,
    /// The invariant is broken.
    Fail { violation: Violation },
    /// A prerequisite failed so the check did not run.
    Skipped { reason: String },
    /// The check could not read what it needed.
    Aborted { reason: String },
}

impl Verdict {
    /// True only for `Pass`.
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Fail and Aborted both count as failures; Skipped does not.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Fail { .. } | Self::Aborted { .. })
    }

    /// The violation carried by a `Fail`.
    pub const fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Fail { violation } => Some(violation),
            _ => None,
        }
    }

    /// A `Skipped` verdict.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped { reason: reason.into() }
    }
}

impl From<Result<(), Violation>> for Verdict {
    fn from(result: Result<(), Violation>) -> Self {
        match result {
            Ok(()) => Self::Pass,
            Err(violation) => Self::Fail { violation },
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Fail { violation } => write!(f, "fail: {violation}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}
