//! Invariant validator.
//!
//! A [`Scenario`] names the checks that apply to one kind of run. The
//! [`Validator`] runs all of them against one store and collects a
//! [`SuiteReport`]; a failing check never prevents the others from running.

mod checks;
mod verdict;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use checks::{
    dangling_references, flow_conservation, quantity_uniformity, single_simulation, singleton, transaction_ordering,
    unique_ids, Check, FlowConservation, QuantityUniformity, ReferentialIntegrity, SingleSimulation, SingletonAgent,
    TableAbsence, TableSet, TablesReadable, TransactionOrdering, UniqueIds,
};
pub use verdict::{AgentRole, FlowMismatch, IdMismatch, Verdict, Violation};

use crate::error::CheckResult;
use crate::schema::TableName;
use crate::storage::{open_store_with, BackendKind, StoreHandle, TableStore};

/// Default agent specs used by the stock scenarios.
pub const DEFAULT_SOURCE_SPEC: &str = ":agents:Source";
#[allow(missing_docs)]
pub const DEFAULT_SINK_SPEC: &str = ":agents:Sink";

/// A kind of simulation run and the invariants it must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scenario {
    /// One source ships material to one sink.
    SourceToSink {
        /// Spec of the source agent.
        source_spec: String,
        /// Spec of the sink agent.
        sink_spec: String,
    },
    /// One sink with nothing to receive: no transactions are written.
    NullSink {
        /// Spec of the sink agent.
        sink_spec: String,
    },
}

impl Default for Scenario {
    fn default() -> Self {
        Self::SourceToSink {
            source_spec: DEFAULT_SOURCE_SPEC.to_string(),
            sink_spec: DEFAULT_SINK_SPEC.to_string(),
        }
    }
}

impl Scenario {
    /// Stable scenario name used in reports.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SourceToSink { .. } => "source-to-sink",
            Self::NullSink { .. } => "null-sink",
        }
    }

    /// Tables that must exist before any check runs.
    pub fn required_tables(&self) -> Vec<TableName> {
        match self {
            Self::SourceToSink { .. } => TableName::ALL.to_vec(),
            Self::NullSink { .. } => vec![TableName::AgentEntry, TableName::Info],
        }
    }

    /// Checks in reporting order.
    pub fn checks(&self) -> Vec<Box<dyn Check>> {
        match self {
            Self::SourceToSink { source_spec, sink_spec } => {
                let mut checks: Vec<Box<dyn Check>> = vec![
                    Box::new(SingletonAgent {
                        role: AgentRole::Source,
                        spec: source_spec.clone(),
                    }),
                    Box::new(SingletonAgent {
                        role: AgentRole::Sink,
                        spec: sink_spec.clone(),
                    }),
                    Box::new(FlowConservation {
                        source_spec: source_spec.clone(),
                        sink_spec: sink_spec.clone(),
                    }),
                    Box::new(TransactionOrdering),
                    Box::new(QuantityUniformity),
                    Box::new(UniqueIds {
                        table: TableName::AgentEntry,
                        column: "AgentId",
                    }),
                    Box::new(UniqueIds {
                        table: TableName::Resources,
                        column: "ResourceId",
                    }),
                ];
                for reference in ReferentialIntegrity::transaction_references() {
                    checks.push(Box::new(reference));
                }
                checks.push(Box::new(SingleSimulation));
                checks.push(Box::new(TablesReadable));
                checks
            }
            Self::NullSink { sink_spec } => vec![
                Box::new(SingletonAgent {
                    role: AgentRole::Sink,
                    spec: sink_spec.clone(),
                }),
                Box::new(TableAbsence {
                    table: TableName::Transactions,
                }),
                Box::new(UniqueIds {
                    table: TableName::AgentEntry,
                    column: "AgentId",
                }),
                Box::new(SingleSimulation),
                Box::new(TablesReadable),
            ],
        }
    }
}

/// Verdict of one named check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Stable check name.
    pub check: String,
    /// What the check found.
    pub verdict: Verdict,
}

/// Every verdict of one scenario against one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Scenario name.
    pub scenario: String,
    /// Backend read; `None` for in-memory tables.
    pub backend: Option<BackendKind>,
    /// One entry per check, in run order.
    pub outcomes: Vec<CheckOutcome>,
    /// When the suite finished.
    pub generated_at: DateTime<Utc>,
}

impl SuiteReport {
    /// True when no check failed or aborted.
    pub fn passed(&self) -> bool {
        !self.outcomes.iter().any(|o| o.verdict.is_failure())
    }

    /// Checks that failed or aborted.
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| o.verdict.is_failure())
    }

    /// Outcome of the named check.
    pub fn outcome(&self, check: &str) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.check == check)
    }

    /// Verdict of the named check.
    pub fn verdict(&self, check: &str) -> Option<&Verdict> {
        self.outcome(check).map(|o| &o.verdict)
    }
}

/// Runs a scenario's checks.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    scenario: Scenario,
}

impl Validator {
    /// A validator for `scenario`.
    pub const fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }

    /// The scenario being checked.
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Opens the store, requiring the scenario's tables, and runs the suite.
    ///
    /// # Errors
    /// - `StoreNotFound` / `SchemaMissing`: no check runs
    /// - table decoding failures
    pub fn verify(&self, handle: &StoreHandle) -> CheckResult<SuiteReport> {
        let store = open_store_with(handle, &self.scenario.required_tables())?;
        self.run(store.as_ref())
    }

    /// Runs the suite against an already opened store.
    pub fn run(&self, store: &dyn TableStore) -> CheckResult<SuiteReport> {
        let tables = TableSet::load(store)?;
        self.run_tables(&tables)
    }

    /// Runs the suite against loaded tables.
    ///
    /// A check that cannot read its inputs is reported as aborted; only
    /// tooling errors escape.
    pub fn run_tables(&self, tables: &TableSet) -> CheckResult<SuiteReport> {
        let mut outcomes = Vec::new();
        for check in self.scenario.checks() {
            let name = check.name();
            let verdict = match check.run(tables) {
                Ok(verdict) => verdict,
                Err(e) if e.is_schema() => Verdict::Aborted { reason: e.to_string() },
                Err(e) => return Err(e),
            };
            if verdict.is_failure() {
                warn!(scenario = self.scenario.name(), check = %name, %verdict, "check failed");
            } else {
                info!(scenario = self.scenario.name(), check = %name, %verdict, "check finished");
            }
            outcomes.push(CheckOutcome { check: name, verdict });
        }

        Ok(SuiteReport {
            scenario: self.scenario.name().to_string(),
            backend: tables.backend(),
            outcomes,
            generated_at: Utc::now(),
        })
    }
}
