//! Invariant checks.
//!
//! The free functions are pure: they take projected columns and return
//! `Err(Violation)` with the offending positions. The [`Check`]
//! implementations wire them to the tables of one run.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::verdict::{AgentRole, FlowMismatch, IdMismatch, Verdict, Violation};
use crate::error::CheckResult;
use crate::projection::{project_blobs, project_floats, project_ints};
use crate::record::RecordSet;
use crate::resolver::AgentResolver;
use crate::schema::TableName;
use crate::storage::{BackendKind, Snapshot, StoreError, TableStore};

/// The canonical tables of one run, read once and shared by every check.
///
/// A table whose rows cannot be decoded is remembered with the reason, so
/// only the checks that need it abort.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    backend: Option<BackendKind>,
    tables: BTreeMap<TableName, RecordSet>,
    unreadable: BTreeMap<TableName, String>,
}

impl TableSet {
    /// Reads every canonical table the store holds. Absent tables are simply
    /// not loaded; which ones are required is decided when opening.
    ///
    /// # Errors
    /// Filesystem failures. Decoding failures are kept per table instead.
    pub fn load(store: &dyn TableStore) -> Result<Self, StoreError> {
        let mut tables = BTreeMap::new();
        let mut unreadable = BTreeMap::new();
        for table in TableName::ALL {
            if !store.has_table(table.as_str()) {
                continue;
            }
            match store.read_canonical(table) {
                Ok(records) => {
                    debug!(table = %table, rows = records.len(), backend = %store.kind(), "table read");
                    tables.insert(table, records);
                }
                Err(StoreError::Corrupt { reason, .. } | StoreError::Backend(reason)) => {
                    warn!(table = %table, backend = %store.kind(), %reason, "table unreadable");
                    unreadable.insert(table, reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Self {
            backend: Some(store.kind()),
            tables,
            unreadable,
        })
    }

    /// Builds a table set from in-memory tables.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let tables = snapshot
            .tables()
            .iter()
            .filter_map(|rs| TableName::parse(rs.table()).map(|t| (t, rs.clone())))
            .collect();
        Self {
            backend: None,
            tables,
            unreadable: BTreeMap::new(),
        }
    }

    /// Backend the tables were read from; `None` for in-memory tables.
    pub const fn backend(&self) -> Option<BackendKind> {
        self.backend
    }

    /// A loaded table.
    pub fn get(&self, table: TableName) -> Option<&RecordSet> {
        self.tables.get(&table)
    }

    /// True when the store holds the table, readable or not.
    pub fn contains(&self, table: TableName) -> bool {
        self.tables.contains_key(&table) || self.unreadable.contains_key(&table)
    }

    /// Tables the store lists but could not decode, with the reason.
    pub fn unreadable(&self) -> impl Iterator<Item = (TableName, &str)> {
        self.unreadable.iter().map(|(t, reason)| (*t, reason.as_str()))
    }

    /// # Errors
    /// `Unreadable` when the table failed to decode, `SchemaMissing` when
    /// it was not loaded.
    pub fn require(&self, table: TableName) -> Result<&RecordSet, StoreError> {
        if let Some(reason) = self.unreadable.get(&table) {
            return Err(StoreError::Unreadable {
                table: table.as_str().to_string(),
                reason: reason.clone(),
            });
        }
        self.get(table).ok_or_else(|| StoreError::schema_missing(table.as_str()))
    }
}

/// One named invariant check.
pub trait Check {
    /// Stable name used to pair verdicts across backends.
    fn name(&self) -> String;

    /// Runs the check.
    ///
    /// Returns `Err` only when the inputs cannot be read; broken invariants
    /// are reported as [`Verdict::Fail`].
    fn run(&self, tables: &TableSet) -> CheckResult<Verdict>;
}

// ---------------------------------------------------------------------------
// Pure checks
// ---------------------------------------------------------------------------

/// Requires exactly one matching agent and returns its id.
pub fn singleton(role: AgentRole, spec: &str, matches: &BTreeSet<i64>) -> Result<i64, Violation> {
    let mut iter = matches.iter();
    match (iter.next(), iter.next()) {
        (Some(id), None) => Ok(*id),
        _ => Err(Violation::CardinalityError {
            role,
            spec: spec.to_string(),
            matches: matches.iter().copied().collect(),
        }),
    }
}

/// Every transaction must flow from `source_id` to `sink_id`.
pub fn flow_conservation(source_id: i64, sink_id: i64, senders: &[i64], receivers: &[i64]) -> Result<(), Violation> {
    let offending: Vec<FlowMismatch> = senders
        .iter()
        .zip(receivers)
        .enumerate()
        .filter(|(_, (s, r))| **s != source_id || **r != sink_id)
        .map(|(index, (s, r))| FlowMismatch {
            index,
            sender: *s,
            receiver: *r,
        })
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(Violation::UnexpectedFlow {
            source_id,
            sink_id,
            offending,
        })
    }
}

/// Ids must be exactly `0..N-1` in storage order.
pub fn transaction_ordering(ids: &[i64]) -> Result<(), Violation> {
    let offending: Vec<IdMismatch> = ids
        .iter()
        .enumerate()
        .filter_map(|(index, observed)| {
            let expected = i64::try_from(index).unwrap_or(i64::MAX);
            (*observed != expected).then_some(IdMismatch {
                index,
                expected,
                observed: *observed,
            })
        })
        .collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(Violation::NonMonotonicIds {
            len: ids.len(),
            offending,
        })
    }
}

/// Every quantity must equal the first, bit for bit.
pub fn quantity_uniformity(quantities: &[f64]) -> Result<(), Violation> {
    let mut distinct: Vec<f64> = Vec::new();
    for q in quantities {
        if !distinct.iter().any(|d| d.to_bits() == q.to_bits()) {
            distinct.push(*q);
        }
    }
    if distinct.len() <= 1 {
        Ok(())
    } else {
        Err(Violation::QuantityMismatch { distinct })
    }
}

/// No id may appear twice.
pub fn unique_ids(table: &str, column: &str, ids: &[i64]) -> Result<(), Violation> {
    let mut seen = BTreeSet::new();
    let duplicates: BTreeSet<i64> = ids.iter().copied().filter(|id| !seen.insert(*id)).collect();
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(Violation::DuplicateIds {
            table: table.to_string(),
            column: column.to_string(),
            duplicates: duplicates.into_iter().collect(),
        })
    }
}

/// Every value must exist in `known`.
pub fn dangling_references(
    table: &str,
    column: &str,
    target_table: &str,
    values: &[i64],
    known: &BTreeSet<i64>,
) -> Result<(), Violation> {
    let offending: BTreeSet<i64> = values.iter().copied().filter(|v| !known.contains(v)).collect();
    if offending.is_empty() {
        Ok(())
    } else {
        Err(Violation::DanglingReference {
            table: table.to_string(),
            column: column.to_string(),
            target_table: target_table.to_string(),
            offending: offending.into_iter().collect(),
        })
    }
}

/// All agents must share one simulation id.
pub fn single_simulation(sim_ids: &[Vec<u8>]) -> Result<(), Violation> {
    let distinct: BTreeSet<&[u8]> = sim_ids.iter().map(Vec::as_slice).collect();
    if distinct.len() <= 1 {
        Ok(())
    } else {
        Err(Violation::MixedSimulations {
            distinct: distinct.into_iter().map(hex::encode).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Checks over a table set
// ---------------------------------------------------------------------------

/// Exactly one agent plays `role`.
#[derive(Debug, Clone)]
pub struct SingletonAgent {
    /// Role the agent plays.
    pub role: AgentRole,
    /// Spec the agent must match exactly.
    pub spec: String,
}

impl Check for SingletonAgent {
    fn name(&self) -> String {
        format!("singleton-{}", self.role)
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        let resolver = AgentResolver::from_records(tables.require(TableName::AgentEntry)?)?;
        Ok(singleton(self.role, &self.spec, &resolver.find_ids(&self.spec)).map(|_| ()).into())
    }
}

/// Every transaction goes from the source to the sink.
#[derive(Debug, Clone)]
pub struct FlowConservation {
    /// Spec of the source agent.
    pub source_spec: String,
    /// Spec of the sink agent.
    pub sink_spec: String,
}

impl Check for FlowConservation {
    fn name(&self) -> String {
        "flow-conservation".to_string()
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        let resolver = AgentResolver::from_records(tables.require(TableName::AgentEntry)?)?;
        let source = singleton(AgentRole::Source, &self.source_spec, &resolver.find_ids(&self.source_spec));
        let sink = singleton(AgentRole::Sink, &self.sink_spec, &resolver.find_ids(&self.sink_spec));
        let (Ok(source_id), Ok(sink_id)) = (source, sink) else {
            return Ok(Verdict::skipped("source and sink are not both unique"));
        };

        let transactions = tables.require(TableName::Transactions)?;
        let senders = project_ints(transactions, "SenderId")?;
        let receivers = project_ints(transactions, "ReceiverId")?;
        Ok(flow_conservation(source_id, sink_id, &senders, &receivers).into())
    }
}

/// Transaction ids are `0..N-1` in storage order.
#[derive(Debug, Clone, Default)]
pub struct TransactionOrdering;

impl Check for TransactionOrdering {
    fn name(&self) -> String {
        "transaction-ordering".to_string()
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        let ids = project_ints(tables.require(TableName::Transactions)?, "TransactionId")?;
        Ok(transaction_ordering(&ids).into())
    }
}

/// All traded quantities are equal.
///
/// When transactions reference resources, only referenced resources count.
#[derive(Debug, Clone, Default)]
pub struct QuantityUniformity;

impl Check for QuantityUniformity {
    fn name(&self) -> String {
        "quantity-uniformity".to_string()
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        let resources = tables.require(TableName::Resources)?;
        let referenced = match tables.get(TableName::Transactions) {
            Some(tx) if tx.has_column("ResourceId") => {
                Some(project_ints(tx, "ResourceId")?.into_iter().collect::<BTreeSet<_>>())
            }
            _ => None,
        };

        let quantities = match referenced {
            Some(referenced) => {
                let ids = project_ints(resources, "ResourceId")?;
                let quantities = project_floats(resources, "Quantity")?;
                ids.iter()
                    .zip(quantities)
                    .filter(|(id, _)| referenced.contains(*id))
                    .map(|(_, q)| q)
                    .collect()
            }
            None => project_floats(resources, "Quantity")?,
        };
        Ok(quantity_uniformity(&quantities).into())
    }
}

/// An id column holds no duplicates.
#[derive(Debug, Clone)]
pub struct UniqueIds {
    /// Table holding the id column.
    pub table: TableName,
    /// Id column.
    pub column: &'static str,
}

impl Check for UniqueIds {
    fn name(&self) -> String {
        format!("unique-ids:{}.{}", self.table, self.column)
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        let ids = project_ints(tables.require(self.table)?, self.column)?;
        Ok(unique_ids(self.table.as_str(), self.column, &ids).into())
    }
}

/// One Transactions id column only references rows that exist.
#[derive(Debug, Clone)]
pub struct ReferentialIntegrity {
    /// Referencing column in Transactions.
    pub column: &'static str,
    /// Table the column refers to.
    pub target: TableName,
    /// Id column of `target`.
    pub target_column: &'static str,
}

impl ReferentialIntegrity {
    /// The three references a transaction carries: sender, receiver and
    /// the resource it moved.
    pub fn transaction_references() -> [Self; 3] {
        [
            Self {
                column: "SenderId",
                target: TableName::AgentEntry,
                target_column: "AgentId",
            },
            Self {
                column: "ReceiverId",
                target: TableName::AgentEntry,
                target_column: "AgentId",
            },
            Self {
                column: "ResourceId",
                target: TableName::Resources,
                target_column: "ResourceId",
            },
        ]
    }
}

impl Check for ReferentialIntegrity {
    fn name(&self) -> String {
        format!("referential-integrity:{}.{}", TableName::Transactions, self.column)
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        let transactions = tables.require(TableName::Transactions)?;
        if !transactions.has_column(self.column) && TableName::Transactions.schema().column(self.column).is_none() {
            return Ok(Verdict::skipped(format!("Transactions has no {} column", self.column)));
        }
        let values = project_ints(transactions, self.column)?;
        let known: BTreeSet<i64> = project_ints(tables.require(self.target)?, self.target_column)?
            .into_iter()
            .collect();
        Ok(dangling_references(
            TableName::Transactions.as_str(),
            self.column,
            self.target.as_str(),
            &values,
            &known,
        )
        .into())
    }
}

/// Every table the store lists decodes.
#[derive(Debug, Clone, Default)]
pub struct TablesReadable;

impl Check for TablesReadable {
    fn name(&self) -> String {
        "tables-readable".to_string()
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        if let Some((table, _)) = tables.unreadable().next() {
            tables.require(table)?;
        }
        Ok(Verdict::Pass)
    }
}

/// Every agent row carries the same simulation id.
#[derive(Debug, Clone, Default)]
pub struct SingleSimulation;

impl Check for SingleSimulation {
    fn name(&self) -> String {
        "single-simulation".to_string()
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        let agents = tables.require(TableName::AgentEntry)?;
        if !agents.has_column("SimId") {
            return Ok(Verdict::skipped("AgentEntry has no SimId column"));
        }
        Ok(single_simulation(&project_blobs(agents, "SimId")?).into())
    }
}

/// A table that must not have been written.
#[derive(Debug, Clone)]
pub struct TableAbsence {
    /// Table that must be absent.
    pub table: TableName,
}

impl Check for TableAbsence {
    fn name(&self) -> String {
        format!("table-absence:{}", self.table)
    }

    fn run(&self, tables: &TableSet) -> CheckResult<Verdict> {
        if tables.contains(self.table) {
            Ok(Verdict::Fail {
                violation: Violation::UnexpectedTable {
                    table: self.table.as_str().to_string(),
                },
            })
        } else {
            Ok(Verdict::Pass)
        }
    }
}
