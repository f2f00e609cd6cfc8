//! Entity resolver: maps an agent specification onto agent ids.

use std::collections::BTreeSet;

use crate::error::ProjectionError;
use crate::projection::{project_ints, project_texts};
use crate::record::RecordSet;

/// Ids whose spec equals `spec_pattern` exactly.
///
/// `specs` and `ids` are parallel columns; extra entries in the longer one
/// are ignored. Matching is case-sensitive with no wildcards.
///
/// # Example
/// ```
/// use simcheck::find_ids;
///
/// let specs = vec![":agents:Source".to_string(), ":agents:Sink".to_string()];
/// let ids = find_ids(":agents:Sink", &specs, &[12, 13]);
/// assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![13]);
/// ```
pub fn find_ids(spec_pattern: &str, specs: &[String], ids: &[i64]) -> BTreeSet<i64> {
    specs
        .iter()
        .zip(ids)
        .filter(|(spec, _)| spec.as_str() == spec_pattern)
        .map(|(_, id)| *id)
        .collect()
}

/// Projected agent table, ready for repeated lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentResolver {
    specs: Vec<String>,
    ids: Vec<i64>,
}

impl AgentResolver {
    /// Projects `Spec` and `AgentId` out of an agent table.
    pub fn from_records(agents: &RecordSet) -> Result<Self, ProjectionError> {
        Ok(Self {
            specs: project_texts(agents, "Spec")?,
            ids: project_ints(agents, "AgentId")?,
        })
    }

    /// Ids of agents whose spec is exactly `spec`.
    pub fn find_ids(&self, spec: &str) -> BTreeSet<i64> {
        find_ids(spec, &self.specs, &self.ids)
    }

    /// True when `id` is a registered agent.
    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// Every agent id, in row order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Number of agents.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when no agents are registered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
