//! # simcheck - Backend-agnostic verification of simulation output
//!
//! A discrete-event simulation engine writes each run as four normalized
//! tables (agents, resources, transactions, run info) into either a
//! columnar array container or a relational database file. simcheck reads
//! those tables back through one interface, checks the domain invariants of
//! the run, and asserts that both storage backends tell the same story.
//!
//! ## Core Concepts
//!
//! - **TableStore**: read access to one output file, whatever its format
//! - **Projection**: one named column as a typed, ordered vector
//! - **Check**: a pure invariant producing a structured [`Verdict`]
//! - **Scenario**: the checks that apply to one kind of run
//! - **EquivalenceDriver**: the same scenario on every backend, compared
//!
//! ## Usage
//!
//! ```rust,ignore
//! use simcheck::{Scenario, StoreHandle, Validator};
//!
//! let handle = StoreHandle::from_path("run.sqlite")?;
//! let report = Validator::new(Scenario::default()).verify(&handle)?;
//! for outcome in &report.outcomes {
//!     println!("{}: {}", outcome.check, outcome.verdict);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod error;
pub mod record;
pub mod schema;
pub mod value;

// Storage and access
pub mod projection;
pub mod resolver;
pub mod storage;

// Validation and orchestration
pub mod config;
pub mod equivalence;
pub mod orchestrator;
pub mod validate;

pub use config::{EngineConfig, VerifyConfig};
pub use equivalence::{
    BackendOutcome, BackendRun, Baseline, BaselineCache, Divergence, EquivalenceDriver, EquivalenceReport, WorkingCopy,
};
pub use error::{CheckError, CheckResult, ConfigError, DivergenceError, ProjectionError, RunError};
pub use orchestrator::{CommandEngine, Engine, EngineOutput, RunOrchestrator};
pub use projection::{project, project_floats, project_ints, project_texts, Column};
pub use record::{Field, Record, RecordSet, RecordSetBuilder};
pub use resolver::{find_ids, AgentResolver};
pub use schema::{ColumnInfo, ColumnType, TableName, TableSchema};
pub use storage::{
    open_store, open_store_with, ArrayStore, ArrayStoreWriter, BackendKind, RelationalStore, RelationalStoreWriter,
    Snapshot, StoreError, StoreHandle, TableStore,
};
pub use validate::{CheckOutcome, Scenario, SuiteReport, TableSet, Validator, Verdict, Violation};
pub use value::Value;
