//! Verification run configuration.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::orchestrator::{default_args, CommandEngine, OUTPUT_PLACEHOLDER};
use crate::storage::BackendKind;
use crate::validate::Scenario;

/// Environment variable that overrides the engine program.
pub const ENGINE_ENV: &str = "SIMCHECK_ENGINE";

/// How to invoke the simulation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable.
    pub program: String,
    /// Argument template; `{output}` and `{input}` are substituted.
    pub args: Vec<String>,
    /// Working directory for the engine; inherited when unset.
    pub cwd: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "cyclus".to_string(),
            args: default_args(),
            cwd: None,
        }
    }
}

impl EngineConfig {
    /// The engine as a runnable command.
    pub fn command(&self) -> CommandEngine {
        let engine = CommandEngine::new(self.program.clone()).with_args(self.args.clone());
        match &self.cwd {
            Some(cwd) => engine.with_cwd(cwd),
            None => engine,
        }
    }
}

/// Everything `simcheck verify` needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// How to run the engine.
    pub engine: EngineConfig,
    /// Scenario input handed to the engine.
    pub input: PathBuf,
    /// Holds golden baselines and working copies.
    pub work_dir: PathBuf,
    /// Backends to produce and compare.
    pub backends: Vec<BackendKind>,
    /// Scenario checked on every backend.
    pub scenario: Scenario,
    /// Leave golden baselines on disk after the run.
    pub keep_baselines: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            input: PathBuf::from("input.xml"),
            work_dir: std::env::temp_dir().join("simcheck"),
            backends: BackendKind::ALL.to_vec(),
            scenario: Scenario::default(),
            keep_baselines: false,
        }
    }
}

impl VerifyConfig {
    /// Loads a JSON config file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Applies `SIMCHECK_ENGINE` if set and non-empty.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_engine_override(std::env::var(ENGINE_ENV).ok())
    }

    /// Replaces the engine program when `program` is set.
    #[must_use]
    pub fn apply_engine_override(mut self, program: Option<String>) -> Self {
        if let Some(program) = program.filter(|p| !p.trim().is_empty()) {
            self.engine.program = program;
        }
        self
    }

    /// # Errors
    /// `Invalid` naming the first offending field.
    pub fn validate(self) -> Result<Self, ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid { reason });

        if self.engine.program.trim().is_empty() {
            return invalid("engine.program must not be empty".to_string());
        }
        if !self.engine.args.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER)) {
            return invalid(format!("engine.args must contain {OUTPUT_PLACEHOLDER}"));
        }
        if self.backends.is_empty() {
            return invalid("at least one backend is required".to_string());
        }
        let unique: BTreeSet<BackendKind> = self.backends.iter().copied().collect();
        if unique.len() != self.backends.len() {
            return invalid(format!("backends must not repeat (got {:?})", self.backends));
        }
        let specs: Vec<&str> = match &self.scenario {
            Scenario::SourceToSink { source_spec, sink_spec } => vec![source_spec.as_str(), sink_spec.as_str()],
            Scenario::NullSink { sink_spec } => vec![sink_spec.as_str()],
        };
        if specs.iter().any(|s| s.trim().is_empty()) {
            return invalid("scenario agent specs must not be empty".to_string());
        }
        Ok(self)
    }
}
