//! Backend-equivalence driver.
//!
//! The same scenario input is materialized once per backend. Each pass works
//! on a throwaway copy of that golden output, runs the full suite, and the
//! reports are compared check by check. Any disagreement, including in the
//! diagnostic payload, is a [`DivergenceError::BackendDivergence`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CheckError, CheckResult, DivergenceError};
use crate::orchestrator::RunOrchestrator;
use crate::storage::{BackendKind, StoreHandle};
use crate::validate::{SuiteReport, Validator, Verdict};

/// Stage name used when a backend fails before any check runs.
pub const OPEN_STAGE: &str = "open";

fn digest_file(path: &Path) -> CheckResult<String> {
    let bytes = fs::read(path).map_err(crate::storage::StoreError::from)?;
    Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
}

/// A golden output produced by one engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Backend the engine wrote.
    pub kind: BackendKind,
    /// Location of the golden file.
    pub path: PathBuf,
    /// blake3 of the file when it was produced.
    pub digest: String,
    /// When the engine produced it.
    pub created_at: DateTime<Utc>,
}

impl Baseline {
    /// Handle for opening the golden file.
    pub fn handle(&self) -> StoreHandle {
        StoreHandle::new(self.path.clone(), self.kind)
    }

    /// True when the file still exists with its original contents.
    pub fn is_intact(&self) -> bool {
        self.path.exists() && digest_file(&self.path).is_ok_and(|d| d == self.digest)
    }
}

/// Golden outputs, created at most once per backend.
///
/// Owned by the caller and passed to each driver run; nothing is global.
#[derive(Debug)]
pub struct BaselineCache {
    dir: PathBuf,
    entries: BTreeMap<BackendKind, Baseline>,
    invocations: usize,
}

impl BaselineCache {
    /// A cache that keeps its golden files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: BTreeMap::new(),
            invocations: 0,
        }
    }

    /// Directory holding the golden files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the golden output for `kind` is written to.
    pub fn baseline_path(&self, kind: BackendKind) -> PathBuf {
        self.dir.join(format!("golden.{}", kind.extension()))
    }

    /// Returns the baseline for `kind`, invoking the engine only if there is
    /// none yet or the file changed since it was produced.
    pub fn ensure(&mut self, kind: BackendKind, orchestrator: &RunOrchestrator, input: &Path) -> CheckResult<Baseline> {
        if let Some(existing) = self.entries.get(&kind) {
            if existing.is_intact() {
                debug!(backend = %kind, "reusing baseline");
                return Ok(existing.clone());
            }
            warn!(backend = %kind, path = %existing.path.display(), "baseline changed on disk, regenerating");
            self.entries.remove(&kind);
        }

        fs::create_dir_all(&self.dir).map_err(crate::storage::StoreError::from)?;
        let path = self.baseline_path(kind);
        self.invocations += 1;
        orchestrator.run(input, &path)?;

        let baseline = Baseline {
            kind,
            digest: digest_file(&path)?,
            path,
            created_at: Utc::now(),
        };
        info!(backend = %kind, path = %baseline.path.display(), "baseline created");
        self.entries.insert(kind, baseline.clone());
        Ok(baseline)
    }

    /// The current baseline for `kind`, if one was produced.
    pub fn get(&self, kind: BackendKind) -> Option<&Baseline> {
        self.entries.get(&kind)
    }

    /// Forgets and deletes the baseline for `kind`.
    pub fn invalidate(&mut self, kind: BackendKind) -> CheckResult<()> {
        if let Some(baseline) = self.entries.remove(&kind) {
            if baseline.path.exists() {
                fs::remove_file(&baseline.path).map_err(crate::storage::StoreError::from)?;
            }
            debug!(backend = %kind, "baseline invalidated");
        }
        Ok(())
    }

    /// Forgets and deletes every baseline.
    pub fn invalidate_all(&mut self) -> CheckResult<()> {
        let kinds: Vec<BackendKind> = self.entries.keys().copied().collect();
        for kind in kinds {
            self.invalidate(kind)?;
        }
        Ok(())
    }

    /// Engine runs performed by this cache so far.
    pub const fn engine_invocations(&self) -> usize {
        self.invocations
    }
}

/// A private copy of a golden output, deleted on drop.
#[derive(Debug)]
pub struct WorkingCopy {
    handle: StoreHandle,
}

impl WorkingCopy {
    /// Copies `source` into `dir` under a unique name.
    pub fn create(source: &StoreHandle, dir: &Path) -> CheckResult<Self> {
        let path = dir.join(format!("working-{}.{}", Uuid::new_v4(), source.kind.extension()));
        fs::copy(&source.path, &path).map_err(crate::storage::StoreError::from)?;
        debug!(from = %source.path.display(), to = %path.display(), "working copy created");
        Ok(Self {
            handle: StoreHandle::new(path, source.kind),
        })
    }

    /// Handle for opening the copy.
    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    /// Location of the copy.
    pub fn path(&self) -> &Path {
        &self.handle.path
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.handle.path.exists() {
            if let Err(e) = fs::remove_file(&self.handle.path) {
                warn!(path = %self.handle.path.display(), error = %e, "failed to remove working copy");
            }
        }
    }
}

/// What happened on one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendOutcome {
    /// The suite ran; individual checks may still have failed.
    Completed {
        /// Verdicts of every check.
        report: SuiteReport,
    },
    /// The store could not be opened or read.
    Aborted {
        /// Full error text.
        error: String,
        /// `error` without file paths; compared across backends.
        #[serde(default)]
        cause: String,
    },
}

/// Outcome of the suite on one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRun {
    /// Backend the suite ran against.
    pub kind: BackendKind,
    /// Completed report or the reason it aborted.
    pub outcome: BackendOutcome,
}

impl BackendRun {
    /// The suite report, unless the backend aborted.
    pub fn report(&self) -> Option<&SuiteReport> {
        match &self.outcome {
            BackendOutcome::Completed { report } => Some(report),
            BackendOutcome::Aborted { .. } => None,
        }
    }

    /// True when the suite completed and every check passed.
    pub fn passed(&self) -> bool {
        self.report().is_some_and(SuiteReport::passed)
    }
}

/// First disagreement between two backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Reference backend.
    pub left: BackendKind,
    /// Backend that disagreed with it.
    pub right: BackendKind,
    /// Check name, or [`OPEN_STAGE`].
    pub check: String,
    /// Verdict JSON or abort reason on `left`.
    pub left_outcome: String,
    /// Verdict JSON or abort reason on `right`.
    pub right_outcome: String,
}

impl From<Divergence> for DivergenceError {
    fn from(d: Divergence) -> Self {
        Self::BackendDivergence {
            left: d.left,
            right: d.right,
            check: d.check,
            left_outcome: d.left_outcome,
            right_outcome: d.right_outcome,
        }
    }
}

/// Per-backend results plus the cross-backend comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquivalenceReport {
    /// One entry per backend, in configured order.
    pub runs: Vec<BackendRun>,
    /// First disagreement, if any.
    pub divergence: Option<Divergence>,
}

impl EquivalenceReport {
    /// The run for `kind`.
    pub fn run(&self, kind: BackendKind) -> Option<&BackendRun> {
        self.runs.iter().find(|r| r.kind == kind)
    }

    /// Every backend completed, every check passed and no backend disagreed.
    pub fn passed(&self) -> bool {
        self.divergence.is_none() && self.runs.iter().all(BackendRun::passed)
    }

    /// # Errors
    /// `BackendDivergence` naming the first disagreeing check.
    pub fn ensure_equivalent(&self) -> Result<(), DivergenceError> {
        match &self.divergence {
            Some(d) => Err(d.clone().into()),
            None => Ok(()),
        }
    }
}

fn describe_outcome(outcome: &BackendOutcome) -> String {
    match outcome {
        BackendOutcome::Completed { .. } => "completed".to_string(),
        BackendOutcome::Aborted { error, .. } => format!("aborted: {error}"),
    }
}

fn verdict_json(verdict: Option<&Verdict>) -> String {
    match verdict {
        Some(v) => serde_json::to_string(v).unwrap_or_else(|_| v.to_string()),
        None => "missing".to_string(),
    }
}

/// Compares every run against the first and returns the first disagreement.
///
/// A backend that aborted disagrees with one that completed, and with one
/// that aborted for a different reason; both are reported at [`OPEN_STAGE`].
pub fn compare(runs: &[BackendRun]) -> Option<Divergence> {
    let (reference, rest) = runs.split_first()?;
    for other in rest {
        let divergence = match (&reference.outcome, &other.outcome) {
            (BackendOutcome::Completed { report: left }, BackendOutcome::Completed { report: right }) => {
                compare_reports(left, right)
            }
            // Both aborted the same way: they agree on the failure.
            (
                BackendOutcome::Aborted { cause: left, .. },
                BackendOutcome::Aborted { cause: right, .. },
            ) if left == right => None,
            _ => Some((
                OPEN_STAGE.to_string(),
                describe_outcome(&reference.outcome),
                describe_outcome(&other.outcome),
            )),
        };
        if let Some((check, left_outcome, right_outcome)) = divergence {
            return Some(Divergence {
                left: reference.kind,
                right: other.kind,
                check,
                left_outcome,
                right_outcome,
            });
        }
    }
    None
}

fn compare_reports(left: &SuiteReport, right: &SuiteReport) -> Option<(String, String, String)> {
    for outcome in &left.outcomes {
        let theirs = right.verdict(&outcome.check);
        if theirs != Some(&outcome.verdict) {
            return Some((outcome.check.clone(), verdict_json(Some(&outcome.verdict)), verdict_json(theirs)));
        }
    }
    right
        .outcomes
        .iter()
        .find(|o| left.outcome(&o.check).is_none())
        .map(|o| (o.check.clone(), verdict_json(None), verdict_json(Some(&o.verdict))))
}

/// Runs one scenario on every configured backend and compares the results.
#[derive(Debug)]
pub struct EquivalenceDriver {
    orchestrator: RunOrchestrator,
    input: PathBuf,
    work_dir: PathBuf,
    backends: Vec<BackendKind>,
    validator: Validator,
}

impl EquivalenceDriver {
    /// A driver over every backend.
    pub fn new(
        orchestrator: RunOrchestrator,
        input: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        validator: Validator,
    ) -> Self {
        Self {
            orchestrator,
            input: input.into(),
            work_dir: work_dir.into(),
            backends: BackendKind::ALL.to_vec(),
            validator,
        }
    }

    /// Restricts the driver to `backends`, in order.
    #[must_use]
    pub fn with_backends(mut self, backends: Vec<BackendKind>) -> Self {
        self.backends = backends;
        self
    }

    /// Backends in the order they run.
    pub fn backends(&self) -> &[BackendKind] {
        &self.backends
    }

    /// Ensures a baseline per backend, validates a fresh working copy of
    /// each, and compares the reports.
    ///
    /// # Errors
    /// Tooling failures (engine, filesystem) abort the whole pass. Store
    /// and schema failures are recorded per backend instead.
    pub fn run(&self, cache: &mut BaselineCache) -> CheckResult<EquivalenceReport> {
        fs::create_dir_all(&self.work_dir).map_err(crate::storage::StoreError::from)?;
        let mut runs = Vec::with_capacity(self.backends.len());
        for &kind in &self.backends {
            let baseline = cache.ensure(kind, &self.orchestrator, &self.input)?;
            let copy = WorkingCopy::create(&baseline.handle(), &self.work_dir)?;
            runs.push(self.validate_one(copy.handle())?);
        }
        Ok(Self::finish(runs))
    }

    /// Validates pre-existing outputs, one per backend, and compares them.
    pub fn verify_handles(validator: &Validator, handles: &[StoreHandle]) -> CheckResult<EquivalenceReport> {
        let runs = handles
            .iter()
            .map(|h| validate_handle(validator, h))
            .collect::<CheckResult<Vec<_>>>()?;
        Ok(Self::finish(runs))
    }

    fn validate_one(&self, handle: &StoreHandle) -> CheckResult<BackendRun> {
        validate_handle(&self.validator, handle)
    }

    fn finish(runs: Vec<BackendRun>) -> EquivalenceReport {
        let divergence = compare(&runs);
        if let Some(ref d) = divergence {
            error!(left = %d.left, right = %d.right, check = %d.check, "backends diverge");
        }
        EquivalenceReport { runs, divergence }
    }
}

fn validate_handle(validator: &Validator, handle: &StoreHandle) -> CheckResult<BackendRun> {
    let outcome = match validator.verify(handle) {
        Ok(report) => BackendOutcome::Completed { report },
        Err(e) if e.is_schema() => {
            warn!(backend = %handle.kind, error = %e, "backend aborted");
            BackendOutcome::Aborted {
                error: e.to_string(),
                cause: e.cause(),
            }
        }
        Err(e) => return Err(e),
    };
    Ok(BackendRun {
        kind: handle.kind,
        outcome,
    })
}

impl From<Divergence> for CheckError {
    fn from(d: Divergence) -> Self {
        Self::Divergence(d.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{CheckOutcome, Violation};

    fn report(verdicts: Vec<(&str, Verdict)>) -> SuiteReport {
        SuiteReport {
            scenario: "source-to-sink".to_string(),
            backend: None,
            outcomes: verdicts
                .into_iter()
                .map(|(check, verdict)| CheckOutcome {
                    check: check.to_string(),
                    verdict,
                })
                .collect(),
            generated_at: Utc::now(),
        }
    }

    fn completed(kind: BackendKind, r: SuiteReport) -> BackendRun {
        BackendRun {
            kind,
            outcome: BackendOutcome::Completed { report: r },
        }
    }

    #[test]
    fn test_identical_reports_agree() {
        let runs = vec![
            completed(BackendKind::Array, report(vec![("a", Verdict::Pass), ("b", Verdict::skipped("x"))])),
            completed(BackendKind::Relational, report(vec![("a", Verdict::Pass), ("b", Verdict::skipped("x"))])),
        ];
        assert!(compare(&runs).is_none());
    }

    #[test]
    fn test_payload_difference_is_divergence() {
        let fail = |matches: Vec<i64>| Verdict::Fail {
            violation: Violation::CardinalityError {
                role: crate::validate::AgentRole::Sink,
                spec: ":agents:Sink".to_string(),
                matches,
            },
        };
        let runs = vec![
            completed(BackendKind::Array, report(vec![("a", Verdict::Pass), ("b", fail(vec![1, 2]))])),
            completed(BackendKind::Relational, report(vec![("a", Verdict::Pass), ("b", fail(vec![1, 3]))])),
        ];
        let d = compare(&runs).unwrap();
        assert_eq!(d.check, "b");
        assert_eq!((d.left, d.right), (BackendKind::Array, BackendKind::Relational));
        assert!(d.left_outcome.contains("[1,2]"));
        assert!(d.right_outcome.contains("[1,3]"));
    }

    #[test]
    fn test_one_sided_abort_diverges_at_open() {
        let runs = vec![
            completed(BackendKind::Array, report(vec![("a", Verdict::Pass)])),
            BackendRun {
                kind: BackendKind::Relational,
                outcome: BackendOutcome::Aborted {
                    error: "Schema missing table(s): Transactions".to_string(),
                    cause: "Schema missing table(s): Transactions".to_string(),
                },
            },
        ];
        let d = compare(&runs).unwrap();
        assert_eq!(d.check, OPEN_STAGE);
        let err = EquivalenceReport {
            runs,
            divergence: Some(d),
        }
        .ensure_equivalent()
        .unwrap_err();
        assert!(err.to_string().contains("Transactions"));
    }

    fn aborted(kind: BackendKind, cause: &str) -> BackendRun {
        BackendRun {
            kind,
            outcome: BackendOutcome::Aborted {
                error: format!("Store error: {cause} ({kind})"),
                cause: cause.to_string(),
            },
        }
    }

    #[test]
    fn test_same_abort_on_both_backends_agrees() {
        let cause = "Store error: Schema missing table(s): Transactions";
        let runs = vec![aborted(BackendKind::Array, cause), aborted(BackendKind::Relational, cause)];
        assert!(compare(&runs).is_none());
        let report = EquivalenceReport { runs, divergence: None };
        assert!(!report.passed());
    }

    #[test]
    fn test_different_aborts_diverge_at_open() {
        let runs = vec![
            aborted(BackendKind::Array, "Store error: Schema missing table(s): Transactions"),
            aborted(BackendKind::Relational, "Store error: Schema missing table(s): Resources"),
        ];
        let d = compare(&runs).unwrap();
        assert_eq!(d.check, OPEN_STAGE);
        assert!(d.left_outcome.contains("Transactions"));
        assert!(d.right_outcome.contains("Resources"));
    }
}
