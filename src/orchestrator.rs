//! Run orchestrator: invokes the simulation engine and locates its output.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::RunError;

/// Placeholder for the output path in an argument template.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Placeholder for the input path in an argument template.
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Exit status and combined stdout/stderr of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl EngineOutput {
    /// True for exit status 0.
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }
}

/// Something that turns a scenario input into an output file.
///
/// The output format is selected by the output path's extension.
pub trait Engine {
    /// Runs once, blocking until the engine exits.
    ///
    /// # Errors
    /// `Spawn` / `Io` when the engine cannot be started. A non-zero exit is
    /// not an error here; it is reported through [`EngineOutput::status`].
    fn run(&self, input: &Path, output: &Path) -> Result<EngineOutput, RunError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Runs an external program.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandEngine {
    /// Uses the stock `-o {output} --input-file {input}` argument layout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: default_args(),
            cwd: None,
        }
    }

    /// Replaces the argument template.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Runs the engine from `cwd` instead of the current directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Arguments with placeholders substituted.
    pub fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace(OUTPUT_PLACEHOLDER, &output).replace(INPUT_PLACEHOLDER, &input))
            .collect()
    }
}

/// `-o {output} --input-file {input}`
pub fn default_args() -> Vec<String> {
    ["-o", OUTPUT_PLACEHOLDER, "--input-file", INPUT_PLACEHOLDER]
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl Engine for CommandEngine {
    fn run(&self, input: &Path, output: &Path) -> Result<EngineOutput, RunError> {
        let args = self.render_args(input, output);
        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        debug!(program = %self.program, ?args, "spawning engine");

        let out = cmd.output().map_err(|source| RunError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(EngineOutput {
            status: out.status.code(),
            output: combined,
        })
    }

    fn describe(&self) -> String {
        self.program.clone()
    }
}

/// Drives one engine run to a produced output file.
pub struct RunOrchestrator {
    engine: Box<dyn Engine>,
}

impl RunOrchestrator {
    /// Wraps an engine.
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self { engine }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Removes any stale output, runs the engine and checks the result.
    ///
    /// # Errors
    /// - `EngineFailed`: non-zero exit, with the captured output
    /// - `OutputMissing`: success reported but no file was produced
    pub fn run(&self, input: &Path, output: &Path) -> Result<PathBuf, RunError> {
        if output.exists() {
            debug!(path = %output.display(), "removing stale output");
            fs::remove_file(output)?;
        }

        let started = Instant::now();
        let result = self.engine.run(input, output)?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if !result.success() {
            warn!(engine = %self.engine.describe(), status = ?result.status, elapsed_ms, "engine failed");
            return Err(RunError::EngineFailed {
                code: result.status,
                output: result.output,
            });
        }
        if !output.exists() {
            warn!(engine = %self.engine.describe(), path = %output.display(), "engine produced no output");
            return Err(RunError::OutputMissing {
                path: output.to_path_buf(),
                output: result.output,
            });
        }

        info!(
            engine = %self.engine.describe(),
            input = %input.display(),
            output = %output.display(),
            elapsed_ms,
            "engine run complete"
        );
        Ok(output.to_path_buf())
    }
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("engine", &self.engine.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct ScriptedEngine {
        status: Option<i32>,
        write: bool,
    }

    impl Engine for ScriptedEngine {
        fn run(&self, _input: &Path, output: &Path) -> Result<EngineOutput, RunError> {
            if self.write {
                fs::write(output, b"out")?;
            }
            Ok(EngineOutput {
                status: self.status,
                output: "scripted run\n".to_string(),
            })
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn scripted(status: Option<i32>, write: bool) -> RunOrchestrator {
        RunOrchestrator::new(Box::new(ScriptedEngine {
            status,
            write,
        }))
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let engine = CommandEngine::new("cyclus");
        let args = engine.render_args(Path::new("in.xml"), Path::new("out.sqlite"));
        assert_eq!(args, vec!["-o", "out.sqlite", "--input-file", "in.xml"]);

        let custom = CommandEngine::new("sim").with_args(vec!["--out={output}".to_string(), "{input}".to_string()]);
        assert_eq!(
            custom.render_args(Path::new("a"), Path::new("b")),
            vec!["--out=b".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_success_returns_output_path() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.nda");
        fs::write(&out, b"stale").unwrap();

        let path = scripted(Some(0), true).run(Path::new("in.xml"), &out).unwrap();
        assert_eq!(path, out);
        assert_eq!(fs::read(&out).unwrap(), b"out");
    }

    #[test]
    fn test_non_zero_exit_is_fatal() {
        let dir = tempdir().unwrap();
        let err = scripted(Some(1), true)
            .run(Path::new("in.xml"), &dir.path().join("out.nda"))
            .unwrap_err();
        match err {
            RunError::EngineFailed { code, output } => {
                assert_eq!(code, Some(1));
                assert!(output.contains("scripted run"));
            }
            other => panic!("expected EngineFailed, got {other}"),
        }
    }

    #[test]
    fn test_missing_output_after_success() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.nda");
        fs::write(&out, b"stale").unwrap();
        let err = scripted(Some(0), false).run(Path::new("in.xml"), &out).unwrap_err();
        assert!(matches!(err, RunError::OutputMissing { .. }));
        // The stale file is not mistaken for fresh output.
        assert!(!out.exists());
    }

    #[test]
    fn test_unknown_program_fails_to_spawn() {
        let engine = CommandEngine::new("simcheck-no-such-engine-binary");
        let err = engine.run(Path::new("in"), Path::new("out")).unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }
}
