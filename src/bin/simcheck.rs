//! simcheck command line interface
//!
//! Usage:
//!   simcheck verify --config simcheck.json  - Run the engine per backend, validate, compare
//!   simcheck check <file>...                - Validate existing outputs (and compare them)
//!   simcheck inspect <file>                 - List tables and columns
//!   simcheck convert <from> <to>            - Rewrite an output in another backend format
//!
//! Exit status: 0 when everything passed, 1 on a failed check or divergence,
//! 2 when the tooling itself failed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use simcheck::validate::{DEFAULT_SINK_SPEC, DEFAULT_SOURCE_SPEC};
use simcheck::{
    open_store_with, BackendOutcome, BaselineCache, CheckError, CheckResult, EquivalenceDriver, EquivalenceReport,
    RunOrchestrator, Scenario, Snapshot, StoreHandle, SuiteReport, TableName, Validator, VerifyConfig,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simcheck")]
#[command(about = "Verify simulation output tables across storage backends")]
#[command(version)]
struct Cli {
    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScenarioKind {
    SourceToSink,
    NullSink,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine for every backend, validate and compare
    Verify {
        /// Configuration file path
        #[arg(short, long, default_value = "simcheck.json")]
        config: PathBuf,
        /// Keep golden baselines after the run
        #[arg(long)]
        keep_baselines: bool,
    },

    /// Validate existing output files; several files are also compared
    Check {
        /// Output files (.nda, .sqlite)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long, value_enum, default_value = "source-to-sink")]
        scenario: ScenarioKind,
        #[arg(long, default_value = DEFAULT_SOURCE_SPEC)]
        source_spec: String,
        #[arg(long, default_value = DEFAULT_SINK_SPEC)]
        sink_spec: String,
    },

    /// List the tables and columns of an output file
    Inspect {
        file: PathBuf,
    },

    /// Rewrite an output file in the format named by the target extension
    Convert {
        from: PathBuf,
        to: PathBuf,
    },
}

#[derive(Serialize)]
struct TableSummary {
    name: String,
    rows: usize,
    columns: Vec<simcheck::ColumnInfo>,
    /// Required columns of a canonical table that the file lacks.
    missing: Vec<&'static str>,
}

fn print_json<T: Serialize>(value: &T) -> CheckResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CheckError::internal(e.to_string()))?;
    println!("{text}");
    Ok(())
}

fn print_suite(report: &SuiteReport) {
    let backend = report.backend.map_or_else(|| "-".to_string(), |b| b.to_string());
    println!("{} [{backend}]", report.scenario);
    for outcome in &report.outcomes {
        println!("  {:<32} {}", outcome.check, outcome.verdict);
    }
}

fn print_equivalence(report: &EquivalenceReport) {
    for run in &report.runs {
        match &run.outcome {
            BackendOutcome::Completed { report } => print_suite(report),
            BackendOutcome::Aborted { error, .. } => println!("[{}] aborted: {error}", run.kind),
        }
    }
    match &report.divergence {
        Some(d) => println!(
            "DIVERGENCE {} vs {} at '{}':\n  {}: {}\n  {}: {}",
            d.left, d.right, d.check, d.left, d.left_outcome, d.right, d.right_outcome
        ),
        None if report.runs.len() > 1 => println!("backends agree"),
        None => {}
    }
}

fn run_verify(config: PathBuf, keep_baselines: bool, json: bool) -> CheckResult<bool> {
    let config = VerifyConfig::from_file(&config)?.apply_env().validate()?;
    info!(engine = %config.engine.program, input = %config.input.display(), "verify");

    let orchestrator = RunOrchestrator::new(Box::new(config.engine.command()));
    let driver = EquivalenceDriver::new(
        orchestrator,
        config.input.clone(),
        config.work_dir.join("work"),
        Validator::new(config.scenario.clone()),
    )
    .with_backends(config.backends.clone());

    let mut cache = BaselineCache::new(config.work_dir.join("baselines"));
    let result = driver.run(&mut cache);
    if !(keep_baselines || config.keep_baselines) {
        cache.invalidate_all()?;
    }
    let report = result?;

    if json {
        print_json(&report)?;
    } else {
        print_equivalence(&report);
    }
    Ok(report.passed())
}

fn run_check(files: Vec<PathBuf>, scenario: Scenario, json: bool) -> CheckResult<bool> {
    let validator = Validator::new(scenario);
    let handles = files
        .into_iter()
        .map(StoreHandle::from_path)
        .collect::<Result<Vec<_>, _>>()?;

    if let [handle] = handles.as_slice() {
        let report = validator.verify(handle)?;
        if json {
            print_json(&report)?;
        } else {
            print_suite(&report);
        }
        return Ok(report.passed());
    }

    let report = EquivalenceDriver::verify_handles(&validator, &handles)?;
    if json {
        print_json(&report)?;
    } else {
        print_equivalence(&report);
    }
    Ok(report.passed())
}

fn run_inspect(file: PathBuf, json: bool) -> CheckResult<bool> {
    let handle = StoreHandle::from_path(file)?;
    let store = open_store_with(&handle, &[])?;
    let mut tables = Vec::new();
    for name in store.table_names() {
        let rows = store.read_table(&name)?.len();
        let columns = store.schema(&name)?;
        let missing = TableName::parse(&name)
            .map(|t| t.schema().missing_columns(columns.iter().map(|c| c.name.as_str())))
            .unwrap_or_default();
        tables.push(TableSummary {
            name,
            rows,
            columns,
            missing,
        });
    }

    if json {
        print_json(&tables)?;
    } else {
        println!("{} ({})", handle.path.display(), handle.kind);
        for table in &tables {
            println!("  {} ({} rows)", table.name, table.rows);
            if !table.missing.is_empty() {
                println!("    missing required: {}", table.missing.join(", "));
            }
            for col in &table.columns {
                let ty = col.ty.map_or("?", |t| t.as_str());
                println!("    {:>3} {:<24} {ty}", col.index, col.name);
            }
        }
    }
    Ok(true)
}

fn run_convert(from: PathBuf, to: PathBuf) -> CheckResult<bool> {
    let source = StoreHandle::from_path(from)?;
    let target = StoreHandle::from_path(to)?;
    let store = open_store_with(&source, &[])?;
    let snapshot = Snapshot::read_from(store.as_ref())?;
    drop(store);
    let written = snapshot.write(&target)?;
    info!(from = %source.path.display(), to = %written.display(), tables = snapshot.tables().len(), "converted");
    Ok(true)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    let result = match cli.command {
        Commands::Verify { config, keep_baselines } => run_verify(config, keep_baselines, json),
        Commands::Check {
            files,
            scenario,
            source_spec,
            sink_spec,
        } => {
            let scenario = match scenario {
                ScenarioKind::SourceToSink => Scenario::SourceToSink { source_spec, sink_spec },
                ScenarioKind::NullSink => Scenario::NullSink { sink_spec },
            };
            run_check(files, scenario, json)
        }
        Commands::Inspect { file } => run_inspect(file, json),
        Commands::Convert { from, to } => run_convert(from, to),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) if e.is_tooling() || e.is_config() => {
            error!(error = %e, "simcheck failed");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "verification failed");
            ExitCode::from(1)
        }
    }
}
