//! The `simcheck` binary: subcommands and exit status.

mod common;

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use common::{agents, source_to_sink, write, SINK_ID, SINK_SPEC, SOURCE_ID, SOURCE_SPEC};
use simcheck::{open_store, BackendKind, Snapshot, StoreHandle};
use tempfile::tempdir;

fn simcheck(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_simcheck"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn path(p: &Path) -> &str {
    p.to_str().unwrap()
}

#[test]
fn test_check_passing_output_exits_zero() {
    let dir = tempdir().unwrap();
    let handle = write(&source_to_sink(5, 10.0), dir.path(), BackendKind::Array);

    let out = simcheck(&["check", path(&handle.path)]);
    assert_eq!(out.status.code(), Some(0), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("source-to-sink [array]"));
    assert!(stdout.contains("transaction-ordering"));
}

#[test]
fn test_check_failing_verdict_exits_one() {
    let dir = tempdir().unwrap();
    let mut snapshot = source_to_sink(3, 10.0);
    snapshot.insert(agents(&[(SOURCE_ID, SOURCE_SPEC), (SINK_ID, SINK_SPEC), (14, SINK_SPEC)]));
    let handle = write(&snapshot, dir.path(), BackendKind::Relational);

    let out = simcheck(&["--json", "check", path(&handle.path)]);
    assert_eq!(out.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let sink = report["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["check"] == "singleton-sink")
        .unwrap();
    assert_eq!(sink["verdict"]["status"], "fail");
    assert_eq!(sink["verdict"]["violation"]["kind"], "cardinality_error");
}

#[test]
fn test_check_missing_file_exits_two() {
    let dir = tempdir().unwrap();
    let out = simcheck(&["check", path(&dir.path().join("absent.nda"))]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Store not found"));
}

#[test]
fn test_check_two_backends_compares_them() {
    let dir = tempdir().unwrap();
    let array = write(&source_to_sink(4, 2.5), dir.path(), BackendKind::Array);
    let relational = write(&source_to_sink(4, 2.5), dir.path(), BackendKind::Relational);

    let out = simcheck(&["check", path(&array.path), path(&relational.path)]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("backends agree"));
}

#[test]
fn test_convert_round_trip() {
    let dir = tempdir().unwrap();
    let original = source_to_sink(6, 1.5);
    let array = write(&original, dir.path(), BackendKind::Array);
    let sqlite = dir.path().join("converted.sqlite");
    let back = dir.path().join("back.nda");

    assert_eq!(simcheck(&["convert", path(&array.path), path(&sqlite)]).status.code(), Some(0));
    assert_eq!(simcheck(&["convert", path(&sqlite), path(&back)]).status.code(), Some(0));

    let store = open_store(&StoreHandle::new(&back, BackendKind::Array)).unwrap();
    assert_eq!(Snapshot::read_from(store.as_ref()).unwrap(), original);
    assert_eq!(simcheck(&["check", path(&sqlite)]).status.code(), Some(0));
}

#[test]
fn test_inspect_lists_tables() {
    let dir = tempdir().unwrap();
    let handle = write(&source_to_sink(2, 10.0), dir.path(), BackendKind::Relational);

    let out = simcheck(&["--json", "inspect", path(&handle.path)]);
    assert_eq!(out.status.code(), Some(0));
    let tables: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let tx = tables
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "Transactions")
        .unwrap();
    assert_eq!(tx["rows"], 2);
    assert!(tx["missing"].as_array().unwrap().is_empty());
}

#[test]
fn test_verify_with_invalid_config_exits_two() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("simcheck.json");
    fs::write(&config, r#"{ "backends": [] }"#).unwrap();

    let out = simcheck(&["verify", "--config", path(&config)]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("at least one backend"));
}
