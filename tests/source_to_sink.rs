//! End-to-end scenario checks against files written in both formats.

mod common;

use common::{
    agents, null_sink, source_to_sink, transactions, write, SINK_ID, SINK_SPEC, SOURCE_ID, SOURCE_SPEC,
};
use simcheck::validate::{AgentRole, FlowMismatch};
use simcheck::{
    open_store, project_floats, project_ints, BackendKind, CheckError, Scenario, StoreError, TableName, Validator,
    Verdict, Violation,
};
use tempfile::tempdir;

fn null_sink_scenario() -> Scenario {
    Scenario::NullSink {
        sink_spec: SINK_SPEC.to_string(),
    }
}

#[test]
fn test_five_transactions_pass_on_both_backends() {
    let dir = tempdir().unwrap();
    for kind in BackendKind::ALL {
        let handle = write(&source_to_sink(5, 10.0), dir.path(), kind);

        let store = open_store(&handle).unwrap();
        let tx = store.read_canonical(TableName::Transactions).unwrap();
        assert_eq!(project_ints(&tx, "TransactionId").unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(project_ints(&tx, "SenderId").unwrap().iter().all(|id| *id == SOURCE_ID));
        assert!(project_ints(&tx, "ReceiverId").unwrap().iter().all(|id| *id == SINK_ID));
        let res = store.read_canonical(TableName::Resources).unwrap();
        assert_eq!(project_floats(&res, "Quantity").unwrap(), vec![10.0; 5]);

        let report = Validator::default().verify(&handle).unwrap();
        assert!(report.passed(), "{kind}: {report:?}");
        assert_eq!(report.backend, Some(kind));
        assert!(report.outcomes.iter().all(|o| o.verdict.is_pass()), "{report:?}");
    }
}

#[test]
fn test_two_sinks_is_a_cardinality_error_and_flow_is_skipped() {
    let dir = tempdir().unwrap();
    let mut snapshot = source_to_sink(3, 10.0);
    snapshot.insert(agents(&[(SOURCE_ID, SOURCE_SPEC), (SINK_ID, SINK_SPEC), (14, SINK_SPEC)]));

    for kind in BackendKind::ALL {
        let handle = write(&snapshot, dir.path(), kind);
        let report = Validator::default().verify(&handle).unwrap();

        assert!(!report.passed());
        assert_eq!(
            report.verdict("singleton-sink"),
            Some(&Verdict::Fail {
                violation: Violation::CardinalityError {
                    role: AgentRole::Sink,
                    spec: SINK_SPEC.to_string(),
                    matches: vec![SINK_ID, 14],
                },
            })
        );
        assert!(report.verdict("singleton-source").unwrap().is_pass());
        assert!(matches!(report.verdict("flow-conservation"), Some(Verdict::Skipped { .. })));
        // Independent checks still ran.
        assert!(report.verdict("transaction-ordering").unwrap().is_pass());
    }
}

#[test]
fn test_missing_transactions_table_stops_before_any_check() {
    let dir = tempdir().unwrap();
    let mut snapshot = source_to_sink(2, 10.0);
    snapshot.remove("Transactions");

    for kind in BackendKind::ALL {
        let handle = write(&snapshot, dir.path(), kind);
        match Validator::default().verify(&handle) {
            Err(CheckError::Store(StoreError::SchemaMissing { tables })) => {
                assert_eq!(tables, vec!["Transactions".to_string()]);
            }
            other => panic!("expected SchemaMissing, got {other:?}"),
        }
    }
}

#[test]
fn test_misrouted_transaction_reports_its_position() {
    let dir = tempdir().unwrap();
    let mut snapshot = source_to_sink(3, 10.0);
    snapshot.insert(transactions(&[(0, SOURCE_ID, SINK_ID), (1, SOURCE_ID, SOURCE_ID), (2, SOURCE_ID, SINK_ID)]));

    let handle = write(&snapshot, dir.path(), BackendKind::Relational);
    let report = Validator::default().verify(&handle).unwrap();
    assert_eq!(
        report.verdict("flow-conservation"),
        Some(&Verdict::Fail {
            violation: Violation::UnexpectedFlow {
                source_id: SOURCE_ID,
                sink_id: SINK_ID,
                offending: vec![FlowMismatch {
                    index: 1,
                    sender: SOURCE_ID,
                    receiver: SOURCE_ID,
                }],
            },
        })
    );
}

#[test]
fn test_out_of_order_ids_and_mixed_quantities() {
    let dir = tempdir().unwrap();
    let mut snapshot = source_to_sink(3, 10.0);
    snapshot.insert(transactions(&[(0, SOURCE_ID, SINK_ID), (2, SOURCE_ID, SINK_ID), (1, SOURCE_ID, SINK_ID)]));
    snapshot.insert(common::resources(&[10.0, 2.5, 10.0]));

    let handle = write(&snapshot, dir.path(), BackendKind::Array);
    let report = Validator::default().verify(&handle).unwrap();
    assert!(matches!(
        report.verdict("transaction-ordering"),
        Some(Verdict::Fail {
            violation: Violation::NonMonotonicIds { len: 3, .. }
        })
    ));
    assert_eq!(
        report.verdict("quantity-uniformity"),
        Some(&Verdict::Fail {
            violation: Violation::QuantityMismatch {
                distinct: vec![10.0, 2.5]
            },
        })
    );
    assert_eq!(report.failures().count(), 2);
}

#[test]
fn test_unknown_agent_is_a_dangling_reference() {
    let dir = tempdir().unwrap();
    let mut snapshot = source_to_sink(2, 10.0);
    snapshot.insert(transactions(&[(0, SOURCE_ID, SINK_ID), (1, 99, SINK_ID)]));

    let handle = write(&snapshot, dir.path(), BackendKind::Array);
    let report = Validator::default().verify(&handle).unwrap();
    assert!(matches!(
        report.verdict("referential-integrity:Transactions.SenderId"),
        Some(Verdict::Fail {
            violation: Violation::DanglingReference { offending, .. }
        }) if offending == &vec![99]
    ));
    assert!(report.verdict("referential-integrity:Transactions.ReceiverId").unwrap().is_pass());
}

#[test]
fn test_every_dangling_column_is_reported() {
    let dir = tempdir().unwrap();
    let mut snapshot = source_to_sink(2, 10.0);
    snapshot.insert(transactions(&[(0, 98, SINK_ID), (1, SOURCE_ID, 99)]));
    snapshot.insert(common::resources(&[10.0]));

    let handle = write(&snapshot, dir.path(), BackendKind::Relational);
    let report = Validator::default().verify(&handle).unwrap();
    for (column, target, dangling) in [
        ("SenderId", "AgentEntry", 98),
        ("ReceiverId", "AgentEntry", 99),
        ("ResourceId", "Resources", 101),
    ] {
        match report.verdict(&format!("referential-integrity:Transactions.{column}")) {
            Some(Verdict::Fail {
                violation:
                    Violation::DanglingReference {
                        column: c,
                        target_table,
                        offending,
                        ..
                    },
            }) => {
                assert_eq!(c, column);
                assert_eq!(target_table, target);
                assert_eq!(offending, &vec![dangling]);
            }
            other => panic!("{column}: expected DanglingReference, got {other:?}"),
        }
    }
}

#[test]
fn test_null_sink_passes_without_transactions() {
    let dir = tempdir().unwrap();
    for kind in BackendKind::ALL {
        let handle = write(&null_sink(), dir.path(), kind);
        let report = Validator::new(null_sink_scenario()).verify(&handle).unwrap();
        assert!(report.passed(), "{kind}: {report:?}");
        assert!(report.verdict("table-absence:Transactions").unwrap().is_pass());
    }
}

#[test]
fn test_null_sink_with_transactions_fails() {
    let dir = tempdir().unwrap();
    let snapshot = null_sink().with_table(transactions(&[(0, SINK_ID, SINK_ID)]));
    let handle = write(&snapshot, dir.path(), BackendKind::Relational);

    let report = Validator::new(null_sink_scenario()).verify(&handle).unwrap();
    assert_eq!(
        report.verdict("table-absence:Transactions"),
        Some(&Verdict::Fail {
            violation: Violation::UnexpectedTable {
                table: "Transactions".to_string(),
            },
        })
    );
}

#[test]
fn test_missing_file_is_a_tooling_error() {
    let dir = tempdir().unwrap();
    let handle = simcheck::StoreHandle::new(dir.path().join("absent.nda"), BackendKind::Array);
    let err = Validator::default().verify(&handle).unwrap_err();
    assert!(err.is_tooling());
}
