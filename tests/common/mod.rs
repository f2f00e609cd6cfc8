//! Shared fixtures: an in-process engine and canned runs.

#![allow(dead_code)]

use std::cell::Cell;
use std::io;
use std::path::Path;
use std::rc::Rc;

use simcheck::{
    BackendKind, ColumnType, Engine, EngineOutput, RecordSet, RunError, Snapshot, StoreHandle, Value,
};

pub const SOURCE_ID: i64 = 12;
pub const SINK_ID: i64 = 13;
pub const SOURCE_SPEC: &str = ":agents:Source";
pub const SINK_SPEC: &str = ":agents:Sink";

fn sim_id() -> Value {
    Value::Blob(vec![0xAB; 16])
}

pub fn agents(rows: &[(i64, &str)]) -> RecordSet {
    RecordSet::builder("AgentEntry")
        .column("SimId", ColumnType::Blob)
        .column("AgentId", ColumnType::Int)
        .column("Kind", ColumnType::Text)
        .column("Spec", ColumnType::Text)
        .rows(
            rows.iter()
                .map(|(id, spec)| vec![sim_id(), Value::Int(*id), Value::from("Facility"), Value::from(*spec)]),
        )
        .build()
        .unwrap()
}

pub fn resources(quantities: &[f64]) -> RecordSet {
    RecordSet::builder("Resources")
        .column("SimId", ColumnType::Blob)
        .column("ResourceId", ColumnType::Int)
        .column("Quantity", ColumnType::Float)
        .column("Units", ColumnType::Text)
        .rows(
            quantities
                .iter()
                .enumerate()
                .map(|(i, q)| vec![sim_id(), Value::Int(100 + i as i64), Value::Float(*q), Value::from("kg")]),
        )
        .build()
        .unwrap()
}

/// `(TransactionId, SenderId, ReceiverId)`; transaction `i` moves resource `100 + i`.
pub fn transactions(rows: &[(i64, i64, i64)]) -> RecordSet {
    RecordSet::builder("Transactions")
        .column("SimId", ColumnType::Blob)
        .column("TransactionId", ColumnType::Int)
        .column("SenderId", ColumnType::Int)
        .column("ReceiverId", ColumnType::Int)
        .column("ResourceId", ColumnType::Int)
        .column("Commodity", ColumnType::Text)
        .rows(rows.iter().enumerate().map(|(i, (tx, s, r))| {
            vec![
                sim_id(),
                Value::Int(*tx),
                Value::Int(*s),
                Value::Int(*r),
                Value::Int(100 + i as i64),
                Value::from("commodity"),
            ]
        }))
        .build()
        .unwrap()
}

pub fn info() -> RecordSet {
    RecordSet::builder("Info")
        .column("SimId", ColumnType::Blob)
        .column("Handle", ColumnType::Text)
        .row(vec![sim_id(), Value::from("fixture")])
        .build()
        .unwrap()
}

/// One source shipping `n` resources of `quantity` to one sink.
pub fn source_to_sink(n: usize, quantity: f64) -> Snapshot {
    let tx: Vec<(i64, i64, i64)> = (0..n as i64).map(|i| (i, SOURCE_ID, SINK_ID)).collect();
    Snapshot::new()
        .with_table(agents(&[(SOURCE_ID, SOURCE_SPEC), (SINK_ID, SINK_SPEC)]))
        .with_table(resources(&vec![quantity; n]))
        .with_table(transactions(&tx))
        .with_table(info())
}

/// A lone sink: no transactions are recorded.
pub fn null_sink() -> Snapshot {
    Snapshot::new()
        .with_table(agents(&[(SINK_ID, SINK_SPEC)]))
        .with_table(resources(&[]))
        .with_table(info())
}

pub fn write(snapshot: &Snapshot, dir: &Path, kind: BackendKind) -> StoreHandle {
    let handle = StoreHandle::new(dir.join(format!("run.{}", kind.extension())), kind);
    snapshot.write(&handle).unwrap();
    handle
}

/// Engine stand-in that writes a snapshot in the format named by the output
/// extension.
pub struct FixtureEngine {
    produce: Box<dyn Fn(BackendKind) -> Snapshot>,
    status: i32,
    calls: Rc<Cell<usize>>,
}

impl FixtureEngine {
    pub fn new(snapshot: Snapshot) -> Self {
        Self::per_backend(move |_| snapshot.clone())
    }

    pub fn per_backend(produce: impl Fn(BackendKind) -> Snapshot + 'static) -> Self {
        Self {
            produce: Box::new(produce),
            status: 0,
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Exits with `status` and writes nothing.
    pub fn failing(status: i32) -> Self {
        Self {
            produce: Box::new(|_| Snapshot::new()),
            status,
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Shared invocation counter.
    pub fn calls(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }
}

impl Engine for FixtureEngine {
    fn run(&self, _input: &Path, output: &Path) -> Result<EngineOutput, RunError> {
        self.calls.set(self.calls.get() + 1);
        if self.status != 0 {
            return Ok(EngineOutput {
                status: Some(self.status),
                output: "ERROR: fixture engine failed\n".to_string(),
            });
        }
        let to_io = |e: simcheck::StoreError| RunError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()));
        let handle = StoreHandle::from_path(output).map_err(to_io)?;
        (self.produce)(handle.kind).write(&handle).map_err(to_io)?;
        Ok(EngineOutput {
            status: Some(0),
            output: format!("wrote {}\n", output.display()),
        })
    }

    fn describe(&self) -> String {
        "fixture".to_string()
    }
}
