//! Property-based test generators using proptest.
//!
//! Timelines are sequences of device operations. Record selectors are
//! resolved against the device's replica when the operation runs, so
//! updates and deletes always target records the device knows about.

use crate::fixtures::{new_record, ClientReplica, TestServer};
use deltasync_protocol::PushResponse;
use proptest::prelude::*;
use serde_json::json;

/// Mobile tables exercised by generated timelines, with whether they
/// accept deletes.
pub const TIMELINE_TABLES: &[(&str, bool)] = &[
    ("patients", true),
    ("visits", true),
    ("string_ids", false),
];

/// One step of a multi-device timeline.
#[derive(Debug, Clone)]
pub enum SyncOp {
    /// A device creates a record with a fresh id.
    Create {
        /// Device index.
        device: usize,
        /// Index into [`TIMELINE_TABLES`].
        table: usize,
        /// Payload value.
        value: i64,
    },
    /// A device edits one of the records it has locally.
    Update {
        /// Device index.
        device: usize,
        /// Index into [`TIMELINE_TABLES`].
        table: usize,
        /// Record selector, taken modulo the local record count.
        pick: usize,
        /// Payload value.
        value: i64,
    },
    /// A device deletes one of the records it has locally.
    Delete {
        /// Device index.
        device: usize,
        /// Index into [`TIMELINE_TABLES`].
        table: usize,
        /// Record selector, taken modulo the local record count.
        pick: usize,
    },
    /// A device syncs (pull, then push).
    Sync {
        /// Device index.
        device: usize,
    },
    /// Time passes on the server.
    Wait(i64),
}

/// Strategy for a single timeline operation.
pub fn sync_op_strategy(devices: usize) -> impl Strategy<Value = SyncOp> {
    let tables = TIMELINE_TABLES.len();
    prop_oneof![
        3 => (0..devices, 0..tables, any::<i64>())
            .prop_map(|(device, table, value)| SyncOp::Create { device, table, value }),
        2 => (0..devices, 0..tables, any::<usize>(), any::<i64>())
            .prop_map(|(device, table, pick, value)| SyncOp::Update { device, table, pick, value }),
        1 => (0..devices, 0..tables, any::<usize>())
            .prop_map(|(device, table, pick)| SyncOp::Delete { device, table, pick }),
        3 => (0..devices).prop_map(|device| SyncOp::Sync { device }),
        1 => (1i64..5_000).prop_map(SyncOp::Wait),
    ]
}

/// Strategy for a timeline of up to `max_len` operations.
pub fn timeline_strategy(devices: usize, max_len: usize) -> impl Strategy<Value = Vec<SyncOp>> {
    prop::collection::vec(sync_op_strategy(devices), 0..max_len)
}

/// Strategy for client cursors as sent on the wire.
pub fn wire_cursor_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        (0i64..=i64::MAX / 2).prop_map(|c| json!(c)),
        (0i64..=i64::MAX / 2).prop_map(|c| json!(c.to_string())),
    ]
}

/// Runs a timeline against a server with one replica per device.
///
/// Returns the push responses in order. Deletes on tables without delete
/// support are skipped.
pub async fn run_timeline(
    server: &TestServer,
    replicas: &mut [ClientReplica],
    ops: &[SyncOp],
) -> Vec<PushResponse> {
    let mut responses = Vec::new();
    for op in ops {
        match *op {
            SyncOp::Create { device, table, value } => {
                let (name, _) = TIMELINE_TABLES[table];
                replicas[device].create(name, new_record(json!({ "value": value })));
            }
            SyncOp::Update { device, table, pick, value } => {
                let (name, _) = TIMELINE_TABLES[table];
                let replica = &mut replicas[device];
                let ids = replica.ids(name);
                if ids.is_empty() {
                    continue;
                }
                let id = &ids[pick % ids.len()];
                let mut record = replica.records(name)[id].clone();
                record.insert("value".into(), json!(value));
                replica.update(name, record);
            }
            SyncOp::Delete { device, table, pick } => {
                let (name, deletable) = TIMELINE_TABLES[table];
                let replica = &mut replicas[device];
                let ids = replica.ids(name);
                if !deletable || ids.is_empty() {
                    continue;
                }
                replica.delete(name, &ids[pick % ids.len()]);
            }
            SyncOp::Sync { device } => {
                responses.push(replicas[device].sync(server).await);
            }
            SyncOp::Wait(millis) => server.clock.advance(millis),
        }
    }
    responses
}
