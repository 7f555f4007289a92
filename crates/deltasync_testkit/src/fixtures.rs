//! Test fixtures and server helpers.
//!
//! Provides an in-process server with a deterministic clock and a
//! simulated mobile client replica.

use deltasync_protocol::{DeltaBatch, PullRequest, PullResponse, PushRequest, PushResponse, Record};
use deltasync_server::{columns, Clock, ServerConfig, SyncServer};
use deltasync_store::{Database, DocumentExt, Filter};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Start time of every test clock (2023-11-14T22:13:20Z).
pub const START_MILLIS: i64 = 1_700_000_000_000;

/// Deterministic clock that moves forward one millisecond per reading.
///
/// Like the system clock, no two readings are equal, so cursor boundaries
/// behave as in production while staying reproducible.
#[derive(Debug)]
pub struct StepClock {
    now: AtomicI64,
}

impl StepClock {
    /// Creates a clock whose first reading is `start + 1`.
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Returns the last reading without advancing.
    pub fn peek(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for StepClock {
    fn now_millis(&self) -> i64 {
        self.now.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// A test server with automatic cleanup.
pub struct TestServer {
    /// The server instance.
    pub server: SyncServer,
    /// The server's clock.
    pub clock: Arc<StepClock>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestServer {
    /// Creates a server with an in-memory store.
    pub fn memory() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a server with an in-memory store and the given config.
    pub fn with_config(config: ServerConfig) -> Self {
        let clock = Arc::new(StepClock::new(START_MILLIS));
        let server = SyncServer::with_parts(config, Arc::new(Database::open_in_memory()), clock.clone())
            .expect("Failed to build server");
        Self {
            server,
            clock,
            _temp_dir: None,
        }
    }

    /// Creates a server with a durable store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open database");
        let clock = Arc::new(StepClock::new(START_MILLIS));
        let server = SyncServer::with_parts(ServerConfig::default(), Arc::new(db), clock.clone())
            .expect("Failed to build server");
        Self {
            server,
            clock,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Pulls with the given cursor (`None` on first sync).
    pub async fn pull(&self, cursor: Option<i64>) -> PullResponse {
        let request = PullRequest {
            last_pulled_at: cursor,
            ..PullRequest::default()
        };
        self.server.handle_pull(request).await.expect("Pull failed")
    }

    /// Pushes a request.
    pub async fn push(&self, request: PushRequest) -> PushResponse {
        self.server.handle_push(request).await.expect("Push failed")
    }

    /// Pushes a single table batch.
    pub async fn push_table(&self, mobile_table: &str, batch: DeltaBatch) -> PushResponse {
        self.push(PushRequest::new().with_table(mobile_table, batch)).await
    }

    /// Returns the live (not soft-deleted) records of a server table by id.
    pub fn live_records(&self, server_table: &str) -> BTreeMap<String, Record> {
        self.server
            .database()
            .select(server_table, &Filter::new())
            .expect("Select failed")
            .into_iter()
            .filter(|doc| !doc.flag(columns::IS_DELETED))
            .filter_map(|doc| Some((doc.id()?.to_string(), doc)))
            .collect()
    }
}

impl std::ops::Deref for TestServer {
    type Target = SyncServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

/// Generates a fresh record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builds a record from a JSON object, setting its `id`.
///
/// # Panics
///
/// Panics if `fields` is not a JSON object.
pub fn record(id: &str, fields: Value) -> Record {
    let mut record = fields.as_object().cloned().expect("Record must be an object");
    record.insert(columns::ID.into(), Value::String(id.to_string()));
    record
}

/// Builds a record with a fresh id.
pub fn new_record(fields: Value) -> Record {
    record(&new_id(), fields)
}

/// Returns a copy of the record without server-owned audit columns.
pub fn payload(record: &Record) -> Record {
    let audit = [
        columns::SERVER_CREATED_AT,
        columns::LAST_MODIFIED,
        columns::IS_DELETED,
        columns::DELETED_AT,
        columns::CREATED_AT,
        columns::UPDATED_AT,
    ];
    record
        .iter()
        .filter(|(key, _)| !audit.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// A simulated mobile client.
///
/// Keeps a local copy of every pulled table, queues local changes, and
/// syncs pull-then-push the way WatermelonDB does.
#[derive(Debug, Default)]
pub struct ClientReplica {
    cursor: Option<i64>,
    tables: BTreeMap<String, BTreeMap<String, Record>>,
    pending: BTreeMap<String, DeltaBatch>,
}

impl ClientReplica {
    /// Creates a replica that has never synced.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cursor of the last successful pull.
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    /// Returns the local records of a mobile table.
    pub fn records(&self, mobile_table: &str) -> BTreeMap<String, Record> {
        self.tables.get(mobile_table).cloned().unwrap_or_default()
    }

    /// Returns the ids of the local records of a mobile table.
    pub fn ids(&self, mobile_table: &str) -> Vec<String> {
        self.tables
            .get(mobile_table)
            .map(|rows| rows.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns true if local changes are waiting to be pushed.
    pub fn has_pending(&self) -> bool {
        self.pending.values().any(|batch| !batch.is_empty())
    }

    /// Creates a record locally.
    pub fn create(&mut self, mobile_table: &str, record: Record) {
        let id = record.id().expect("Record needs an id").to_string();
        self.local(mobile_table).insert(id, record.clone());
        self.queue(mobile_table).created.push(record);
    }

    /// Updates a record locally.
    pub fn update(&mut self, mobile_table: &str, record: Record) {
        let id = record.id().expect("Record needs an id").to_string();
        self.local(mobile_table).insert(id, record.clone());
        self.queue(mobile_table).updated.push(record);
    }

    /// Deletes a record locally.
    pub fn delete(&mut self, mobile_table: &str, id: &str) {
        self.local(mobile_table).remove(id);
        self.queue(mobile_table).deleted.push(id.to_string());
    }

    /// Applies a pull response to the local tables and adopts its cursor.
    pub fn apply(&mut self, response: &PullResponse) {
        for (table, batch) in &response.changes {
            let local = self.local(table);
            for record in batch.upserts() {
                if let Some(id) = record.id() {
                    local.insert(id.to_string(), record.clone());
                }
            }
            for id in &batch.deleted {
                local.remove(id);
            }
        }
        self.cursor = Some(response.timestamp);
    }

    /// Pulls, applies the response, then pushes queued changes.
    ///
    /// Queued changes are dropped once the server accepts them.
    pub async fn sync(&mut self, server: &TestServer) -> PushResponse {
        let pulled = server.pull(self.cursor).await;
        self.apply(&pulled);

        let request = PushRequest {
            changes: std::mem::take(&mut self.pending),
        };
        let response = server.push(request.clone()).await;
        if !response.ok {
            self.pending = request.changes;
        }
        response
    }

    fn local(&mut self, mobile_table: &str) -> &mut BTreeMap<String, Record> {
        self.tables.entry(mobile_table.to_string()).or_default()
    }

    fn queue(&mut self, mobile_table: &str) -> &mut DeltaBatch {
        self.pending.entry(mobile_table.to_string()).or_default()
    }
}
