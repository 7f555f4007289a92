//! Protocol messages for sync.

use crate::delta::DeltaBatch;
use crate::error::{ProtocolError, ProtocolResult};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Pull request from a client.
///
/// `schemaVersion` and `migration` are accepted so that newer clients can
/// send them, but the server does not interpret them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Cursor of the client's last successful pull (epoch ms).
    /// Absent or `null` on the very first sync.
    #[serde(default, deserialize_with = "deserialize_cursor")]
    pub last_pulled_at: Option<i64>,
    /// Client schema version.
    #[serde(
        rename = "schemaVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub schema_version: Option<u32>,
    /// Client migration descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<serde_json::Value>,
}

impl PullRequest {
    /// Creates a pull request for the given cursor.
    #[must_use]
    pub fn new(last_pulled_at: i64) -> Self {
        Self {
            last_pulled_at: Some(last_pulled_at),
            ..Self::default()
        }
    }

    /// Creates a first-sync pull request (no cursor).
    #[must_use]
    pub fn initial() -> Self {
        Self::default()
    }

    /// Returns the effective cursor: `0` on first sync.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidField`] for a negative cursor.
    pub fn cursor(&self) -> ProtocolResult<i64> {
        match self.last_pulled_at {
            None => Ok(0),
            Some(cursor) if cursor < 0 => Err(ProtocolError::invalid_field(
                "last_pulled_at",
                format!("must not be negative, got {}", cursor),
            )),
            Some(cursor) => Ok(cursor),
        }
    }
}

/// Accepts a cursor as an integer, a float, a numeric string (query
/// strings), or `null`/empty/`"null"` for "never pulled".
fn deserialize_cursor<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Option::<Repr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Repr::Int(v)) => Ok(Some(v)),
        Some(Repr::Float(v)) => Ok(Some(v as i64)),
        Some(Repr::Text(text)) => {
            let text = text.trim();
            if text.is_empty() || text == "null" || text == "undefined" {
                return Ok(None);
            }
            text.parse::<i64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("invalid cursor {:?}", text)))
        }
    }
}

/// Pull response from the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Mobile table name -> changes since the cursor.
    pub changes: BTreeMap<String, DeltaBatch>,
    /// New cursor (epoch ms); the client's next `last_pulled_at`.
    pub timestamp: i64,
}

impl PullResponse {
    /// Creates a pull response.
    #[must_use]
    pub fn new(changes: BTreeMap<String, DeltaBatch>, timestamp: i64) -> Self {
        Self { changes, timestamp }
    }

    /// Returns the batch for a mobile table, if present.
    #[must_use]
    pub fn table(&self, mobile_table: &str) -> Option<&DeltaBatch> {
        self.changes.get(mobile_table)
    }

    /// Returns the total number of records and ids across all tables.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.changes.values().map(DeltaBatch::len).sum()
    }
}

/// Push request from a client: mobile table name -> local changes.
///
/// Tables without local changes may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushRequest {
    /// Mobile table name -> changes authored offline.
    pub changes: BTreeMap<String, DeltaBatch>,
}

impl PushRequest {
    /// Creates an empty push request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the batch for a table.
    #[must_use]
    pub fn with_table(mut self, mobile_table: impl Into<String>, batch: DeltaBatch) -> Self {
        self.changes.insert(mobile_table.into(), batch);
        self
    }

    /// Returns the total number of records and ids across all tables.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.changes.values().map(DeltaBatch::len).sum()
    }
}

/// Why a table of a push was not (fully) applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The table name is not registered.
    UnknownTable,
    /// The table exists but does not accept changes from clients.
    NotAccepted,
    /// A record in the batch is malformed (e.g. missing `id`).
    InvalidRecord,
    /// The batch asks for an operation the table does not support.
    Unsupported,
    /// The server failed to persist a change.
    Storage,
}

impl RejectionKind {
    /// Returns true if retrying the same batch may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, RejectionKind::Storage)
    }
}

/// A table of a push that was rejected or only partially applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRejection {
    /// Mobile table name as sent by the client.
    pub table: String,
    /// Rejection category.
    pub kind: RejectionKind,
    /// Human-readable reason.
    pub reason: String,
    /// Number of records and ids of this table applied before the failure.
    #[serde(default)]
    pub applied: usize,
}

/// Push response from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    /// True if every table was fully applied.
    pub ok: bool,
    /// Server time of the push (ISO-8601).
    pub timestamp: String,
    /// Tables that were rejected or only partially applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<TableRejection>,
}

impl PushResponse {
    /// Creates a response; `ok` is derived from `rejected`.
    #[must_use]
    pub fn new(timestamp: impl Into<String>, rejected: Vec<TableRejection>) -> Self {
        Self {
            ok: rejected.is_empty(),
            timestamp: timestamp.into(),
            rejected,
        }
    }

    /// Creates a fully successful response.
    #[must_use]
    pub fn success(timestamp: impl Into<String>) -> Self {
        Self::new(timestamp, Vec::new())
    }

    /// Returns true if any rejection is retryable.
    #[must_use]
    pub fn has_retryable_failures(&self) -> bool {
        self.rejected.iter().any(|r| r.kind.is_retryable())
    }
}
