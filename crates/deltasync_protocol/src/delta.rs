//! Per-table delta batches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An opaque record payload.
///
/// The sync layer only inspects `id` and the audit columns; every other
/// field belongs to the entity's own schema.
pub type Record = Map<String, Value>;

/// Created, updated and deleted records of one table, in one direction.
///
/// Any of the three lists may be omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaBatch {
    /// Records new since the cursor.
    #[serde(default)]
    pub created: Vec<Record>,
    /// Records modified since the cursor that already existed before it.
    #[serde(default)]
    pub updated: Vec<Record>,
    /// Ids of records deleted since the cursor.
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl DeltaBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a batch from its three parts.
    #[must_use]
    pub fn from_parts(created: Vec<Record>, updated: Vec<Record>, deleted: Vec<String>) -> Self {
        Self {
            created,
            updated,
            deleted,
        }
    }

    /// Returns true if the batch carries no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Returns the total number of records and ids in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }

    /// Iterates `created` then `updated`: every record an upsert applies.
    pub fn upserts(&self) -> impl Iterator<Item = &Record> {
        self.created.iter().chain(self.updated.iter())
    }
}
