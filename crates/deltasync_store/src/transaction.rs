//! Transactions.

use crate::database::Tables;
use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::journal::JournalWrite;
use std::collections::BTreeMap;

/// An open transaction.
///
/// Reads see committed state plus the transaction's own pending writes.
/// Writes are buffered and become visible atomically when the closure
/// passed to [`Database::transaction`](crate::Database::transaction)
/// returns `Ok`.
#[derive(Debug)]
pub struct Transaction<'db> {
    base: &'db Tables,
    writes: BTreeMap<(String, String), Document>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(base: &'db Tables) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Gets a document, preferring this transaction's pending write.
    #[must_use]
    pub fn get(&self, table: &str, id: &str) -> Option<&Document> {
        self.writes
            .get(&(table.to_string(), id.to_string()))
            .or_else(|| self.base.get(table).and_then(|rows| rows.get(id)))
    }

    /// Records a full-document write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidDocument`] if the table name or id is empty.
    pub fn put(&mut self, table: &str, id: &str, doc: Document) -> StoreResult<()> {
        if table.is_empty() {
            return Err(StoreError::invalid_document(table, "empty table name"));
        }
        if id.is_empty() {
            return Err(StoreError::invalid_document(table, "empty id"));
        }
        self.writes.insert((table.to_string(), id.to_string()), doc);
        Ok(())
    }

    /// Returns the number of pending writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn into_writes(self) -> Vec<JournalWrite> {
        self.writes
            .into_iter()
            .map(|((table, id), doc)| JournalWrite { table, id, doc })
            .collect()
    }
}
