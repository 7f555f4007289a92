//! Sync adapters: per-entity storage access for the puller and persister.

use crate::clock::Clock;
use crate::descriptor::{columns, AuditShape, EntityDescriptor};
use crate::error::{ServerError, ServerResult};
use async_trait::async_trait;
use deltasync_protocol::Record;
use deltasync_store::{Database, DocumentExt, Filter};
use serde_json::Value;
use std::sync::Arc;

/// What an upsert or delete did to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new record was stored.
    Inserted,
    /// An existing record was overwritten.
    Updated,
    /// A live record was soft-deleted.
    Deleted,
    /// The record is already soft-deleted; nothing changed.
    AlreadyDeleted,
    /// The record does not exist; nothing changed.
    Missing,
}

impl ApplyOutcome {
    /// Returns true if storage changed.
    pub fn changed(&self) -> bool {
        matches!(
            self,
            ApplyOutcome::Inserted | ApplyOutcome::Updated | ApplyOutcome::Deleted
        )
    }
}

/// Storage access for one syncable entity.
///
/// Every upsert and delete is a single store transaction, so a failure
/// never leaves a half-written record behind.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// Returns the entity's descriptor.
    fn descriptor(&self) -> &EntityDescriptor;

    /// Runs the filters against one consistent view of the entity's table.
    ///
    /// Result `i` holds the matches of `filters[i]`.
    async fn select(&self, filters: &[Filter]) -> ServerResult<Vec<Vec<Record>>>;

    /// Inserts the record if absent, overwrites it if present (keyed by `id`).
    async fn upsert_from_delta(&self, record: &Record) -> ServerResult<ApplyOutcome>;

    /// Deletes the record with the given id.
    async fn delete_from_delta(&self, id: &str) -> ServerResult<ApplyOutcome>;
}

/// Builds the adapter matching a descriptor's audit shape.
pub fn adapter_for(
    descriptor: EntityDescriptor,
    database: Arc<Database>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn SyncAdapter> {
    match descriptor.shape {
        AuditShape::Standard => Arc::new(StandardAdapter::new(descriptor, database, clock)),
        AuditShape::CreateOnly => Arc::new(CreateOnlyAdapter::new(descriptor, database, clock)),
    }
}

fn record_id(descriptor: &EntityDescriptor, record: &Record) -> ServerResult<String> {
    record
        .id()
        .map(str::to_string)
        .ok_or_else(|| ServerError::InvalidRecord {
            table: descriptor.mobile_table.to_string(),
            message: "record has no string id".into(),
        })
}

/// Runs a store call on the blocking thread pool.
///
/// Store calls take locks and may fsync the journal, so they stay off the
/// async workers; concurrent pulls then read in parallel.
async fn blocking<T, F>(database: &Arc<Database>, f: F) -> ServerResult<T>
where
    F: FnOnce(&Database) -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    let database = Arc::clone(database);
    tokio::task::spawn_blocking(move || f(&database))
        .await
        .map_err(|e| ServerError::Internal(format!("storage task failed: {e}")))?
}

async fn select_many(
    database: &Arc<Database>,
    table: &'static str,
    filters: &[Filter],
) -> ServerResult<Vec<Vec<Record>>> {
    let filters = filters.to_vec();
    blocking(database, move |db| Ok(db.select_many(table, &filters)?)).await
}

/// Adapter for entities with the standard audit columns.
///
/// - The server owns the audit columns: client-sent values are replaced
/// - Last write wins: an upsert overwrites the stored payload unconditionally
/// - Tombstones are final: upserting a soft-deleted id changes nothing
#[derive(Debug)]
pub struct StandardAdapter {
    descriptor: EntityDescriptor,
    database: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl StandardAdapter {
    /// Creates a standard adapter.
    pub fn new(
        descriptor: EntityDescriptor,
        database: Arc<Database>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            descriptor,
            database,
            clock,
        }
    }
}

#[async_trait]
impl SyncAdapter for StandardAdapter {
    fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    async fn select(&self, filters: &[Filter]) -> ServerResult<Vec<Vec<Record>>> {
        select_many(&self.database, self.descriptor.server_table, filters).await
    }

    async fn upsert_from_delta(&self, record: &Record) -> ServerResult<ApplyOutcome> {
        let id = record_id(&self.descriptor, record)?;
        let table = self.descriptor.server_table;
        let clock = Arc::clone(&self.clock);
        let record = record.clone();
        let key = id.clone();

        let outcome = blocking(&self.database, move |db| {
            Ok(db.transaction(|txn| {
                let existing = txn
                    .get(table, &key)
                    .map(|doc| (doc.flag(columns::IS_DELETED), doc.millis(columns::SERVER_CREATED_AT)));

                if let Some((true, _)) = existing {
                    return Ok(None);
                }

                // Stamped under the write lock: a pull whose cursor was issued
                // before this point either sees the write or gets a cursor below
                // the stamp.
                let now = clock.now_millis();
                let created_at = existing.and_then(|(_, created)| created).unwrap_or(now);

                let mut doc = record;
                doc.insert(columns::SERVER_CREATED_AT.into(), created_at.into());
                doc.insert(columns::LAST_MODIFIED.into(), now.into());
                doc.insert(columns::IS_DELETED.into(), Value::Bool(false));
                doc.insert(columns::DELETED_AT.into(), Value::Null);
                txn.put(table, &key, doc)?;

                Ok(Some(if existing.is_some() {
                    ApplyOutcome::Updated
                } else {
                    ApplyOutcome::Inserted
                }))
            })?)
        })
        .await?;

        match outcome {
            Some(outcome) => {
                tracing::debug!(table, %id, ?outcome, "applied upsert");
                Ok(outcome)
            }
            None => {
                tracing::debug!(table, %id, "ignored upsert of deleted record");
                Ok(ApplyOutcome::AlreadyDeleted)
            }
        }
    }

    async fn delete_from_delta(&self, id: &str) -> ServerResult<ApplyOutcome> {
        let table = self.descriptor.server_table;
        let clock = Arc::clone(&self.clock);
        let key = id.to_string();

        let outcome = blocking(&self.database, move |db| {
            Ok(db.transaction(|txn| {
                let Some(existing) = txn.get(table, &key) else {
                    return Ok(ApplyOutcome::Missing);
                };
                if existing.flag(columns::IS_DELETED) {
                    return Ok(ApplyOutcome::AlreadyDeleted);
                }

                let now = clock.now_millis();
                let mut doc = existing.clone();
                doc.insert(columns::IS_DELETED.into(), Value::Bool(true));
                doc.insert(columns::DELETED_AT.into(), now.into());
                doc.insert(columns::LAST_MODIFIED.into(), now.into());
                txn.put(table, &key, doc)?;
                Ok(ApplyOutcome::Deleted)
            })?)
        })
        .await?;

        tracing::debug!(table, id, ?outcome, "applied delete");
        Ok(outcome)
    }
}

/// Adapter for create-only entities (`created_at` / `updated_at`).
///
/// Records are superseded by upserts and never deleted.
#[derive(Debug)]
pub struct CreateOnlyAdapter {
    descriptor: EntityDescriptor,
    database: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl CreateOnlyAdapter {
    /// Creates a create-only adapter.
    pub fn new(
        descriptor: EntityDescriptor,
        database: Arc<Database>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            descriptor,
            database,
            clock,
        }
    }
}

#[async_trait]
impl SyncAdapter for CreateOnlyAdapter {
    fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    async fn select(&self, filters: &[Filter]) -> ServerResult<Vec<Vec<Record>>> {
        select_many(&self.database, self.descriptor.server_table, filters).await
    }

    async fn upsert_from_delta(&self, record: &Record) -> ServerResult<ApplyOutcome> {
        let id = record_id(&self.descriptor, record)?;
        let table = self.descriptor.server_table;
        let clock = Arc::clone(&self.clock);
        let record = record.clone();
        let key = id.clone();

        let outcome = blocking(&self.database, move |db| {
            Ok(db.transaction(|txn| {
                let existing = txn.get(table, &key).map(|doc| doc.millis(columns::CREATED_AT));

                let now = clock.now_millis();
                let created_at = existing.flatten().unwrap_or(now);

                let mut doc = record;
                doc.insert(columns::CREATED_AT.into(), created_at.into());
                doc.insert(columns::UPDATED_AT.into(), now.into());
                txn.put(table, &key, doc)?;

                Ok(if existing.is_some() {
                    ApplyOutcome::Updated
                } else {
                    ApplyOutcome::Inserted
                })
            })?)
        })
        .await?;

        tracing::debug!(table, %id, ?outcome, "applied upsert");
        Ok(outcome)
    }

    async fn delete_from_delta(&self, _id: &str) -> ServerResult<ApplyOutcome> {
        Err(ServerError::UnsupportedOperation {
            table: self.descriptor.mobile_table.to_string(),
            operation: "delete",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn setup(descriptor: EntityDescriptor) -> (Arc<Database>, Arc<ManualClock>, Arc<dyn SyncAdapter>) {
        let db = Arc::new(Database::open_in_memory());
        let clock = Arc::new(ManualClock::new(100));
        let adapter = adapter_for(descriptor, Arc::clone(&db), clock.clone());
        (db, clock, adapter)
    }

    #[tokio::test]
    async fn waiting_on_the_write_lock_leaves_the_runtime_free() {
        let (db, _clock, adapter) = setup(EntityDescriptor::standard("patients", "patients"));
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                db.transaction(|_txn| {
                    locked_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok(())
                })
                .unwrap();
            })
        };
        locked_rx.recv().unwrap();

        let upsert = tokio::spawn(async move {
            adapter.upsert_from_delta(&record(json!({"id": "a"}))).await
        });
        // Only runs if the upsert is not parked on the runtime's one worker.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!upsert.is_finished());

        release_tx.send(()).unwrap();
        assert_eq!(upsert.await.unwrap().unwrap(), ApplyOutcome::Inserted);
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn standard_upsert_stamps_audit_columns() {
        let (db, clock, adapter) = setup(EntityDescriptor::standard("patients", "patients"));

        let outcome = adapter
            .upsert_from_delta(&record(json!({
                "id": "a", "given_name": "Ana",
                "server_created_at": 1, "last_modified": 1, "is_deleted": true
            })))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Inserted);

        let stored = db.get("patients", "a").unwrap().unwrap();
        assert_eq!(stored["given_name"], "Ana");
        assert_eq!(stored["server_created_at"], 100);
        assert_eq!(stored["last_modified"], 100);
        assert_eq!(stored["is_deleted"], false);
        assert!(stored["deleted_at"].is_null());

        clock.set(200);
        let outcome = adapter
            .upsert_from_delta(&record(json!({"id": "a", "given_name": "Ana Maria"})))
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Updated);

        let stored = db.get("patients", "a").unwrap().unwrap();
        assert_eq!(stored["given_name"], "Ana Maria");
        assert_eq!(stored["server_created_at"], 100);
        assert_eq!(stored["last_modified"], 200);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let (db, clock, adapter) = setup(EntityDescriptor::standard("visits", "visits"));

        adapter
            .upsert_from_delta(&record(json!({"id": "v", "note": "from device one"})))
            .await
            .unwrap();
        clock.set(150);
        // A stale client edit still overwrites: arrival order decides.
        adapter
            .upsert_from_delta(&record(json!({
                "id": "v", "note": "from device two", "last_modified": 50
            })))
            .await
            .unwrap();

        let stored = db.get("visits", "v").unwrap().unwrap();
        assert_eq!(stored["note"], "from device two");
        assert_eq!(stored["last_modified"], 150);
    }

    #[tokio::test]
    async fn standard_delete_is_soft_and_final() {
        let (db, clock, adapter) = setup(EntityDescriptor::standard("events", "events"));

        adapter
            .upsert_from_delta(&record(json!({"id": "e"})))
            .await
            .unwrap();

        clock.set(300);
        assert_eq!(
            adapter.delete_from_delta("e").await.unwrap(),
            ApplyOutcome::Deleted
        );
        let stored = db.get("events", "e").unwrap().unwrap();
        assert_eq!(stored["is_deleted"], true);
        assert_eq!(stored["deleted_at"], 300);
        assert_eq!(stored["last_modified"], 300);

        clock.set(400);
        assert_eq!(
            adapter.delete_from_delta("e").await.unwrap(),
            ApplyOutcome::AlreadyDeleted
        );
        assert_eq!(
            adapter
                .upsert_from_delta(&record(json!({"id": "e", "revived": true})))
                .await
                .unwrap(),
            ApplyOutcome::AlreadyDeleted
        );

        let stored = db.get("events", "e").unwrap().unwrap();
        assert_eq!(stored["deleted_at"], 300);
        assert!(stored.get("revived").is_none());
    }

    #[tokio::test]
    async fn delete_of_unknown_id_is_a_noop() {
        let (db, _clock, adapter) = setup(EntityDescriptor::standard("events", "events"));
        assert_eq!(
            adapter.delete_from_delta("ghost").await.unwrap(),
            ApplyOutcome::Missing
        );
        assert!(db.get("events", "ghost").unwrap().is_none());
        assert!(!ApplyOutcome::Missing.changed());
    }

    #[tokio::test]
    async fn record_without_id_is_invalid() {
        let (_db, _clock, adapter) = setup(EntityDescriptor::standard("events", "events"));
        let err = adapter
            .upsert_from_delta(&record(json!({"name": "no id"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidRecord { .. }));
    }

    #[tokio::test]
    async fn create_only_upsert_and_delete() {
        let (db, clock, adapter) = setup(EntityDescriptor::create_only("string_ids", "string_ids"));

        adapter
            .upsert_from_delta(&record(json!({"id": "s", "created_at": 1})))
            .await
            .unwrap();
        clock.set(250);
        assert_eq!(
            adapter
                .upsert_from_delta(&record(json!({"id": "s", "value": "x"})))
                .await
                .unwrap(),
            ApplyOutcome::Updated
        );

        let stored = db.get("string_ids", "s").unwrap().unwrap();
        assert_eq!(stored["created_at"], 100);
        assert_eq!(stored["updated_at"], 250);
        assert!(stored.get("is_deleted").is_none());

        let err = adapter.delete_from_delta("s").await.unwrap_err();
        assert!(matches!(err, ServerError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn select_runs_filters_on_server_table() {
        let descriptor = EntityDescriptor::standard("patient_registration_forms", "registration_forms");
        let (_db, _clock, adapter) = setup(descriptor);
        adapter
            .upsert_from_delta(&record(json!({"id": "f"})))
            .await
            .unwrap();

        let results = adapter
            .select(&[AuditShape::Standard.created_filter(0)])
            .await
            .unwrap();
        assert_eq!(results[0].len(), 1);
    }
}
