//! Delta puller: computes what changed since a client's cursor.

use crate::adapter::SyncAdapter;
use crate::clock::Clock;
use crate::error::{ServerError, ServerResult};
use crate::registry::EntityRegistry;
use deltasync_protocol::{DeltaBatch, PullResponse};
use deltasync_store::DocumentExt;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds pull responses from the registered entities.
#[derive(Debug, Clone)]
pub struct DeltaPuller {
    registry: Arc<EntityRegistry>,
    clock: Arc<dyn Clock>,
}

impl DeltaPuller {
    /// Creates a new puller.
    pub fn new(registry: Arc<EntityRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Returns every change to a pushable entity since `cursor`.
    ///
    /// The response timestamp is read before any query runs. A write that
    /// lands while the pull is in flight is stamped after it, so it is
    /// reported again on the next pull rather than lost. Every pushable
    /// entity has an entry in the response, empty or not.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Query`] if any entity's queries fail; no
    /// partial response is produced.
    pub async fn pull(&self, cursor: i64) -> ServerResult<PullResponse> {
        let timestamp = self.clock.cursor_millis();

        let deltas = try_join_all(
            self.registry
                .pushable()
                .map(|adapter| entity_delta(adapter.as_ref(), cursor)),
        )
        .await?;

        let changes: BTreeMap<String, DeltaBatch> = deltas.into_iter().collect();
        tracing::debug!(
            cursor,
            timestamp,
            changes = changes.values().map(DeltaBatch::len).sum::<usize>(),
            "pull computed"
        );
        Ok(PullResponse::new(changes, timestamp))
    }
}

async fn entity_delta(adapter: &dyn SyncAdapter, cursor: i64) -> ServerResult<(String, DeltaBatch)> {
    let descriptor = adapter.descriptor();
    let shape = descriptor.shape;

    let mut filters = vec![shape.created_filter(cursor), shape.updated_filter(cursor)];
    if let Some(deleted) = shape.deleted_filter(cursor) {
        filters.push(deleted);
    }

    let mut results = adapter.select(&filters).await.map_err(|e| {
        tracing::error!(table = descriptor.server_table, error = %e, "delta query failed");
        ServerError::query(descriptor.server_table, &e)
    })?;
    if results.len() != filters.len() {
        return Err(ServerError::Query {
            table: descriptor.server_table.to_string(),
            message: format!("expected {} result sets, got {}", filters.len(), results.len()),
        });
    }

    let deleted = if results.len() == 3 {
        results
            .pop()
            .unwrap_or_default()
            .iter()
            .filter_map(|doc| doc.id().map(str::to_string))
            .collect()
    } else {
        Vec::new()
    };
    let updated = results.pop().unwrap_or_default();
    let created = results.pop().unwrap_or_default();

    Ok((
        descriptor.mobile_table.to_string(),
        DeltaBatch::from_parts(created, updated, deleted),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ApplyOutcome;
    use crate::clock::ManualClock;
    use crate::descriptor::EntityDescriptor;
    use async_trait::async_trait;
    use deltasync_protocol::Record;
    use deltasync_store::{Database, Filter, StoreError};
    use serde_json::json;

    struct BrokenAdapter(EntityDescriptor);

    #[async_trait]
    impl SyncAdapter for BrokenAdapter {
        fn descriptor(&self) -> &EntityDescriptor {
            &self.0
        }

        async fn select(&self, _filters: &[Filter]) -> ServerResult<Vec<Vec<Record>>> {
            Err(StoreError::Corrupted("disk on fire".into()).into())
        }

        async fn upsert_from_delta(&self, _record: &Record) -> ServerResult<ApplyOutcome> {
            unreachable!()
        }

        async fn delete_from_delta(&self, _id: &str) -> ServerResult<ApplyOutcome> {
            unreachable!()
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        registry: Arc<EntityRegistry>,
        puller: DeltaPuller,
    }

    fn fixture(descriptors: &[EntityDescriptor], extra: Option<Arc<dyn SyncAdapter>>) -> Fixture {
        let db = Arc::new(Database::open_in_memory());
        let clock = Arc::new(ManualClock::new(100));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let mut registry = EntityRegistry::from_descriptors(descriptors, &db, &dyn_clock).unwrap();
        if let Some(adapter) = extra {
            registry.register(adapter).unwrap();
        }
        let registry = Arc::new(registry);
        Fixture {
            clock,
            puller: DeltaPuller::new(Arc::clone(&registry), dyn_clock),
            registry,
        }
    }

    fn record(id: &str) -> Record {
        json!({"id": id}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn classifies_created_updated_deleted() {
        let f = fixture(&[EntityDescriptor::standard("events", "events")], None);
        let events = f.registry.by_server_table("events").unwrap();

        // Stored at 100, modified at 200.
        events.upsert_from_delta(&record("e1")).await.unwrap();
        f.clock.set(200);
        events.upsert_from_delta(&record("e1")).await.unwrap();

        f.clock.set(1000);
        let response = f.puller.pull(50).await.unwrap();
        assert_eq!(response.timestamp, 1000);
        let batch = response.table("events").unwrap();
        assert_eq!(batch.created.len(), 1);
        assert!(batch.updated.is_empty());

        let response = f.puller.pull(150).await.unwrap();
        let batch = response.table("events").unwrap();
        assert!(batch.created.is_empty());
        assert_eq!(batch.updated.len(), 1);
        assert_eq!(batch.updated[0]["id"], "e1");

        // Deleted at 300.
        f.clock.set(300);
        events.delete_from_delta("e1").await.unwrap();
        f.clock.set(1000);
        let response = f.puller.pull(250).await.unwrap();
        let batch = response.table("events").unwrap();
        assert!(batch.created.is_empty());
        assert!(batch.updated.is_empty());
        assert_eq!(batch.deleted, vec!["e1".to_string()]);

        let response = f.puller.pull(350).await.unwrap();
        assert!(response.table("events").unwrap().is_empty());
    }

    #[tokio::test]
    async fn created_then_deleted_since_cursor_is_only_deleted() {
        let f = fixture(&[EntityDescriptor::standard("events", "events")], None);
        let events = f.registry.by_server_table("events").unwrap();
        events.upsert_from_delta(&record("gone")).await.unwrap();
        f.clock.set(110);
        events.delete_from_delta("gone").await.unwrap();

        let response = f.puller.pull(0).await.unwrap();
        let batch = response.table("events").unwrap();
        assert!(batch.created.is_empty());
        assert_eq!(batch.deleted, vec!["gone".to_string()]);
    }

    #[tokio::test]
    async fn uses_mobile_names_and_lists_every_entity() {
        let f = fixture(
            &[
                EntityDescriptor::standard("patient_registration_forms", "registration_forms")
                    .push_only(),
                EntityDescriptor::create_only("string_ids", "string_ids"),
                EntityDescriptor::standard("patients", "patients"),
            ],
            None,
        );
        f.registry
            .by_server_table("patient_registration_forms")
            .unwrap()
            .upsert_from_delta(&record("form"))
            .await
            .unwrap();

        let response = f.puller.pull(0).await.unwrap();
        let tables: Vec<_> = response.changes.keys().map(String::as_str).collect();
        assert_eq!(tables, vec!["patients", "registration_forms", "string_ids"]);
        assert_eq!(response.table("registration_forms").unwrap().created.len(), 1);
        assert!(response.table("patients").unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_only_deltas() {
        let f = fixture(&[EntityDescriptor::create_only("string_ids", "string_ids")], None);
        let ids = f.registry.by_server_table("string_ids").unwrap();
        ids.upsert_from_delta(&record("s1")).await.unwrap();
        f.clock.set(200);
        ids.upsert_from_delta(&record("s1")).await.unwrap();

        let batch = f.puller.pull(100).await.unwrap().changes.remove("string_ids").unwrap();
        assert!(batch.created.is_empty());
        assert_eq!(batch.updated.len(), 1);
        assert!(batch.deleted.is_empty());
    }

    #[tokio::test]
    async fn failing_entity_aborts_pull() {
        let broken: Arc<dyn SyncAdapter> =
            Arc::new(BrokenAdapter(EntityDescriptor::standard("visits", "visits")));
        let f = fixture(&[EntityDescriptor::standard("patients", "patients")], Some(broken));

        let err = f.puller.pull(0).await.unwrap_err();
        match err {
            ServerError::Query { table, message } => {
                assert_eq!(table, "visits");
                assert!(message.contains("disk on fire"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
