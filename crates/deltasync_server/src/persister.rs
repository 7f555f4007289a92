//! Delta persister: applies a client's pushed changes to storage.

use crate::adapter::{ApplyOutcome, SyncAdapter};
use crate::error::{ServerError, ServerResult};
use crate::registry::EntityRegistry;
use deltasync_protocol::{DeltaBatch, PushRequest, TableRejection};
use std::sync::Arc;

/// Outcome of applying one push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Records newly stored.
    pub inserted: usize,
    /// Records overwritten.
    pub updated: usize,
    /// Records soft-deleted.
    pub deleted: usize,
    /// Operations that changed nothing (tombstoned or unknown ids).
    pub skipped: usize,
    /// Tables whose whole batch was applied.
    pub tables_applied: usize,
    /// Tables that were stopped by an error.
    pub rejected: Vec<TableRejection>,
}

impl PushReport {
    /// Returns true if every table was applied.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Returns true if any table was stopped by a storage failure.
    pub fn has_storage_failures(&self) -> bool {
        self.rejected.iter().any(|r| r.kind.is_retryable())
    }

    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Inserted => self.inserted += 1,
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Deleted => self.deleted += 1,
            ApplyOutcome::AlreadyDeleted | ApplyOutcome::Missing => self.skipped += 1,
        }
    }
}

/// Applies pushed changes through the registered adapters.
#[derive(Debug, Clone)]
pub struct DeltaPersister {
    registry: Arc<EntityRegistry>,
}

impl DeltaPersister {
    /// Creates a new persister.
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    /// Applies every table of a push.
    ///
    /// Tables are applied one after another; within a table, created and
    /// updated records go first, then deletions. The first failing
    /// operation stops its table: operations already applied stay applied
    /// and the remaining tables still run. Reapplying the same push yields
    /// the same stored state.
    ///
    /// Empty batches are skipped without resolving their table, so a client
    /// may list every table it knows about.
    pub async fn push(&self, request: &PushRequest) -> PushReport {
        let mut report = PushReport::default();

        for (mobile_table, batch) in &request.changes {
            if batch.is_empty() {
                continue;
            }

            let adapter = match self.registry.resolve_for_push(mobile_table) {
                Ok(adapter) => adapter,
                Err(e) => {
                    reject(&mut report, mobile_table, 0, &e);
                    continue;
                }
            };

            let mut applied = 0;
            match apply_batch(adapter.as_ref(), batch, &mut report, &mut applied).await {
                Ok(()) => report.tables_applied += 1,
                Err(e) => reject(&mut report, mobile_table, applied, &e),
            }
        }

        report
    }
}

async fn apply_batch(
    adapter: &dyn SyncAdapter,
    batch: &DeltaBatch,
    report: &mut PushReport,
    applied: &mut usize,
) -> ServerResult<()> {
    for record in batch.upserts() {
        let outcome = adapter.upsert_from_delta(record).await?;
        report.record(outcome);
        *applied += 1;
    }
    for id in &batch.deleted {
        let outcome = adapter.delete_from_delta(id).await?;
        report.record(outcome);
        *applied += 1;
    }
    Ok(())
}

fn reject(report: &mut PushReport, table: &str, applied: usize, error: &ServerError) {
    let kind = error.rejection_kind();
    tracing::warn!(table, applied, ?kind, error = %error, "push table rejected");
    report.rejected.push(TableRejection {
        table: table.to_string(),
        kind,
        reason: error.to_string(),
        applied,
    });
}
