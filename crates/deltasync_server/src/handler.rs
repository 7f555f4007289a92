//! Request handlers for sync endpoints.

use crate::clock::{iso8601, Clock};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::persister::DeltaPersister;
use crate::puller::DeltaPuller;
use crate::registry::EntityRegistry;
use deltasync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use std::sync::Arc;

/// Context for request handling.
#[derive(Debug)]
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Registered entities (shared across all handlers).
    pub registry: Arc<EntityRegistry>,
    /// Time source for cursors and audit stamps.
    pub clock: Arc<dyn Clock>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, registry: Arc<EntityRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            registry,
            clock,
        }
    }
}

/// Handler for sync requests.
#[derive(Debug)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
    puller: DeltaPuller,
    persister: DeltaPersister,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        let puller = DeltaPuller::new(Arc::clone(&context.registry), Arc::clone(&context.clock));
        let persister = DeltaPersister::new(Arc::clone(&context.registry));
        Self {
            context,
            puller,
            persister,
        }
    }

    /// Returns the handler context.
    pub fn context(&self) -> &HandlerContext {
        &self.context
    }

    /// Handles a pull request.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRequest`] for a negative cursor and
    /// [`ServerError::Query`] if any delta query fails.
    pub async fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        let cursor = request
            .cursor()
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

        let response = self.puller.pull(cursor).await?;
        tracing::info!(
            cursor,
            timestamp = response.timestamp,
            changes = response.change_count(),
            "pull served"
        );
        Ok(response)
    }

    /// Handles a push request.
    ///
    /// Per-table failures are reported in the response, not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::TooManyRecords`] if the push exceeds
    /// `max_push_records`; nothing is applied in that case.
    pub async fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        let count = request.record_count();
        let limit = self.context.config.max_push_records;
        if count > limit {
            return Err(ServerError::TooManyRecords { count, limit });
        }

        let report = self.persister.push(&request).await;
        let timestamp = iso8601(self.context.clock.cursor_millis());

        tracing::info!(
            records = count,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            rejected = report.rejected.len(),
            "push applied"
        );
        Ok(PushResponse::new(timestamp, report.rejected))
    }
}
