//! Main sync server.

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::descriptor::{columns, DEFAULT_ENTITIES};
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler};
use crate::http;
use crate::registry::EntityRegistry;
use axum::Router;
use deltasync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use deltasync_store::Database;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

/// The sync server.
///
/// Owns the record store, the entity registry and the request handler.
/// Clients pull deltas since their last cursor and push their local
/// changes back; see [`router`](crate::router) for the endpoints.
///
/// # Example
///
/// ```
/// use deltasync_server::{ServerConfig, SyncServer};
/// use deltasync_protocol::PullRequest;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let server = SyncServer::new(ServerConfig::default()).unwrap();
/// let response = server.handle_pull(PullRequest::initial()).await.unwrap();
/// assert_eq!(response.change_count(), 0);
/// # }
/// ```
#[derive(Debug)]
pub struct SyncServer {
    handler: Arc<RequestHandler>,
    database: Arc<Database>,
}

impl SyncServer {
    /// Creates a server with the default entity catalog.
    ///
    /// Opens the store in `config.data_dir`, or in memory if unset. The
    /// clock starts above every stamp already stored, so writes after a
    /// restart sort after cursors issued before it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or is locked.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let database = match &config.data_dir {
            Some(dir) => Database::open_with_config(dir, config.store_config())?,
            None => Database::open_in_memory(),
        };
        let clock = match database.max_millis(columns::STAMPS)? {
            Some(high_water) => {
                tracing::info!(high_water, "seeding clock from stored stamps");
                SystemClock::starting_after(high_water)
            }
            None => SystemClock::new(),
        };
        Self::with_parts(config, Arc::new(database), Arc::new(clock))
    }

    /// Creates a server with the default entity catalog over an existing
    /// store and clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be registered.
    pub fn with_parts(
        config: ServerConfig,
        database: Arc<Database>,
        clock: Arc<dyn Clock>,
    ) -> ServerResult<Self> {
        let registry = EntityRegistry::from_descriptors(DEFAULT_ENTITIES, &database, &clock)?;
        Ok(Self::with_registry(config, database, registry, clock))
    }

    /// Creates a server with a custom registry.
    pub fn with_registry(
        config: ServerConfig,
        database: Arc<Database>,
        registry: EntityRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        tracing::debug!(entities = registry.len(), "entity registry ready");
        let context = Arc::new(HandlerContext::new(config, Arc::new(registry), clock));
        let handler = Arc::new(RequestHandler::new(context));
        Self { handler, database }
    }

    /// Handles a pull request.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_pull`].
    pub async fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        self.handler.handle_pull(request).await
    }

    /// Handles a push request.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::handle_push`].
    pub async fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(request).await
    }

    /// Returns the HTTP router for this server.
    pub fn router(&self) -> Router {
        http::router(Arc::clone(&self.handler))
    }

    /// Returns the entity registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.handler.context().registry
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.handler.context().config
    }

    /// Returns the record store.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Binds `config.bind_addr` and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if binding or serving fails.
    pub async fn serve<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config().bind_addr).await?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves, then
    /// checkpoints and closes the store.
    ///
    /// # Errors
    ///
    /// Returns an error if serving or closing the store fails.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, entities = self.registry().len(), "sync server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("sync server stopped, closing store");
        self.database.close()?;
        Ok(())
    }
}
