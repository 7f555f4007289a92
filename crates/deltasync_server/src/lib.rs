//! # deltasync Server
//!
//! Offline-first delta sync server for mobile clients.
//!
//! This crate provides:
//! - Entity descriptors and the default entity catalog
//! - Sync adapters per audit shape (standard and create-only)
//! - The delta puller and delta persister
//! - HTTP endpoints (pull, push, health)
//!
//! # Architecture
//!
//! Every syncable entity is declared by an [`EntityDescriptor`] and backed
//! by a [`SyncAdapter`] in the [`EntityRegistry`]. The server stamps audit
//! columns itself; clients only ever see the server's clock through pull
//! cursors.
//!
//! # Protocol
//!
//! The server implements pull-then-push synchronization:
//! 1. Client pulls changes since its last cursor (`null` on first sync)
//! 2. Server answers created / updated / deleted per mobile table, plus a
//!    new cursor read before any query ran
//! 3. Client pushes its local changes; each table is applied independently
//!    and tables that fail are reported back
//!
//! Conflicts resolve by arrival order: the last push to reach the server
//! wins. Deleted records stay deleted.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod adapter;
mod clock;
mod config;
mod descriptor;
mod error;
mod handler;
mod http;
mod persister;
mod puller;
mod registry;
mod server;

pub use adapter::{adapter_for, ApplyOutcome, CreateOnlyAdapter, StandardAdapter, SyncAdapter};
pub use clock::{iso8601, Clock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use descriptor::{columns, AuditShape, EntityDescriptor, DEFAULT_ENTITIES};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use http::router;
pub use persister::{DeltaPersister, PushReport};
pub use puller::DeltaPuller;
pub use registry::EntityRegistry;
pub use server::SyncServer;
