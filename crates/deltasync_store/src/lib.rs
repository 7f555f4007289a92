//! # deltasync Store
//!
//! Embedded record store backing the deltasync server.
//!
//! Tables hold schemaless JSON documents keyed by a string id. The store
//! knows nothing about sync semantics: audit columns are ordinary document
//! fields that callers read and write, and [`Filter`] expresses the column
//! predicates delta queries need.
//!
//! ## Design Principles
//!
//! - Every write goes through [`Database::transaction`], which is atomic:
//!   either all writes of the closure land or none do
//! - Writers are serialized, so a read-modify-write inside one transaction
//!   never interleaves with another writer
//! - Durable databases append each committed transaction to a JSON-lines
//!   journal and periodically fold it into a snapshot
//! - A durable database locks its directory for its whole life; a second
//!   writer is refused, and read-only handles share the lock and never write
//!
//! ## Example
//!
//! ```rust
//! use deltasync_store::{Database, Document, Filter};
//! use serde_json::json;
//!
//! let db = Database::open_in_memory();
//! db.transaction(|txn| {
//!     let doc: Document = json!({"id": "a", "score": 7}).as_object().cloned().unwrap();
//!     txn.put("scores", "a", doc)
//! })
//! .unwrap();
//!
//! let hits = db.select("scores", &Filter::new().gt("score", 5)).unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod database;
mod document;
mod error;
mod filter;
mod journal;
mod transaction;

pub use config::StoreConfig;
pub use database::{Database, TableStats};
pub use document::{Document, DocumentExt};
pub use error::{StoreError, StoreResult};
pub use filter::{Condition, Filter};
pub use journal::{Journal, JournalEntry, JournalWrite};
pub use transaction::Transaction;
