//! # deltasync Testkit
//!
//! Test utilities for deltasync.
//!
//! This crate provides:
//! - An in-process server fixture with a deterministic clock
//! - A simulated mobile client replica (pull-then-push)
//! - Property-based timeline generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use deltasync_testkit::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let server = TestServer::memory();
//! let mut device = ClientReplica::new();
//! device.create("patients", new_record(json!({"given_name": "Ana"})));
//! assert!(device.sync(&server).await.ok);
//! assert_eq!(server.live_records("patients").len(), 1);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
