//! # deltasync Protocol
//!
//! Wire types for the deltasync pull/push protocol.
//!
//! This crate provides:
//! - [`DeltaBatch`], the per-table unit of exchange in both directions
//! - Protocol messages ([`PullRequest`], [`PullResponse`], [`PushRequest`],
//!   [`PushResponse`])
//! - JSON encoding/decoding via [`JsonEncode`] / [`JsonDecode`]
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire format
//!
//! ```text
//! pull request   { "last_pulled_at": 1700000000000, "schemaVersion": 3 }
//! pull response  { "changes": { "patients": { "created": [..], "updated": [..], "deleted": ["id"] } },
//!                  "timestamp": 1700000005000 }
//! push request   { "patients": { "created": [..], "updated": [..], "deleted": [..] } }
//! push response  { "ok": true, "timestamp": "2024-11-14T22:13:25.000Z" }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod delta;
mod error;
mod messages;

pub use codec::{JsonDecode, JsonEncode};
pub use delta::{DeltaBatch, Record};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    PullRequest, PullResponse, PushRequest, PushResponse, RejectionKind, TableRejection,
};
