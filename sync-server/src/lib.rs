//! # sync-server
//!
//! Synchronization core for the actionsync action log.
//!
//! This crate keeps multiple clients' application state synchronized by
//! exchanging an ordered log of actions tagged with ordering, deduplication
//! and garbage-collection metadata. It implements:
//! - Per-client connection state machines (handshake, authentication,
//!   subprotocol negotiation, zombie detection)
//! - A pluggable action+metadata store with reasons-based retention
//! - A structured lifecycle/error event stream for observability
//!
//! ## Architecture
//!
//! ```text
//! transport ──► SyncServer::on_connect / on_frame / on_close
//!                  │
//!                  ├─► Session (handshake → auth → synchronized)
//!                  ├─► ClientRegistry (one live session per node)
//!                  ├─► MetaStore (ordered, deduplicated log + GC)
//!                  └─► Reporter (lifecycle + error events)
//! ```
//!
//! The transport itself (socket framing, TLS) stays outside: it delivers
//! [`Frame`](protocol::Frame)s into the core and drains each session's
//! outbound channel. Authentication and authorization are asynchronous
//! hooks supplied by the embedding application.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod gc;
pub mod hooks;
pub mod options;
pub mod protocol;
pub mod registry;
pub mod reporter;
pub mod server;
pub mod session;
pub mod store;
