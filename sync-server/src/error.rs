//! Error types for sync-server.
//!
//! The taxonomy mirrors the recovery policy: [`ServerError`] is fatal at
//! startup, [`ProtocolError`] and [`SyncError`] are session-scoped, and
//! hook failures are routed through the reporter as `runtimeError` events
//! rather than propagated.

use std::net::SocketAddr;

/// Fatal errors surfaced to the embedding process.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `listen()` was called before an authenticator was supplied.
    #[error("authentication hook is required before listen()")]
    MissingAuthenticator,

    /// The transport failed to bind its address. Not retried.
    #[error("cannot bind {addr}: {}", bind_hint(source))]
    Bind {
        /// The address the transport tried to bind.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Option resolution failed.
    #[error("options error: {0}")]
    Options(#[from] crate::options::OptionsError),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Store backend failure during startup.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The server's own `supports` range expression failed to parse.
    #[error("invalid supports range: {0}")]
    Supports(#[from] ProtocolError),
}

/// Render an operator-friendly hint for common bind failures.
fn bind_hint(source: &std::io::Error) -> String {
    match source.kind() {
        std::io::ErrorKind::AddrInUse => {
            "port already in use (another server may still be running)".to_string()
        }
        std::io::ErrorKind::PermissionDenied => {
            "not allowed to bind this port (use a port >= 1024 or change user)".to_string()
        }
        _ => source.to_string(),
    }
}

/// Session-scoped protocol violations.
///
/// These close the offending session only and never affect other sessions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The client's subprotocol version is outside the supported range.
    #[error("subprotocol {used} is not compatible with supported range {supported}")]
    SubprotocolMismatch {
        /// The server's declared range, e.g. `"2.x || 1.x"`.
        supported: String,
        /// The version the client sent.
        used: String,
    },

    /// The handshake frame could not be interpreted.
    #[error("malformed handshake: {reason}")]
    MalformedHandshake {
        /// Why the handshake was rejected.
        reason: String,
    },

    /// A frame arrived in a state that does not accept it.
    #[error("unexpected frame: expected {expected}, got {actual}")]
    UnexpectedFrame {
        /// Frames the current state accepts.
        expected: String,
        /// The frame that actually arrived.
        actual: String,
    },

    /// A bounded wait elapsed before the client made progress.
    #[error("timeout during {phase}")]
    Timeout {
        /// The phase that timed out (`handshake` or `authentication`).
        phase: &'static str,
    },

    /// The server's own `supports` range string failed to parse.
    #[error("invalid subprotocol range {range:?}: {reason}")]
    InvalidRange {
        /// The offending range expression.
        range: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// A synchronization failure during the action exchange.
///
/// Classified as client-caused or server-caused; the flag decides whether
/// the reporter sees a `clientError` or a `syncError` event.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}")]
pub struct SyncError {
    /// What went wrong.
    pub kind: SyncErrorKind,
    /// `true` when the client is at fault.
    pub client_caused: bool,
}

impl SyncError {
    /// A client-caused sync failure.
    pub fn client(kind: SyncErrorKind) -> Self {
        Self {
            kind,
            client_caused: true,
        }
    }

    /// A server-caused sync failure.
    pub fn server(kind: SyncErrorKind) -> Self {
        Self {
            kind,
            client_caused: false,
        }
    }
}

/// Kinds of sync failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncErrorKind {
    /// The exchange timed out.
    #[error("sync timeout")]
    Timeout,

    /// A frame payload had the wrong shape.
    #[error("wrong format: {0}")]
    WrongFormat(String),

    /// A hook failed while handling the exchange.
    #[error("hook failed: {0}")]
    Hook(String),
}

/// Failures of a pluggable [`MetaStore`](crate::store::MetaStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend rejected or lost the operation.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
