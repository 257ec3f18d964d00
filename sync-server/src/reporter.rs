//! Structured lifecycle and error events.
//!
//! Every observable transition in the core emits an [`Event`] to an
//! injected [`Reporter`]. The core only ever emits; rendering (human
//! readable, JSON, a metrics pipeline) is the sink's business. There is no
//! global reporter: every component that emits receives its sink
//! explicitly.

use sync_types::{Action, Meta};

/// A point-in-time snapshot of a session, attached to session events.
///
/// Events must not borrow live session state, so they carry this copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Server-local session number.
    pub session: u64,
    /// The node id, absent until the handshake delivered it.
    pub node_id: Option<String>,
    /// Subprotocol version the client declared, absent before handshake.
    pub subprotocol: Option<String>,
    /// Authenticated user identity, absent before authentication.
    pub user: Option<String>,
}

/// The full event vocabulary of the core.
#[derive(Debug, Clone)]
pub enum Event {
    /// The transport was bound.
    Listen {
        /// Bound host.
        host: String,
        /// Bound port.
        port: u16,
        /// Whether TLS is enabled.
        tls: bool,
    },
    /// A transport connection arrived.
    Connect {
        /// The new session.
        session: SessionInfo,
    },
    /// A session passed authentication.
    Authenticated {
        /// The authenticated session.
        session: SessionInfo,
    },
    /// A session failed authentication and is being closed.
    Unauthenticated {
        /// The rejected session.
        session: SessionInfo,
    },
    /// A session ended.
    Disconnect {
        /// The closed session.
        session: SessionInfo,
    },
    /// A session was superseded by a newer one for the same node.
    Zombie {
        /// The demoted session.
        session: SessionInfo,
    },
    /// An action was admitted to the log.
    Add {
        /// The action.
        action: Action,
        /// Its metadata.
        meta: Meta,
    },
    /// An action was garbage-collected.
    Clean {
        /// The collected action.
        action: Action,
        /// Its metadata at collection time.
        meta: Meta,
    },
    /// The authorization hook rejected an action.
    Denied {
        /// The rejected action.
        action: Action,
        /// Its metadata.
        meta: Meta,
    },
    /// An action finished intake, storage and fan-out.
    Processed {
        /// The action.
        action: Action,
        /// Its metadata.
        meta: Meta,
        /// Elapsed wall time in milliseconds.
        duration_ms: u64,
    },
    /// An unexpected failure inside a hook or the core. The process
    /// continues; only errors escaping every boundary are fatal.
    RuntimeError {
        /// Rendered error.
        error: String,
        /// The action being handled, when one was involved.
        action: Option<Action>,
        /// Its metadata, when available.
        meta: Option<Meta>,
    },
    /// A client-caused error on one session.
    ClientError {
        /// The offending session.
        session: SessionInfo,
        /// Rendered error.
        error: String,
    },
    /// A server-caused error while syncing with one session.
    SyncError {
        /// The affected session.
        session: SessionInfo,
        /// Rendered error.
        error: String,
    },
    /// The server finished its shutdown sequence.
    Destroy,
}

impl Event {
    /// The event's name in the reporting vocabulary.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Listen { .. } => "listen",
            Event::Connect { .. } => "connect",
            Event::Authenticated { .. } => "authenticated",
            Event::Unauthenticated { .. } => "unauthenticated",
            Event::Disconnect { .. } => "disconnect",
            Event::Zombie { .. } => "zombie",
            Event::Add { .. } => "add",
            Event::Clean { .. } => "clean",
            Event::Denied { .. } => "denied",
            Event::Processed { .. } => "processed",
            Event::RuntimeError { .. } => "runtimeError",
            Event::ClientError { .. } => "clientError",
            Event::SyncError { .. } => "syncError",
            Event::Destroy => "destroy",
        }
    }
}

/// A sink for core events.
///
/// Reporting is infallible from the core's point of view: a sink must not
/// panic on events it does not care about, it simply ignores them.
pub trait Reporter: Send + Sync {
    /// Consume one event.
    fn report(&self, event: Event);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&self, _event: Event) {}
}

/// Renders events through `tracing`.
///
/// Error-class events come out at `error`/`warn` level, lifecycle events
/// at `info`, per-action events at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, event: Event) {
        match &event {
            Event::Listen { host, port, tls } => {
                tracing::info!(host, port, tls, "listening");
            }
            Event::Connect { session } | Event::Disconnect { session } => {
                tracing::info!(session = session.session, node = ?session.node_id, "{}", event.name());
            }
            Event::Authenticated { session } => {
                tracing::info!(session = session.session, node = ?session.node_id, user = ?session.user, "authenticated");
            }
            Event::Unauthenticated { session } => {
                tracing::warn!(session = session.session, node = ?session.node_id, "authentication failed");
            }
            Event::Zombie { session } => {
                tracing::info!(session = session.session, node = ?session.node_id, "session superseded");
            }
            Event::Add { meta, action } => {
                tracing::debug!(id = %meta.id, kind = %action.kind, "action added");
            }
            Event::Clean { meta, .. } => {
                tracing::debug!(id = %meta.id, "action collected");
            }
            Event::Denied { meta, .. } => {
                tracing::warn!(id = %meta.id, "action denied");
            }
            Event::Processed { meta, duration_ms, .. } => {
                tracing::debug!(id = %meta.id, duration_ms, "action processed");
            }
            Event::RuntimeError { error, .. } => {
                tracing::error!(%error, "runtime error");
            }
            Event::ClientError { session, error } => {
                tracing::warn!(session = session.session, %error, "client error");
            }
            Event::SyncError { session, error } => {
                tracing::error!(session = session.session, %error, "sync error");
            }
            Event::Destroy => {
                tracing::info!("destroyed");
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingReporter;
    use super::*;
    use sync_types::ActionId;

    fn session() -> SessionInfo {
        SessionInfo {
            session: 1,
            node_id: Some("client:a".into()),
            subprotocol: Some("1.0.0".into()),
            user: None,
        }
    }

    #[test]
    fn every_event_has_a_name() {
        let action = Action::new("test");
        let meta = Meta::new(ActionId::new(1, "client:a", 0), 0, "server:x");
        let events = vec![
            Event::Listen {
                host: "127.0.0.1".into(),
                port: 31337,
                tls: false,
            },
            Event::Connect { session: session() },
            Event::Authenticated { session: session() },
            Event::Unauthenticated { session: session() },
            Event::Disconnect { session: session() },
            Event::Zombie { session: session() },
            Event::Add {
                action: action.clone(),
                meta: meta.clone(),
            },
            Event::Clean {
                action: action.clone(),
                meta: meta.clone(),
            },
            Event::Denied {
                action: action.clone(),
                meta: meta.clone(),
            },
            Event::Processed {
                action: action.clone(),
                meta: meta.clone(),
                duration_ms: 3,
            },
            Event::RuntimeError {
                error: "boom".into(),
                action: Some(action),
                meta: Some(meta),
            },
            Event::ClientError {
                session: session(),
                error: "bad frame".into(),
            },
            Event::SyncError {
                session: session(),
                error: "timeout".into(),
            },
            Event::Destroy,
        ];

        let names: Vec<_> = events.iter().map(Event::name).collect();
        assert_eq!(
            names,
            vec![
                "listen",
                "connect",
                "authenticated",
                "unauthenticated",
                "disconnect",
                "zombie",
                "add",
                "clean",
                "denied",
                "processed",
                "runtimeError",
                "clientError",
                "syncError",
                "destroy",
            ]
        );
    }

    #[test]
    fn recording_reporter_keeps_order() {
        let reporter = RecordingReporter::new();
        reporter.report(Event::Connect { session: session() });
        reporter.report(Event::Destroy);
        assert_eq!(reporter.names(), vec!["connect", "destroy"]);
        assert!(reporter.saw("destroy"));
        assert!(!reporter.saw("zombie"));
    }

    #[test]
    fn sinks_accept_every_event() {
        // Neither shipped sink may panic on any event.
        NoopReporter.report(Event::Destroy);
        LogReporter.report(Event::Destroy);
        LogReporter.report(Event::Listen {
            host: "0.0.0.0".into(),
            port: 1,
            tls: true,
        });
    }
}
