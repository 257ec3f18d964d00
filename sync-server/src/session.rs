//! Per-connection session state.
//!
//! One [`Session`] exists per transport connection, created on connect and
//! destroyed on close or eviction; a session is never resurrected — a new
//! connection from the same node creates a new session object. State is a
//! tagged variant handled exhaustively; there is no method-overriding
//! hierarchy behind it.

use crate::protocol::Frame;
use crate::reporter::SessionInfo;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// The handshake/authentication state machine.
///
/// ```text
/// Connected → Handshaking → Authenticating → Synchronized → { Zombie, Closing }
/// ```
///
/// `Closing` is terminal and reachable from every state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Transport connected, no handshake frame yet.
    Connected,
    /// Handshake frame received, subprotocol being negotiated.
    Handshaking,
    /// Waiting on the authentication hook.
    Authenticating,
    /// Authenticated and receiving broadcasts.
    Synchronized {
        /// The node id delivered by the handshake.
        node_id: String,
        /// Identity resolved by the authentication hook, if any.
        user: Option<String>,
    },
    /// Superseded by a newer session for the same node. No longer receives
    /// broadcasts; force-closed after a grace delay.
    Zombie {
        /// The node id this session used to own.
        node_id: String,
    },
    /// Terminal. All pending intake for the session is abandoned.
    Closing,
}

impl SessionState {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Connected => "connected",
            SessionState::Handshaking => "handshaking",
            SessionState::Authenticating => "authenticating",
            SessionState::Synchronized { .. } => "synchronized",
            SessionState::Zombie { .. } => "zombie",
            SessionState::Closing => "closing",
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: SessionState,
    remote_subprotocol: Option<String>,
    remote_protocol: Option<u32>,
}

/// A per-connection session.
///
/// Shared between the transport callbacks, the registry and background
/// timers, so all mutable state sits behind a short-lived lock that is
/// never held across an `await`.
#[derive(Debug)]
pub struct Session {
    id: u64,
    outbound: mpsc::UnboundedSender<Frame>,
    shared: Mutex<Shared>,
    /// Serializes frame handling per session, preserving the sender's
    /// sequence order.
    pub(crate) frame_gate: tokio::sync::Mutex<()>,
}

impl Session {
    /// Create a session and the outbound channel the transport drains.
    pub fn new(id: u64) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let session = Self {
            id,
            outbound,
            shared: Mutex::new(Shared {
                state: SessionState::Connected,
                remote_subprotocol: None,
                remote_protocol: None,
            }),
            frame_gate: tokio::sync::Mutex::new(()),
        };
        (session, rx)
    }

    /// Server-local session number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Snapshot for events and hooks.
    pub fn info(&self) -> SessionInfo {
        let shared = self.shared.lock().unwrap();
        let (node_id, user) = match &shared.state {
            SessionState::Synchronized { node_id, user } => (Some(node_id.clone()), user.clone()),
            SessionState::Zombie { node_id } => (Some(node_id.clone()), None),
            _ => (None, None),
        };
        SessionInfo {
            session: self.id,
            node_id,
            subprotocol: shared.remote_subprotocol.clone(),
            user,
        }
    }

    /// Current state, cloned.
    pub fn state(&self) -> SessionState {
        self.shared.lock().unwrap().state.clone()
    }

    /// The subprotocol version the client declared, once known.
    pub fn remote_subprotocol(&self) -> Option<String> {
        self.shared.lock().unwrap().remote_subprotocol.clone()
    }

    /// The sync protocol version the client declared, once known.
    pub fn remote_protocol(&self) -> Option<u32> {
        self.shared.lock().unwrap().remote_protocol
    }

    /// Record the handshake frame's versions and enter `Handshaking`.
    pub fn begin_handshake(&self, subprotocol: String, protocol: u32) {
        let mut shared = self.shared.lock().unwrap();
        shared.remote_subprotocol = Some(subprotocol);
        shared.remote_protocol = Some(protocol);
        shared.state = SessionState::Handshaking;
    }

    /// Enter `Authenticating`.
    pub fn begin_authentication(&self) {
        self.shared.lock().unwrap().state = SessionState::Authenticating;
    }

    /// Enter `Synchronized` with the authenticated identity.
    ///
    /// Refused (returns `false`) when the session already closed — a stale
    /// hook resolution must not resurrect it.
    pub fn synchronize(&self, node_id: String, user: Option<String>) -> bool {
        let mut shared = self.shared.lock().unwrap();
        if shared.state == SessionState::Closing {
            return false;
        }
        shared.state = SessionState::Synchronized { node_id, user };
        true
    }

    /// Demote a synchronized session to `Zombie`.
    ///
    /// Returns `false` when the session was not synchronized (already
    /// closing, or never finished authentication).
    pub fn mark_zombie(&self) -> bool {
        let mut shared = self.shared.lock().unwrap();
        match &shared.state {
            SessionState::Synchronized { node_id, .. } => {
                shared.state = SessionState::Zombie {
                    node_id: node_id.clone(),
                };
                true
            }
            _ => false,
        }
    }

    /// Enter the terminal `Closing` state.
    ///
    /// Returns `false` when the session was already closing, so close
    /// paths racing each other settle on exactly one winner.
    pub fn close(&self) -> bool {
        let mut shared = self.shared.lock().unwrap();
        if shared.state == SessionState::Closing {
            return false;
        }
        shared.state = SessionState::Closing;
        true
    }

    /// Whether the session reached the terminal state.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().unwrap().state == SessionState::Closing
    }

    /// Whether the session is the live, broadcast-receiving one for its
    /// node.
    pub fn is_live(&self) -> bool {
        matches!(
            self.shared.lock().unwrap().state,
            SessionState::Synchronized { .. }
        )
    }

    /// Whether the session was demoted to zombie.
    pub fn is_zombie(&self) -> bool {
        matches!(self.shared.lock().unwrap().state, SessionState::Zombie { .. })
    }

    /// The node id, once authenticated (kept through zombie demotion).
    pub fn node_id(&self) -> Option<String> {
        match &self.shared.lock().unwrap().state {
            SessionState::Synchronized { node_id, .. } | SessionState::Zombie { node_id } => {
                Some(node_id.clone())
            }
            _ => None,
        }
    }

    /// Queue an outbound frame. Delivery failures mean the transport is
    /// gone; the close path handles that, so they are ignored here.
    pub fn send(&self, frame: Frame) {
        let _ = self.outbound.send(frame);
    }

    /// Frames the current state accepts, for `UnexpectedFrame` errors.
    pub fn expected_frames(&self) -> &'static str {
        match self.shared.lock().unwrap().state {
            SessionState::Connected => "hello",
            SessionState::Handshaking | SessionState::Authenticating => "none (handshake pending)",
            SessionState::Synchronized { .. } | SessionState::Zombie { .. } => "action, ack, bye",
            SessionState::Closing => "none",
        }
    }
}
