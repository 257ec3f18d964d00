//! Frames exchanged with the transport collaborator and subprotocol
//! negotiation.
//!
//! The core never opens sockets. A transport delivers inbound [`Frame`]s
//! via [`SyncServer::on_frame`](crate::server::SyncServer::on_frame) and
//! drains each session's outbound channel; how frames are encoded on the
//! wire is the transport's business.

use crate::error::ProtocolError;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use sync_types::{Action, ActionId, Meta};

/// Sync protocol version spoken by this server.
pub const PROTOCOL_VERSION: u32 = 1;

/// A protocol frame, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    /// Client handshake: the first frame on every connection.
    Hello {
        /// Sync protocol version the client speaks.
        protocol: u32,
        /// Application subprotocol version, e.g. `"1.4.0"`.
        subprotocol: String,
        /// The client's stable node id.
        node_id: String,
        /// Opaque credentials for the authentication hook.
        credentials: serde_json::Value,
    },
    /// Server reply completing a successful handshake.
    Welcome {
        /// The server's subprotocol version.
        subprotocol: String,
        /// The server's node id.
        node_id: String,
    },
    /// An action with its metadata, in either direction.
    Action {
        /// The opaque action.
        action: Action,
        /// Its ordering/retention metadata.
        meta: Meta,
    },
    /// Client acknowledgement that an action was applied locally.
    Ack {
        /// Id of the acknowledged action.
        id: ActionId,
    },
    /// Server-reported error, sent before closing the session.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// Graceful disconnect.
    Bye,
}

impl Frame {
    /// Short name used in diagnostics and `UnexpectedFrame` errors.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Welcome { .. } => "welcome",
            Frame::Action { .. } => "action",
            Frame::Ack { .. } => "ack",
            Frame::Error { .. } => "error",
            Frame::Bye => "bye",
        }
    }
}

/// A subprotocol compatibility range, e.g. `"2.x || 1.x"`.
///
/// Alternatives separated by `||` are each a semver requirement; a client
/// version is compatible when any alternative matches.
#[derive(Debug, Clone)]
pub struct SubprotocolRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl SubprotocolRange {
    /// Parse a range expression.
    pub fn parse(range: &str) -> Result<Self, ProtocolError> {
        let alternatives = range
            .split("||")
            .map(|part| VersionReq::parse(part.trim()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProtocolError::InvalidRange {
                range: range.to_string(),
                reason: e.to_string(),
            })?;
        if alternatives.is_empty() {
            return Err(ProtocolError::InvalidRange {
                range: range.to_string(),
                reason: "empty range".to_string(),
            });
        }
        Ok(Self {
            raw: range.to_string(),
            alternatives,
        })
    }

    /// The original range expression.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check a client's single version string against the range.
    ///
    /// An unparsable client version is reported as a mismatch, not a
    /// server-side error: the client is at fault.
    pub fn check(&self, version: &str) -> Result<(), ProtocolError> {
        let mismatch = || ProtocolError::SubprotocolMismatch {
            supported: self.raw.clone(),
            used: version.to_string(),
        };
        let parsed = Version::parse(version).map_err(|_| mismatch())?;
        if self.alternatives.iter().any(|req| req.matches(&parsed)) {
            Ok(())
        } else {
            Err(mismatch())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_accepts_any_alternative() {
        let range = SubprotocolRange::parse("2.x || 1.x").unwrap();
        assert!(range.check("1.0.0").is_ok());
        assert!(range.check("1.9.3").is_ok());
        assert!(range.check("2.5.0").is_ok());
    }

    #[test]
    fn range_rejects_outside_versions() {
        let range = SubprotocolRange::parse("2.x || 1.x").unwrap();
        let err = range.check("3.0.0").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::SubprotocolMismatch {
                supported: "2.x || 1.x".into(),
                used: "3.0.0".into(),
            }
        );
    }

    #[test]
    fn unparsable_client_version_is_a_mismatch() {
        let range = SubprotocolRange::parse("1.x").unwrap();
        assert!(matches!(
            range.check("not-a-version"),
            Err(ProtocolError::SubprotocolMismatch { .. })
        ));
    }

    #[test]
    fn invalid_range_is_a_server_error() {
        assert!(matches!(
            SubprotocolRange::parse("totally wrong"),
            Err(ProtocolError::InvalidRange { .. })
        ));
    }

    #[test]
    fn frame_names() {
        let frame = Frame::Hello {
            protocol: PROTOCOL_VERSION,
            subprotocol: "1.0.0".into(),
            node_id: "client:a".into(),
            credentials: serde_json::Value::Null,
        };
        assert_eq!(frame.name(), "hello");
        assert_eq!(Frame::Bye.name(), "bye");
    }

    #[test]
    fn frame_serde_roundtrip() {
        let frame = Frame::Ack {
            id: ActionId::new(1, "client:a", 0),
        };
        let json = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
