//! Identity and ordering types for the action log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A globally unique, totally ordered action identifier.
///
/// The order is `(time, node, seq)`: logical time first, then the origin
/// node id lexicographically, then the per-node sequence counter. Two ids
/// comparing equal denote the same action, so `ActionId` doubles as the
/// deduplication key for the log.
///
/// The wall-clock timestamp on [`Meta`](crate::Meta) is advisory only;
/// ordering decisions always use this logical id.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId {
    /// Logical time when the action was created.
    pub time: u64,
    /// Id of the node that created the action.
    pub node: String,
    /// Per-node sequence counter, issued in creation order.
    pub seq: u64,
}

impl ActionId {
    /// Create an id from its three components.
    pub fn new(time: u64, node: impl Into<String>, seq: u64) -> Self {
        Self {
            time,
            node: node.into(),
            seq,
        }
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.time, self.node, self.seq)
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({} {} {})", self.time, self.node, self.seq)
    }
}

impl FromStr for ActionId {
    type Err = ParseIdError;

    /// Parse the `"<time> <node> <seq>"` textual form.
    ///
    /// Time and sequence are parsed as integers, so `"10 a 0"` sorts after
    /// `"9 a 0"` even though the strings compare the other way around.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(' ');
        let (time, node, seq) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(time), Some(node), Some(seq), None) => (time, node, seq),
            _ => {
                return Err(ParseIdError::WrongShape {
                    id: s.to_string(),
                })
            }
        };
        if node.is_empty() {
            return Err(ParseIdError::WrongShape { id: s.to_string() });
        }
        let time = time.parse().map_err(|_| ParseIdError::NotAnInteger {
            field: "time",
            value: time.to_string(),
        })?;
        let seq = seq.parse().map_err(|_| ParseIdError::NotAnInteger {
            field: "seq",
            value: seq.to_string(),
        })?;
        Ok(Self::new(time, node, seq))
    }
}

/// Errors produced when parsing the textual form of an [`ActionId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseIdError {
    /// The id was not three space-separated parts.
    #[error("action id must be \"<time> <node> <seq>\", got {id:?}")]
    WrongShape {
        /// The offending input.
        id: String,
    },

    /// Time or sequence was not an unsigned integer.
    #[error("action id {field} is not an integer: {value:?}")]
    NotAnInteger {
        /// Which component failed to parse.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}
