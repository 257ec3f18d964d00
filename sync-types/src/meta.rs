//! Retention and ordering metadata attached to every action.

use crate::ActionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metadata attached to every [`Action`](crate::Action) in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Unique, totally ordered id; the log's deduplication key.
    pub id: ActionId,
    /// Wall-clock hint in milliseconds since the epoch. Advisory only;
    /// never used for ordering decisions.
    pub time: i64,
    /// Retention tags. Each subsystem that still needs the action keeps a
    /// reason present; an empty set makes the entry garbage.
    #[serde(default)]
    pub reasons: BTreeSet<String>,
    /// Identity of the originating user, absent for server-originated
    /// actions.
    #[serde(default)]
    pub user: Option<String>,
    /// Id of the node that committed the action.
    pub server: String,
}

impl Meta {
    /// Create metadata with no reasons and no user.
    pub fn new(id: ActionId, time: i64, server: impl Into<String>) -> Self {
        Self {
            id,
            time,
            reasons: BTreeSet::new(),
            user: None,
            server: server.into(),
        }
    }

    /// Attach a retention reason, returning `self` for chaining.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.insert(reason.into());
        self
    }

    /// Attach the originating user, returning `self` for chaining.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// An entry with no remaining reasons is eligible for collection.
    pub fn is_garbage(&self) -> bool {
        self.reasons.is_empty()
    }
}
