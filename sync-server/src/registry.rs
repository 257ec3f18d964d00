//! Node identity to session mapping.
//!
//! At most one live (non-zombie) session exists per node id at any time.
//! When a new session authenticates for a node that already has one, the
//! older session is demoted to zombie under the map entry's lock, so two
//! racing authentications for the same node always settle on exactly one
//! live winner — the newer session is never rejected.

use crate::protocol::Frame;
use crate::reporter::SessionInfo;
use crate::session::Session;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use sync_types::{Action, Meta};

/// Predicate deciding which sessions receive a broadcast action.
pub type SubscriptionFilter = dyn Fn(&Action, &Meta, &SessionInfo) -> bool + Send + Sync;

/// Maps node ids to their single live session.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<Session>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` as the live session for `node_id`.
    ///
    /// If another live session holds the id, it is demoted to zombie while
    /// the entry lock is held and returned so the caller can report the
    /// event and schedule the grace close.
    pub fn insert(&self, node_id: &str, session: Arc<Session>) -> Option<Arc<Session>> {
        match self.clients.entry(node_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let old = std::mem::replace(occupied.get_mut(), session);
                old.mark_zombie();
                Some(old)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(session);
                None
            }
        }
    }

    /// Remove the entry for `node_id`, but only when it still points at
    /// session `session_id`.
    ///
    /// A closing zombie must not evict the newer session that replaced it.
    pub fn remove(&self, node_id: &str, session_id: u64) {
        self.clients
            .remove_if(node_id, |_, current| current.id() == session_id);
    }

    /// The live session for a node, if any.
    pub fn get(&self, node_id: &str) -> Option<Arc<Session>> {
        self.clients.get(node_id).map(|entry| entry.value().clone())
    }

    /// All currently live (synchronized, non-zombie) sessions.
    pub fn live_sessions(&self) -> Vec<Arc<Session>> {
        self.clients
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|session| session.is_live())
            .collect()
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no node is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Fan an action out to every live session whose subscription filter
    /// matches, skipping the originating session.
    ///
    /// Returns the sessions the action was delivered to.
    pub fn broadcast(
        &self,
        action: &Action,
        meta: &Meta,
        origin: Option<u64>,
        filter: &SubscriptionFilter,
    ) -> Vec<Arc<Session>> {
        let mut delivered = Vec::new();
        for session in self.live_sessions() {
            if Some(session.id()) == origin {
                continue;
            }
            if !filter(action, meta, &session.info()) {
                continue;
            }
            session.send(Frame::Action {
                action: action.clone(),
                meta: meta.clone(),
            });
            delivered.push(session);
        }
        delivered
    }
}
