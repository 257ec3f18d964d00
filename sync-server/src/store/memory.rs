//! In-memory log backend.

use super::MetaStore;
use crate::error::StoreResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use sync_types::{Action, ActionId, Meta};
use tokio::sync::RwLock;

/// The default, in-memory [`MetaStore`].
///
/// Entries live in a `BTreeMap` keyed by [`ActionId`], so iteration order
/// is the id order `(time, node, seq)` and same-node entries keep the
/// order their sequence counters were issued in. A single `RwLock` makes
/// every mutation atomic with respect to readers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    log: RwLock<BTreeMap<ActionId, (Action, Meta)>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn bound_ref(bound: &Bound<ActionId>) -> Bound<&ActionId> {
    match bound {
        Bound::Included(id) => Bound::Included(id),
        Bound::Excluded(id) => Bound::Excluded(id),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[async_trait]
impl MetaStore for MemoryStore {
    async fn add(&self, action: Action, meta: Meta) -> StoreResult<bool> {
        let mut log = self.log.write().await;
        if log.contains_key(&meta.id) {
            return Ok(false);
        }
        log.insert(meta.id.clone(), (action, meta));
        Ok(true)
    }

    async fn get(&self, id: &ActionId) -> StoreResult<Option<(Action, Meta)>> {
        Ok(self.log.read().await.get(id).cloned())
    }

    async fn change_reasons(
        &self,
        id: &ActionId,
        add: &[String],
        remove: &[String],
    ) -> StoreResult<bool> {
        let mut log = self.log.write().await;
        match log.get_mut(id) {
            Some((_, meta)) => {
                for reason in add {
                    meta.reasons.insert(reason.clone());
                }
                for reason in remove {
                    meta.reasons.remove(reason);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn collect(&self) -> StoreResult<Vec<(Action, Meta)>> {
        let mut log = self.log.write().await;
        let garbage: Vec<ActionId> = log
            .iter()
            .filter(|(_, (_, meta))| meta.is_garbage())
            .map(|(id, _)| id.clone())
            .collect();
        let mut removed = Vec::with_capacity(garbage.len());
        for id in garbage {
            if let Some(entry) = log.remove(&id) {
                removed.push(entry);
            }
        }
        Ok(removed)
    }

    async fn range_page(
        &self,
        from: Bound<ActionId>,
        to: Bound<ActionId>,
        limit: usize,
    ) -> StoreResult<Vec<(Action, Meta)>> {
        let log = self.log.read().await;
        Ok(log
            .range((bound_ref(&from), bound_ref(&to)))
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.log.read().await.len())
    }
}
