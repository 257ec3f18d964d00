//! The action+metadata log.
//!
//! A [`MetaStore`] keeps an ordered, deduplicated log of actions with
//! reasons-based retention. The in-memory backend ships with the crate;
//! persistent backends implement the same trait.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreResult;
use async_trait::async_trait;
use std::ops::Bound;
use std::sync::Arc;
use sync_types::{Action, ActionId, Meta};

/// Trait for action log backends.
///
/// All mutations are serialized by the backend (single mutator at a time);
/// reads may run concurrently but must observe either the pre- or
/// post-state of a mutation, never a partially applied one.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Insert an action keyed by `meta.id`.
    ///
    /// Returns `false` without touching the log when the id is already
    /// present: duplicates are a no-op, not an error, and do not re-add
    /// reasons the existing entry already satisfied.
    async fn add(&self, action: Action, meta: Meta) -> StoreResult<bool>;

    /// Look up one entry by id.
    async fn get(&self, id: &ActionId) -> StoreResult<Option<(Action, Meta)>>;

    /// Atomically union `add` into and subtract `remove` from the entry's
    /// reason set.
    ///
    /// Returns whether the entry exists. An entry left with no reasons is
    /// removed by the next [`collect`](MetaStore::collect) pass, not
    /// synchronously.
    async fn change_reasons(
        &self,
        id: &ActionId,
        add: &[String],
        remove: &[String],
    ) -> StoreResult<bool>;

    /// Remove every entry whose reason set is empty.
    ///
    /// Returns the removed entries so the caller can report them.
    async fn collect(&self) -> StoreResult<Vec<(Action, Meta)>>;

    /// One ascending page of the log between the given bounds.
    ///
    /// At most `limit` entries are returned; a shorter page means the
    /// bounds are exhausted.
    async fn range_page(
        &self,
        from: Bound<ActionId>,
        to: Bound<ActionId>,
        limit: usize,
    ) -> StoreResult<Vec<(Action, Meta)>>;

    /// Number of entries currently in the log.
    async fn count(&self) -> StoreResult<usize>;
}

/// Default page size for [`RangeCursor`].
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A lazy, restartable ascending view over a log range.
///
/// Each [`next_page`](RangeCursor::next_page) call re-queries the store
/// from just past the last yielded id, so the cursor stays valid across
/// concurrent insertions and collections: it simply continues from where
/// it left off.
pub struct RangeCursor {
    store: Arc<dyn MetaStore>,
    next: Bound<ActionId>,
    to: Bound<ActionId>,
    page_size: usize,
    done: bool,
}

impl RangeCursor {
    /// Create a cursor over `[from, to]` with the default page size.
    pub fn new(store: Arc<dyn MetaStore>, from: Bound<ActionId>, to: Bound<ActionId>) -> Self {
        Self::with_page_size(store, from, to, DEFAULT_PAGE_SIZE)
    }

    /// Create a cursor with an explicit page size.
    pub fn with_page_size(
        store: Arc<dyn MetaStore>,
        from: Bound<ActionId>,
        to: Bound<ActionId>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            next: from,
            to,
            page_size: page_size.max(1),
            done: false,
        }
    }

    /// Fetch the next ascending page, empty once the range is exhausted.
    pub async fn next_page(&mut self) -> StoreResult<Vec<(Action, Meta)>> {
        if self.done {
            return Ok(Vec::new());
        }
        let page = self
            .store
            .range_page(self.next.clone(), self.to.clone(), self.page_size)
            .await?;
        if page.len() < self.page_size {
            self.done = true;
        }
        if let Some((_, meta)) = page.last() {
            self.next = Bound::Excluded(meta.id.clone());
        }
        Ok(page)
    }
}
