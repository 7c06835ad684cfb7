//! The record store seam: queries, change watches and bulk writes over the
//! `categories` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::error::StoreError;
use crate::models::{Category, CategoryRecord};

/// Sort order by `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// A predicate plus sort over the categories table.
///
/// Two queries share a store watch only if they are equal; different
/// predicates never do, even over the same table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CategoryQuery {
    name_contains: Option<String>,
    order: SortOrder,
}

impl CategoryQuery {
    /// Every row, ascending `id`.
    pub fn all() -> Self {
        Self::default()
    }

    /// Case-insensitive substring match on `name`.
    ///
    /// A keyword that is empty after trimming yields [`CategoryQuery::all`].
    pub fn search(keyword: &str) -> Self {
        let keyword = keyword.trim();
        Self {
            name_contains: (!keyword.is_empty()).then(|| keyword.to_string()),
            order: SortOrder::default(),
        }
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn name_contains(&self) -> Option<&str> {
        self.name_contains.as_deref()
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    pub fn matches(&self, record: &CategoryRecord) -> bool {
        match &self.name_contains {
            None => true,
            Some(keyword) => record
                .name
                .to_lowercase()
                .contains(&keyword.to_lowercase()),
        }
    }
}

/// Kind of write that triggered a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Inserted,
    Deleted,
    Replaced,
}

/// Counts of store watches handed out, for resource accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchStats {
    /// Watches started over the lifetime of the store.
    pub started: usize,
    /// Watches currently alive.
    pub active: usize,
}

#[derive(Debug, Default)]
pub struct WatchCounters {
    started: AtomicUsize,
    active: AtomicUsize,
}

impl WatchCounters {
    pub fn stats(&self) -> WatchStats {
        WatchStats {
            started: self.started.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
        }
    }
}

/// A live subscription to store change notifications.
///
/// The watch is stopped when this value is dropped.
pub struct StoreWatch {
    receiver: broadcast::Receiver<StoreChange>,
    counters: Arc<WatchCounters>,
}

impl StoreWatch {
    pub fn new(receiver: broadcast::Receiver<StoreChange>, counters: Arc<WatchCounters>) -> Self {
        counters.started.fetch_add(1, Ordering::SeqCst);
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(active, "store watch started");
        Self { receiver, counters }
    }

    /// Waits for the next change, folding any backlog into one wake-up.
    ///
    /// Returns `None` once the store has gone away.
    pub async fn changed(&mut self) -> Option<StoreChange> {
        let mut change = match self.receiver.recv().await {
            Ok(change) => change,
            // Missed notifications still mean "something changed".
            Err(RecvError::Lagged(_)) => StoreChange::Replaced,
            Err(RecvError::Closed) => return None,
        };
        loop {
            match self.receiver.try_recv() {
                Ok(next) => change = next,
                Err(TryRecvError::Lagged(_)) => change = StoreChange::Replaced,
                Err(_) => break,
            }
        }
        Some(change)
    }
}

impl Drop for StoreWatch {
    fn drop(&mut self) {
        let active = self.counters.active.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::debug!(active, "store watch stopped");
    }
}

/// Durable, id-ordered table of categories with a query + watch interface.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Current rows matching `query`, in the query's order.
    async fn query(&self, query: &CategoryQuery) -> Result<Vec<CategoryRecord>, StoreError>;

    /// Starts watching the table for committed writes.
    fn watch(&self) -> StoreWatch;

    async fn insert(&self, categories: &[Category]) -> Result<(), StoreError>;

    async fn delete_all(&self) -> Result<(), StoreError>;

    /// Deletes one row. Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Deletes the row with the highest `id`, returning that id.
    async fn delete_last(&self) -> Result<Option<i64>, StoreError>;

    /// Deletes every row and inserts `categories` as one transaction.
    ///
    /// On error nothing is changed.
    async fn replace_all(&self, categories: &[Category]) -> Result<(), StoreError>;

    /// When the cache was last replaced from the remote endpoint.
    async fn last_refreshed_at(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: i64, name: &str) -> CategoryRecord {
        Category::new(id, name).into()
    }

    #[test]
    fn test_search_trims_and_treats_blank_as_all() {
        assert_eq!(CategoryQuery::search("   "), CategoryQuery::all());
        assert_eq!(CategoryQuery::search(" hair ").name_contains(), Some("hair"));
    }

    #[test]
    fn test_matches_is_case_insensitive_substring() {
        let query = CategoryQuery::search("AIR");
        assert!(query.matches(&rec(1, "Hair Care")));
        assert!(!query.matches(&rec(2, "Nails")));
        assert!(CategoryQuery::all().matches(&rec(3, "anything")));
    }

    #[test]
    fn test_matches_unicode_case() {
        let query = CategoryQuery::search("ÉPILATION");
        assert!(query.matches(&rec(1, "épilation douce")));
    }

    #[test]
    fn test_queries_differ_by_predicate_and_order() {
        assert_ne!(CategoryQuery::search("a"), CategoryQuery::search("ab"));
        assert_ne!(
            CategoryQuery::all(),
            CategoryQuery::all().with_order(SortOrder::Descending)
        );
    }

    #[tokio::test]
    async fn test_watch_coalesces_backlog_and_tracks_counts() {
        let (tx, rx) = broadcast::channel(4);
        let counters = Arc::new(WatchCounters::default());
        let mut watch = StoreWatch::new(rx, counters.clone());
        assert_eq!(counters.stats(), WatchStats { started: 1, active: 1 });

        tx.send(StoreChange::Inserted).unwrap();
        tx.send(StoreChange::Deleted).unwrap();
        assert_eq!(watch.changed().await, Some(StoreChange::Deleted));

        drop(tx);
        assert_eq!(watch.changed().await, None);

        drop(watch);
        assert_eq!(counters.stats(), WatchStats { started: 1, active: 0 });
    }
}
