//! Change-notified query publisher.
//!
//! Turns store change notifications into a stream of full result sets.
//! Observers of equal queries share one store watch through a registry
//! keyed by [`CategoryQuery`]:
//!
//! - the first observer starts the watch and triggers the initial read,
//! - later observers get the cached latest result immediately,
//! - the last observer to drop stops the watch.

use futures::Stream;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::db::{CategoryQuery, RecordStore, StoreWatch};
use crate::error::StoreError;
use crate::models::CategoryRecord;

/// One emission of a query stream: the full matching set, or the error that
/// ended the stream.
pub type QueryResult = Result<Arc<Vec<CategoryRecord>>, StoreError>;

#[derive(Debug, Clone)]
enum QueryState {
    Pending,
    Ready(Arc<Vec<CategoryRecord>>),
    Failed(StoreError),
}

struct Entry {
    state: Arc<watch::Sender<QueryState>>,
    observers: usize,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<CategoryQuery, Entry>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Registry updates never panic midway, so a poisoned lock is still consistent
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shares store watches between observers of the same query.
#[derive(Clone)]
pub struct QueryPublisher {
    store: Arc<dyn RecordStore>,
    registry: Arc<Mutex<Registry>>,
}

impl QueryPublisher {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Starts observing `query`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn observe(&self, query: CategoryQuery) -> QuerySubscription {
        let mut registry = lock(&self.registry);

        let receiver = match registry.entries.get_mut(&query) {
            Some(entry) => {
                entry.observers += 1;
                tracing::debug!(?query, observers = entry.observers, "joined live query");
                entry.state.subscribe()
            }
            None => {
                let (state, receiver) = watch::channel(QueryState::Pending);
                let state = Arc::new(state);

                // Subscribe before the first read so no write can slip between them
                let changes = self.store.watch();
                let task = tokio::spawn(run_query(
                    self.store.clone(),
                    query.clone(),
                    changes,
                    state.clone(),
                ));

                tracing::debug!(?query, "started live query");
                registry.entries.insert(
                    query.clone(),
                    Entry {
                        state,
                        observers: 1,
                        task,
                    },
                );
                receiver
            }
        };

        QuerySubscription {
            query,
            receiver,
            registry: self.registry.clone(),
            primed: false,
            finished: false,
        }
    }

    /// Number of observers currently sharing `query`.
    pub fn observer_count(&self, query: &CategoryQuery) -> usize {
        lock(&self.registry)
            .entries
            .get(query)
            .map_or(0, |e| e.observers)
    }

    /// Number of distinct queries with a live watch.
    pub fn live_queries(&self) -> usize {
        lock(&self.registry).entries.len()
    }
}

/// Reads the query, then re-reads the full set after every store change.
///
/// Stops after the first failed read.
async fn run_query(
    store: Arc<dyn RecordStore>,
    query: CategoryQuery,
    mut changes: StoreWatch,
    state: Arc<watch::Sender<QueryState>>,
) {
    loop {
        match store.query(&query).await {
            Ok(rows) => {
                state.send_replace(QueryState::Ready(Arc::new(rows)));
            }
            Err(e) => {
                tracing::warn!(?query, error = %e, "live query read failed");
                state.send_replace(QueryState::Failed(e));
                return;
            }
        }

        match changes.changed().await {
            Some(change) => tracing::debug!(?query, ?change, "store changed, re-reading"),
            None => return,
        }
    }
}

/// One observer's handle on a live query.
///
/// Dropping it releases the observer's reference on the shared watch.
pub struct QuerySubscription {
    query: CategoryQuery,
    receiver: watch::Receiver<QueryState>,
    registry: Arc<Mutex<Registry>>,
    primed: bool,
    finished: bool,
}

impl QuerySubscription {
    pub fn query(&self) -> &CategoryQuery {
        &self.query
    }

    /// Next full result set.
    ///
    /// The first call yields the current result as soon as one exists. After
    /// an `Err` the stream is over and `None` follows. Cancel safe.
    pub async fn next(&mut self) -> Option<QueryResult> {
        if self.finished {
            return None;
        }
        loop {
            if self.primed && self.receiver.changed().await.is_err() {
                self.finished = true;
                return None;
            }
            self.primed = true;

            let state = self.receiver.borrow_and_update().clone();
            match state {
                QueryState::Pending => continue,
                QueryState::Ready(rows) => return Some(Ok(rows)),
                QueryState::Failed(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = QueryResult> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|item| (item, sub))
        })
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        let mut registry = lock(&self.registry);

        let remaining = match registry.entries.get_mut(&self.query) {
            Some(entry) => {
                entry.observers = entry.observers.saturating_sub(1);
                entry.observers
            }
            None => return,
        };

        if remaining == 0 {
            if let Some(entry) = registry.entries.remove(&self.query) {
                entry.task.abort();
            }
            tracing::debug!(query = ?self.query, "stopped live query");
        }
    }
}
