//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::db::{CategoryQuery, CategoryStore, RecordStore, StoreWatch};
use crate::error::{FetchError, StoreError};
use crate::models::{Category, CategoryRecord};
use crate::net::CategorySource;

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

pub fn category(id: i64) -> Category {
    Category::new(id, format!("Category {}", id))
        .with_images(
            format!("https://cdn.example.com/{}/high.png", id),
            format!("https://cdn.example.com/{}/low.png", id),
        )
        .with_path(format!("category-{}", id))
}

pub struct TestStore {
    pub store: Arc<CategoryStore>,
    _temp_dir: TempDir,
}

pub async fn setup_store() -> TestStore {
    let temp_dir = TempDir::new().unwrap();
    let store = CategoryStore::open(&temp_dir.path().join("test.db"))
        .await
        .unwrap();
    TestStore {
        store: Arc::new(store),
        _temp_dir: temp_dir,
    }
}

/// Polls `condition` until it holds or the wait times out.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Next message, or `None` if the channel closed or nothing arrived in time.
pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Option<T> {
    tokio::time::timeout(WAIT_TIMEOUT, rx.recv())
        .await
        .ok()
        .flatten()
}

/// Receives until `done` accepts a message, returning that message.
pub async fn recv_until<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    mut done: impl FnMut(&T) -> bool,
) -> Option<T> {
    while let Some(message) = recv(rx).await {
        if done(&message) {
            return Some(message);
        }
    }
    None
}

/// Delegates to a real store while counting calls.
///
/// Reads of a query registered with [`RecordingStore::delay_query`] are held
/// back before they reach the store.
pub struct RecordingStore {
    inner: Arc<CategoryStore>,
    queries: Mutex<Vec<CategoryQuery>>,
    delays: Mutex<Vec<(CategoryQuery, Duration)>>,
    replaces: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: Arc<CategoryStore>) -> Self {
        Self {
            inner,
            queries: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
            replaces: AtomicUsize::new(0),
        }
    }

    pub fn query_count(&self, query: &CategoryQuery) -> usize {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| *q == query)
            .count()
    }

    pub fn delay_query(&self, query: CategoryQuery, delay: Duration) {
        self.delays.lock().unwrap().push((query, delay));
    }

    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn query(&self, query: &CategoryQuery) -> Result<Vec<CategoryRecord>, StoreError> {
        self.queries.lock().unwrap().push(query.clone());
        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(q, _)| q == query)
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.query(query).await
    }

    fn watch(&self) -> StoreWatch {
        self.inner.watch()
    }

    async fn insert(&self, categories: &[Category]) -> Result<(), StoreError> {
        self.inner.insert(categories).await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.inner.delete_all().await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn delete_last(&self) -> Result<Option<i64>, StoreError> {
        self.inner.delete_last().await
    }

    async fn replace_all(&self, categories: &[Category]) -> Result<(), StoreError> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.inner.replace_all(categories).await
    }

    async fn last_refreshed_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.inner.last_refreshed_at().await
    }
}

type ScriptedResponse = (Duration, Result<Vec<Category>, FetchError>);

/// A category source that plays back queued responses in order.
///
/// Once the queue is exhausted every fetch returns an empty set.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, result: Result<Vec<Category>, FetchError>) {
        self.respond_after(Duration::ZERO, result);
    }

    pub fn respond_after(&self, delay: Duration, result: Result<Vec<Category>, FetchError>) {
        self.responses.lock().unwrap().push_back((delay, result));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CategorySource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<Category>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Serves `app` on an ephemeral local port, returning its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
