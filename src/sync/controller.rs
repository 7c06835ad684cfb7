//! Synchronization controller.
//!
//! A single task owns all trigger handling so that debouncing, query
//! switching and cache writes never interleave. Two pipelines share it:
//!
//! - local read: `InitialLoad` and debounced keyword changes pick the live
//!   query whose results become [`Snapshot`]s,
//! - remote refresh: `InitialLoad` and `PullToRefresh` fetch from the
//!   [`CategorySource`] and replace the cache, then report
//!   [`LoadingComplete`].
//!
//! Both switches are latest-wins. A newer query drops the previous
//! subscription, so rows still in flight for it are never seen; a newer
//! fetch aborts the previous one and any late result carrying a stale
//! generation is discarded.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::cache::replace_cache;
use super::events::{Diagnostic, LoadingComplete, RefreshOutcome, Trigger};
use super::publisher::{QueryPublisher, QueryResult, QuerySubscription};
use crate::db::{CategoryQuery, RecordStore};
use crate::error::SyncError;
use crate::models::{Category, Snapshot};
use crate::net::CategorySource;

pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Tunables for a controller instance.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Quiet period a keyword must survive before it is queried.
    pub search_debounce: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
        }
    }
}

/// Sends triggers to a running controller.
///
/// Dropping every handle stops the controller.
#[derive(Clone)]
pub struct SyncHandle {
    triggers: mpsc::UnboundedSender<Trigger>,
}

impl SyncHandle {
    pub fn send(&self, trigger: Trigger) -> Result<(), SyncError> {
        self.triggers
            .send(trigger)
            .map_err(|_| SyncError::ControllerClosed)
    }

    pub fn initial_load(&self) -> Result<(), SyncError> {
        self.send(Trigger::InitialLoad)
    }

    pub fn pull_to_refresh(&self) -> Result<(), SyncError> {
        self.send(Trigger::PullToRefresh)
    }

    pub fn delete_last(&self) -> Result<(), SyncError> {
        self.send(Trigger::DeleteLast)
    }

    pub fn search(&self, keyword: impl Into<String>) -> Result<(), SyncError> {
        self.send(Trigger::SearchKeywordChanged(keyword.into()))
    }
}

/// Streams produced by a controller.
///
/// Dropping both `snapshots` and `loading_complete` stops the controller
/// and releases its live query.
pub struct SyncOutputs {
    pub snapshots: mpsc::UnboundedReceiver<Snapshot>,
    pub loading_complete: mpsc::UnboundedReceiver<LoadingComplete>,
    pub diagnostics: mpsc::UnboundedReceiver<Diagnostic>,
}

pub struct SyncController;

impl SyncController {
    /// Spawns a controller on the current Tokio runtime.
    ///
    /// `reachable` gates remote refreshes; it is read at trigger time and
    /// never awaited.
    pub fn spawn(
        publisher: QueryPublisher,
        source: Arc<dyn CategorySource>,
        reachable: watch::Receiver<bool>,
        settings: SyncSettings,
    ) -> (SyncHandle, SyncOutputs) {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (loading_tx, loading_rx) = mpsc::unbounded_channel();
        let (diagnostic_tx, diagnostic_rx) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();

        let pipeline = Pipeline {
            store: publisher.store().clone(),
            publisher,
            source,
            reachable,
            settings,
            triggers: trigger_rx,
            fetch_tx,
            fetch_rx,
            snapshots: snapshot_tx,
            loading_complete: loading_tx,
            diagnostics: diagnostic_tx,
            started: false,
            keyword: String::new(),
            pending_keyword: None,
            current: None,
            refresh_generation: 0,
            inflight: None,
        };
        tokio::spawn(pipeline.run());

        (
            SyncHandle {
                triggers: trigger_tx,
            },
            SyncOutputs {
                snapshots: snapshot_rx,
                loading_complete: loading_rx,
                diagnostics: diagnostic_rx,
            },
        )
    }
}

struct InflightFetch {
    generation: u64,
    task: JoinHandle<()>,
}

impl Drop for InflightFetch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct FetchCompleted {
    generation: u64,
    result: Result<Vec<Category>, SyncError>,
}

struct Pipeline {
    publisher: QueryPublisher,
    store: Arc<dyn RecordStore>,
    source: Arc<dyn CategorySource>,
    reachable: watch::Receiver<bool>,
    settings: SyncSettings,

    triggers: mpsc::UnboundedReceiver<Trigger>,
    fetch_tx: mpsc::UnboundedSender<FetchCompleted>,
    fetch_rx: mpsc::UnboundedReceiver<FetchCompleted>,

    snapshots: mpsc::UnboundedSender<Snapshot>,
    loading_complete: mpsc::UnboundedSender<LoadingComplete>,
    diagnostics: mpsc::UnboundedSender<Diagnostic>,

    /// Local reads begin with the first `InitialLoad`.
    started: bool,
    /// Last keyword that passed debounce and de-duplication.
    keyword: String,
    pending_keyword: Option<(String, Instant)>,
    current: Option<QuerySubscription>,

    refresh_generation: u64,
    inflight: Option<InflightFetch>,
}

impl Pipeline {
    async fn run(mut self) {
        tracing::debug!("sync controller started");
        loop {
            let debouncing = self.pending_keyword.is_some();
            let deadline = self
                .pending_keyword
                .as_ref()
                .map_or_else(Instant::now, |(_, at)| *at);

            tokio::select! {
                trigger = self.triggers.recv() => match trigger {
                    Some(trigger) => self.handle_trigger(trigger).await,
                    None => break,
                },
                _ = sleep_until(deadline), if debouncing => self.flush_keyword(),
                result = next_rows(&mut self.current) => self.handle_rows(result),
                Some(completed) = self.fetch_rx.recv() => self.handle_fetch(completed).await,
                _ = outputs_closed(&self.snapshots, &self.loading_complete) => break,
            }
        }
        tracing::debug!("sync controller stopped");
    }

    async fn handle_trigger(&mut self, trigger: Trigger) {
        tracing::debug!(?trigger, "trigger received");
        match trigger {
            Trigger::InitialLoad => {
                self.started = true;
                self.requery();
                self.start_refresh();
            }
            Trigger::PullToRefresh => self.start_refresh(),
            Trigger::DeleteLast => self.delete_last().await,
            Trigger::SearchKeywordChanged(text) => {
                // Every keystroke restarts the quiet period
                let deadline = Instant::now() + self.settings.search_debounce;
                self.pending_keyword = Some((text, deadline));
            }
        }
    }

    fn flush_keyword(&mut self) {
        let Some((text, _)) = self.pending_keyword.take() else {
            return;
        };
        let keyword = text.trim().to_string();
        if keyword == self.keyword {
            tracing::debug!(%keyword, "keyword unchanged, not re-querying");
            return;
        }
        self.keyword = keyword;
        if self.started {
            self.requery();
        }
    }

    /// Switches the live query to the current keyword.
    ///
    /// Subscribes before releasing the previous query so re-issuing the same
    /// query keeps its watch alive. Dropping the previous subscription
    /// discards any read still pending for it.
    fn requery(&mut self) {
        let query = CategoryQuery::search(&self.keyword);
        tracing::debug!(?query, "switching live query");

        let subscription = self.publisher.observe(query);
        self.current = Some(subscription);
    }

    fn handle_rows(&mut self, result: Option<QueryResult>) {
        match result {
            Some(Ok(rows)) => self.emit_snapshot(Snapshot::new(rows.iter().cloned())),
            Some(Err(e)) => {
                // A degraded list beats a halted UI
                self.current = None;
                self.report(e.into());
                self.emit_snapshot(Snapshot::empty());
            }
            None => self.current = None,
        }
    }

    fn start_refresh(&mut self) {
        if !*self.reachable.borrow() {
            tracing::debug!("unreachable, skipping refresh");
            self.complete(RefreshOutcome::Offline);
            return;
        }

        self.refresh_generation += 1;
        let generation = self.refresh_generation;
        let source = self.source.clone();
        let fetch_tx = self.fetch_tx.clone();

        tracing::debug!(generation, "starting refresh");
        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(source.fetch()).catch_unwind().await {
                Ok(result) => result.map_err(SyncError::from),
                Err(panic) => Err(SyncError::Generic(format!(
                    "category fetch panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            let _ = fetch_tx.send(FetchCompleted { generation, result });
        });
        // Replacing the previous entry aborts its fetch
        self.inflight = Some(InflightFetch { generation, task });
    }

    async fn handle_fetch(&mut self, completed: FetchCompleted) {
        let FetchCompleted { generation, result } = completed;
        if self.inflight.as_ref().map(|f| f.generation) != Some(generation) {
            tracing::debug!(generation, "discarding superseded fetch result");
            return;
        }
        self.inflight = None;

        let outcome = match result {
            Ok(categories) => match replace_cache(&*self.store, &categories).await {
                Ok(records) => {
                    tracing::info!(records, "category cache refreshed");
                    RefreshOutcome::Refreshed { records }
                }
                Err(e) => {
                    self.report(e.into());
                    RefreshOutcome::StoreFailed
                }
            },
            Err(e) => {
                self.report(e);
                RefreshOutcome::FetchFailed
            }
        };
        self.complete(outcome);

        // A failed local read dropped the live query; fresh data brings it back
        if outcome.is_refreshed() && self.started && self.current.is_none() {
            self.requery();
        }
    }

    async fn delete_last(&mut self) {
        // Live queries pick up the change through the store watch
        match self.store.delete_last().await {
            Ok(Some(id)) => tracing::debug!(id, "deleted last category"),
            Ok(None) => tracing::debug!("no category to delete"),
            Err(e) => self.report(e.into()),
        }
    }

    fn emit_snapshot(&self, snapshot: Snapshot) {
        let _ = self.snapshots.send(snapshot);
    }

    fn complete(&self, outcome: RefreshOutcome) {
        let _ = self.loading_complete.send(LoadingComplete { outcome });
    }

    fn report(&self, error: SyncError) {
        tracing::warn!(error = %error, "sync error");
        let _ = self.diagnostics.send(Diagnostic::new(error));
    }
}

async fn next_rows(current: &mut Option<QuerySubscription>) -> Option<QueryResult> {
    match current {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

async fn outputs_closed(
    snapshots: &mpsc::UnboundedSender<Snapshot>,
    loading_complete: &mpsc::UnboundedSender<LoadingComplete>,
) {
    tokio::join!(snapshots.closed(), loading_complete.closed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CategoryStore, WatchStats};
    use crate::error::{FetchError, StoreError};
    use crate::net::CategorySource;
    use crate::test_support::{
        category, recv, recv_until, setup_store, wait_until, RecordingStore, ScriptedSource,
        TestStore,
    };

    const DEBOUNCE: Duration = Duration::from_millis(30);

    struct Harness {
        ctx: TestStore,
        recording: Arc<RecordingStore>,
        source: Arc<ScriptedSource>,
        online: watch::Sender<bool>,
        handle: SyncHandle,
        outputs: SyncOutputs,
    }

    impl Harness {
        fn inner(&self) -> &CategoryStore {
            &self.ctx.store
        }
    }

    async fn harness(seed: Vec<Category>, online: bool) -> Harness {
        let ctx = setup_store().await;
        if !seed.is_empty() {
            ctx.store.insert(&seed).await.unwrap();
        }
        let recording = Arc::new(RecordingStore::new(ctx.store.clone()));
        let source = Arc::new(ScriptedSource::new());
        let (online_tx, online_rx) = watch::channel(online);

        let publisher = QueryPublisher::new(recording.clone());
        let (handle, outputs) = SyncController::spawn(
            publisher,
            source.clone(),
            online_rx,
            SyncSettings {
                search_debounce: DEBOUNCE,
            },
        );

        Harness {
            ctx,
            recording,
            source,
            online: online_tx,
            handle,
            outputs,
        }
    }

    fn named(id: i64, name: &str) -> Category {
        Category::new(id, name)
    }

    async fn cached_ids(store: &CategoryStore) -> Vec<i64> {
        store
            .query(&CategoryQuery::all())
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect()
    }

    #[tokio::test]
    async fn test_initial_load_shows_cache_then_refreshed_data() {
        let mut h = harness(vec![category(1), category(2), category(3)], true).await;
        h.source
            .respond_after(Duration::from_millis(100), Ok(vec![category(4), category(5)]));

        h.handle.initial_load().unwrap();

        let done = recv(&mut h.outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::Refreshed { records: 2 });

        let mut seen = Vec::new();
        let last = recv_until(&mut h.outputs.snapshots, |s| {
            seen.push(s.ids());
            s.ids() == vec![4, 5]
        })
        .await;
        assert!(last.is_some());

        // Readers only ever see a complete old or complete new set
        for ids in &seen {
            assert!(ids == &vec![1, 2, 3] || ids == &vec![4, 5], "mixed snapshot {:?}", ids);
        }
        assert_eq!(seen.first().unwrap(), &vec![1, 2, 3]);
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_same_keyword_twice_queries_once() {
        let mut h = harness(vec![named(1, "Abalone"), named(2, "Cherry")], false).await;
        h.handle.initial_load().unwrap();
        assert_eq!(recv(&mut h.outputs.snapshots).await.unwrap().ids(), vec![1, 2]);

        h.handle.search("ab").unwrap();
        h.handle.search("ab").unwrap();
        let snapshot = recv(&mut h.outputs.snapshots).await.unwrap();
        assert_eq!(snapshot.ids(), vec![1]);

        // Once more after the window closes: still unchanged, still no query
        tokio::time::sleep(DEBOUNCE * 3).await;
        h.handle.search(" ab ").unwrap();
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert_eq!(h.recording.query_count(&CategoryQuery::search("ab")), 1);
        assert!(h.outputs.snapshots.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fast_keywords_only_query_latest() {
        let mut h = harness(
            vec![named(1, "Abalone"), named(2, "Apple"), named(3, "Cherry")],
            false,
        )
        .await;
        h.handle.initial_load().unwrap();
        assert_eq!(recv(&mut h.outputs.snapshots).await.unwrap().ids(), vec![1, 2, 3]);

        h.handle.search("a").unwrap();
        h.handle.search("ab").unwrap();

        let mut seen = Vec::new();
        recv_until(&mut h.outputs.snapshots, |s| {
            seen.push(s.ids());
            s.ids() == vec![1]
        })
        .await
        .unwrap();

        assert!(!seen.contains(&vec![1, 2]));
        assert_eq!(h.recording.query_count(&CategoryQuery::search("a")), 0);
        assert_eq!(h.recording.query_count(&CategoryQuery::search("ab")), 1);
    }

    #[tokio::test]
    async fn test_slow_superseded_query_never_emits() {
        let mut h = harness(
            vec![named(1, "Abalone"), named(2, "Apple"), named(3, "Cherry")],
            false,
        )
        .await;
        h.recording
            .delay_query(CategoryQuery::search("a"), Duration::from_millis(200));
        h.handle.initial_load().unwrap();
        assert_eq!(recv(&mut h.outputs.snapshots).await.unwrap().ids(), vec![1, 2, 3]);

        // "a" is past its debounce and stuck reading when "ab" replaces it
        h.handle.search("a").unwrap();
        assert!(wait_until(|| h.recording.query_count(&CategoryQuery::search("a")) == 1).await);
        h.handle.search("ab").unwrap();

        let mut seen = Vec::new();
        recv_until(&mut h.outputs.snapshots, |s| {
            seen.push(s.ids());
            s.ids() == vec![1]
        })
        .await
        .unwrap();
        assert!(!seen.contains(&vec![1, 2]));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(h.outputs.snapshots.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_keyword_before_initial_load_applies_on_load() {
        let mut h = harness(vec![named(1, "Hair"), named(2, "Nails")], false).await;

        h.handle.search("nail").unwrap();
        tokio::time::sleep(DEBOUNCE * 3).await;
        assert!(h.outputs.snapshots.try_recv().is_err());

        h.handle.initial_load().unwrap();
        assert_eq!(recv(&mut h.outputs.snapshots).await.unwrap().ids(), vec![2]);
    }

    #[tokio::test]
    async fn test_clearing_keyword_shows_everything_again() {
        let mut h = harness(vec![named(1, "Hair"), named(2, "Nails")], false).await;
        h.handle.initial_load().unwrap();
        recv(&mut h.outputs.snapshots).await.unwrap();

        h.handle.search("hair").unwrap();
        assert_eq!(recv(&mut h.outputs.snapshots).await.unwrap().ids(), vec![1]);

        h.handle.search("").unwrap();
        assert_eq!(recv(&mut h.outputs.snapshots).await.unwrap().ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_delete_last_pushes_snapshot_through_watch() {
        let mut h = harness(vec![category(1), category(2), category(5)], false).await;
        h.handle.initial_load().unwrap();
        assert_eq!(recv(&mut h.outputs.snapshots).await.unwrap().ids(), vec![1, 2, 5]);

        h.handle.delete_last().unwrap();
        assert_eq!(recv(&mut h.outputs.snapshots).await.unwrap().ids(), vec![1, 2]);
        assert_eq!(cached_ids(h.inner()).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unreachable_skips_fetch_but_completes() {
        let mut h = harness(vec![category(1), category(2)], false).await;

        h.handle.pull_to_refresh().unwrap();
        let done = recv(&mut h.outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::Offline);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.outputs.loading_complete.try_recv().is_err());
        assert_eq!(h.source.calls(), 0);
        assert_eq!(cached_ids(h.inner()).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_gate_is_read_at_trigger_time() {
        let mut h = harness(vec![], false).await;
        h.source.respond(Ok(vec![category(8)]));

        h.online.send(true).unwrap();
        h.handle.pull_to_refresh().unwrap();

        let done = recv(&mut h.outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::Refreshed { records: 1 });
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_preserves_cache() {
        let mut h = harness(vec![category(1), category(2)], true).await;
        h.source.respond(Err(FetchError::BadStatus(500)));

        h.handle.pull_to_refresh().unwrap();
        let done = recv(&mut h.outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::FetchFailed);

        let diagnostic = recv(&mut h.outputs.diagnostics).await.unwrap();
        assert_eq!(diagnostic.error, SyncError::Fetch(FetchError::BadStatus(500)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.outputs.loading_complete.try_recv().is_err());
        assert_eq!(cached_ids(h.inner()).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_reported_as_success() {
        let mut h = harness(vec![category(1)], true).await;
        h.source.respond(Ok(vec![category(2), category(2)]));

        h.handle.pull_to_refresh().unwrap();
        let done = recv(&mut h.outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::StoreFailed);

        let diagnostic = recv(&mut h.outputs.diagnostics).await.unwrap();
        assert!(matches!(
            diagnostic.error,
            SyncError::Store(StoreError::ConstraintViolation(_))
        ));
        assert_eq!(cached_ids(h.inner()).await, vec![1]);
    }

    #[tokio::test]
    async fn test_newer_refresh_supersedes_slow_one() {
        let mut h = harness(vec![], true).await;
        h.source
            .respond_after(Duration::from_millis(200), Ok(vec![category(10)]));
        h.source.respond(Ok(vec![category(20)]));

        h.handle.pull_to_refresh().unwrap();
        assert!(wait_until(|| h.source.calls() == 1).await);
        h.handle.pull_to_refresh().unwrap();

        let done = recv(&mut h.outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::Refreshed { records: 1 });

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(h.outputs.loading_complete.try_recv().is_err());
        assert_eq!(cached_ids(h.inner()).await, vec![20]);
        assert_eq!(h.recording.replace_count(), 1);
    }

    #[tokio::test]
    async fn test_local_read_error_falls_back_to_empty() {
        let mut h = harness(vec![category(1)], false).await;
        sqlx::query("DROP TABLE categories")
            .execute(h.inner().pool())
            .await
            .unwrap();

        h.handle.initial_load().unwrap();
        assert!(recv(&mut h.outputs.snapshots).await.unwrap().is_empty());

        let diagnostic = recv(&mut h.outputs.diagnostics).await.unwrap();
        assert!(matches!(diagnostic.error, SyncError::Store(StoreError::Io(_))));
    }

    #[tokio::test]
    async fn test_refresh_after_read_error_restores_snapshots() {
        let mut h = harness(vec![category(1)], true).await;
        sqlx::query("DROP TABLE categories")
            .execute(h.inner().pool())
            .await
            .unwrap();
        h.source.respond(Err(FetchError::BadStatus(503)));

        h.handle.initial_load().unwrap();
        assert!(recv(&mut h.outputs.snapshots).await.unwrap().is_empty());
        let done = recv(&mut h.outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::FetchFailed);

        sqlx::query(
            "CREATE TABLE categories (
                id INTEGER PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                high_res_image_url TEXT NOT NULL DEFAULT '',
                low_res_image_url TEXT NOT NULL DEFAULT '',
                path TEXT NOT NULL DEFAULT ''
            )",
        )
            .execute(h.inner().pool())
            .await
            .unwrap();
        h.source.respond(Ok(vec![category(4), category(5)]));

        h.handle.pull_to_refresh().unwrap();
        let done = recv(&mut h.outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::Refreshed { records: 2 });
        let seen = recv_until(&mut h.outputs.snapshots, |s| s.ids() == vec![4, 5]).await;
        assert!(seen.is_some());
    }

    struct PanickingSource;

    #[async_trait::async_trait]
    impl CategorySource for PanickingSource {
        async fn fetch(&self) -> Result<Vec<Category>, FetchError> {
            panic!("source exploded");
        }
    }

    #[tokio::test]
    async fn test_panicking_fetch_still_completes_loading() {
        let ctx = setup_store().await;
        ctx.store.insert(&[category(1)]).await.unwrap();
        let (_online, online_rx) = watch::channel(true);
        let (handle, mut outputs) = SyncController::spawn(
            QueryPublisher::new(ctx.store.clone()),
            Arc::new(PanickingSource),
            online_rx,
            SyncSettings {
                search_debounce: DEBOUNCE,
            },
        );

        handle.pull_to_refresh().unwrap();
        let done = recv(&mut outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::FetchFailed);

        let diagnostic = recv(&mut outputs.diagnostics).await.unwrap();
        assert!(matches!(diagnostic.error, SyncError::Generic(ref m) if m.contains("source exploded")));
        assert_eq!(cached_ids(&ctx.store).await, vec![1]);

        // The controller keeps serving triggers afterwards
        assert!(handle.pull_to_refresh().is_ok());
        let done = recv(&mut outputs.loading_complete).await.unwrap();
        assert_eq!(done.outcome, RefreshOutcome::FetchFailed);
    }

    #[tokio::test]
    async fn test_dropping_outputs_releases_live_query() {
        let mut h = harness(vec![category(1)], false).await;
        h.handle.initial_load().unwrap();
        recv(&mut h.outputs.snapshots).await.unwrap();
        assert_eq!(h.inner().watch_stats(), WatchStats { started: 1, active: 1 });

        let Harness { ctx, handle, outputs, .. } = h;
        drop(outputs);

        assert!(wait_until(|| ctx.store.watch_stats().active == 0).await);
        assert!(wait_until(|| handle.pull_to_refresh().is_err()).await);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_controller() {
        let mut h = harness(vec![category(1)], false).await;
        h.handle.initial_load().unwrap();
        recv(&mut h.outputs.snapshots).await.unwrap();

        let Harness { ctx, handle, mut outputs, .. } = h;
        drop(handle);

        assert!(wait_until(|| ctx.store.watch_stats().active == 0).await);
        assert!(recv(&mut outputs.snapshots).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_reaches_every_live_observer() {
        let ctx = setup_store().await;
        ctx.store.insert(&[category(1)]).await.unwrap();
        let publisher = QueryPublisher::new(ctx.store.clone());
        let source = Arc::new(ScriptedSource::new());
        source.respond(Ok(vec![category(2), category(3)]));
        let (_online, online_rx) = watch::channel(true);
        let (_offline, offline_rx) = watch::channel(false);

        let settings = SyncSettings {
            search_debounce: DEBOUNCE,
        };
        let (refresher, mut refresher_out) =
            SyncController::spawn(publisher.clone(), source.clone(), online_rx, settings.clone());
        let (viewer, mut viewer_out) =
            SyncController::spawn(publisher.clone(), source.clone(), offline_rx, settings);

        viewer.initial_load().unwrap();
        assert_eq!(recv(&mut viewer_out.snapshots).await.unwrap().ids(), vec![1]);

        refresher.initial_load().unwrap();
        let done = recv(&mut refresher_out.loading_complete).await.unwrap();
        assert!(done.outcome.is_refreshed());

        let seen = recv_until(&mut viewer_out.snapshots, |s| s.ids() == vec![2, 3]).await;
        assert!(seen.is_some());
        let seen = recv_until(&mut refresher_out.snapshots, |s| s.ids() == vec![2, 3]).await;
        assert!(seen.is_some());

        // Both controllers share the single watch on the unfiltered query
        assert_eq!(publisher.observer_count(&CategoryQuery::all()), 2);
        assert_eq!(ctx.store.watch_stats().started, 1);
    }
}
