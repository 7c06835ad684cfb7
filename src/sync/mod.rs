//! Reactive synchronization between the local category cache and the remote
//! endpoint.
//!
//! # Pieces
//!
//! - [`QueryPublisher`]: shared, change-notified query results over a
//!   [`RecordStore`](crate::db::RecordStore)
//! - [`replace_cache`]: atomic swap of the cached set
//! - [`SyncController`]: turns UI [`Trigger`]s into [`Snapshot`](crate::models::Snapshot)s
//!   and [`LoadingComplete`] events
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use glam_catalog::db::CategoryStore;
//! use glam_catalog::net::{HttpCategorySource, FetchConfig, Reachability};
//! use glam_catalog::sync::{QueryPublisher, SyncController, SyncSettings};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(CategoryStore::open("glam.db".as_ref()).await?);
//! let source = Arc::new(HttpCategorySource::new(FetchConfig::default())?);
//! let reachability = Reachability::fixed(true);
//!
//! let (handle, mut outputs) = SyncController::spawn(
//!     QueryPublisher::new(store),
//!     source,
//!     reachability.subscribe(),
//!     SyncSettings::default(),
//! );
//! handle.initial_load()?;
//! while let Some(snapshot) = outputs.snapshots.recv().await {
//!     println!("{} categories", snapshot.len());
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod controller;
mod events;
mod publisher;

pub use cache::replace_cache;
pub use controller::{
    SyncController, SyncHandle, SyncOutputs, SyncSettings, DEFAULT_SEARCH_DEBOUNCE,
};
pub use events::{Diagnostic, LoadingComplete, RefreshOutcome, Trigger};
pub use publisher::{QueryPublisher, QueryResult, QuerySubscription};
