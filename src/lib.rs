//! Glam Catalog
//!
//! Offline-first category catalog: a SQLite cache kept in sync with a remote
//! endpoint, exposed as live, searchable snapshots.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod net;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Config, ConfigError, ConfigSource, ConfigValue};
pub use db::{CategoryQuery, CategoryStore, RecordStore, SortOrder};
pub use error::{FetchError, StoreError, SyncError};
pub use models::{Category, CategoryRecord, ImagePolicy, Snapshot, SnapshotDiff};
pub use net::{CategorySource, FetchConfig, HttpCategorySource, Reachability};
pub use sync::{
    LoadingComplete, QueryPublisher, RefreshOutcome, SyncController, SyncHandle, SyncOutputs,
    SyncSettings, Trigger,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
