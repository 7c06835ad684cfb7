//! Inbound triggers and outbound events of the sync controller.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::SyncError;

/// Events produced by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// View appeared: show the cache, then refresh it.
    InitialLoad,
    PullToRefresh,
    /// Remove the row with the highest id.
    DeleteLast,
    SearchKeywordChanged(String),
}

/// How a refresh request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cache now holds `records` fresh rows.
    Refreshed { records: usize },
    /// Skipped: the connectivity gate was closed.
    Offline,
    /// The fetch failed; the cache was left untouched.
    FetchFailed,
    /// The fetch succeeded but replacing the cache failed; nothing was changed.
    StoreFailed,
}

impl RefreshOutcome {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, RefreshOutcome::Refreshed { .. })
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Refreshed { records } => write!(f, "refreshed {} record(s)", records),
            RefreshOutcome::Offline => write!(f, "offline, showing cached data"),
            RefreshOutcome::FetchFailed => write!(f, "fetch failed, showing cached data"),
            RefreshOutcome::StoreFailed => write!(f, "cache update failed, showing cached data"),
        }
    }
}

/// Signals that a refresh request has finished, whatever its outcome.
///
/// Meant for stopping a refresh indicator; inspect `outcome` to tell
/// success from failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadingComplete {
    pub outcome: RefreshOutcome,
}

/// An error recorded for diagnostics only.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub at: DateTime<Utc>,
    pub error: SyncError,
}

impl Diagnostic {
    pub fn new(error: SyncError) -> Self {
        Self {
            at: Utc::now(),
            error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.to_rfc3339(), self.error)
    }
}
