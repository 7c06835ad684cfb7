//! Cache replacement: swap the whole categories table for a fetched set.

use std::collections::HashSet;

use crate::db::RecordStore;
use crate::error::StoreError;
use crate::models::Category;

/// Atomically replaces the cached categories with `categories`.
///
/// Readers see either the old complete set or the new one. A set with
/// duplicate ids is rejected before the store is touched. Returns the number
/// of records written.
pub async fn replace_cache(
    store: &dyn RecordStore,
    categories: &[Category],
) -> Result<usize, StoreError> {
    let mut seen = HashSet::with_capacity(categories.len());
    if let Some(dup) = categories.iter().find(|c| !seen.insert(c.id)) {
        return Err(StoreError::ConstraintViolation(format!(
            "duplicate category id {} in fetched set",
            dup.id
        )));
    }

    store.replace_all(categories).await?;
    tracing::debug!(records = categories.len(), "cache replaced");
    Ok(categories.len())
}
