use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use super::init_db;
use super::store::{
    CategoryQuery, RecordStore, SortOrder, StoreChange, StoreWatch, WatchCounters, WatchStats,
};
use crate::error::StoreError;
use crate::models::{Category, CategoryRecord};

const LAST_REFRESHED_KEY: &str = "last_refreshed_at";
const CHANGE_BUFFER: usize = 16;

/// SQLite-backed category cache.
///
/// Writes are serialized through a single writer lock and every committed
/// write is announced to live [`StoreWatch`]es.
pub struct CategoryStore {
    pool: SqlitePool,
    writer: Mutex<()>,
    changes: broadcast::Sender<StoreChange>,
    watches: Arc<WatchCounters>,
}

impl CategoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            pool,
            writer: Mutex::new(()),
            changes,
            watches: Arc::new(WatchCounters::default()),
        }
    }

    /// Opens (or creates) the cache database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        tracing::debug!(path = %path.display(), "opening category store");
        Ok(Self::new(init_db(path).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn watch_stats(&self) -> WatchStats {
        self.watches.stats()
    }

    fn notify(&self, change: StoreChange) {
        // No receivers just means nobody is watching
        let _ = self.changes.send(change);
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Sqlite>,
        categories: &[Category],
    ) -> Result<(), StoreError> {
        for category in categories {
            sqlx::query(
                r#"
                INSERT INTO categories (id, name, high_res_image_url, low_res_image_url, path)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(category.id)
            .bind(&category.name)
            .bind(&category.high_res_image_url)
            .bind(&category.low_res_image_url)
            .bind(&category.path)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for CategoryStore {
    async fn query(&self, query: &CategoryQuery) -> Result<Vec<CategoryRecord>, StoreError> {
        let sql = match query.order() {
            SortOrder::Ascending => "SELECT * FROM categories ORDER BY id ASC",
            SortOrder::Descending => "SELECT * FROM categories ORDER BY id DESC",
        };
        let rows: Vec<CategoryRecord> = sqlx::query_as(sql).fetch_all(&self.pool).await?;

        // SQLite's LIKE only folds ASCII, so the predicate is applied here
        Ok(rows.into_iter().filter(|r| query.matches(r)).collect())
    }

    fn watch(&self) -> StoreWatch {
        StoreWatch::new(self.changes.subscribe(), self.watches.clone())
    }

    async fn insert(&self, categories: &[Category]) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        Self::insert_rows(&mut tx, categories).await?;
        tx.commit().await?;

        self.notify(StoreChange::Inserted);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let result = sqlx::query("DELETE FROM categories")
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            self.notify(StoreChange::Deleted);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().await;
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected() > 0;
        if removed {
            self.notify(StoreChange::Deleted);
        }
        Ok(removed)
    }

    async fn delete_last(&self) -> Result<Option<i64>, StoreError> {
        let _writer = self.writer.lock().await;

        // Single statement so no read lock is ever upgraded to a write lock
        let last: Option<i64> = sqlx::query_scalar(
            "DELETE FROM categories WHERE id = (SELECT MAX(id) FROM categories) RETURNING id",
        )
        .fetch_optional(&self.pool)
        .await?;

        if last.is_some() {
            self.notify(StoreChange::Deleted);
        }
        Ok(last)
    }

    async fn replace_all(&self, categories: &[Category]) -> Result<(), StoreError> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM categories")
            .execute(&mut *tx)
            .await?;
        Self::insert_rows(&mut tx, categories).await?;

        sqlx::query(
            r#"
            INSERT INTO cache_meta (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(LAST_REFRESHED_KEY)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        // Dropping the transaction on an earlier `?` rolls everything back
        tx.commit().await?;

        self.notify(StoreChange::Replaced);
        Ok(())
    }

    async fn last_refreshed_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM cache_meta WHERE key = ?")
                .bind(LAST_REFRESHED_KEY)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.and_then(|v| match DateTime::parse_from_rfc3339(&v) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(value = %v, error = %e, "ignoring unreadable refresh timestamp");
                None
            }
        }))
    }
}
