//! Download record persistence.
//!
//! Records outlive a single message: they back the pre-download duplicate
//! check and the `stats` command. Insertion is safe from concurrent tasks;
//! SQLite serializes the writes.

mod repository;

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use thiserror::Error;
use tracing::instrument;

use crate::db::Database;

pub use repository::DownloadStore;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors from the download store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query or connection failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One saved file.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DownloadRecord {
    /// URL the download was requested for (before redirects).
    pub url: String,
    /// When the file was saved.
    pub time: DateTime<Utc>,
    /// Full path of the written file.
    pub destination: String,
    pub filename: String,
    pub channel_id: String,
    pub user_id: String,
}

/// SQLite-backed [`DownloadStore`].
#[derive(Debug, Clone)]
pub struct SqliteDownloadStore {
    db: Database,
}

impl SqliteDownloadStore {
    /// Wraps an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a record and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, record), fields(url = %record.url, channel = %record.channel_id))]
    pub async fn insert_download(&self, record: &DownloadRecord) -> Result<i64> {
        let result = sqlx::query(
            r"INSERT INTO downloads (url, time, destination, filename, channel_id, user_id)
              VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.url)
        .bind(record.time)
        .bind(&record.destination)
        .bind(&record.filename)
        .bind(&record.channel_id)
        .bind(&record.user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Returns every record saved for `url`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn find_downloads_by_url(&self, url: &str) -> Result<Vec<DownloadRecord>> {
        let records = sqlx::query_as::<_, DownloadRecord>(
            r"SELECT url, time, destination, filename, channel_id, user_id
              FROM downloads WHERE url = ? ORDER BY id",
        )
        .bind(url)
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    /// Counts records, optionally restricted to one channel.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_downloads(&self, channel_id: Option<&str>) -> Result<i64> {
        let (count,): (i64,) = match channel_id {
            Some(channel) => {
                sqlx::query_as("SELECT COUNT(*) FROM downloads WHERE channel_id = ?")
                    .bind(channel)
                    .fetch_one(self.db.pool())
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM downloads")
                    .fetch_one(self.db.pool())
                    .await?
            }
        };
        Ok(count)
    }

    /// Most recent records for a channel, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn downloads_for_channel(
        &self,
        channel_id: &str,
        limit: i64,
    ) -> Result<Vec<DownloadRecord>> {
        let records = sqlx::query_as::<_, DownloadRecord>(
            r"SELECT url, time, destination, filename, channel_id, user_id
              FROM downloads WHERE channel_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(channel_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }
}
