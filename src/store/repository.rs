//! Persistence seam used by the pipeline.
//!
//! The coordinator and pre-download filter depend on this trait rather than on
//! SQLite directly, so tests can substitute an in-memory fake.

use async_trait::async_trait;

use super::{DownloadRecord, Result, SqliteDownloadStore};

/// Data-access contract for download records.
#[async_trait]
pub trait DownloadStore: Send + Sync {
    /// Persists a saved download.
    async fn insert_download(&self, record: &DownloadRecord) -> Result<i64>;

    /// Returns all records for a source URL.
    async fn find_downloads_by_url(&self, url: &str) -> Result<Vec<DownloadRecord>>;
}

#[async_trait]
impl DownloadStore for SqliteDownloadStore {
    async fn insert_download(&self, record: &DownloadRecord) -> Result<i64> {
        SqliteDownloadStore::insert_download(self, record).await
    }

    async fn find_downloads_by_url(&self, url: &str) -> Result<Vec<DownloadRecord>> {
        SqliteDownloadStore::find_downloads_by_url(self, url).await
    }
}
