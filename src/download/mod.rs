//! Retrying media download for resolved links.
//!
//! The coordinator owns the per-link decision sequence; the submodules provide
//! the pieces it composes:
//!
//! - [`HttpClient`]: single GET with browser User-Agent and identity encoding
//! - [`RetryPolicy`]: attempt limit and fixed pause between attempts
//! - [`DownloadStatus`]: ordered outcome classification
//! - filename and content-type helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use media_archiver::download::{DownloadCoordinator, DownloadRequest, HttpClient};
//! use media_archiver::message::Message;
//! use media_archiver::platform::OfflinePlatform;
//! use media_archiver::store::SqliteDownloadStore;
//! use media_archiver::{Database, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::default();
//! let store = Arc::new(SqliteDownloadStore::new(Database::new_in_memory().await?));
//! let coordinator = DownloadCoordinator::new(HttpClient::new(), store, Arc::new(OfflinePlatform::new()));
//! let message = Arc::new(Message::default());
//! let request = DownloadRequest::new("https://example.com/a.png", message, "archive");
//! let policy = settings.channel_policy("123");
//! let outcome = coordinator.handle_download(&request, policy.as_ref()).await;
//! println!("{}", outcome.status);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod coordinator;
mod error;
mod filename;
mod request;
mod retry;
mod sniff;
mod status;

pub use client::{BROWSER_USER_AGENT, FetchedResponse, HttpClient};
pub use constants::{CONNECT_TIMEOUT_SECS, DEFAULT_DOWNLOAD_TIMEOUT_SECS};
pub use coordinator::DownloadCoordinator;
pub use error::FetchError;
pub use filename::{
    MAX_FILENAME_LEN, TRUNCATED_STEM_LEN, apply_date_prefix, extension_of, normalize_jfif,
    truncate_long_filename,
};
pub(crate) use filename::{next_free_numbered_path, numbered_path, sanitize_filename};
pub use request::DownloadRequest;
pub use retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryDecision, RetryPolicy};
pub use sniff::{OCTET_STREAM, content_class, detect_content_type, is_html};
pub use status::{DownloadOutcome, DownloadStatus, Tier};
