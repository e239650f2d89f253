//! Error types for the download module.
//!
//! These are faults, not outcomes: the coordinator folds each one into a
//! [`DownloadStatus`](super::DownloadStatus) and keeps the text for reporting.

use std::path::PathBuf;

use thiserror::Error;

use super::DownloadStatus;

/// Errors that can occur while fetching or storing a file.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be built.
    #[error("could not build request for {url}: {source}")]
    Request {
        /// The URL being requested.
        url: String,
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The response body could not be read to the end.
    #[error("error reading response body from {url}: {source}")]
    Read {
        /// The URL whose body failed.
        url: String,
        /// The underlying stream error.
        #[source]
        source: reqwest::Error,
    },

    /// The provided URL is malformed or unsupported.
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// File system error while placing the file.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The download was abandoned because shutdown was requested.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The URL being downloaded.
        url: String,
    },
}

impl FetchError {
    /// Creates a request-build error.
    pub fn request(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            source,
        }
    }

    /// Creates a network error, or a timeout when reqwest reports one.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout { url: url.into() };
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a body read error.
    pub fn read(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Read {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Status this fault maps to when it ends an attempt.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        match self {
            Self::Request { .. } => DownloadStatus::FailedRequesting,
            Self::Network { .. } | Self::Timeout { .. } => {
                DownloadStatus::FailedDownloadingResponse
            }
            Self::Read { .. } => DownloadStatus::FailedReadResponse,
            Self::InvalidUrl { .. } => DownloadStatus::FailedInvalidSource,
            Self::Io { .. } => DownloadStatus::FailedWritingFile,
            Self::Cancelled { .. } => DownloadStatus::Failed,
        }
    }

    /// Returns true for unreachable hosts (DNS failure, connection refused).
    ///
    /// These still count as a failed attempt but are not worth a loud log line.
    #[must_use]
    pub fn is_unreachable_host(&self) -> bool {
        matches!(self, Self::Network { source, .. } if source.is_connect())
    }
}

// No From<reqwest::Error> / From<std::io::Error>: every variant needs the URL
// or path for context, which the source errors don't carry.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_timeout_display() {
        let error = FetchError::Timeout {
            url: "https://example.com/a.jpg".into(),
        };
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/a.jpg"));
        assert_eq!(error.status(), DownloadStatus::FailedDownloadingResponse);
    }

    #[test]
    fn test_fetch_error_invalid_url_maps_to_invalid_source() {
        let error = FetchError::invalid_url("ftp://x", "unsupported scheme");
        let msg = error.to_string();
        assert!(msg.contains("ftp://x"), "Expected URL in: {msg}");
        assert!(msg.contains("unsupported scheme"), "Expected reason in: {msg}");
        assert_eq!(error.status(), DownloadStatus::FailedInvalidSource);
        assert!(!error.is_unreachable_host());
    }

    #[test]
    fn test_fetch_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = FetchError::io(PathBuf::from("/tmp/a.jpg"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/a.jpg"), "Expected path in: {msg}");
    }

    #[test]
    fn test_fetch_error_cancelled() {
        let error = FetchError::cancelled("https://example.com/a.jpg");
        assert!(error.to_string().contains("cancelled"));
        assert_eq!(error.status(), DownloadStatus::Failed);
    }
}
