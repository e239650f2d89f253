//! Error types for provider resolution.
//!
//! Resolver errors never abort a pipeline. The registry logs them and falls
//! through to the next provider, so these variants mainly carry log context.

use thiserror::Error;

/// Substrings in provider error text that mark an expected, unremarkable miss.
const BENIGN_MARKERS: [&str; 2] = ["suspended", "No status found"];

/// Errors a provider can report while expanding a link.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The provider's upstream request failed.
    #[error("{provider} request failed for '{url}': {reason}")]
    Request {
        /// Provider name.
        provider: String,
        /// Link being resolved.
        url: String,
        /// Upstream error text.
        reason: String,
    },

    /// The provider reached its upstream but could not interpret the answer.
    #[error("{provider} could not parse response for '{url}': {reason}")]
    Parse {
        /// Provider name.
        provider: String,
        /// Link being resolved.
        url: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// The content exists but is unavailable (removed, private, suspended...).
    #[error("{provider} reports '{url}' unavailable: {reason}")]
    Unavailable {
        /// Provider name.
        provider: String,
        /// Link being resolved.
        url: String,
        /// Upstream explanation.
        reason: String,
    },
}

impl ResolveError {
    /// Creates a `Request` error.
    #[must_use]
    pub fn request(provider: &str, url: &str, reason: impl Into<String>) -> Self {
        Self::Request {
            provider: provider.to_string(),
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `Parse` error.
    #[must_use]
    pub fn parse(provider: &str, url: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            provider: provider.to_string(),
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an `Unavailable` error.
    #[must_use]
    pub fn unavailable(provider: &str, url: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.to_string(),
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true for expected misses that should not be logged as warnings.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        let text = self.to_string();
        BENIGN_MARKERS.iter().any(|marker| text.contains(marker))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_display_carries_context() {
        let err = ResolveError::request("album-host", "https://a.example/x", "timed out");
        let msg = err.to_string();
        assert!(msg.contains("album-host"), "Expected provider in: {msg}");
        assert!(msg.contains("https://a.example/x"), "Expected URL in: {msg}");
        assert!(msg.contains("timed out"), "Expected reason in: {msg}");
    }

    #[test]
    fn test_resolve_error_benign_markers() {
        assert!(ResolveError::unavailable("status", "u", "account suspended").is_benign());
        assert!(ResolveError::parse("status", "u", "No status found with that ID").is_benign());
        assert!(!ResolveError::request("status", "u", "connection reset").is_benign());
    }
}
