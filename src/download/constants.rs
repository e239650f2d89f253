//! Constants for the download module (timeouts).

/// HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default whole-request timeout (60 seconds), overridable per settings file.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;
