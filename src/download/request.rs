use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::message::Message;

/// One resolved link to fetch for a message.
///
/// Filename, extension and path are refined per attempt on local copies; the
/// request itself is not mutated while it is processed.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// URL to fetch; also the key stored in the download record.
    pub input_url: String,
    /// Filename supplied by the message or resolver.
    pub filename: Option<String>,
    pub extension: String,
    /// Channel destination root.
    pub destination: PathBuf,
    pub message: Arc<Message>,
    /// Timestamp applied to the written file.
    pub file_time: DateTime<Utc>,
    /// Replay of channel history rather than a live message.
    pub is_history: bool,
    /// Triggered by an emoji reaction command.
    pub is_emoji_command: bool,
    /// Triggered manually by an administrator.
    pub is_manual: bool,
    pub start_time: Instant,
}

impl DownloadRequest {
    #[must_use]
    pub fn new(
        input_url: impl Into<String>,
        message: Arc<Message>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        let file_time = message.timestamp.unwrap_or_else(Utc::now);
        Self {
            input_url: input_url.into(),
            filename: None,
            extension: String::new(),
            destination: destination.into(),
            message,
            file_time,
            is_history: false,
            is_emoji_command: false,
            is_manual: false,
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename.filter(|f| !f.is_empty());
        self
    }

    #[must_use]
    pub fn with_file_time(mut self, time: DateTime<Utc>) -> Self {
        self.file_time = time;
        self
    }

    #[must_use]
    pub fn history(mut self) -> Self {
        self.is_history = true;
        self
    }

    #[must_use]
    pub fn emoji_command(mut self) -> Self {
        self.is_emoji_command = true;
        self
    }

    #[must_use]
    pub fn manual(mut self) -> Self {
        self.is_manual = true;
        self
    }

    /// Requests started by a command bypass the channel policy requirement.
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.is_emoji_command || self.is_manual
    }
}
