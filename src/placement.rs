//! Destination directory composition and filename collision handling.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::config::Nesting;
use crate::download::{DownloadStatus, next_free_numbered_path, numbered_path, sanitize_filename};
use crate::message::Message;
use crate::platform::{ChannelKind, ChatPlatform};

/// Server name used when the platform cannot tell us one.
pub const UNKNOWN_SERVER: &str = "UNKNOWN";

/// Failure to create one of the nested folders.
#[derive(Debug, Error)]
#[error("failed to create subfolder {path}: {source}")]
pub struct PlacementError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl PlacementError {
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        DownloadStatus::FailedCreatingSubfolder
    }
}

/// Failure to store a downloaded file under a fresh name.
#[derive(Debug, Error)]
pub enum SaveError {
    /// The name is taken and possible duplicates are not saved.
    #[error("{path} already exists")]
    Exists { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SaveError {
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        match self {
            Self::Exists { .. } => DownloadStatus::SkippedDuplicate,
            Self::Io { .. } => DownloadStatus::FailedWritingFile,
        }
    }
}

/// Display names of where a message was posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNames {
    /// Server name, `Direct Messages`, `Group Messages` or [`UNKNOWN_SERVER`].
    pub server: String,
    /// `#channel`, or `Category / #channel`, or the raw id.
    pub channel: String,
    pub channel_kind: Option<ChannelKind>,
}

impl SourceNames {
    /// Names used when no metadata is available.
    #[must_use]
    pub fn unknown(channel_id: &str) -> Self {
        Self {
            server: UNKNOWN_SERVER.to_string(),
            channel: channel_id.to_string(),
            channel_kind: None,
        }
    }

    /// Looks up server and channel names. Lookup failures degrade to ids.
    pub async fn lookup(platform: &dyn ChatPlatform, message: &Message) -> Self {
        let mut names = Self::unknown(&message.channel_id);
        let Ok(channel) = platform.channel(&message.channel_id).await else {
            return names;
        };

        names.channel_kind = Some(channel.kind);
        if !channel.name.is_empty() {
            names.channel = format!("#{}", channel.name);
        }

        match channel.kind {
            ChannelKind::Text => {
                if let Some(guild_id) = channel.guild_id.as_deref().filter(|g| !g.is_empty())
                    && let Ok(guild) = platform.guild(guild_id).await
                    && !guild.name.is_empty()
                {
                    names.server = guild.name;
                }
                if let Some(parent_id) = channel.parent_id.as_deref().filter(|p| !p.is_empty())
                    && let Ok(parent) = platform.channel(parent_id).await
                    && !parent.name.is_empty()
                {
                    names.channel = format!("{} / {}", parent.name, names.channel);
                }
            }
            ChannelKind::Direct => names.server = "Direct Messages".to_string(),
            ChannelKind::Group => names.server = "Group Messages".to_string(),
        }
        names
    }
}

/// Folder name for a content class.
#[must_use]
pub fn type_folder(class: &str) -> &str {
    match class {
        "image" => "images",
        "video" => "videos",
        "application" => "applications",
        other => other,
    }
}

/// Builds nested destination folders for one channel's policy.
#[derive(Debug, Clone, Copy)]
pub struct PathComposer<'a> {
    nesting: &'a Nesting,
}

impl<'a> PathComposer<'a> {
    #[must_use]
    pub fn new(nesting: &'a Nesting) -> Self {
        Self { nesting }
    }

    /// Folder segments in order: server, channel, user, year, month, day, hour, type.
    #[must_use]
    pub fn segments(
        &self,
        names: &SourceNames,
        message: &Message,
        class: &str,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let nesting = self.nesting;
        let mut segments = Vec::new();

        if nesting.server {
            let guild_id = message.guild_id.clone().unwrap_or_default();
            let segment = if nesting.use_id || names.server.is_empty() || names.server == UNKNOWN_SERVER
            {
                guild_id
            } else {
                sanitize_filename(&names.server)
            };
            if !segment.is_empty() {
                segments.push(segment);
            }
        }

        if nesting.channel {
            let segment = if nesting.use_id || names.channel.is_empty() {
                message.channel_id.clone()
            } else {
                sanitize_filename(&names.channel)
            };
            if !segment.is_empty() {
                segments.push(segment);
            }
        }

        if nesting.user {
            let author = &message.author;
            let segment = if nesting.use_id || author.username.is_empty() {
                author.id.clone()
            } else {
                sanitize_filename(&author.tag())
            };
            if !segment.is_empty() {
                segments.push(segment);
            }
        }

        let time = message.timestamp.unwrap_or(now);
        if nesting.year {
            segments.push(time.year().to_string());
        }
        if nesting.month {
            segments.push(format!("{:02}", time.month()));
        }
        if nesting.day {
            segments.push(format!("{:02}", time.day()));
        }
        if nesting.hour {
            segments.push(format!("{:02}", time.hour()));
        }

        if nesting.content_type && !class.is_empty() {
            segments.push(type_folder(class).to_string());
        }

        segments
    }

    /// Creates each nested folder below `base` and returns the deepest one.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError`] for the first folder that cannot be created.
    #[instrument(skip(self, names, message), fields(base = %base.display()))]
    pub async fn compose(
        &self,
        base: &Path,
        names: &SourceNames,
        message: &Message,
        class: &str,
    ) -> Result<PathBuf, PlacementError> {
        let mut dir = base.to_path_buf();
        for segment in self.segments(names, message, class, Utc::now()) {
            dir.push(segment);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| PlacementError {
                    path: dir.clone(),
                    source,
                })?;
        }
        debug!(dir = %dir.display(), "destination composed");
        Ok(dir)
    }
}

/// Picks the final file path in `dir`.
///
/// An existing file is either sidestepped with a `-N` suffix (when possible
/// duplicates are saved) or reported as [`DownloadStatus::SkippedDuplicate`].
///
/// # Errors
///
/// Returns `SkippedDuplicate` when the name is taken and duplicates are not saved.
pub fn resolve_collision(
    dir: &Path,
    filename: &str,
    save_possible_duplicates: bool,
) -> Result<PathBuf, DownloadStatus> {
    let path = dir.join(filename);
    if !path.exists() {
        return Ok(path);
    }
    if save_possible_duplicates {
        let renamed = next_free_numbered_path(dir, filename);
        debug!(
            original = %path.display(),
            renamed = %renamed.display(),
            "matching filename, saving under new name"
        );
        Ok(renamed)
    } else {
        Err(DownloadStatus::SkippedDuplicate)
    }
}

/// Writes `bytes` to a new file named `filename` in `dir`.
///
/// The name is claimed with `create_new`, so two writers never end up
/// sharing a file. A taken name moves on to `-1`, `-2`, ... when possible
/// duplicates are saved, and is [`SaveError::Exists`] otherwise.
///
/// # Errors
///
/// [`SaveError::Exists`] for a taken name without duplicate saving, and
/// [`SaveError::Io`] when opening or writing fails.
pub async fn write_new_file(
    dir: &Path,
    filename: &str,
    save_possible_duplicates: bool,
    bytes: &[u8],
) -> Result<PathBuf, SaveError> {
    let mut n: u64 = 0;
    loop {
        let path = if n == 0 {
            dir.join(filename)
        } else {
            numbered_path(dir, filename, n)
        };

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                let written = match file.write_all(bytes).await {
                    Ok(()) => file.flush().await,
                    Err(e) => Err(e),
                };
                return match written {
                    Ok(()) => {
                        if n > 0 {
                            debug!(renamed = %path.display(), "matching filename, saved under new name");
                        }
                        Ok(path)
                    }
                    Err(source) => Err(SaveError::Io { path, source }),
                };
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !save_possible_duplicates {
                    return Err(SaveError::Exists { path });
                }
                n += 1;
            }
            Err(source) => return Err(SaveError::Io { path, source }),
        }
    }
}
