//! Plain-text link logs.
//!
//! Each finished download may append one line to a log file. Appends to the
//! same file are serialized; different files proceed independently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::config::LinkLogPolicy;
use crate::download::DownloadStatus;
use crate::message::Message;
use crate::platform::ChannelKind;

const LOG_BASENAME: &str = "Log_Links";

/// Appends link lines to log files.
#[derive(Debug, Default)]
pub struct LinkLogger {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl LinkLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `url` to the log chosen by `policy`.
    ///
    /// Returns `Ok(false)` when the entry was filtered out.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the folder or file cannot be written.
    #[instrument(skip(self, policy, message, kind), fields(url = %url))]
    pub async fn append(
        &self,
        policy: &LinkLogPolicy,
        message: &Message,
        kind: Option<ChannelKind>,
        url: &str,
        status: DownloadStatus,
    ) -> std::io::Result<bool> {
        if policy.destination.as_os_str().is_empty() {
            return Ok(false);
        }
        let wanted = if status == DownloadStatus::Success {
            policy.log_downloads
        } else {
            policy.log_failures
        };
        if !wanted {
            return Ok(false);
        }

        if policy.destination_is_folder {
            tokio::fs::create_dir_all(&policy.destination).await?;
        }
        let path = log_path(policy, message, kind, status);

        let lock = self
            .locks
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if policy.filter_duplicates && log_contains(&path, url).await {
            debug!(path = %path.display(), "link already logged");
            return Ok(false);
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let line = format!("\n{}", format_line(policy, message, url));
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(true)
    }
}

async fn log_contains(path: &Path, url: &str) -> bool {
    tokio::fs::read_to_string(path)
        .await
        .is_ok_and(|existing| existing.contains(url))
}

/// Log file for an entry.
///
/// A folder destination becomes `<folder>/Log_Links[ SID_x| DM| GroupDM|
/// Unknown][ CID_x][ UID_x][ - STATUS].txt`; a file destination is used as-is.
#[must_use]
pub fn log_path(
    policy: &LinkLogPolicy,
    message: &Message,
    kind: Option<ChannelKind>,
    status: DownloadStatus,
) -> PathBuf {
    if !policy.destination_is_folder {
        return policy.destination.clone();
    }

    let mut name = String::from(LOG_BASENAME);
    if policy.divide_by_server {
        match message.guild_id.as_deref().filter(|g| !g.is_empty()) {
            Some(guild) => {
                name.push_str(" SID_");
                name.push_str(guild);
            }
            None => name.push_str(match kind {
                Some(ChannelKind::Direct) => " DM",
                Some(ChannelKind::Group) => " GroupDM",
                _ => " Unknown",
            }),
        }
    }
    if policy.divide_by_channel {
        name.push_str(" CID_");
        name.push_str(&message.channel_id);
    }
    if policy.divide_by_user {
        name.push_str(" UID_");
        name.push_str(&message.author.id);
    }
    if policy.divide_by_status {
        name.push_str(status_suffix(status));
    }
    name.push_str(".txt");
    policy.destination.join(name)
}

fn status_suffix(status: DownloadStatus) -> &'static str {
    if status.is_failure() {
        " - FAILED"
    } else if status.is_skip_or_worse() {
        " - SKIPPED"
    } else if status == DownloadStatus::Ignored {
        " - IGNORED"
    } else {
        " - DOWNLOADED"
    }
}

/// One log line without the leading newline.
#[must_use]
pub fn format_line(policy: &LinkLogPolicy, message: &Message, url: &str) -> String {
    let user_data = if policy.user_data {
        let posted = message
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H-%M-%S").to_string())
            .unwrap_or_default();
        format!(
            "[{}/{}] \"{}\"#{} ({}) @ {}: ",
            message.guild_id.as_deref().unwrap_or_default(),
            message.channel_id,
            message.author.username,
            message.author.discriminator,
            message.author.id,
            posted
        )
    } else {
        String::new()
    };
    format!("{}{user_data}{url}{}", policy.prefix, policy.suffix)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::Author;
    use chrono::{DateTime, Utc};
    use tempfile::TempDir;

    fn policy(dest: &Path, folder: bool) -> LinkLogPolicy {
        LinkLogPolicy {
            destination: dest.to_path_buf(),
            destination_is_folder: folder,
            divide_by_server: false,
            divide_by_channel: false,
            divide_by_user: false,
            divide_by_status: false,
            log_downloads: true,
            log_failures: true,
            filter_duplicates: false,
            prefix: String::new(),
            suffix: String::new(),
            user_data: false,
        }
    }

    fn message() -> Message {
        Message {
            id: "1".into(),
            channel_id: "20".into(),
            guild_id: Some("10".into()),
            author: Author {
                id: "30".into(),
                username: "ann".into(),
                discriminator: "0001".into(),
            },
            timestamp: Some(
                DateTime::parse_from_rfc3339("2022-01-02T03:04:05Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            ..Message::default()
        }
    }

    // ==================== Naming Tests ====================

    #[test]
    fn test_log_path_divisions() {
        let mut p = policy(Path::new("/logs"), true);
        p.divide_by_server = true;
        p.divide_by_channel = true;
        p.divide_by_user = true;
        p.divide_by_status = true;
        let path = log_path(&p, &message(), None, DownloadStatus::FailedCode);
        assert_eq!(
            path,
            PathBuf::from("/logs/Log_Links SID_10 CID_20 UID_30 - FAILED.txt")
        );
    }

    #[test]
    fn test_log_path_direct_messages() {
        let mut p = policy(Path::new("/logs"), true);
        p.divide_by_server = true;
        let mut dm = message();
        dm.guild_id = None;
        assert_eq!(
            log_path(&p, &dm, Some(ChannelKind::Direct), DownloadStatus::Success),
            PathBuf::from("/logs/Log_Links DM.txt")
        );
        assert_eq!(
            log_path(&p, &dm, Some(ChannelKind::Group), DownloadStatus::Success),
            PathBuf::from("/logs/Log_Links GroupDM.txt")
        );
        assert_eq!(
            log_path(&p, &dm, None, DownloadStatus::Success),
            PathBuf::from("/logs/Log_Links Unknown.txt")
        );
    }

    #[test]
    fn test_status_suffixes() {
        assert_eq!(status_suffix(DownloadStatus::Success), " - DOWNLOADED");
        assert_eq!(status_suffix(DownloadStatus::Ignored), " - IGNORED");
        assert_eq!(status_suffix(DownloadStatus::SkippedDuplicate), " - SKIPPED");
        assert_eq!(status_suffix(DownloadStatus::FailedWritingFile), " - FAILED");
    }

    #[test]
    fn test_file_destination_used_verbatim() {
        let p = policy(Path::new("/logs/links.txt"), false);
        assert_eq!(
            log_path(&p, &message(), None, DownloadStatus::Success),
            PathBuf::from("/logs/links.txt")
        );
    }

    #[test]
    fn test_format_line_with_user_data() {
        let mut p = policy(Path::new("/logs"), true);
        p.user_data = true;
        p.prefix = "> ".into();
        p.suffix = " <".into();
        assert_eq!(
            format_line(&p, &message(), "https://x/y.png"),
            "> [10/20] \"ann\"#0001 (30) @ 2022-01-02 03-04-05: https://x/y.png <"
        );
    }

    // ==================== Append Tests ====================

    #[tokio::test]
    async fn test_append_and_filter_duplicates() {
        let temp = TempDir::new().unwrap();
        let mut p = policy(temp.path(), true);
        p.filter_duplicates = true;
        let logger = LinkLogger::new();

        let first = logger
            .append(&p, &message(), None, "https://x/a.png", DownloadStatus::Success)
            .await
            .unwrap();
        let again = logger
            .append(&p, &message(), None, "https://x/a.png", DownloadStatus::Success)
            .await
            .unwrap();
        assert!(first);
        assert!(!again);

        let content = std::fs::read_to_string(temp.path().join("Log_Links.txt")).unwrap();
        assert_eq!(content, "\nhttps://x/a.png");
    }

    #[tokio::test]
    async fn test_append_respects_failure_toggle() {
        let temp = TempDir::new().unwrap();
        let mut p = policy(temp.path(), true);
        p.log_failures = false;
        let logged = LinkLogger::new()
            .append(&p, &message(), None, "https://x/a.png", DownloadStatus::FailedCode)
            .await
            .unwrap();
        assert!(!logged);
        assert!(!temp.path().join("Log_Links.txt").exists());
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_every_line() {
        let temp = TempDir::new().unwrap();
        let p = Arc::new(policy(temp.path(), true));
        let logger = Arc::new(LinkLogger::new());
        let msg = Arc::new(message());

        let mut handles = Vec::new();
        for i in 0..16 {
            let (p, logger, msg) = (Arc::clone(&p), Arc::clone(&logger), Arc::clone(&msg));
            handles.push(tokio::spawn(async move {
                logger
                    .append(&p, &msg, None, &format!("https://x/{i}.png"), DownloadStatus::Success)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let content = std::fs::read_to_string(temp.path().join("Log_Links.txt")).unwrap();
        assert_eq!(content.lines().filter(|l| !l.is_empty()).count(), 16);
    }
}
