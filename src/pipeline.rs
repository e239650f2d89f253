//! Per-message pipeline: extraction, resolution, pre-download dedup and
//! concurrent per-link downloads.
//!
//! Each resolved link is handed to the shared [`DownloadCoordinator`] in its
//! own Tokio task; the pipeline waits for all of them and tallies the
//! outcomes in [`PipelineStats`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::config::{ChannelPolicy, Settings};
use crate::dedup::filter_already_downloaded;
use crate::download::{DownloadCoordinator, DownloadOutcome, DownloadRequest, Tier};
use crate::extract::extract_links;
use crate::message::Message;
use crate::resolver::{ResolveContext, ResolvedLink, ResolverRegistry};

/// Destination used for command-triggered downloads in unconfigured channels.
pub const DEFAULT_COMMAND_DESTINATION: &str = "downloads";

/// What caused a message to be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trigger {
    /// A message seen as it was posted.
    #[default]
    Live,
    /// Replay of older channel history.
    History,
    /// An emoji reaction asked for the message to be saved.
    EmojiCommand,
    /// An administrator asked for the message to be saved.
    Manual,
}

impl Trigger {
    fn apply(self, request: DownloadRequest) -> DownloadRequest {
        match self {
            Self::Live => request,
            Self::History => request.history(),
            Self::EmojiCommand => request.emoji_command(),
            Self::Manual => request.manual(),
        }
    }

    fn is_command(self) -> bool {
        matches!(self, Self::EmojiCommand | Self::Manual)
    }
}

/// Running outcome counts across all processed links.
#[derive(Debug, Default)]
pub struct PipelineStats {
    downloaded: AtomicUsize,
    ignored: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl PipelineStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Links saved (or recorded with saving disabled).
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn ignored(&self) -> usize {
        self.ignored.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Total links that reached a final outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.downloaded() + self.ignored() + self.skipped() + self.failed()
    }

    fn record(&self, outcome: &DownloadOutcome) {
        let counter = match outcome.status.tier() {
            Tier::Success => &self.downloaded,
            Tier::Ignored => &self.ignored,
            Tier::Skip => &self.skipped,
            Tier::Fail => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runs chat messages through resolution and download.
pub struct MessagePipeline {
    settings: Arc<Settings>,
    registry: Arc<ResolverRegistry>,
    coordinator: Arc<DownloadCoordinator>,
    stats: Arc<PipelineStats>,
    command_destination: PathBuf,
}

impl std::fmt::Debug for MessagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePipeline")
            .field("resolvers", &self.registry.resolver_count())
            .field("coordinator", &self.coordinator)
            .field("command_destination", &self.command_destination)
            .finish_non_exhaustive()
    }
}

impl MessagePipeline {
    #[must_use]
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<ResolverRegistry>,
        coordinator: Arc<DownloadCoordinator>,
    ) -> Self {
        Self {
            settings,
            registry,
            coordinator,
            stats: Arc::new(PipelineStats::new()),
            command_destination: PathBuf::from(DEFAULT_COMMAND_DESTINATION),
        }
    }

    /// Sets where command-triggered downloads land when the channel has no
    /// configuration of its own.
    #[must_use]
    pub fn with_command_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.command_destination = destination.into();
        self
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<DownloadCoordinator> {
        &self.coordinator
    }

    /// Extracts and resolves every link in `message`.
    ///
    /// Links the channel already holds are dropped unless the policy keeps
    /// possible duplicates. An attachment's own filename wins over whatever
    /// the resolver suggested, and each final URL appears once.
    #[instrument(skip(self, message, policy), fields(message_id = %message.id))]
    pub async fn collect_links(
        &self,
        message: &Message,
        policy: &ChannelPolicy,
    ) -> Vec<(ResolvedLink, chrono::DateTime<chrono::Utc>)> {
        let ctx = ResolveContext::new(&message.channel_id, &message.id);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for candidate in extract_links(message) {
            let resolved = self.registry.resolve(&candidate.url, &ctx).await;
            let resolved = filter_already_downloaded(
                resolved,
                self.coordinator.store().as_ref(),
                &message.channel_id,
                policy.save_possible_duplicates,
            )
            .await;

            for mut link in resolved {
                if candidate.suggested_filename.is_some() {
                    link.filename.clone_from(&candidate.suggested_filename);
                }
                if seen.insert(link.url.clone()) {
                    links.push((link, candidate.discovered_at));
                } else {
                    debug!(url = %link.url, "dropping repeated link");
                }
            }
        }
        links
    }

    /// Processes one message and returns the outcome of every link it held.
    ///
    /// Live and history messages in unconfigured channels are ignored
    /// without resolving anything; command triggers still run.
    #[instrument(skip(self, message), fields(message_id = %message.id, channel = %message.channel_id))]
    pub async fn process(&self, message: Arc<Message>, trigger: Trigger) -> Vec<DownloadOutcome> {
        let policy = self.settings.channel_policy(&message.channel_id);
        let effective = match (&policy, trigger.is_command()) {
            (Some(policy), _) => policy.clone(),
            (None, true) => {
                ChannelPolicy::for_command(&message.channel_id, &self.command_destination)
            }
            (None, false) => {
                debug!("channel not configured, ignoring message");
                return Vec::new();
            }
        };

        let links = self.collect_links(&message, &effective).await;
        if links.is_empty() {
            return Vec::new();
        }
        debug!(count = links.len(), "links resolved");

        let policy = policy.map(Arc::new);
        let mut handles = Vec::with_capacity(links.len());
        for (link, discovered_at) in links {
            let request = trigger.apply(
                DownloadRequest::new(link.url, Arc::clone(&message), &effective.destination)
                    .with_filename(link.filename)
                    .with_file_time(discovered_at),
            );
            let coordinator = Arc::clone(&self.coordinator);
            let stats = Arc::clone(&self.stats);
            let policy = policy.clone();

            handles.push(tokio::spawn(async move {
                let outcome = coordinator
                    .handle_download(&request, policy.as_deref())
                    .await;
                stats.record(&outcome);
                outcome
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        info!(
            links = outcomes.len(),
            saved = outcomes.iter().filter(|o| o.status.tier() == Tier::Success).count(),
            "message processed"
        );
        outcomes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ChannelOverrides;
    use crate::db::Database;
    use crate::download::{DownloadStatus, HttpClient};
    use crate::message::Attachment;
    use crate::platform::OfflinePlatform;
    use crate::store::{DownloadRecord, DownloadStore, SqliteDownloadStore};
    use chrono::Utc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n0000000000000000";

    async fn pipeline_for(dir: &TempDir, channel: &str) -> MessagePipeline {
        let mut settings = Settings::default();
        settings.channels.push(ChannelOverrides {
            channel: Some(channel.to_string()),
            destination: dir.path().to_string_lossy().into_owned(),
            ..ChannelOverrides::default()
        });
        let store = Arc::new(SqliteDownloadStore::new(
            Database::new_in_memory().await.unwrap(),
        ));
        let coordinator =
            DownloadCoordinator::new(HttpClient::new(), store, Arc::new(OfflinePlatform::new()));
        MessagePipeline::new(
            Arc::new(settings),
            Arc::new(ResolverRegistry::new()),
            Arc::new(coordinator),
        )
    }

    fn message(channel: &str, content: &str) -> Message {
        Message {
            id: "m1".into(),
            channel_id: channel.into(),
            content: content.into(),
            timestamp: Some(Utc::now()),
            ..Message::default()
        }
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_stats_record_by_tier() {
        let stats = PipelineStats::new();
        stats.record(&DownloadOutcome::new(DownloadStatus::Success));
        stats.record(&DownloadOutcome::new(DownloadStatus::Ignored));
        stats.record(&DownloadOutcome::new(DownloadStatus::SkippedUnpermittedType));
        stats.record(&DownloadOutcome::new(DownloadStatus::FailedCode404));
        stats.record(&DownloadOutcome::new(DownloadStatus::FailedCode));
        assert_eq!(stats.downloaded(), 1);
        assert_eq!(stats.ignored(), 1);
        assert_eq!(stats.skipped(), 1);
        assert_eq!(stats.failed(), 2);
        assert_eq!(stats.total(), 5);
    }

    // ==================== Link Collection Tests ====================

    #[tokio::test]
    async fn test_collect_links_dedups_and_prefers_attachment_filename() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_for(&dir, "c1").await;
        let mut msg = message(
            "c1",
            "see https://cdn.example.com/a.png and https://cdn.example.com/b.png",
        );
        msg.attachments.push(Attachment {
            url: "https://cdn.example.com/a.png".into(),
            filename: "upload.png".into(),
        });
        let policy = pipeline.settings.channel_policy("c1").unwrap();

        let links = pipeline.collect_links(&msg, &policy).await;
        let urls: Vec<_> = links.iter().map(|(l, _)| l.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://cdn.example.com/a.png", "https://cdn.example.com/b.png"]
        );
        assert_eq!(links[0].0.filename.as_deref(), Some("upload.png"));
        assert_eq!(links[1].0.filename, None);
    }

    #[tokio::test]
    async fn test_collect_links_drops_already_downloaded() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_for(&dir, "c1").await;
        pipeline
            .coordinator
            .store()
            .insert_download(&DownloadRecord {
                url: "https://cdn.example.com/a.png".into(),
                time: Utc::now(),
                destination: "x".into(),
                filename: "a.png".into(),
                channel_id: "c1".into(),
                user_id: "u".into(),
            })
            .await
            .unwrap();
        let msg = message("c1", "https://cdn.example.com/a.png");
        let mut policy = pipeline.settings.channel_policy("c1").unwrap();

        assert!(pipeline.collect_links(&msg, &policy).await.is_empty());

        policy.save_possible_duplicates = true;
        assert_eq!(pipeline.collect_links(&msg, &policy).await.len(), 1);
    }

    // ==================== Processing Tests ====================

    #[tokio::test]
    async fn test_process_unconfigured_channel_is_ignored() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_for(&dir, "c1").await;
        let outcomes = pipeline
            .process(
                Arc::new(message("other", "https://cdn.example.com/a.png")),
                Trigger::Live,
            )
            .await;
        assert!(outcomes.is_empty());
        assert_eq!(pipeline.stats().total(), 0);
    }

    #[tokio::test]
    async fn test_process_downloads_every_link() {
        let server = MockServer::start().await;
        for name in ["/one.png", "/two.png"] {
            Mock::given(method("GET"))
                .and(path(name))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_MAGIC.to_vec()))
                .expect(1)
                .mount(&server)
                .await;
        }
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline_for(&dir, "c1").await;
        let content = format!("{0}/one.png {0}/two.png {0}/one.png", server.uri());

        let outcomes = pipeline
            .process(Arc::new(message("c1", &content)), Trigger::Live)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.status == DownloadStatus::Success));
        assert!(dir.path().join("images").join("one.png").exists());
        assert!(dir.path().join("images").join("two.png").exists());
        assert_eq!(pipeline.stats().downloaded(), 2);
    }

    #[tokio::test]
    async fn test_process_manual_trigger_in_unconfigured_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_MAGIC.to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let manual_dir = TempDir::new().unwrap();
        let pipeline = pipeline_for(&dir, "c1")
            .await
            .with_command_destination(manual_dir.path());

        let content = format!("{}/m.png", server.uri());
        let outcomes = pipeline
            .process(Arc::new(message("elsewhere", &content)), Trigger::Manual)
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, DownloadStatus::Success);
        assert!(manual_dir.path().join("images").join("m.png").exists());
    }
}
