//! Per-link download orchestration.
//!
//! [`DownloadCoordinator::handle_download`] runs the retry loop;
//! each attempt walks the fixed sequence of validation, fetch, policy,
//! duplicate, placement and persistence steps and ends in a
//! [`DownloadStatus`].

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::HttpClient;
use super::error::FetchError;
use super::filename::{
    apply_date_prefix, extension_for_content_type, extension_of, filename_from_url,
    normalize_jfif, parse_content_disposition, sanitize_filename, truncate_long_filename,
};
use super::request::DownloadRequest;
use super::retry::{RetryDecision, RetryPolicy};
use super::sniff::{content_class, detect_content_type, is_html};
use super::status::{DownloadOutcome, DownloadStatus};
use crate::config::{ChannelPolicy, Settings};
use crate::dedup::{DownloadIdCounter, DuplicateDetector};
use crate::placement::{PathComposer, SaveError, SourceNames, resolve_collision, write_new_file};
use crate::platform::ChatPlatform;
use crate::report::OutcomeReporter;
use crate::store::{DownloadRecord, DownloadStore};

const VIDEO_EXTENSIONS: [&str; 3] = [".mov", ".mp4", ".webm"];
const IMAGE_EXTENSIONS: [&str; 5] = [".psd", ".nef", ".dng", ".tif", ".tiff"];

/// Fetches, filters, places and records resolved links.
///
/// Shared services (store, detector, id counter, platform) are internally
/// synchronized, so one coordinator can serve many concurrent tasks.
pub struct DownloadCoordinator {
    client: HttpClient,
    store: Arc<dyn DownloadStore>,
    platform: Arc<dyn ChatPlatform>,
    detector: Arc<DuplicateDetector>,
    counter: Arc<DownloadIdCounter>,
    reporter: OutcomeReporter,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("retry_policy", &self.retry_policy)
            .field("detector", &self.detector)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl DownloadCoordinator {
    /// Coordinator with default retry policy and duplicate detection off.
    #[must_use]
    pub fn new(
        client: HttpClient,
        store: Arc<dyn DownloadStore>,
        platform: Arc<dyn ChatPlatform>,
    ) -> Self {
        let retry_policy = RetryPolicy::default();
        Self {
            client,
            store,
            reporter: OutcomeReporter::new(Arc::clone(&platform))
                .with_max_attempts(retry_policy.max_attempts()),
            platform,
            detector: Arc::new(DuplicateDetector::disabled()),
            counter: Arc::new(DownloadIdCounter::new()),
            retry_policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Coordinator configured from global settings.
    #[must_use]
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn DownloadStore>,
        platform: Arc<dyn ChatPlatform>,
    ) -> Self {
        let reporter = OutcomeReporter::new(Arc::clone(&platform))
            .with_admin_channels(settings.admin_channels.clone())
            .with_max_attempts(settings.download_retry_max);
        Self {
            client: HttpClient::new_with_timeout(settings.download_timeout_secs),
            store,
            platform,
            detector: Arc::new(DuplicateDetector::new(
                settings.filter_duplicate_images,
                settings.filter_duplicate_images_threshold,
            )),
            counter: Arc::new(DownloadIdCounter::new()),
            reporter,
            retry_policy: RetryPolicy::with_max_attempts(settings.download_retry_max),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.reporter = self.reporter.with_max_attempts(retry_policy.max_attempts());
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn with_detector(mut self, detector: Arc<DuplicateDetector>) -> Self {
        self.detector = detector;
        self
    }

    #[must_use]
    pub fn with_id_counter(mut self, counter: Arc<DownloadIdCounter>) -> Self {
        self.counter = counter;
        self
    }

    #[must_use]
    pub fn with_admin_channels(mut self, admin_channels: Vec<String>) -> Self {
        self.reporter = self.reporter.with_admin_channels(admin_channels);
        self
    }

    /// Shares an externally owned shutdown token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DownloadStore> {
        &self.store
    }

    #[must_use]
    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    /// Downloads one link, retrying transient failures.
    ///
    /// Without a channel policy only command-triggered requests run; others
    /// are [`DownloadStatus::Ignored`]. After the final attempt a failure
    /// notice and link log entry are produced per policy.
    #[instrument(
        skip(self, request, policy),
        fields(url = %request.input_url, channel = %request.message.channel_id)
    )]
    pub async fn handle_download(
        &self,
        request: &DownloadRequest,
        policy: Option<&ChannelPolicy>,
    ) -> DownloadOutcome {
        let fallback;
        let (policy, configured) = match policy {
            Some(policy) => (policy, true),
            None if request.is_command() => {
                fallback = ChannelPolicy::for_command(&request.message.channel_id, &request.destination);
                (&fallback, false)
            }
            None => return DownloadOutcome::new(DownloadStatus::Ignored),
        };

        let mut attempt = 0u32;
        let outcome = loop {
            attempt += 1;
            debug!(attempt, "attempting download");

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    DownloadOutcome::with_error(
                        DownloadStatus::Failed,
                        FetchError::cancelled(&request.input_url),
                    )
                }
                outcome = self.try_download(request, policy) => outcome,
            };
            if self.cancel.is_cancelled() {
                break outcome;
            }

            match self.retry_policy.should_retry(outcome.status, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        status = %outcome.status,
                        "retrying download"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => break outcome,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, status = %outcome.status, "not retrying download");
                    break outcome;
                }
            }
        };

        if configured && !self.cancel.is_cancelled() {
            self.reporter.notify_failure(request, policy, &outcome).await;
            self.reporter.log_link(request, policy, &outcome).await;
        }
        outcome
    }

    /// One attempt. Steps run in order and stop at the first non-success.
    #[allow(clippy::too_many_lines)]
    async fn try_download(&self, request: &DownloadRequest, policy: &ChannelPolicy) -> DownloadOutcome {
        let download_id = self.counter.next_id();
        let url = request.input_url.as_str();
        let message = &request.message;

        let parsed = match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed,
            Ok(parsed) => {
                let reason = format!("unsupported scheme {}", parsed.scheme());
                return failed(FetchError::invalid_url(url, reason));
            }
            Err(e) => return failed(FetchError::invalid_url(url, e.to_string())),
        };

        let domain = parsed.host_str().unwrap_or_default();
        if let Err(status) = policy.filters.check_domain(domain) {
            self.log_skip(request, status, domain);
            return status.into();
        }

        let destination = &request.destination;
        if destination.as_os_str().is_empty() || destination == Path::new("/") {
            warn!(url, "destination cannot be an empty path");
            return DownloadStatus::FailedInvalidPath.into();
        }
        if let Err(e) = tokio::fs::create_dir_all(destination).await {
            warn!(path = %destination.display(), error = %e, "could not create destination folder");
            return DownloadOutcome::with_error(
                DownloadStatus::FailedCreatingFolder,
                FetchError::io(destination, e),
            );
        }

        let response = match self.client.fetch(url).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_unreachable_host() {
                    debug!(url, error = %e, "host unreachable");
                } else {
                    warn!(url, error = %e, "error receiving response");
                }
                return failed(e);
            }
        };

        if response.status >= 400 {
            let status = DownloadStatus::from_http_status(response.status);
            warn!(url, code = response.status, history = request.is_history, "download failed");
            return status.into();
        }

        let content_type = detect_content_type(&response.body);
        let mut class = content_class(&content_type).to_string();
        let html = is_html(&content_type);

        let mut filename = match &request.filename {
            Some(name) => sanitize_filename(name),
            None => response
                .content_disposition
                .as_deref()
                .and_then(parse_content_disposition)
                .filter(|name| !name.is_empty())
                .map_or_else(|| filename_from_url(&response.final_url), |name| sanitize_filename(&name)),
        };

        if let Err(status) = policy.filters.check_filename(&filename) {
            self.log_skip(request, status, &filename);
            return status.into();
        }
        if let Err(status) = policy.filters.check_reactions(&message.reactions) {
            self.log_skip(request, status, "reaction criteria not met");
            return status.into();
        }

        let mut extension = extension_of(&filename);
        if extension.is_empty()
            && let Some(guessed) = extension_for_content_type(&content_type)
        {
            filename.push_str(&guessed);
            extension = guessed;
        }
        if let Some(format) = &policy.filename_date_format {
            filename = apply_date_prefix(&filename, format, request.file_time);
        }
        let filename = truncate_long_filename(&filename, &extension);
        let (filename, extension) = normalize_jfif(&filename, &extension);

        if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            class = "video".to_string();
        } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            class = "image".to_string();
        }

        if let Err(status) = policy.filters.check_extension(&extension) {
            if !html {
                self.log_skip(request, status, &extension);
            }
            return status.into();
        }
        if let Err(status) = policy.filters.check_content_class(&class, html) {
            if !html {
                self.log_skip(request, status, &class);
            }
            return status.into();
        }

        if self
            .detector
            .is_duplicate(&response.body, &class, &extension, download_id)
            .await
        {
            return DownloadStatus::SkippedDetectedDuplicate.into();
        }

        let names = SourceNames::lookup(self.platform.as_ref(), message).await;
        let dir = match PathComposer::new(&policy.nesting)
            .compose(destination, &names, message, &class)
            .await
        {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "could not create subfolder");
                return DownloadOutcome::with_error(e.status(), e);
            }
        };
        let path = if policy.save {
            let path = match write_new_file(
                &dir,
                &filename,
                policy.save_possible_duplicates,
                &response.body,
            )
            .await
            {
                Ok(path) => path,
                Err(SaveError::Exists { .. }) => {
                    self.log_skip(request, DownloadStatus::SkippedDuplicate, &filename);
                    return DownloadStatus::SkippedDuplicate.into();
                }
                Err(e) => {
                    warn!(error = %e, "error writing file");
                    return DownloadOutcome::with_error(e.status(), e);
                }
            };
            if let Err(e) = set_file_time(&path, request.file_time) {
                warn!(path = %path.display(), error = %e, "could not set file time");
            }
            self.reporter
                .log_saved(request, &class, &path, response.body.len() as u64);
            path
        } else {
            let path = match resolve_collision(&dir, &filename, policy.save_possible_duplicates) {
                Ok(path) => path,
                Err(status) => {
                    self.log_skip(request, status, &filename);
                    return status.into();
                }
            };
            info!(class = %class, server = %names.server, channel = %names.channel, "file saving disabled");
            path
        };

        let record = DownloadRecord {
            url: request.input_url.clone(),
            time: Utc::now(),
            destination: path.display().to_string(),
            filename: filename.clone(),
            channel_id: message.channel_id.clone(),
            user_id: message.author.id.clone(),
        };
        if let Err(e) = self.store.insert_download(&record).await {
            warn!(error = %e, "error writing to database");
            return DownloadOutcome::with_error(DownloadStatus::FailedWritingDatabase, e);
        }

        self.reporter.react(request, policy).await;
        self.reporter
            .relay(request, policy, &filename, &class, &response.body)
            .await;
        self.reporter.refresh_presence(request, policy).await;

        DownloadStatus::Success.into()
    }

    fn log_skip(&self, request: &DownloadRequest, status: DownloadStatus, detail: &str) {
        if !request.is_history {
            info!(url = %request.input_url, %status, detail, "skipped");
        }
    }
}

fn failed(error: FetchError) -> DownloadOutcome {
    DownloadOutcome::with_error(error.status(), error)
}

fn set_file_time(path: &Path, time: DateTime<Utc>) -> std::io::Result<()> {
    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::from(time))
}
