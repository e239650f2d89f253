//! Outcome side-effects: notices, link logs, reactions, relays and presence.
//!
//! Every platform or filesystem failure here is logged and swallowed. A
//! download's status is settled before the reporter runs.

mod link_log;

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tracing::{info, warn};

pub use link_log::{LinkLogger, format_line, log_path};

use crate::config::{ChannelPolicy, ReactPolicy};
use crate::download::{DEFAULT_MAX_ATTEMPTS, DownloadOutcome, DownloadRequest};
use crate::platform::{ChannelKind, ChatPlatform, GuildInfo, Permission, RelayEmbed};

/// Reaction used when no configured or server emoji is available.
pub const DEFAULT_REACTION: &str = "✅";

/// Placeholder in relay captions replaced by the source channel id.
const CHANNEL_ID_KEY: &str = "{{channelID}}";

/// Runs the side-effects of finished downloads.
pub struct OutcomeReporter {
    platform: Arc<dyn ChatPlatform>,
    links: LinkLogger,
    admin_channels: Vec<String>,
    max_attempts: u32,
}

impl std::fmt::Debug for OutcomeReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeReporter")
            .field("admin_channels", &self.admin_channels)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl OutcomeReporter {
    #[must_use]
    pub fn new(platform: Arc<dyn ChatPlatform>) -> Self {
        Self {
            platform,
            links: LinkLogger::new(),
            admin_channels: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Channels that receive a copy of failures carrying error text.
    #[must_use]
    pub fn with_admin_channels(mut self, admin_channels: Vec<String>) -> Self {
        self.admin_channels = admin_channels;
        self
    }

    /// Attempt count quoted in failure notices.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Tells the author (and admin channels) that retries were exhausted.
    ///
    /// Skipped for history replays and emoji commands.
    pub async fn notify_failure(
        &self,
        request: &DownloadRequest,
        policy: &ChannelPolicy,
        outcome: &DownloadOutcome,
    ) {
        if !outcome.status.is_failure() || request.is_history || request.is_emoji_command {
            return;
        }
        warn!(
            url = %request.input_url,
            attempts = self.max_attempts,
            status = %outcome.status,
            "gave up on download"
        );

        let channel_id = &request.message.channel_id;
        if policy.send_error_messages {
            if self
                .platform
                .has_permission(channel_id, Permission::SendMessages)
                .await
            {
                let content = format!(
                    "<@{}> **Download Failure**\n\n{}",
                    request.message.author.id,
                    failure_notice(&request.input_url, self.max_attempts, outcome)
                );
                if let Err(e) = self.platform.send_message(channel_id, &content).await {
                    warn!(channel = %channel_id, error = %e, "failed to send failure notice");
                }
            } else {
                warn!(channel = %channel_id, "no permission to send failure notice");
            }
        }

        if let Some(error) = &outcome.error {
            let content = format!("**{}**\n\n{error}", outcome.status.label());
            for admin_channel in &self.admin_channels {
                if let Err(e) = self.platform.send_message(admin_channel, &content).await {
                    warn!(channel = %admin_channel, error = %e, "failed to send admin notice");
                }
            }
        }
    }

    /// Appends the outcome to the channel's link log, if configured.
    pub async fn log_link(
        &self,
        request: &DownloadRequest,
        policy: &ChannelPolicy,
        outcome: &DownloadOutcome,
    ) {
        let Some(log_policy) = &policy.link_log else {
            return;
        };
        let kind = self.channel_kind(&request.message.channel_id).await;
        if let Err(e) = self
            .links
            .append(
                log_policy,
                &request.message,
                kind,
                &request.input_url,
                outcome.status,
            )
            .await
        {
            warn!(
                path = %log_policy.destination.display(),
                error = %e,
                "failed to append link log"
            );
        }
    }

    /// Reacts to the source message after a save.
    pub async fn react(&self, request: &DownloadRequest, policy: &ChannelPolicy) {
        let react = &policy.react;
        let should_react = if request.is_history {
            react.on_history
        } else {
            react.enabled
        };
        if !should_react || request.message.author.id.is_empty() {
            return;
        }

        let guild = match request.message.guild_id.as_deref().filter(|g| !g.is_empty()) {
            Some(guild_id) if react.emoji.is_none() => match self.platform.guild(guild_id).await {
                Ok(guild) => Some(guild),
                Err(e) => {
                    warn!(guild = guild_id, error = %e, "failed to fetch guild emojis");
                    None
                }
            },
            _ => None,
        };
        let emoji = choose_reaction(react, guild.as_ref());

        let channel_id = &request.message.channel_id;
        if !self
            .platform
            .has_permission(channel_id, Permission::AddReactions)
            .await
        {
            warn!(channel = %channel_id, "no permission to add reactions");
            return;
        }
        if let Err(e) = self
            .platform
            .add_reaction(channel_id, &request.message.id, &emoji)
            .await
        {
            warn!(channel = %channel_id, error = %e, "failed to add reaction");
        }
    }

    /// Sends a copy or summary of a saved file to the relay channels.
    pub async fn relay(
        &self,
        request: &DownloadRequest,
        policy: &ChannelPolicy,
        filename: &str,
        class: &str,
        bytes: &[u8],
    ) {
        let relay = &policy.relay;
        if !relay.is_enabled() {
            return;
        }
        let caption = relay
            .caption
            .as_deref()
            .map(|c| c.replace(CHANNEL_ID_KEY, &request.message.channel_id))
            .unwrap_or_default();

        for target in &relay.targets {
            if !self
                .platform
                .has_permission(target, Permission::SendMessages)
                .await
            {
                warn!(channel = %target, "no permission to relay file");
                continue;
            }
            let sent = if relay.send_directly {
                self.platform
                    .send_file(target, &caption, filename, bytes)
                    .await
            } else {
                let embed = relay_embed(filename, class, &request.input_url);
                self.platform.send_embed(target, &caption, &embed).await
            };
            if let Err(e) = sent {
                warn!(channel = %target, error = %e, "relay message failed to send");
            }
        }
    }

    /// Refreshes presence after a live save.
    pub async fn refresh_presence(&self, request: &DownloadRequest, policy: &ChannelPolicy) {
        if !request.is_history && policy.presence_enabled {
            self.platform.refresh_presence().await;
        }
    }

    /// Logs a saved file with its size and elapsed time.
    pub fn log_saved(&self, request: &DownloadRequest, class: &str, path: &std::path::Path, size: u64) {
        let elapsed = request.start_time.elapsed();
        info!(
            history = request.is_history,
            class = %class.to_uppercase(),
            channel = %request.message.channel_id,
            message = %request.message.id,
            path = %path.display(),
            size = %format_bytes(size),
            elapsed = ?elapsed,
            speed = %format_speed(size, elapsed),
            "saved"
        );
    }

    async fn channel_kind(&self, channel_id: &str) -> Option<ChannelKind> {
        self.platform.channel(channel_id).await.ok().map(|c| c.kind)
    }
}

/// Body of the failure notice.
#[must_use]
pub fn failure_notice(url: &str, attempts: u32, outcome: &DownloadOutcome) -> String {
    let mut content = format!(
        "Gave up trying to download\n<{url}>\nafter {attempts} failed attempts...\n\n``{}``",
        outcome.status.label()
    );
    if let Some(error) = &outcome.error {
        content.push_str(&format!("\n```ERROR: {error}```"));
    }
    content
}

/// Picks the reaction emoji.
///
/// A configured emoji wins. Otherwise a random non-animated, non-blacklisted
/// server emoji is used when the server has more than one, else the default.
#[must_use]
pub fn choose_reaction(react: &ReactPolicy, guild: Option<&GuildInfo>) -> String {
    if let Some(emoji) = &react.emoji {
        return emoji.clone();
    }
    let Some(guild) = guild.filter(|g| g.emojis.len() > 1) else {
        return DEFAULT_REACTION.to_string();
    };

    let candidates: Vec<String> = guild
        .emojis
        .iter()
        .filter(|e| !e.animated)
        .map(crate::platform::GuildEmoji::api_name)
        .filter(|name| !react.blacklist.contains(name))
        .collect();
    candidates
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_else(|| DEFAULT_REACTION.to_string())
}

/// Summary card for a relayed file.
#[must_use]
pub fn relay_embed(filename: &str, class: &str, url: &str) -> RelayEmbed {
    let mut embed = RelayEmbed {
        title: format!("Downloaded: {filename}"),
        ..RelayEmbed::default()
    };
    match class {
        "image" => embed.image_url = Some(url.to_string()),
        "video" => embed.video_url = Some(url.to_string()),
        _ => embed.description = Some(format!("Unsupported filetype: {class}\n{url}")),
    }
    embed
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let value = bytes as f64;
    if value >= GB {
        format!("{:.2} GB", value / GB)
    } else if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.0} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_speed(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64().max(0.001);
    format!("{}/s", format_bytes((bytes as f64 / secs) as u64))
}
