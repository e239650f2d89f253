//! Chat platform seam.
//!
//! The pipeline never talks to a gateway directly. Everything it needs from
//! the platform (metadata lookups, notices, reactions, relays) goes through
//! [`ChatPlatform`]. Failures are reported as [`PlatformError`] and callers
//! log them without aborting the download.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from platform calls.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Lookup target does not exist or is not visible.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The platform rejected or failed an action.
    #[error("{action} failed in {channel_id}: {reason}")]
    Action {
        action: &'static str,
        channel_id: String,
        reason: String,
    },
}

impl PlatformError {
    #[must_use]
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn action(action: &'static str, channel_id: &str, reason: impl Into<String>) -> Self {
        Self::Action {
            action,
            channel_id: channel_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Kind of conversation a channel is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Server text channel.
    Text,
    /// One-to-one direct messages.
    Direct,
    /// Group direct messages.
    Group,
}

/// Channel metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub guild_id: Option<String>,
    /// Category the channel is nested under.
    pub parent_id: Option<String>,
}

/// Custom server emoji.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildEmoji {
    pub id: String,
    pub name: String,
    pub animated: bool,
}

impl GuildEmoji {
    /// `name:id` form accepted by reaction calls.
    #[must_use]
    pub fn api_name(&self) -> String {
        format!("{}:{}", self.name, self.id)
    }
}

/// Server metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: String,
    pub name: String,
    pub emojis: Vec<GuildEmoji>,
}

/// Permissions checked before acting in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    SendMessages,
    AddReactions,
}

/// Summary card posted when a saved file is relayed without its bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayEmbed {
    pub title: String,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub description: Option<String>,
}

/// Operations the pipeline needs from the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), PlatformError>;

    async fn send_embed(
        &self,
        channel_id: &str,
        content: &str,
        embed: &RelayEmbed,
    ) -> Result<(), PlatformError>;

    async fn send_file(
        &self,
        channel_id: &str,
        content: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), PlatformError>;

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    async fn channel(&self, channel_id: &str) -> Result<ChannelInfo, PlatformError>;

    async fn guild(&self, guild_id: &str) -> Result<GuildInfo, PlatformError>;

    async fn has_permission(&self, channel_id: &str, permission: Permission) -> bool;

    async fn refresh_presence(&self);
}

/// Something an [`OfflinePlatform`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformAction {
    Message {
        channel_id: String,
        content: String,
    },
    Embed {
        channel_id: String,
        content: String,
        embed: RelayEmbed,
    },
    File {
        channel_id: String,
        content: String,
        filename: String,
        size: usize,
    },
    Reaction {
        channel_id: String,
        message_id: String,
        emoji: String,
    },
    Presence,
}

/// Platform with no network connection.
///
/// Metadata comes from a fixed directory; outgoing actions are logged and
/// recorded. Used by the `process` command and by tests.
#[derive(Debug, Default)]
pub struct OfflinePlatform {
    channels: HashMap<String, ChannelInfo>,
    guilds: HashMap<String, GuildInfo>,
    denied: Vec<(String, Permission)>,
    actions: Mutex<Vec<PlatformAction>>,
}

impl OfflinePlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds channel metadata to the directory.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelInfo) -> Self {
        self.channels.insert(channel.id.clone(), channel);
        self
    }

    /// Adds server metadata to the directory.
    #[must_use]
    pub fn with_guild(mut self, guild: GuildInfo) -> Self {
        self.guilds.insert(guild.id.clone(), guild);
        self
    }

    /// Withholds a permission in one channel.
    #[must_use]
    pub fn deny(mut self, channel_id: &str, permission: Permission) -> Self {
        self.denied.push((channel_id.to_string(), permission));
        self
    }

    /// Returns a snapshot of recorded actions.
    #[must_use]
    pub fn actions(&self) -> Vec<PlatformAction> {
        self.actions
            .lock()
            .map(|actions| actions.clone())
            .unwrap_or_default()
    }

    fn record(&self, action: PlatformAction) {
        if let Ok(mut actions) = self.actions.lock() {
            actions.push(action);
        }
    }
}

#[async_trait]
impl ChatPlatform for OfflinePlatform {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), PlatformError> {
        info!(channel = channel_id, %content, "message");
        self.record(PlatformAction::Message {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn send_embed(
        &self,
        channel_id: &str,
        content: &str,
        embed: &RelayEmbed,
    ) -> Result<(), PlatformError> {
        info!(channel = channel_id, title = %embed.title, "embed");
        self.record(PlatformAction::Embed {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
            embed: embed.clone(),
        });
        Ok(())
    }

    async fn send_file(
        &self,
        channel_id: &str,
        content: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), PlatformError> {
        info!(channel = channel_id, filename, size = bytes.len(), "file");
        self.record(PlatformAction::File {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
            filename: filename.to_string(),
            size: bytes.len(),
        });
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        debug!(channel = channel_id, message = message_id, emoji, "reaction");
        self.record(PlatformAction::Reaction {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn channel(&self, channel_id: &str) -> Result<ChannelInfo, PlatformError> {
        self.channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found("channel", channel_id))
    }

    async fn guild(&self, guild_id: &str) -> Result<GuildInfo, PlatformError> {
        self.guilds
            .get(guild_id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found("guild", guild_id))
    }

    async fn has_permission(&self, channel_id: &str, permission: Permission) -> bool {
        !self
            .denied
            .iter()
            .any(|(channel, denied)| channel == channel_id && *denied == permission)
    }

    async fn refresh_presence(&self) {
        debug!("presence refreshed");
        self.record(PlatformAction::Presence);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_emoji_api_name() {
        let emoji = GuildEmoji {
            id: "123".into(),
            name: "blob".into(),
            animated: false,
        };
        assert_eq!(emoji.api_name(), "blob:123");
    }

    #[tokio::test]
    async fn test_offline_platform_lookups() {
        let platform = OfflinePlatform::new().with_channel(ChannelInfo {
            id: "1".into(),
            name: "general".into(),
            kind: ChannelKind::Text,
            guild_id: Some("9".into()),
            parent_id: None,
        });

        assert_eq!(platform.channel("1").await.unwrap().name, "general");
        let err = platform.guild("9").await.unwrap_err();
        assert_eq!(err.to_string(), "guild 9 not found");
    }

    #[tokio::test]
    async fn test_offline_platform_records_actions() {
        let platform = OfflinePlatform::new();
        platform.send_message("1", "hi").await.unwrap();
        platform.add_reaction("1", "2", "✅").await.unwrap();
        platform.refresh_presence().await;

        let actions = platform.actions();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[2], PlatformAction::Presence);
    }

    #[tokio::test]
    async fn test_offline_platform_denied_permission() {
        let platform = OfflinePlatform::new().deny("1", Permission::AddReactions);
        assert!(!platform.has_permission("1", Permission::AddReactions).await);
        assert!(platform.has_permission("1", Permission::SendMessages).await);
        assert!(platform.has_permission("2", Permission::AddReactions).await);
    }
}
