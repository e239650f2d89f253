//! Resolution of channel overrides into a concrete, read-only policy.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{ChannelOverrides, LinkLogSettings, Settings};
use crate::policy::{ContentToggles, DEFAULT_BLOCKED_EXTENSIONS, ListFilter, PolicyFilterChain};

/// Which folder levels to create below the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Nesting {
    pub server: bool,
    pub channel: bool,
    pub user: bool,
    pub year: bool,
    pub month: bool,
    pub day: bool,
    pub hour: bool,
    pub content_type: bool,
    /// Use ids instead of display names for server/channel/user folders.
    pub use_id: bool,
}

/// Download reaction options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactPolicy {
    pub enabled: bool,
    pub on_history: bool,
    pub emoji: Option<String>,
    /// Server emoji ids never picked at random.
    pub blacklist: Vec<String>,
}

/// Channels that receive a copy of each saved file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayPolicy {
    pub targets: Vec<String>,
    pub send_directly: bool,
    pub caption: Option<String>,
}

impl RelayPolicy {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.targets.is_empty()
    }
}

/// Link log file options with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLogPolicy {
    pub destination: PathBuf,
    pub destination_is_folder: bool,
    pub divide_by_server: bool,
    pub divide_by_channel: bool,
    pub divide_by_user: bool,
    pub divide_by_status: bool,
    pub log_downloads: bool,
    pub log_failures: bool,
    pub filter_duplicates: bool,
    pub prefix: String,
    pub suffix: String,
    pub user_data: bool,
}

impl From<&LinkLogSettings> for LinkLogPolicy {
    fn from(settings: &LinkLogSettings) -> Self {
        Self {
            destination: PathBuf::from(&settings.destination),
            destination_is_folder: settings.destination_is_folder.resolve(false),
            divide_by_server: settings.divide_logs_by_server.resolve(false),
            divide_by_channel: settings.divide_logs_by_channel.resolve(false),
            divide_by_user: settings.divide_logs_by_user.resolve(false),
            divide_by_status: settings.divide_logs_by_status.resolve(false),
            log_downloads: settings.log_downloads.resolve(true),
            log_failures: settings.log_failures.resolve(true),
            filter_duplicates: settings.filter_duplicates.resolve(false),
            prefix: settings.prefix.clone(),
            suffix: settings.suffix.clone(),
            user_data: settings.user_data.resolve(false),
        }
    }
}

/// Everything the pipeline needs to know about one channel.
///
/// Built once per message and never mutated while links are processed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPolicy {
    pub channel_id: String,
    pub destination: PathBuf,
    /// Write files to disk. When off, downloads are still recorded.
    pub save: bool,
    pub send_error_messages: bool,
    pub presence_enabled: bool,
    pub save_possible_duplicates: bool,
    pub nesting: Nesting,
    pub filters: PolicyFilterChain,
    pub react: ReactPolicy,
    pub relay: RelayPolicy,
    pub link_log: Option<LinkLogPolicy>,
    pub filename_date_format: Option<String>,
}

impl ChannelPolicy {
    /// Finds the block for `channel_id` and applies defaults.
    ///
    /// A dedicated channel block wins; otherwise `all_channels` applies unless
    /// the channel is blacklisted. Disabled channels resolve to `None`.
    #[must_use]
    pub fn resolve(settings: &Settings, channel_id: &str) -> Option<Self> {
        let block = settings
            .channels
            .iter()
            .find(|block| block.covers(channel_id))
            .or_else(|| {
                settings
                    .all_channels
                    .as_ref()
                    .filter(|_| !settings.all_channels_blacklist.iter().any(|c| c == channel_id))
            })?;

        if !block.enabled.resolve(true) {
            return None;
        }
        Some(Self::from_block(settings, channel_id, block))
    }

    /// Built-in defaults for a command-triggered download in a channel with
    /// no configuration. Such downloads never post failure notices.
    #[must_use]
    pub fn for_command(channel_id: &str, destination: &Path) -> Self {
        let block = ChannelOverrides {
            destination: destination.display().to_string(),
            ..ChannelOverrides::default()
        };
        let mut policy = Self::from_block(&Settings::default(), channel_id, &block);
        policy.send_error_messages = false;
        policy
    }

    /// Applies built-in defaults to a single override block.
    #[must_use]
    pub fn from_block(settings: &Settings, channel_id: &str, block: &ChannelOverrides) -> Self {
        let nesting = Nesting {
            server: block.divide_by_server.resolve(false),
            channel: block.divide_by_channel.resolve(false),
            user: block.divide_by_user.resolve(false),
            year: block.divide_by_year.resolve(false),
            month: block.divide_by_month.resolve(false),
            day: block.divide_by_day.resolve(false),
            hour: block.divide_by_hour.resolve(false),
            content_type: block.divide_by_type.resolve(true),
            use_id: block.divide_folders_use_id.resolve(false),
        };

        let content = ContentToggles {
            images: block.save_images.resolve(true),
            videos: block.save_videos.resolve(true),
            audio: block.save_audio_files.resolve(false),
            text: block.save_text_files.resolve(false),
            other: block.save_other_files.resolve(false),
        };

        let extensions = if block.allowed_extensions.is_none() && block.blocked_extensions.is_none()
        {
            ListFilter::new(
                None,
                Some(
                    DEFAULT_BLOCKED_EXTENSIONS
                        .iter()
                        .map(|e| (*e).to_string())
                        .collect(),
                ),
            )
        } else {
            ListFilter::new(
                block.allowed_extensions.clone(),
                block.blocked_extensions.clone(),
            )
        };

        let filters = PolicyFilterChain {
            domains: ListFilter::new(block.allowed_domains.clone(), block.blocked_domains.clone()),
            filenames: ListFilter::new(
                block.allowed_filenames.clone(),
                block.blocked_filenames.clone(),
            ),
            reactions: ListFilter::new(
                block.allowed_reactions.clone(),
                block.blocked_reactions.clone(),
            ),
            extensions,
            content,
        };

        let react = ReactPolicy {
            enabled: block
                .react_when_downloaded
                .resolve(settings.react_when_downloaded),
            on_history: block
                .react_when_downloaded_history
                .resolve(settings.react_when_downloaded_history),
            emoji: block
                .react_when_downloaded_emoji
                .clone()
                .filter(|e| !e.is_empty()),
            blacklist: block.blacklist_react_emojis.clone(),
        };

        let mut seen = HashSet::new();
        let targets: Vec<String> = block
            .send_file_to_channel
            .iter()
            .chain(block.send_file_to_channels.iter())
            .filter(|c| !c.is_empty() && seen.insert(*c))
            .cloned()
            .collect();
        let relay = RelayPolicy {
            targets,
            send_directly: block.send_file_directly.resolve(false),
            caption: block.send_file_caption.clone(),
        };

        Self {
            channel_id: channel_id.to_string(),
            destination: PathBuf::from(&block.destination),
            save: block.save.resolve(true),
            send_error_messages: block.send_error_messages.resolve(true),
            presence_enabled: block.presence_enabled.resolve(true),
            save_possible_duplicates: block.save_possible_duplicates.resolve(false),
            nesting,
            filters,
            react,
            relay,
            link_log: block.log_links.as_ref().map(LinkLogPolicy::from),
            filename_date_format: block
                .filename_date_format
                .clone()
                .filter(|f| !f.is_empty()),
        }
    }
}
