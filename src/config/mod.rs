//! Settings file loading, validation and per-channel overrides.
//!
//! Settings are a JSON document. Global values sit at the top level; each
//! entry in `channels` overrides the built-in defaults for the channel ids it
//! names. Channel booleans are [`Toggle`]s so an absent field can fall back.

mod policy;
mod toggle;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use policy::{ChannelPolicy, LinkLogPolicy, Nesting, ReactPolicy, RelayPolicy};
pub use toggle::Toggle;

/// File name used when no settings path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

const APP_DIR: &str = "media-archiver";

/// Login material written by `init`. Never logged.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Credentials {
    pub token: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &(!self.token.is_empty()).then_some("<redacted>"))
            .field("email", &self.email)
            .field("password", &(!self.password.is_empty()).then_some("<redacted>"))
            .finish()
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub credentials: Credentials,
    /// User ids allowed to administer the archiver.
    pub admins: Vec<String>,
    /// Channels that receive copies of failure notices.
    pub admin_channels: Vec<String>,

    /// Attempts per link, including the first.
    pub download_retry_max: u32,
    pub download_timeout_secs: u64,
    pub filter_duplicate_images: bool,
    /// Normalized hash distance below which an image counts as a duplicate.
    pub filter_duplicate_images_threshold: f64,
    pub database_path: PathBuf,
    pub react_when_downloaded: bool,
    pub react_when_downloaded_history: bool,

    /// Fallback overrides for channels without their own block.
    pub all_channels: Option<ChannelOverrides>,
    /// Channel ids excluded from `all_channels`.
    pub all_channels_blacklist: Vec<String>,
    pub channels: Vec<ChannelOverrides>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            admins: Vec::new(),
            admin_channels: Vec::new(),
            download_retry_max: 3,
            download_timeout_secs: 60,
            filter_duplicate_images: false,
            filter_duplicate_images_threshold: 0.1,
            database_path: PathBuf::from("database.db"),
            react_when_downloaded: true,
            react_when_downloaded_history: false,
            all_channels: None,
            all_channels_blacklist: Vec::new(),
            channels: Vec::new(),
        }
    }
}

/// Overrides for one or more channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelOverrides {
    pub channel: Option<String>,
    pub channels: Vec<String>,
    pub destination: String,

    pub enabled: Toggle,
    pub save: Toggle,
    pub send_error_messages: Toggle,
    pub presence_enabled: Toggle,

    pub react_when_downloaded: Toggle,
    pub react_when_downloaded_history: Toggle,
    pub react_when_downloaded_emoji: Option<String>,
    pub blacklist_react_emojis: Vec<String>,

    pub divide_by_server: Toggle,
    pub divide_by_channel: Toggle,
    pub divide_by_user: Toggle,
    pub divide_by_year: Toggle,
    pub divide_by_month: Toggle,
    pub divide_by_day: Toggle,
    pub divide_by_hour: Toggle,
    pub divide_by_type: Toggle,
    pub divide_folders_use_id: Toggle,

    pub save_images: Toggle,
    pub save_videos: Toggle,
    pub save_audio_files: Toggle,
    pub save_text_files: Toggle,
    pub save_other_files: Toggle,
    pub save_possible_duplicates: Toggle,

    pub allowed_domains: Option<Vec<String>>,
    pub blocked_domains: Option<Vec<String>>,
    pub allowed_filenames: Option<Vec<String>>,
    pub blocked_filenames: Option<Vec<String>>,
    pub allowed_reactions: Option<Vec<String>>,
    pub blocked_reactions: Option<Vec<String>>,
    pub allowed_extensions: Option<Vec<String>>,
    pub blocked_extensions: Option<Vec<String>>,

    pub log_links: Option<LinkLogSettings>,

    pub send_file_to_channel: Option<String>,
    pub send_file_to_channels: Vec<String>,
    pub send_file_directly: Toggle,
    pub send_file_caption: Option<String>,

    /// chrono format string prepended to saved filenames.
    pub filename_date_format: Option<String>,
}

impl ChannelOverrides {
    /// Returns true if this block applies to `channel_id`.
    #[must_use]
    pub fn covers(&self, channel_id: &str) -> bool {
        self.channel.as_deref() == Some(channel_id) || self.channels.iter().any(|c| c == channel_id)
    }

    fn has_channel_id(&self) -> bool {
        self.channel.as_deref().is_some_and(|c| !c.is_empty())
            || self.channels.iter().any(|c| !c.is_empty())
    }
}

/// Link log file options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LinkLogSettings {
    pub destination: String,
    pub destination_is_folder: Toggle,
    pub divide_logs_by_server: Toggle,
    pub divide_logs_by_channel: Toggle,
    pub divide_logs_by_user: Toggle,
    pub divide_logs_by_status: Toggle,
    pub log_downloads: Toggle,
    pub log_failures: Toggle,
    pub filter_duplicates: Toggle,
    pub prefix: String,
    pub suffix: String,
    pub user_data: Toggle,
}

impl Settings {
    /// Reads, parses and validates a settings file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not valid JSON, or fails
    /// [`Settings::validate`].
    #[instrument(fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        debug!(channels = settings.channels.len(), "settings loaded");
        Ok(settings)
    }

    /// Writes the settings as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings file {}", path.display()))
    }

    /// Checks values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if !(1..=20).contains(&self.download_retry_max) {
            bail!(
                "Invalid config value for `download_retry_max`: {}. Expected range: 1..=20",
                self.download_retry_max
            );
        }
        if !(1..=3600).contains(&self.download_timeout_secs) {
            bail!(
                "Invalid config value for `download_timeout_secs`: {}. Expected range: 1..=3600",
                self.download_timeout_secs
            );
        }
        let threshold = self.filter_duplicate_images_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            bail!(
                "Invalid config value for `filter_duplicate_images_threshold`: {threshold}. Expected a finite value >= 0"
            );
        }
        for (index, block) in self.channels.iter().enumerate() {
            validate_channel_block(&format!("channels[{index}]"), block, true)?;
        }
        if let Some(all) = &self.all_channels {
            validate_channel_block("all_channels", all, false)?;
        }
        Ok(())
    }

    /// Resolves the policy for a channel, or `None` when it is not archived.
    #[must_use]
    pub fn channel_policy(&self, channel_id: &str) -> Option<ChannelPolicy> {
        ChannelPolicy::resolve(self, channel_id)
    }
}

fn validate_channel_block(field: &str, block: &ChannelOverrides, needs_id: bool) -> Result<()> {
    if block.destination.trim().is_empty() {
        bail!("Invalid config value for `{field}.destination`: must not be empty");
    }
    if needs_id && !block.has_channel_id() {
        bail!("Invalid config value for `{field}`: set `channel` or `channels`");
    }
    Ok(())
}

/// Picks the settings file path.
///
/// Priority:
/// 1. an explicit path
/// 2. `settings.json` in the working directory, when present
/// 3. `$XDG_CONFIG_HOME/media-archiver/settings.json`
/// 4. `$HOME/.config/media-archiver/settings.json`
/// 5. `settings.json` in the working directory
#[must_use]
pub fn resolve_settings_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(DEFAULT_SETTINGS_FILE);
    if local.exists() {
        return local;
    }
    default_config_dir().map_or(local, |dir| dir.join(DEFAULT_SETTINGS_FILE))
}

fn default_config_dir() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(PathBuf::from(home).join(".config").join(APP_DIR))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn channel_block(id: &str) -> ChannelOverrides {
        ChannelOverrides {
            channel: Some(id.to_string()),
            destination: "archive".to_string(),
            ..ChannelOverrides::default()
        }
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn test_settings_defaults_from_empty_document() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.download_retry_max, 3);
        assert_eq!(settings.download_timeout_secs, 60);
        assert!(!settings.filter_duplicate_images);
        assert!(settings.react_when_downloaded);
        assert_eq!(settings.database_path, PathBuf::from("database.db"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_channel_block_toggles_parse_tri_state() {
        let block: ChannelOverrides = serde_json::from_str(
            r#"{"channel":"1","destination":"d","save_audio_files":true,"divide_by_type":false}"#,
        )
        .unwrap();
        assert_eq!(block.save_audio_files, Toggle::On);
        assert_eq!(block.divide_by_type, Toggle::Off);
        assert_eq!(block.save_images, Toggle::Unset);
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials {
            token: "secret-token".into(),
            email: "a@b.c".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("a@b.c"));
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_validate_rejects_retry_out_of_range() {
        let settings = Settings {
            download_retry_max: 0,
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err().to_string();
        assert!(err.contains("download_retry_max"));
        assert!(err.contains("1..=20"));
    }

    #[test]
    fn test_validate_rejects_timeout_out_of_range() {
        let settings = Settings {
            download_timeout_secs: 4000,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_threshold() {
        let settings = Settings {
            filter_duplicate_images_threshold: -0.5,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        let nan = Settings {
            filter_duplicate_images_threshold: f64::NAN,
            ..Settings::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_validate_requires_destination_and_id() {
        let mut missing_dest = channel_block("1");
        missing_dest.destination = String::new();
        let settings = Settings {
            channels: vec![missing_dest],
            ..Settings::default()
        };
        assert!(settings.validate().unwrap_err().to_string().contains("destination"));

        let mut missing_id = channel_block("1");
        missing_id.channel = None;
        let settings = Settings {
            channels: vec![missing_id],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_channel_block_covers_single_and_list() {
        let mut block = channel_block("1");
        block.channels = vec!["2".into(), "3".into()];
        assert!(block.covers("1"));
        assert!(block.covers("3"));
        assert!(!block.covers("4"));
    }

    // ==================== File Tests ====================

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            channels: vec![channel_block("100")],
            admins: vec!["5".into()],
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let err = format!("{:#}", Settings::load(&path).unwrap_err());
        assert!(err.contains("Failed to parse settings file"));
    }

    #[test]
    fn test_resolve_settings_path_prefers_explicit() {
        let explicit = Path::new("/tmp/custom.json");
        assert_eq!(resolve_settings_path(Some(explicit)), explicit);
    }
}
