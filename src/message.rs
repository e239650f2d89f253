//! Chat message model consumed by the pipeline.
//!
//! Messages arrive from whatever gateway the host application uses; the
//! pipeline only needs the fields below. They deserialize from the JSON-lines
//! input accepted by the `process` command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message that may carry downloadable media.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Message id.
    pub id: String,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Server (guild) id, absent for direct and group messages.
    pub guild_id: Option<String>,
    /// Message author.
    pub author: Author,
    /// Raw body text.
    pub content: String,
    /// Time the message was posted.
    pub timestamp: Option<DateTime<Utc>>,
    /// Uploaded files.
    pub attachments: Vec<Attachment>,
    /// Rich embeds attached by the platform or the author.
    pub embeds: Vec<Embed>,
    /// Reactions currently on the message.
    pub reactions: Vec<Reaction>,
}

/// Message author.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub id: String,
    pub username: String,
    pub discriminator: String,
}

impl Author {
    /// Display tag in `username#discriminator` form.
    #[must_use]
    pub fn tag(&self) -> String {
        format!("{}#{}", self.username, self.discriminator)
    }
}

/// Uploaded file attached to a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
}

/// Rich embed. Only its URL fields are ever treated as links.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Embed {
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub description: Option<String>,
}

/// Reaction emoji on a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Reaction {
    /// Custom emoji id, empty for unicode emoji.
    pub emoji_id: String,
    /// Emoji name (the unicode character for standard emoji).
    pub emoji_name: String,
}

impl Reaction {
    /// Identifier used for reaction policy matching.
    ///
    /// Custom emoji match on their id, unicode emoji on the character itself.
    #[must_use]
    pub fn key(&self) -> &str {
        if self.emoji_id.is_empty() {
            &self.emoji_name
        } else {
            &self.emoji_id
        }
    }
}

impl Message {
    /// Returns true when the message was posted outside a server.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.guild_id.as_deref().is_none_or(str::is_empty)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_deserializes_with_missing_fields() {
        let msg: Message = serde_json::from_str(
            r#"{"id":"1","channel_id":"2","content":"hi","author":{"id":"3","username":"ann"}}"#,
        )
        .unwrap();
        assert_eq!(msg.channel_id, "2");
        assert!(msg.attachments.is_empty());
        assert!(msg.timestamp.is_none());
        assert!(msg.is_direct());
    }

    #[test]
    fn test_author_tag() {
        let author = Author {
            id: "1".into(),
            username: "ann".into(),
            discriminator: "0042".into(),
        };
        assert_eq!(author.tag(), "ann#0042");
    }

    #[test]
    fn test_reaction_key_prefers_custom_id() {
        let custom = Reaction {
            emoji_id: "998".into(),
            emoji_name: "blob".into(),
        };
        let unicode = Reaction {
            emoji_id: String::new(),
            emoji_name: "👍".into(),
        };
        assert_eq!(custom.key(), "998");
        assert_eq!(unicode.key(), "👍");
    }
}
