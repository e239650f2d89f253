//! Candidate link extraction from chat messages.
//!
//! Candidates come from three places, in this order:
//! 1. attachments (carrying the uploaded filename)
//! 2. `http(s)://` URLs found in the message body
//! 3. embed URL, image URL and video URL fields
//!
//! Embed descriptions are never scanned. Candidates are not deduplicated here;
//! the pipeline collapses duplicates after resolution.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::trace;

use crate::message::Message;

/// Matches `http://` and `https://` URLs up to whitespace or common delimiters.
#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"'`|\]]+"#).expect("URL regex is valid") // Static pattern, safe to panic
});

/// A raw link found in a message, before provider resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    /// Link as it appeared in the message.
    pub url: String,
    /// Filename supplied by the platform (attachments only).
    pub suggested_filename: Option<String>,
    /// Message timestamp, or extraction time when the message has none.
    pub discovered_at: DateTime<Utc>,
}

/// Extracts every candidate link from a message, preserving order.
#[must_use]
#[tracing::instrument(skip(message), fields(message_id = %message.id))]
pub fn extract_links(message: &Message) -> Vec<CandidateLink> {
    let discovered_at = message.timestamp.unwrap_or_else(Utc::now);
    let mut links = Vec::new();

    for attachment in &message.attachments {
        if attachment.url.is_empty() {
            continue;
        }
        links.push(CandidateLink {
            url: attachment.url.clone(),
            suggested_filename: (!attachment.filename.is_empty())
                .then(|| attachment.filename.clone()),
            discovered_at,
        });
    }

    for url in extract_body_urls(&message.content) {
        links.push(CandidateLink {
            url,
            suggested_filename: None,
            discovered_at,
        });
    }

    for embed in &message.embeds {
        let fields = [&embed.url, &embed.image_url, &embed.video_url];
        for url in fields.into_iter().flatten() {
            if url.is_empty() {
                continue;
            }
            links.push(CandidateLink {
                url: url.clone(),
                suggested_filename: None,
                discovered_at,
            });
        }
    }

    trace!(count = links.len(), "extracted candidate links");
    links
}

/// Finds strict-grammar URLs in free text.
#[must_use]
pub fn extract_body_urls(text: &str) -> Vec<String> {
    URL_PATTERN
        .find_iter(text)
        .map(|m| clean_url_trailing(m.as_str()).to_string())
        .filter(|url| url.len() > "https://".len())
        .collect()
}

/// Strips sentence punctuation and unbalanced closing brackets captured with a URL.
fn clean_url_trailing(url: &str) -> &str {
    let mut result = url;

    while let Some(last) = result.chars().last() {
        match last {
            '.' | ',' | ';' | ':' | '!' | '?' | '*' | '_' | '~' => {
                result = &result[..result.len() - 1];
            }
            ')' | ']' | '>' => {
                let open = match last {
                    ')' => '(',
                    ']' => '[',
                    _ => '<',
                };
                let open_count = result.chars().filter(|&c| c == open).count();
                let close_count = result.chars().filter(|&c| c == last).count();
                if close_count > open_count {
                    result = &result[..result.len() - 1];
                } else {
                    break;
                }
            }
            _ => break,
        }
    }

    result
}
