//! Per-channel admission policy for downloads.
//!
//! The coordinator consults the chain in a fixed order and stops at the first
//! rejection: domain, filename, reaction, extension, content class.

mod filter;

pub use filter::ListFilter;

use crate::download::DownloadStatus;
use crate::message::Reaction;

/// Extensions blocked when a channel configures no extension lists.
pub const DEFAULT_BLOCKED_EXTENSIONS: [&str; 10] = [
    ".htm", ".html", ".php", ".exe", ".dll", ".bin", ".cmd", ".sh", ".py", ".jar",
];

/// Which content classes a channel saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentToggles {
    pub images: bool,
    pub videos: bool,
    pub audio: bool,
    pub text: bool,
    pub other: bool,
}

impl Default for ContentToggles {
    fn default() -> Self {
        Self {
            images: true,
            videos: true,
            audio: false,
            text: false,
            other: false,
        }
    }
}

impl ContentToggles {
    /// Returns true if a file of `class` should be saved. HTML never counts as text.
    #[must_use]
    pub fn permits(&self, class: &str, is_html: bool) -> bool {
        match class {
            "image" => self.images,
            "video" => self.videos,
            "audio" => self.audio,
            "text" => self.text && !is_html,
            "application" => self.other,
            _ => false,
        }
    }
}

/// Ordered allow/deny checks for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyFilterChain {
    pub domains: ListFilter,
    pub filenames: ListFilter,
    pub reactions: ListFilter,
    pub extensions: ListFilter,
    pub content: ContentToggles,
}

impl Default for PolicyFilterChain {
    fn default() -> Self {
        Self {
            domains: ListFilter::unconstrained(),
            filenames: ListFilter::unconstrained(),
            reactions: ListFilter::unconstrained(),
            extensions: ListFilter::new(
                None,
                Some(
                    DEFAULT_BLOCKED_EXTENSIONS
                        .iter()
                        .map(|e| (*e).to_string())
                        .collect(),
                ),
            ),
            content: ContentToggles::default(),
        }
    }
}

impl PolicyFilterChain {
    /// Domain check on the source host.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadStatus::SkippedUnpermittedDomain`] when rejected.
    pub fn check_domain(&self, host: &str) -> Result<(), DownloadStatus> {
        self.domains
            .permits(host)
            .then_some(())
            .ok_or(DownloadStatus::SkippedUnpermittedDomain)
    }

    /// Substring check on the filename.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadStatus::SkippedUnpermittedFilename`] when rejected.
    pub fn check_filename(&self, filename: &str) -> Result<(), DownloadStatus> {
        self.filenames
            .permits_containing(filename)
            .then_some(())
            .ok_or(DownloadStatus::SkippedUnpermittedFilename)
    }

    /// Check against the reactions on the source message.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadStatus::SkippedUnpermittedReaction`] when rejected.
    pub fn check_reactions(&self, reactions: &[Reaction]) -> Result<(), DownloadStatus> {
        self.reactions
            .permits_any(reactions.iter().map(Reaction::key))
            .then_some(())
            .ok_or(DownloadStatus::SkippedUnpermittedReaction)
    }

    /// Check on the normalized extension (with leading dot).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadStatus::SkippedUnpermittedExtension`] when rejected.
    pub fn check_extension(&self, extension: &str) -> Result<(), DownloadStatus> {
        self.extensions
            .permits(extension)
            .then_some(())
            .ok_or(DownloadStatus::SkippedUnpermittedExtension)
    }

    /// Check on the content class.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadStatus::SkippedUnpermittedType`] when rejected.
    pub fn check_content_class(&self, class: &str, is_html: bool) -> Result<(), DownloadStatus> {
        self.content
            .permits(class, is_html)
            .then_some(())
            .ok_or(DownloadStatus::SkippedUnpermittedType)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Option<Vec<String>> {
        Some(items.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn test_default_chain_blocks_executables_and_html() {
        let chain = PolicyFilterChain::default();
        assert_eq!(
            chain.check_extension(".exe"),
            Err(DownloadStatus::SkippedUnpermittedExtension)
        );
        assert_eq!(
            chain.check_extension(".HTML"),
            Err(DownloadStatus::SkippedUnpermittedExtension)
        );
        assert_eq!(chain.check_extension(".png"), Ok(()));
    }

    #[test]
    fn test_domain_allow_overrides_block() {
        let chain = PolicyFilterChain {
            domains: ListFilter::new(
                strings(&["example.com"]),
                strings(&["example.com", "other.com"]),
            ),
            ..PolicyFilterChain::default()
        };
        assert_eq!(chain.check_domain("example.com"), Ok(()));
        assert_eq!(
            chain.check_domain("other.com"),
            Err(DownloadStatus::SkippedUnpermittedDomain)
        );
    }

    #[test]
    fn test_filename_block_phrase() {
        let chain = PolicyFilterChain {
            filenames: ListFilter::new(None, strings(&["thumb"])),
            ..PolicyFilterChain::default()
        };
        assert_eq!(
            chain.check_filename("img_thumb.jpg"),
            Err(DownloadStatus::SkippedUnpermittedFilename)
        );
        assert_eq!(chain.check_filename("img.jpg"), Ok(()));
    }

    #[test]
    fn test_reaction_allow_list_requires_matching_reaction() {
        let chain = PolicyFilterChain {
            reactions: ListFilter::new(strings(&["555"]), None),
            ..PolicyFilterChain::default()
        };
        let none: Vec<Reaction> = Vec::new();
        let matching = vec![Reaction {
            emoji_id: "555".into(),
            emoji_name: "save".into(),
        }];
        assert_eq!(
            chain.check_reactions(&none),
            Err(DownloadStatus::SkippedUnpermittedReaction)
        );
        assert_eq!(chain.check_reactions(&matching), Ok(()));
    }

    #[test]
    fn test_content_class_rules() {
        let chain = PolicyFilterChain::default();
        assert_eq!(chain.check_content_class("image", false), Ok(()));
        assert_eq!(chain.check_content_class("video", false), Ok(()));
        assert_eq!(
            chain.check_content_class("audio", false),
            Err(DownloadStatus::SkippedUnpermittedType)
        );

        let text_on = PolicyFilterChain {
            content: ContentToggles {
                text: true,
                ..ContentToggles::default()
            },
            ..PolicyFilterChain::default()
        };
        assert_eq!(text_on.check_content_class("text", false), Ok(()));
        assert_eq!(
            text_on.check_content_class("text", true),
            Err(DownloadStatus::SkippedUnpermittedType)
        );
    }
}
