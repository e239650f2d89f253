//! Provider resolution: expanding a posted link into concrete media URLs.
//!
//! # Architecture
//!
//! - [`Resolver`] - Async trait each provider implements
//! - [`ResolverRegistry`] - Priority-ordered provider chain with the
//!   non-downloadable check, query-strip retry and literal fallback
//! - [`ProviderPriority`] - Fixed order in which provider families are tried
//!
//! Site-specific providers live outside this crate and are registered at
//! startup; with none registered every link resolves to itself.
//!
//! # Example
//!
//! ```no_run
//! use media_archiver::resolver::{ResolveContext, ResolverRegistry};
//!
//! # async fn example() {
//! let registry = ResolverRegistry::new();
//! let ctx = ResolveContext::new("channel-1", "message-1");
//! let links = registry.resolve("https://example.com/a.jpg?x=1", &ctx).await;
//! assert_eq!(links[0].url, "https://example.com/a.jpg");
//! # }
//! ```

mod alias;
mod error;
mod registry;

pub use alias::{canonicalize_host, is_non_downloadable, strip_query};
pub use error::ResolveError;
pub use registry::ResolverRegistry;

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Final URL → suggested filename (empty when the provider has none).
pub type LinkMap = BTreeMap<String, String>;

/// Order in which provider families are consulted.
///
/// Derives `Ord` so handlers sort with the most specific family first.
/// Within one family, registration order is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProviderPriority {
    /// Social status links (a post with attached media).
    StatusLink = 0,
    /// A user's media listing page.
    MediaListing = 1,
    /// Single-item image host page.
    SingleItem = 2,
    /// Album or gallery pages.
    Album = 3,
    /// Video hosting pages.
    VideoHost = 4,
    /// Photo sharing pages.
    PhotoHost = 5,
    /// Blog platform posts.
    BlogPlatform = 6,
    /// Older URL scheme of the same blog platform.
    LegacyBlogPlatform = 7,
    /// Discussion board posts.
    DiscussionPost = 8,
    /// Heuristic: custom domains that might be hosted on the blog platform.
    PossibleBlog = 9,
}

/// A link produced by resolution, ready to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    /// URL to fetch.
    pub url: String,
    /// Filename suggested by the provider or the platform.
    pub filename: Option<String>,
}

impl ResolvedLink {
    /// Creates a link with no filename hint.
    #[must_use]
    pub fn bare(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
        }
    }

    /// Converts a provider's map into links, treating empty names as absent.
    #[must_use]
    pub fn from_map(map: LinkMap) -> Vec<Self> {
        map.into_iter()
            .map(|(url, filename)| Self {
                url,
                filename: (!filename.is_empty()).then_some(filename),
            })
            .collect()
    }
}

/// Message context handed to providers.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Channel the link was posted in.
    pub channel_id: String,
    /// Message carrying the link.
    pub message_id: String,
}

impl ResolveContext {
    /// Creates a context for one message.
    #[must_use]
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

/// A link-expansion provider.
///
/// # Object Safety
///
/// Uses `async_trait` so providers can be stored as `Box<dyn Resolver>`.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Provider name used in logs.
    fn name(&self) -> &str;

    /// Provider family, which fixes its position in the chain.
    fn priority(&self) -> ProviderPriority;

    /// Returns true if this provider recognizes the link.
    fn matches(&self, url: &str) -> bool;

    /// Expands the link. An empty map means "nothing found, try the next provider".
    async fn resolve(&self, url: &str, ctx: &ResolveContext) -> Result<LinkMap, ResolveError>;
}
