//! Provider registry and the resolution chain.

use tracing::{debug, info, warn};

use super::alias::{canonicalize_host, is_non_downloadable, strip_query};
use super::{ResolveContext, ResolvedLink, Resolver};

/// A priority-ordered collection of providers.
///
/// Resolution for one link:
/// 1. canonicalize alias hosts
/// 2. try matching providers in priority order; first non-empty result wins
/// 3. known non-downloadable assets resolve to nothing
/// 4. if stripping the query changes the link, run the chain once more on the
///    stripped link
/// 5. otherwise the link resolves to itself with no filename
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl ResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Registers a provider.
    #[tracing::instrument(skip(self, resolver), fields(resolver_name))]
    pub fn register(&mut self, resolver: Box<dyn Resolver>) {
        tracing::Span::current().record("resolver_name", resolver.name());
        debug!(
            name = resolver.name(),
            priority = ?resolver.priority(),
            "Registering resolver"
        );
        self.resolvers.push(resolver);
    }

    /// Returns the number of registered providers.
    #[must_use]
    pub fn resolver_count(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns true if no providers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Returns the providers matching `url`, most specific family first.
    #[must_use]
    pub fn find_handlers(&self, url: &str) -> Vec<&dyn Resolver> {
        let mut handlers: Vec<&dyn Resolver> = self
            .resolvers
            .iter()
            .filter(|r| r.matches(url))
            .map(AsRef::as_ref)
            .collect();
        handlers.sort_by_key(|r| r.priority());
        handlers
    }

    /// Resolves a posted link into downloadable links.
    ///
    /// Never fails: provider errors are logged and the chain falls through.
    #[tracing::instrument(skip(self, ctx), fields(channel = %ctx.channel_id))]
    pub async fn resolve(&self, url: &str, ctx: &ResolveContext) -> Vec<ResolvedLink> {
        let canonical = canonicalize_host(url);
        if canonical != url {
            debug!(from = %url, to = %canonical, "canonicalized alias host");
        }

        if let Some(links) = self.run_chain(&canonical, ctx).await {
            return links;
        }
        if is_non_downloadable(&canonical) {
            debug!(url = %canonical, "link is a non-downloadable platform asset");
            return Vec::new();
        }

        // TODO: the stripped retry re-runs every provider; skip those that
        // already declined the unstripped link.
        if let Some(stripped) = strip_query(&canonical) {
            debug!(url = %stripped, "retrying resolution without query");
            if let Some(links) = self.run_chain(&stripped, ctx).await {
                return links;
            }
            if is_non_downloadable(&stripped) {
                return Vec::new();
            }
            return vec![ResolvedLink::bare(stripped)];
        }

        vec![ResolvedLink::bare(canonical)]
    }

    /// Tries each matching provider; returns the first non-empty expansion.
    async fn run_chain(&self, url: &str, ctx: &ResolveContext) -> Option<Vec<ResolvedLink>> {
        for handler in self.find_handlers(url) {
            debug!(resolver = handler.name(), url = %url, "Trying resolver");
            match handler.resolve(url, ctx).await {
                Ok(map) if !map.is_empty() => {
                    info!(
                        resolver = handler.name(),
                        url = %url,
                        count = map.len(),
                        "Resolution successful"
                    );
                    return Some(ResolvedLink::from_map(map));
                }
                Ok(_) => {
                    debug!(resolver = handler.name(), "Resolver found nothing, trying next");
                }
                Err(err) if err.is_benign() => {
                    debug!(resolver = handler.name(), error = %err, "Resolver declined");
                }
                Err(err) => {
                    warn!(resolver = handler.name(), error = %err, "Resolver returned error");
                }
            }
        }
        None
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.resolvers.iter().map(|r| r.name()).collect();
        f.debug_struct("ResolverRegistry")
            .field("resolver_count", &self.resolvers.len())
            .field("resolvers", &names)
            .finish()
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
