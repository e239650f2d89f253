//! Host-alias canonicalization and query stripping for incoming links.

use url::Url;

/// Mobile, proxy and mirror hosts rewritten to their canonical platform host.
///
/// Applied in order as plain substring replacements; `c.vxtwitter.com` must
/// come before `vxtwitter.com`.
const HOST_ALIASES: [(&str, &str); 6] = [
    ("mobile.twitter", "twitter"),
    ("fxtwitter.com", "twitter.com"),
    ("c.vxtwitter.com", "twitter.com"),
    ("vxtwitter.com", "twitter.com"),
    ("//x.com", "//twitter.com"),
    (".x.com", ".twitter.com"),
];

/// Link prefixes that point at platform assets which are never archived.
const NON_DOWNLOADABLE_PREFIXES: [&str; 1] = ["https://cdn.discordapp.com/emojis/"];

/// Query parameter kept when stripping queries, since some CDNs key the
/// served format on it.
const RETAINED_QUERY_KEY: &str = "format";

/// Rewrites known alias hosts to the canonical host.
#[must_use]
pub fn canonicalize_host(url: &str) -> String {
    HOST_ALIASES
        .iter()
        .fold(url.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Returns true when the link is a platform asset that must produce no downloads.
#[must_use]
pub fn is_non_downloadable(url: &str) -> bool {
    NON_DOWNLOADABLE_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

/// Strips the query string, keeping only a `format` parameter if one exists.
///
/// Returns `None` when the link does not parse or stripping would not change it.
#[must_use]
pub fn strip_query(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let before = parsed.query().map(str::to_owned);

    if url.contains("format=") {
        let format = parsed
            .query_pairs()
            .find(|(key, _)| key == RETAINED_QUERY_KEY)
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        parsed
            .query_pairs_mut()
            .clear()
            .append_pair(RETAINED_QUERY_KEY, &format);
    } else {
        parsed.set_query(None);
    }

    (parsed.query().map(str::to_owned) != before).then(|| parsed.to_string())
}
