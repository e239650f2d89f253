use tracing::{debug, warn};

use crate::resolver::ResolvedLink;
use crate::store::DownloadStore;

/// Drops links this channel has already saved.
///
/// A link survives when no stored record for its URL belongs to `channel_id`,
/// or when `save_possible_duplicates` is set. Store errors keep the link.
pub async fn filter_already_downloaded(
    links: Vec<ResolvedLink>,
    store: &dyn DownloadStore,
    channel_id: &str,
    save_possible_duplicates: bool,
) -> Vec<ResolvedLink> {
    if save_possible_duplicates {
        return links;
    }

    let mut kept = Vec::with_capacity(links.len());
    for link in links {
        match store.find_downloads_by_url(&link.url).await {
            Ok(records) if records.iter().any(|r| r.channel_id == channel_id) => {
                debug!(url = %link.url, channel = channel_id, "already downloaded for this channel");
            }
            Ok(_) => kept.push(link),
            Err(e) => {
                warn!(url = %link.url, error = %e, "download lookup failed, keeping link");
                kept.push(link);
            }
        }
    }
    kept
}
