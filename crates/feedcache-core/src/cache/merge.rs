use std::collections::{HashMap, HashSet};

use crate::models::FeedItem;

/// Reconcile a freshly fetched page with previously cached items.
///
/// Fresh items come first in their given order and win on identity
/// conflicts. Cached items missing from the fresh page follow in their
/// original order, so pages the user already scrolled into survive a
/// refresh of the first page.
pub fn merge_feed_items(cached_items: &[FeedItem], fresh_items: &[FeedItem]) -> Vec<FeedItem> {
    let mut latest: HashMap<&str, &FeedItem> = HashMap::with_capacity(fresh_items.len());
    for item in fresh_items {
        latest.insert(item.id.as_str(), item);
    }

    let mut merged = Vec::with_capacity(fresh_items.len() + cached_items.len());
    let mut emitted: HashSet<&str> = HashSet::with_capacity(fresh_items.len());

    for item in fresh_items {
        if emitted.insert(item.id.as_str()) {
            let newest = latest.get(item.id.as_str()).copied().unwrap_or(item);
            merged.push(newest.clone());
        }
    }

    for item in cached_items {
        if emitted.insert(item.id.as_str()) {
            merged.push(item.clone());
        }
    }

    merged
}

/// Append `new_items` to `existing`, skipping identities already present.
pub(crate) fn append_unique(existing: Vec<FeedItem>, new_items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen: HashSet<String> = existing.iter().map(|item| item.id.clone()).collect();
    let mut combined = existing;
    for item in new_items {
        if seen.insert(item.id.clone()) {
            combined.push(item);
        }
    }
    combined
}
