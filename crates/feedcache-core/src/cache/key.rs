use crate::models::FeedCacheKey;
use crate::utils::{non_empty, prefix_chars};

/// Prefix shared by every cache record in the store.
pub const CACHE_PREFIX: &str = "feed_cache";

/// Schema version written into keys and records.
pub const CACHE_VERSION: &str = "v1";

/// Only this many characters of a search term take part in the key.
/// Groups near-duplicate free-text searches into one slot.
pub const SEARCH_KEY_CHARS: usize = 20;

const ANY: &str = "all";
const DEFAULT_SORT: &str = "newest";

/// Prefix used to enumerate cache records among unrelated store keys
pub fn key_prefix() -> String {
    format!("{}:", CACHE_PREFIX)
}

/// Build the storage key for a filter tuple.
///
/// Field order and defaults are part of the persisted format: changing either
/// orphans every record written by an earlier build.
pub fn generate_cache_key(params: &FeedCacheKey) -> String {
    let search = match non_empty(&params.search) {
        Some(term) => format!("search:{}", prefix_chars(term, SEARCH_KEY_CHARS)),
        None => "nosearch".to_string(),
    };

    [
        CACHE_PREFIX,
        CACHE_VERSION,
        non_empty(&params.country).unwrap_or(ANY),
        non_empty(&params.city).unwrap_or(ANY),
        non_empty(&params.category).unwrap_or(ANY),
        non_empty(&params.subcategory).unwrap_or(ANY),
        non_empty(&params.sort).unwrap_or(DEFAULT_SORT),
        non_empty(&params.seller_id).unwrap_or(ANY),
        &search,
    ]
    .join(":")
}
