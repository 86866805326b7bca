//! Feed caching module for instant, offline-tolerant feed rendering.
//!
//! This module provides the `FeedCache` service, which stores listing feed
//! pages in a `KeyValueStore` and mirrors them in memory. Entries are
//! considered stale after 5 minutes and expired after 24 hours.
//!
//! Components:
//! - `key`: deterministic storage keys from filter tuples
//! - `merge`: reconciling refreshed pages with cached ones
//! - `manager`: the `FeedCache` service itself
//! - `stats`: diagnostics over persisted records

pub mod key;
pub mod manager;
pub mod merge;
pub mod stats;

pub use key::{generate_cache_key, CACHE_PREFIX, CACHE_VERSION};
pub use manager::{FeedCache, FeedCacheOptions, CACHE_MAX_AGE_HOURS, CACHE_TTL_MINUTES};
pub use merge::merge_feed_items;
pub use stats::CacheStats;
