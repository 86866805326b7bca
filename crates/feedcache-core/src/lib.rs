//! Feedcache core library.
//!
//! Cache-first, stale-while-revalidate storage for paginated listing feeds:
//! - `models`: feed items, cached feeds and filter keys
//! - `cache`: the `FeedCache` service, key generation and merging
//! - `store`: persistent key-value backends
//! - `config`: cache location and freshness thresholds

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod utils;

pub use cache::{generate_cache_key, merge_feed_items, CacheStats, FeedCache, FeedCacheOptions};
pub use config::Config;
pub use error::{CacheError, StoreError};
pub use models::{CachedFeed, FeedCacheKey, FeedItem};
pub use store::{FileStore, KeyValueStore, MemoryStore};
