//! Data models for cached listing feeds.
//!
//! This module contains the structures persisted by the feed cache:
//!
//! - `FeedItem`: a denormalized summary of one marketplace listing
//! - `CachedFeed`: one cached page sequence with pagination metadata
//! - `FeedCacheKey`: the filter tuple that identifies a logical feed

pub mod feed;
pub mod key;

pub use feed::{CachedFeed, FeedItem};
pub use key::FeedCacheKey;
