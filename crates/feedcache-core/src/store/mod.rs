//! Persistent key-value storage consumed by the feed cache.
//!
//! The cache only needs string keys and string values. Two backends ship
//! with the crate:
//! - `MemoryStore`: process-local map, used by tests and as a fallback
//! - `FileStore`: one file per key under a cache directory

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
    async fn get_all_keys(&self) -> Result<Vec<String>, StoreError>;
    async fn multi_remove(&self, keys: &[String]) -> Result<(), StoreError>;
}
