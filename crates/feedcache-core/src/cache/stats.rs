use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::utils::format_bytes;

/// Summary of every feed record currently persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    /// Sum of serialized record lengths in bytes
    pub total_size: u64,
    /// Earliest `updated_at` among records that could be parsed
    pub oldest_entry: Option<DateTime<Utc>>,
}

impl CacheStats {
    pub fn record(&mut self, size: usize, updated_at: Option<DateTime<Utc>>) {
        self.total_entries += 1;
        self.total_size += size as u64;
        if let Some(ts) = updated_at {
            self.oldest_entry = Some(match self.oldest_entry {
                Some(oldest) if oldest <= ts => oldest,
                _ => ts,
            });
        }
    }

    pub fn size_display(&self) -> String {
        format_bytes(self.total_size)
    }
}
