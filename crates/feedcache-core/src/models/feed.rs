use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Summary of a single listing as shown in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub thumbnail: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_boosted: bool,
    pub seller_id: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub is_negotiable: bool,
}

/// A persisted feed entry.
///
/// `items` is in display order. `total` is the count reported by the origin
/// and may exceed `items.len()` while more pages remain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedFeed {
    pub items: Vec<FeedItem>,
    pub updated_at: DateTime<Utc>,
    pub total: u64,
    pub next_cursor: Option<String>,
    pub version: String,
}

impl CachedFeed {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.updated_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Negative ages come from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    /// Whether more than `age` has passed since the last write
    pub fn is_older_than(&self, age: Duration) -> bool {
        Utc::now() - self.updated_at > age
    }

    /// Whether the origin reported another page after this one.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}
