//! Configuration management.
//!
//! Holds the cache location and the freshness thresholds. Configuration is
//! stored at `~/.config/feedcache/config.json`; a missing file means defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::cache::{FeedCacheOptions, CACHE_MAX_AGE_HOURS, CACHE_TTL_MINUTES};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "feedcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overrides the platform cache directory
    pub cache_dir: Option<PathBuf>,
    pub stale_after_minutes: i64,
    pub max_age_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            stale_after_minutes: CACHE_TTL_MINUTES,
            max_age_hours: CACHE_MAX_AGE_HOURS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cache_options(&self) -> FeedCacheOptions {
        FeedCacheOptions {
            ttl: Duration::minutes(self.stale_after_minutes),
            max_age: Duration::hours(self.max_age_hours),
        }
    }
}
