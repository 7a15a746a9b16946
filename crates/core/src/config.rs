//! Tracker configuration loaded from environment variables.

use std::time::Duration;

use crate::ranking::{DisplayDefaults, NoCategoryPlacement};
use crate::search::NameMatchMode;

/// Runtime settings shared by the cache, pipeline, and background jobs.
///
/// All fields have defaults suitable for local use; override via environment
/// variables.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How long a player stays in the recent list after leaving.
    pub recent_threshold: Duration,
    pub recency_sweep_interval: Duration,
    pub lookup_interval: Duration,
    /// Open lookups sent to the identity service per tick.
    pub lookup_batch_size: usize,
    pub duplicate_sweep_interval: Duration,
    pub no_category_placement: NoCategoryPlacement,
    pub name_search_mode: NameMatchMode,
    pub display_defaults: DisplayDefaults,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            recent_threshold: Duration::from_secs(15 * 60),
            recency_sweep_interval: Duration::from_secs(60),
            lookup_interval: Duration::from_secs(30),
            lookup_batch_size: 20,
            duplicate_sweep_interval: Duration::from_secs(3600),
            no_category_placement: NoCategoryPlacement::Bottom,
            name_search_mode: NameMatchMode::Contains,
            display_defaults: DisplayDefaults::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default    |
    /// |----------------------------------|------------|
    /// | `RECENT_PLAYER_THRESHOLD_MINS`   | `15`       |
    /// | `RECENCY_SWEEP_INTERVAL_SECS`    | `60`       |
    /// | `LOOKUP_INTERVAL_SECS`           | `30`       |
    /// | `LOOKUP_BATCH_SIZE`              | `20`       |
    /// | `DUPLICATE_SWEEP_INTERVAL_SECS`  | `3600`     |
    /// | `NO_CATEGORY_PLACEMENT`          | `bottom`   |
    /// | `NAME_SEARCH_MODE`               | `contains` |
    /// | `DEFAULT_PLAYER_COLOR`           | `0`        |
    /// | `DEFAULT_PLAYER_ICON`            | `0`        |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            recent_threshold: env_parse::<u64>("RECENT_PLAYER_THRESHOLD_MINS")
                .map(|mins| Duration::from_secs(mins * 60))
                .unwrap_or(defaults.recent_threshold),
            recency_sweep_interval: env_parse::<u64>("RECENCY_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.recency_sweep_interval),
            lookup_interval: env_parse::<u64>("LOOKUP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lookup_interval),
            lookup_batch_size: env_parse("LOOKUP_BATCH_SIZE").unwrap_or(defaults.lookup_batch_size),
            duplicate_sweep_interval: env_parse::<u64>("DUPLICATE_SWEEP_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.duplicate_sweep_interval),
            no_category_placement: env_parse("NO_CATEGORY_PLACEMENT")
                .unwrap_or(defaults.no_category_placement),
            name_search_mode: env_parse("NAME_SEARCH_MODE").unwrap_or(defaults.name_search_mode),
            display_defaults: DisplayDefaults {
                color: env_parse("DEFAULT_PLAYER_COLOR").unwrap_or(defaults.display_defaults.color),
                icon: env_parse("DEFAULT_PLAYER_ICON").unwrap_or(defaults.display_defaults.icon),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.recent_threshold, Duration::from_secs(900));
        assert_eq!(config.lookup_batch_size, 20);
        assert_eq!(config.no_category_placement, NoCategoryPlacement::Bottom);
        assert_eq!(config.name_search_mode, NameMatchMode::Contains);
    }
}
