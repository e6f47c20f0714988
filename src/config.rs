//! Configuration types for the disposal engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::SafetyFilterConfig;

/// Top-level configuration for the disposal engine.
///
/// Supplies the initial safety-filter rules (blacklist and auto-discard
/// list included) and the timing policy of every component. The engine
/// works on an in-memory copy; the owner writes mutations back with
/// [`MiddenConfig::save_to_file`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MiddenConfig {
    /// Safety filter rules, blacklist, and auto-discard list.
    pub filter: SafetyFilterConfig,
    /// Discard pipeline timing and retry policy.
    pub discard: DiscardConfig,
    /// Market price cache policy.
    pub market: MarketConfig,
    /// Passive trigger gating policy.
    pub passive: PassiveConfig,
}

/// Discard pipeline timing and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscardConfig {
    /// Delay between confirmation-dialog polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Attempts tolerated while the confirm control is not yet actionable.
    pub confirm_retry_limit: u32,
    /// Polls tolerated with no dialog visible before assuming the discard
    /// completed without a confirmation prompt.
    pub missing_dialog_limit: u32,
    /// Wall-clock bound per item, in seconds, measured from the moment the
    /// discard was issued. Exceeding it fails the job regardless of the
    /// retry counters.
    pub hard_timeout_secs: u64,
    /// Text pattern identifying the disposal confirmation dialog.
    pub confirm_text: String,
    /// Run-history entries kept in memory and on disk.
    pub history_limit: usize,
}

impl Default for DiscardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            confirm_retry_limit: 10,
            missing_dialog_limit: 50,
            hard_timeout_secs: 15,
            confirm_text: "Discard".to_owned(),
            history_limit: 50,
        }
    }
}

impl DiscardConfig {
    /// Poll delay as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-item wall-clock bound as a [`Duration`].
    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_timeout_secs)
    }
}

/// Market price cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Minutes a cached price (or failed lookup) stays fresh.
    pub price_ttl_mins: u64,
    /// Seconds before an unresolved fetch is reclaimed as failed.
    pub fetch_timeout_secs: u64,
    /// Minimum milliseconds between fetch dispatch cycles.
    pub dispatch_interval_ms: u64,
    /// Fetches dispatched per cycle; overflow defers to the next cycle.
    pub dispatch_batch: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            price_ttl_mins: 15,
            fetch_timeout_secs: 30,
            dispatch_interval_ms: 500,
            dispatch_batch: 8,
        }
    }
}

impl MarketConfig {
    /// Cache TTL as a [`Duration`].
    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_mins * 60)
    }

    /// Fetch reclaim bound as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Dispatch rate limit as a [`Duration`].
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }
}

/// Passive trigger gating policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PassiveConfig {
    /// Whether passive (idle-triggered) discarding starts enabled.
    pub enabled: bool,
    /// Seconds the player must stay idle before a trigger.
    pub idle_threshold_secs: u64,
    /// Seconds between automatic triggers.
    pub cooldown_secs: u64,
    /// Seconds between passive gating cycles.
    pub cycle_secs: u64,
    /// Seconds the cached eligible-items snapshot stays fresh.
    pub snapshot_ttl_secs: u64,
    /// Zones in which passive discarding may run (cities, housing, inns).
    ///
    /// Empty by default: passive mode stays inert until the host supplies
    /// its zone list.
    pub allowed_zones: Vec<u32>,
}

impl Default for PassiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_threshold_secs: 60,
            cooldown_secs: 300,
            cycle_secs: 5,
            snapshot_ttl_secs: 10,
            allowed_zones: Vec::new(),
        }
    }
}

impl PassiveConfig {
    /// Idle threshold as a [`Duration`].
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    /// Trigger cooldown as a [`Duration`].
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Cycle interval as a [`Duration`].
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }

    /// Snapshot TTL as a [`Duration`].
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs)
    }
}

impl MiddenConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::MiddenError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MiddenError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/midden/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("midden").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("midden")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/midden-config/config.toml")
        }
    }

    /// Returns the default run-history file path, next to the config file.
    pub fn default_history_path() -> PathBuf {
        Self::default_config_path().with_file_name("history.json")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::game::ItemId;

    #[test]
    fn default_config_is_valid() {
        let config = MiddenConfig::default();
        assert!(config.discard.poll_interval_ms > 0);
        assert!(config.discard.confirm_retry_limit > 0);
        assert!(config.discard.missing_dialog_limit > config.discard.confirm_retry_limit);
        assert!(config.discard.hard_timeout() > config.discard.poll_interval());
        assert!(!config.discard.confirm_text.is_empty());
        assert!(config.market.price_ttl() > Duration::ZERO);
        assert!(config.market.dispatch_batch > 0);
        assert!(config.passive.cooldown() >= config.passive.cycle_interval());
        assert!(!config.passive.enabled, "passive mode must be opt-in");
        assert!(config.passive.allowed_zones.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = MiddenConfig::default();
        config.discard.hard_timeout_secs = 20;
        config.market.price_ttl_mins = 90;
        config.passive.allowed_zones = vec![128, 129, 282];
        config.filter.blacklist.insert(ItemId(777));

        config.save_to_file(&path).unwrap();
        let loaded = MiddenConfig::from_file(&path).unwrap();

        assert_eq!(loaded.discard.hard_timeout_secs, 20);
        assert_eq!(loaded.market.price_ttl_mins, 90);
        assert_eq!(loaded.passive.allowed_zones, vec![128, 129, 282]);
        assert!(loaded.filter.blacklist.contains(&ItemId(777)));
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = MiddenConfig::from_file(std::path::Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").ok();

        let result = MiddenConfig::from_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[discard]\npoll_interval_ms = 100\n").unwrap();

        let loaded = MiddenConfig::from_file(&path).unwrap();
        assert_eq!(loaded.discard.poll_interval_ms, 100);
        assert_eq!(loaded.discard.confirm_retry_limit, 10);
        assert_eq!(loaded.market.dispatch_batch, 8);
    }

    #[test]
    fn default_paths_are_anchored_next_to_each_other() {
        let config_path = MiddenConfig::default_config_path();
        let history_path = MiddenConfig::default_history_path();
        assert!(config_path.to_string_lossy().ends_with("config.toml"));
        assert!(config_path.to_string_lossy().contains("midden"));
        assert_eq!(config_path.parent(), history_path.parent());
    }
}
