//! Configuration and settings management
//!
//! Loads settings from environment variables and config files, and defines
//! the hub's tunable constants.

use crate::clients::device::Device;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Comma-separated list of allowed user IDs
    #[serde(rename = "allowed_users")]
    pub allowed_users_str: Option<String>,

    /// Transmission RPC endpoint
    #[serde(default = "default_transmission_url")]
    pub transmission_url: String,

    /// Hub web API base URL (scenario execution)
    #[serde(default = "default_hub_api_url")]
    pub hub_api_url: String,

    /// Path of the JSON file holding per-user state
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Wakeable devices as `name=mac` pairs, comma-separated
    pub devices_str: Option<String>,

    /// Runnable hub scenario names, comma-separated
    pub scenarios_str: Option<String>,
}

fn default_transmission_url() -> String {
    "http://localhost:9091/transmission/rpc".to_string()
}

fn default_hub_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_state_file() -> String {
    "state/users.json".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to
            // snake_case; ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        s.try_deserialize()
    }

    /// Returns a set of Telegram IDs that are allowed to use the bot
    #[must_use]
    pub fn allowed_users(&self) -> HashSet<i64> {
        self.allowed_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Wakeable devices parsed from `devices_str` (`name=mac` pairs).
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.devices_str
            .as_ref()
            .map(|s| {
                s.split(',')
                    .filter_map(|pair| {
                        let (name, mac) = pair.split_once('=')?;
                        let (name, mac) = (name.trim(), mac.trim());
                        if name.is_empty() || mac.is_empty() {
                            return None;
                        }
                        Some(Device {
                            name: name.to_string(),
                            mac: mac.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Scenario names parsed from `scenarios_str`.
    #[must_use]
    pub fn scenarios(&self) -> Vec<String> {
        self.scenarios_str
            .as_ref()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// Telegram API retry configuration
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum retry attempts for Telegram API operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

// Torrent operation budgets
/// Budget for one Transmission RPC round trip, seconds
pub const TORRENT_OP_TIMEOUT_SECS: u64 = 15;
/// Interval between metadata polls after adding a torrent, milliseconds
pub const METADATA_POLL_INTERVAL_MS: u64 = 1000;
/// Budget for waiting on magnet metadata, seconds
pub const METADATA_POLL_TIMEOUT_SECS: u64 = 20;

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_settings() -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            allowed_users_str: None,
            transmission_url: default_transmission_url(),
            hub_api_url: default_hub_api_url(),
            state_file: default_state_file(),
            devices_str: None,
            scenarios_str: None,
        }
    }

    #[test]
    fn test_allowed_users_parsing() {
        let mut settings = bare_settings();

        settings.allowed_users_str = Some("123,456".to_string());
        let allowed = settings.allowed_users();
        assert!(allowed.contains(&123));
        assert!(allowed.contains(&456));
        assert_eq!(allowed.len(), 2);

        settings.allowed_users_str = Some("333; 444, 555".to_string());
        let allowed = settings.allowed_users();
        assert_eq!(allowed.len(), 3);

        settings.allowed_users_str = Some("abc, 777".to_string());
        let allowed = settings.allowed_users();
        assert!(allowed.contains(&777));
        assert_eq!(allowed.len(), 1);
    }

    #[test]
    fn test_devices_parsing() {
        let mut settings = bare_settings();
        settings.devices_str = Some("nas=aa:bb:cc:dd:ee:ff, htpc=11-22-33-44-55-66".to_string());

        let devices = settings.devices();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name, "nas");
        assert_eq!(devices[1].mac, "11-22-33-44-55-66");

        settings.devices_str = Some("broken".to_string());
        assert!(settings.devices().is_empty());
    }

    #[test]
    fn test_scenarios_parsing() {
        let mut settings = bare_settings();
        assert!(settings.scenarios().is_empty());

        settings.scenarios_str = Some("movie_night, , lights_off".to_string());
        assert_eq!(settings.scenarios(), vec!["movie_night", "lights_off"]);
    }
}
