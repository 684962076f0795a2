//! Configuration Module
//!
//! Handles loading and managing configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TTL for cache entries stored without an explicit TTL
    pub default_ttl: Duration,
    /// XP queue length that triggers an immediate flush
    pub max_batch_size: usize,
    /// Period of the XP auto-flush timer
    pub flush_interval: Duration,
    /// Period of the XP snapshot background task
    pub snapshot_interval: Duration,
    /// Admin HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL_MS` - Cache default TTL in milliseconds (default: 300000)
    /// - `MAX_BATCH_SIZE` - XP flush threshold (default: 10)
    /// - `FLUSH_INTERVAL_MS` - XP auto-flush period in milliseconds (default: 30000)
    /// - `SNAPSHOT_INTERVAL_MS` - Snapshot task period in milliseconds (default: 60000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    ///
    /// Missing or unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_ttl: env_millis("DEFAULT_TTL_MS").unwrap_or(defaults.default_ttl),
            max_batch_size: env_parse("MAX_BATCH_SIZE").unwrap_or(defaults.max_batch_size),
            flush_interval: env_millis("FLUSH_INTERVAL_MS").unwrap_or(defaults.flush_interval),
            snapshot_interval: env_millis("SNAPSHOT_INTERVAL_MS")
                .unwrap_or(defaults.snapshot_interval),
            server_port: env_parse("SERVER_PORT").unwrap_or(defaults.server_port),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: crate::cache::DEFAULT_TTL,
            max_batch_size: crate::queue::MAX_BATCH_SIZE,
            flush_interval: crate::queue::FLUSH_INTERVAL,
            snapshot_interval: Duration::from_secs(60),
            server_port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.snapshot_interval, Duration::from_secs(60));
        assert_eq!(config.server_port, 3000);
    }

    // Single test so no other test races on these variables
    #[test]
    fn test_config_from_env() {
        env::remove_var("DEFAULT_TTL_MS");
        env::remove_var("MAX_BATCH_SIZE");
        env::remove_var("FLUSH_INTERVAL_MS");
        env::remove_var("SNAPSHOT_INTERVAL_MS");
        env::remove_var("SERVER_PORT");
        assert_eq!(Config::from_env(), Config::default());

        env::set_var("MAX_BATCH_SIZE", "25");
        env::set_var("FLUSH_INTERVAL_MS", "1500");
        env::set_var("SERVER_PORT", "not-a-port");
        let config = Config::from_env();
        assert_eq!(config.max_batch_size, 25);
        assert_eq!(config.flush_interval, Duration::from_millis(1500));
        assert_eq!(config.server_port, 3000);

        env::remove_var("MAX_BATCH_SIZE");
        env::remove_var("FLUSH_INTERVAL_MS");
        env::remove_var("SERVER_PORT");
    }
}
