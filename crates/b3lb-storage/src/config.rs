//! Ambient configuration, loaded from environment variables with the same
//! `env_parse`-with-fallback shape the storage layer has always used for
//! its connection tuning.

use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_PATH: &str = "b3lb.sqlite3";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RETENTION_SWEEP_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_NODE_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_NML_CACHE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RECORD_PATH_HIERARCHY_WIDTH: usize = 2;
pub const DEFAULT_RECORD_PATH_HIERARCHY_DEPTH: usize = 3;

/// Everything the API process needs at startup, resolved once from the
/// environment. Individual background tasks borrow the fields they need
/// rather than re-reading `std::env` themselves.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: String,
    pub poll_interval: Duration,
    pub retention_sweep_interval: Duration,
    pub stats_interval: Duration,
    pub node_request_timeout: Duration,
    pub nml_cache_timeout: Duration,
    pub record_path_hierarchy_width: usize,
    pub record_path_hierarchy_depth: usize,
    pub blob_root: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            retention_sweep_interval: Duration::from_secs(DEFAULT_RETENTION_SWEEP_INTERVAL_SECS),
            stats_interval: Duration::from_secs(DEFAULT_STATS_INTERVAL_SECS),
            node_request_timeout: Duration::from_secs(DEFAULT_NODE_REQUEST_TIMEOUT_SECS),
            nml_cache_timeout: Duration::from_secs(DEFAULT_NML_CACHE_TIMEOUT_SECS),
            record_path_hierarchy_width: DEFAULT_RECORD_PATH_HIERARCHY_WIDTH,
            record_path_hierarchy_depth: DEFAULT_RECORD_PATH_HIERARCHY_DEPTH,
            blob_root: "./blobs".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_parse("B3LB_BIND_ADDR", DEFAULT_BIND_ADDR.to_string()),
            db_path: env_parse("B3LB_DB_PATH", DEFAULT_DB_PATH.to_string()),
            poll_interval: Duration::from_secs(env_parse(
                "B3LB_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            retention_sweep_interval: Duration::from_secs(env_parse(
                "B3LB_RETENTION_SWEEP_INTERVAL_SECS",
                DEFAULT_RETENTION_SWEEP_INTERVAL_SECS,
            )),
            stats_interval: Duration::from_secs(env_parse(
                "B3LB_STATS_INTERVAL_SECS",
                DEFAULT_STATS_INTERVAL_SECS,
            )),
            node_request_timeout: Duration::from_secs(env_parse(
                "B3LB_NODE_REQUEST_TIMEOUT",
                DEFAULT_NODE_REQUEST_TIMEOUT_SECS,
            )),
            nml_cache_timeout: Duration::from_secs(env_parse(
                "B3LB_CACHE_NML_TIMEOUT",
                DEFAULT_NML_CACHE_TIMEOUT_SECS,
            )),
            record_path_hierarchy_width: env_parse(
                "B3LB_RECORD_PATH_HIERARCHY_WIDTH",
                DEFAULT_RECORD_PATH_HIERARCHY_WIDTH,
            ),
            record_path_hierarchy_depth: env_parse(
                "B3LB_RECORD_PATH_HIERARCHY_DEPTH",
                DEFAULT_RECORD_PATH_HIERARCHY_DEPTH,
            ),
            blob_root: env_parse("B3LB_BLOB_ROOT", "./blobs".to_string()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.record_path_hierarchy_depth, 3);
    }

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        std::env::remove_var("B3LB_BIND_ADDR_TEST_UNUSED");
        let config = Config::from_env();
        assert!(!config.db_path.is_empty());
    }
}
