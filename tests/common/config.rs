//! Configuration helpers pointing every upstream at one mock server

use std::time::Duration;
use tempfile::TempDir;
use update_fetch::{Config, RetryConfig};

/// Config rooted in `dir` whose GitHub and F-Droid endpoints are `upstream`
pub fn test_config(dir: &TempDir, upstream: &str) -> Config {
    let mut config = Config::default();
    config.catalog_path = dir.path().join("items.yaml");
    config.cache.cache_dir = dir.path().join("cache");
    config.cache.database_path = dir.path().join("update-fetch.db");
    config.cache.max_cache_size_mb = 16;
    config.cache.on_demand_timeout = Duration::from_secs(10);
    config.mirror.data_dir = dir.path().join("data");
    config.fetch.concurrent_amount = 1;
    config.fetch.request_timeout = Duration::from_secs(5);
    config.fetch.download_timeout = Duration::from_secs(10);
    config.fetch.retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config.fetch.endpoints.github_api = upstream.to_string();
    config.fetch.endpoints.github = upstream.to_string();
    config.fetch.endpoints.fdroid = upstream.to_string();
    config
}

/// Write the catalog document the config points at
pub fn write_catalog(config: &Config, yaml: &str) {
    std::fs::write(&config.catalog_path, yaml).unwrap();
}
