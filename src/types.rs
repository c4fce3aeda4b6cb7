use std::fs;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Where the feed client gets its payloads from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    Http,
    Fixture,
}

/// Which wager-store backend the engine writes settlements to.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    pub mode: FeedMode,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Directory of canned `{sport}_{window}.json` payloads for fixture mode.
    #[serde(default)]
    pub fixture_dir: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub store: StoreMode,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// How many d-1, d-2, ... windows the matcher may widen into.
    #[serde(default = "default_max_history_windows")]
    pub max_history_windows: u8,
    #[serde(default = "default_control_addr")]
    pub control_addr: String,
}

impl EngineConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub postgres: PostgresConfig,
    pub feed: FeedConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {path}"))?;
        let cfg: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to deserialize TOML config at {path}"))?;
        Ok(cfg)
    }
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_cache_ttl_secs() -> u64 {
    25
}

fn default_retries() -> u32 {
    2
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_history_windows() -> u8 {
    3
}

fn default_control_addr() -> String {
    "127.0.0.1:8099".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml_str = r#"
            [postgres]
            url = "postgres://localhost/bets"

            [feed]
            mode = "http"
            base_url = "https://feeds.example.com/json"
            api_key = "k"

            [engine]
            store = "postgres"
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.feed.mode, FeedMode::Http);
        assert_eq!(cfg.engine.interval_secs, 30);
        assert_eq!(cfg.engine.max_history_windows, 3);
        assert_eq!(cfg.feed.retries, 2);
    }
}
