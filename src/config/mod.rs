use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Read provider JSON-RPC URL (Polygon node)
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Game contract emitting RunEnded
    #[serde(default = "default_game_address")]
    pub game_address: String,
    /// Blocks queried behind the head per refresh. Most public RPCs reject
    /// eth_getLogs spans over 10k blocks.
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// EIP-1193 JSON-RPC endpoint exposed by the wallet (Frame listens on 1248)
    #[serde(default = "default_wallet_url")]
    pub rpc_url: String,
    /// Where the install prompt sends the user
    #[serde(default = "default_install_url")]
    pub install_url: String,
    /// Request authorization at startup instead of waiting for the connect action.
    #[serde(default)]
    pub auto_connect: bool,
    /// Interval for polling eth_accounts / eth_chainId.
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,
}

/// What the poller does when a tick fires while a refresh is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the tick.
    #[default]
    Skip,
    /// Start another refresh anyway; the last one to publish wins.
    Race,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Keep only the N most recent runs (None = everything in the window).
    #[serde(default)]
    pub max_runs: Option<usize>,
    /// Attach runner metadata from the runner API to each run.
    #[serde(default = "default_true")]
    pub fetch_runners: bool,
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Runner metadata API base URL (GET {url}/runner/{id})
    #[serde(default = "default_runner_api_url")]
    pub runner_api_url: String,
    /// Base URL for runner / run links in the API output
    #[serde(default = "default_links_base_url")]
    pub links_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_rpc_url() -> String {
    "https://polygon-rpc.com".to_string()
}
fn default_game_address() -> String {
    "0x9d0c114Ac1C3cD1276B0366160B3354ca0f9377E".to_string()
}
fn default_lookback_blocks() -> u64 {
    10_000
}
fn default_wallet_url() -> String {
    "http://127.0.0.1:1248".to_string()
}
fn default_install_url() -> String {
    "https://frame.sh".to_string()
}
fn default_watch_interval_ms() -> u64 {
    1000
}
fn default_poll_interval_secs() -> u64 {
    10
}
fn default_runner_api_url() -> String {
    "https://2112-api.sirsean.workers.dev".to_string()
}
fn default_links_base_url() -> String {
    "https://runner-hunter.sirsean.workers.dev".to_string()
}
fn default_bind_addr() -> String {
    "127.0.0.1:3112".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            game_address: default_game_address(),
            lookback_blocks: default_lookback_blocks(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_wallet_url(),
            install_url: default_install_url(),
            auto_connect: false,
            watch_interval_ms: default_watch_interval_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_runs: None,
            fetch_runners: true,
            overlap: OverlapPolicy::Skip,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            runner_api_url: default_runner_api_url(),
            links_base_url: default_links_base_url(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: default_bind_addr(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            wallet: WalletConfig::default(),
            sync: SyncConfig::default(),
            metadata: MetadataConfig::default(),
            dashboard: DashboardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(contents)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults plus environment overrides (no file needed).
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay `DATA_RUNS_*` variables looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATA_RUNS_RPC_URL") {
            self.chain.rpc_url = url;
        }
        if let Some(address) = lookup("DATA_RUNS_GAME_ADDRESS") {
            self.chain.game_address = address;
        }
        if let Some(url) = lookup("DATA_RUNS_WALLET_URL") {
            self.wallet.rpc_url = url;
        }
        if let Some(url) = lookup("DATA_RUNS_RUNNER_API_URL") {
            self.metadata.runner_api_url = url;
        }
        if let Some(addr) = lookup("DATA_RUNS_DASHBOARD_ADDR") {
            self.dashboard.bind_addr = addr;
        }
        if let Some(secs) = lookup("DATA_RUNS_POLL_INTERVAL_SECS") {
            self.sync.poll_interval_secs =
                secs.parse().map_err(|_| ConfigError::Invalid {
                    key: "DATA_RUNS_POLL_INTERVAL_SECS".to_string(),
                    value: secs.clone(),
                })?;
        }
        self.validate()
    }

    /// Reject values the timers cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "sync.poll_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.wallet.watch_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "wallet.watch_interval_ms".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.chain.lookback_blocks, 10_000);
        assert_eq!(config.sync.poll_interval_secs, 10);
        assert_eq!(config.sync.overlap, OverlapPolicy::Skip);
        assert!(config.sync.fetch_runners);
        assert!(config.sync.max_runs.is_none());
        assert_eq!(config.wallet.rpc_url, "http://127.0.0.1:1248");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [chain]
            lookback_blocks = 1000

            [sync]
            max_runs = 20
            fetch_runners = false
            overlap = "race"

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.lookback_blocks, 1000);
        assert_eq!(config.chain.rpc_url, "https://polygon-rpc.com");
        assert_eq!(config.sync.max_runs, Some(20));
        assert!(!config.sync.fetch_runners);
        assert_eq!(config.sync.overlap, OverlapPolicy::Race);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            ("DATA_RUNS_RPC_URL", "http://localhost:8545"),
            ("DATA_RUNS_WALLET_URL", "http://localhost:1248"),
            ("DATA_RUNS_POLL_INTERVAL_SECS", "30"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.chain.rpc_url, "http://localhost:8545");
        assert_eq!(config.wallet.rpc_url, "http://localhost:1248");
        assert_eq!(config.sync.poll_interval_secs, 30);
        assert_eq!(
            config.metadata.runner_api_url,
            "https://2112-api.sirsean.workers.dev"
        );
    }

    #[test]
    fn test_env_overlay_rejects_bad_interval() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| {
                (key == "DATA_RUNS_POLL_INTERVAL_SECS").then(|| "soon".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_env_overlay_rejects_zero_interval() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "DATA_RUNS_POLL_INTERVAL_SECS").then(|| "0".to_string()))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "sync.poll_interval_secs")
        );
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let config: Config = toml::from_str("[sync]\npoll_interval_secs = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "sync.poll_interval_secs")
        );

        let config: Config = toml::from_str("[wallet]\nwatch_interval_ms = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref key, .. } if key == "wallet.watch_interval_ms")
        );

        assert!(Config::default().validate().is_ok());
    }
}
