//! data-runs: follows RunEnded events of the 2112 game on Polygon and serves
//! the augmented, sorted run list as JSON.
//!
//! Usage:
//!   data-runs                          # reads data-runs.toml if present
//!   data-runs --config path/to.toml    # or DATA_RUNS_CONFIG
//!   data-runs --connect                # request wallet authorization at startup

use data_runs::config::Config;
use data_runs::dashboard::{self, DashboardState};
use data_runs::onchain::{GameContract, RpcGameContract};
use data_runs::session::{ContractFactory, Session};
use data_runs::store::RunStore;
use data_runs::wallet::{JsonRpcWallet, WalletProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "data-runs.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let auto_connect = args.iter().any(|a| a == "--connect");
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| std::env::var("DATA_RUNS_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Load config
    let config_found = config_path.exists();
    let mut config = if config_found {
        Config::load(&config_path)?
    } else {
        Config::from_env()?
    };
    if auto_connect {
        config.wallet.auto_connect = true;
    }

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("data-runs v{} starting", env!("CARGO_PKG_VERSION"));
    if config_found {
        info!(path = %config_path.display(), "config loaded");
    } else {
        info!(path = %config_path.display(), "no config file found, using env-only config");
    }
    info!(
        rpc = %config.chain.rpc_url,
        game = %config.chain.game_address,
        wallet = %config.wallet.rpc_url,
        lookback_blocks = config.chain.lookback_blocks,
        poll_interval_secs = config.sync.poll_interval_secs,
        overlap = ?config.sync.overlap,
        "configuration"
    );

    let store = RunStore::new();
    let (commands, command_rx) = mpsc::unbounded_channel();

    // --- Dashboard ---
    if config.dashboard.enabled {
        let state = DashboardState {
            store: store.clone(),
            commands: commands.clone(),
            links_base_url: config.metadata.links_base_url.clone(),
        };
        let bind_addr = config.dashboard.bind_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve(state, &bind_addr).await {
                error!(error = %e, "dashboard server failed");
            }
        });
    }

    // --- Wallet + Contract ---
    let wallet: Arc<dyn WalletProvider> = Arc::new(JsonRpcWallet::new(config.wallet.rpc_url.clone()));

    let chain = config.chain.clone();
    let contracts: ContractFactory = Arc::new(move || -> anyhow::Result<Arc<dyn GameContract>> {
        let contract = RpcGameContract::connect(&chain.rpc_url, &chain.game_address)?;
        info!(address = %contract.address(), rpc = %chain.rpc_url, "game contract ready");
        Ok(Arc::new(contract))
    });

    // --- Session ---
    let session = Session::new(config, wallet, store, contracts);
    session
        .run(command_rx, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    drop(commands);
    Ok(())
}
