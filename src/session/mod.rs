//! Session wiring: wallet → onboarding → contract binding → poller.
//!
//! One pass of the session runs until the wallet switches chains. That is a
//! hard reset: the watcher and poller are dropped, the store is cleared and
//! onboarding starts over from detection.
//!
//! Revoking every account only marks the store disconnected. The poller keeps
//! refreshing, since runs are public chain data and do not depend on the
//! account.

use crate::config::Config;
use crate::metadata::RunnerClient;
use crate::onchain::GameContract;
use crate::store::RunStore;
use crate::sync::{Poller, Synchronizer};
use crate::wallet::{
    spawn_watcher, NetworkParams, Onboarding, OnboardingState, Signal, WalletProvider,
};

use alloy::primitives::Address;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Builds the game contract handle once the wallet is on the target chain.
pub type ContractFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn GameContract>> + Send + Sync>;

/// User actions answering an onboarding prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletCommand {
    Install,
    Connect,
    SwitchNetwork,
}

enum Exit {
    Reload,
    Shutdown,
}

/// Aborts the watcher task when a session pass ends.
struct WatcherTask(tokio::task::JoinHandle<()>);

impl Drop for WatcherTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct Session {
    config: Config,
    wallet: Arc<dyn WalletProvider>,
    store: RunStore,
    contracts: ContractFactory,
}

impl Session {
    pub fn new(
        config: Config,
        wallet: Arc<dyn WalletProvider>,
        store: RunStore,
        contracts: ContractFactory,
    ) -> Self {
        Self {
            config,
            wallet,
            store,
            contracts,
        }
    }

    /// Run until `shutdown` resolves, reloading on every chain change.
    pub async fn run<F>(
        &self,
        mut commands: mpsc::UnboundedReceiver<WalletCommand>,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut generation = 0u64;
        loop {
            generation += 1;
            match self
                .run_once(generation, &mut commands, shutdown.as_mut())
                .await?
            {
                Exit::Reload => {
                    info!(generation, "session reloading");
                    self.store.reset();
                }
                Exit::Shutdown => {
                    info!("session shut down");
                    return Ok(());
                }
            }
        }
    }

    async fn run_once<F>(
        &self,
        generation: u64,
        commands: &mut mpsc::UnboundedReceiver<WalletCommand>,
        mut shutdown: Pin<&mut F>,
    ) -> anyhow::Result<Exit>
    where
        F: Future<Output = ()>,
    {
        let mut fsm = Onboarding::new(
            NetworkParams::polygon_mainnet(),
            self.config.wallet.install_url.clone(),
        );

        let installed = self.wallet.detect().await;
        fsm.mounted(installed);

        let (event_tx, mut events) = mpsc::unbounded_channel();
        let _watcher = if installed {
            let accounts = match self.wallet.accounts().await {
                Ok(accounts) => accounts,
                Err(e) => {
                    warn!(error = %e, "eth_accounts failed");
                    Vec::new()
                }
            };
            fsm.accounts_changed(accounts.clone());

            if accounts.is_empty() && self.config.wallet.auto_connect {
                fsm.accounts_changed(self.authorize().await);
            }

            Some(WatcherTask(spawn_watcher(
                self.wallet.clone(),
                accounts,
                Duration::from_millis(self.config.wallet.watch_interval_ms),
                event_tx.clone(),
            )))
        } else {
            None
        };
        self.store.set_prompt(fsm.prompt());
        info!(generation, state = ?fsm.state(), "onboarding started");

        let sync = Arc::new(Synchronizer::new(
            self.store.clone(),
            self.config
                .sync
                .fetch_runners
                .then(|| RunnerClient::new(self.config.metadata.runner_api_url.clone())),
            self.config.chain.lookback_blocks,
            self.config.sync.max_runs,
            self.config.sync.overlap,
        ));
        let mut _poller: Option<Poller> = None;

        loop {
            let signal = tokio::select! {
                _ = &mut shutdown => return Ok(Exit::Shutdown),
                Some(event) = events.recv() => fsm.handle(event),
                Some(command) = commands.recv() => self.execute(command, &mut fsm).await,
            };
            self.store.set_prompt(fsm.prompt());

            match signal {
                Some(Signal::Connected { account }) => {
                    let contract = (self.contracts)().context("failed to bind game contract")?;
                    sync.bind(contract).await;
                    self.store.connected(account);
                    _poller = Some(Poller::start(
                        sync.clone(),
                        Duration::from_secs(self.config.sync.poll_interval_secs),
                    ));
                }
                Some(Signal::AccountChanged { account }) => self.store.account_changed(account),
                Some(Signal::Reload) => return Ok(Exit::Reload),
                None => {}
            }
        }
    }

    async fn execute(&self, command: WalletCommand, fsm: &mut Onboarding) -> Option<Signal> {
        info!(?command, state = ?fsm.state(), "wallet command");
        match command {
            WalletCommand::Install => {
                info!(url = %fsm.install_url(), "install a wallet to continue");
                // pick up a wallet installed since startup
                if fsm.state() == OnboardingState::Uninstalled && self.wallet.detect().await {
                    return Some(Signal::Reload);
                }
                None
            }
            WalletCommand::Connect => {
                let accounts = self.authorize().await;
                fsm.accounts_changed(accounts)
            }
            WalletCommand::SwitchNetwork => {
                // the watcher reports the resulting chain change
                if let Err(e) = self.wallet.add_chain(fsm.target()).await {
                    warn!(error = %e, chain = %fsm.target().chain_name, "network switch failed");
                }
                None
            }
        }
    }

    async fn authorize(&self) -> Vec<Address> {
        match self.wallet.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) if e.is_user_rejection() => {
                info!("account authorization rejected");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "account authorization failed");
                Vec::new()
            }
        }
    }
}
