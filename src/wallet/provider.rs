//! Wallet provider boundary.
//!
//! Wallets expose the EIP-1193 request methods over JSON-RPC (Frame serves
//! them on 127.0.0.1:1248). There is no push channel over HTTP, so account
//! and chain notifications are produced by a watcher task that polls
//! `eth_accounts` / `eth_chainId` and diffs the answers.

use crate::wallet::network::NetworkParams;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("wallet request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("wallet returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid wallet response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("wallet returned invalid address {0}")]
    InvalidAddress(String),
}

impl WalletError {
    /// EIP-1193 4001: the user rejected the request.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, WalletError::Rpc { code: 4001, .. })
    }
}

/// Notifications a wallet emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// The wallet became reachable; carries the active chain id.
    Connect { chain_id: String },
    AccountsChanged(Vec<Address>),
    ChainChanged(String),
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Whether a wallet answers at all.
    async fn detect(&self) -> bool;

    /// Already-authorized accounts (`eth_accounts`). Never prompts.
    async fn accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Ask the user to authorize accounts (`eth_requestAccounts`).
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Active chain id as a hex string (`eth_chainId`).
    async fn chain_id(&self) -> Result<String, WalletError>;

    /// Ask the wallet to add and switch to a network (`wallet_addEthereumChain`).
    async fn add_chain(&self, params: &NetworkParams) -> Result<(), WalletError>;
}

/// Wallet reached over HTTP JSON-RPC.
pub struct JsonRpcWallet {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl JsonRpcWallet {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp: RpcResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = resp.error {
            return Err(WalletError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(resp.result)
    }

    async fn request_addresses(&self, method: &str) -> Result<Vec<Address>, WalletError> {
        let raw: Vec<String> = serde_json::from_value(self.request(method, json!([])).await?)?;
        parse_addresses(raw)
    }
}

fn parse_addresses(raw: Vec<String>) -> Result<Vec<Address>, WalletError> {
    raw.into_iter()
        .map(|s| Address::from_str(&s).map_err(|_| WalletError::InvalidAddress(s)))
        .collect()
}

#[async_trait]
impl WalletProvider for JsonRpcWallet {
    async fn detect(&self) -> bool {
        match self.chain_id().await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.url, error = %e, "no wallet detected");
                false
            }
        }
    }

    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.request_addresses("eth_accounts").await
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        self.request_addresses("eth_requestAccounts").await
    }

    async fn chain_id(&self) -> Result<String, WalletError> {
        let chain_id: String = serde_json::from_value(self.request("eth_chainId", json!([])).await?)?;
        Ok(chain_id)
    }

    async fn add_chain(&self, params: &NetworkParams) -> Result<(), WalletError> {
        self.request("wallet_addEthereumChain", json!([params]))
            .await?;
        Ok(())
    }
}

/// Poll the wallet and forward changes as `WalletEvent`s.
///
/// The first successful `eth_chainId` produces `Connect`; later differences
/// produce `ChainChanged`. Account lists are diffed against `known_accounts`.
/// Stops when the receiver is dropped.
pub fn spawn_watcher(
    wallet: Arc<dyn WalletProvider>,
    known_accounts: Vec<Address>,
    interval: Duration,
    events: mpsc::UnboundedSender<WalletEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut chain_id: Option<String> = None;
        let mut accounts = known_accounts;

        loop {
            ticker.tick().await;

            match wallet.chain_id().await {
                Ok(current) => {
                    let event = match &chain_id {
                        None => Some(WalletEvent::Connect {
                            chain_id: current.clone(),
                        }),
                        Some(prev) if !prev.eq_ignore_ascii_case(&current) => {
                            info!(from = %prev, to = %current, "wallet chain changed");
                            Some(WalletEvent::ChainChanged(current.clone()))
                        }
                        Some(_) => None,
                    };
                    chain_id = Some(current);
                    if let Some(event) = event {
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => debug!(error = %e, "eth_chainId poll failed"),
            }

            match wallet.accounts().await {
                Ok(current) if current != accounts => {
                    debug!(accounts = current.len(), "wallet accounts changed");
                    accounts = current.clone();
                    if events.send(WalletEvent::AccountsChanged(current)).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "eth_accounts poll failed"),
            }

            if events.is_closed() {
                break;
            }
        }
        debug!("wallet watcher stopped");
    })
}
