//! Read-only access to the game contract over HTTP JSON-RPC.
//!
//! `GameContract` is the contract boundary the synchronizer works against:
//! head block, RunEnded logs in a block range, and the per-run record.
//! `RpcGameContract` implements it with an alloy HTTP provider.

use crate::onchain::abi;
use crate::onchain::types::{RawRunRecord, Run};

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Filter, TransactionInput, TransactionRequest};
use anyhow::Context;
use async_trait::async_trait;
use std::str::FromStr;
use tracing::{debug, warn};

#[async_trait]
pub trait GameContract: Send + Sync {
    /// Current chain head.
    async fn block_number(&self) -> anyhow::Result<u64>;

    /// RunEnded events in `[from_block, to_block]`, in on-chain order.
    async fn run_ended_logs(&self, from_block: u64, to_block: u64) -> anyhow::Result<Vec<Run>>;

    /// The stored record for a run.
    async fn runs_by_id(&self, run_id: U256) -> anyhow::Result<RawRunRecord>;
}

/// Game contract bound to an HTTP read provider.
pub struct RpcGameContract {
    provider: RootProvider,
    address: Address,
}

impl RpcGameContract {
    pub fn connect(rpc_url: &str, game_address: &str) -> anyhow::Result<Self> {
        let url = rpc_url
            .parse::<reqwest::Url>()
            .with_context(|| format!("invalid RPC URL {rpc_url}"))?;
        let address = Address::from_str(game_address)
            .with_context(|| format!("invalid game contract address {game_address}"))?;
        Ok(Self {
            provider: RootProvider::new_http(url),
            address,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl GameContract for RpcGameContract {
    async fn block_number(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn run_ended_logs(&self, from_block: u64, to_block: u64) -> anyhow::Result<Vec<Run>> {
        let filter = Filter::new()
            .address(self.address)
            .event_signature(abi::run_ended_topic())
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.provider.get_logs(&filter).await?;

        let mut runs = Vec::with_capacity(logs.len());
        for log in &logs {
            let block_number = log.block_number.unwrap_or(0);
            let log_index = log.log_index.unwrap_or(0);
            match abi::decode_run_ended(log.topics(), block_number, log_index) {
                Ok(run) => runs.push(run),
                Err(e) => warn!(error = %e, block = block_number, "skipping undecodable RunEnded log"),
            }
        }
        Ok(runs)
    }

    async fn runs_by_id(&self, run_id: U256) -> anyhow::Result<RawRunRecord> {
        let calldata = abi::encode_runs_by_id(run_id);
        let tx = TransactionRequest::default()
            .to(self.address)
            .input(TransactionInput::new(Bytes::from(calldata)));

        let output = self
            .provider
            .call(tx)
            .await
            .with_context(|| format!("runsById({run_id}) call failed"))?;
        Ok(abi::decode_runs_by_id(&output)?)
    }
}

/// Chain reader: every RunEnded event from the last `lookback_blocks` blocks
/// up to and including the current head.
///
/// The window is a fixed constant. If more runs end inside a refresh interval
/// than the window covers, the older ones are never seen.
pub async fn fetch_recent_runs<C>(contract: &C, lookback_blocks: u64) -> anyhow::Result<Vec<Run>>
where
    C: GameContract + ?Sized,
{
    let head = contract
        .block_number()
        .await
        .context("failed to fetch head block")?;
    let from_block = head.saturating_sub(lookback_blocks);

    let runs = contract
        .run_ended_logs(from_block, head)
        .await
        .with_context(|| format!("RunEnded query {from_block}..{head} failed"))?;

    debug!(from_block, to_block = head, runs = runs.len(), "fetched RunEnded events");
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct WindowRecorder {
        head: u64,
        window: Mutex<Option<(u64, u64)>>,
    }

    #[async_trait]
    impl GameContract for WindowRecorder {
        async fn block_number(&self) -> anyhow::Result<u64> {
            Ok(self.head)
        }

        async fn run_ended_logs(&self, from_block: u64, to_block: u64) -> anyhow::Result<Vec<Run>> {
            *self.window.lock().unwrap() = Some((from_block, to_block));
            Ok(Vec::new())
        }

        async fn runs_by_id(&self, _run_id: U256) -> anyhow::Result<RawRunRecord> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn test_window_ends_at_head() {
        let contract = WindowRecorder {
            head: 50_000,
            window: Mutex::new(None),
        };
        fetch_recent_runs(&contract, 10_000).await.unwrap();
        assert_eq!(*contract.window.lock().unwrap(), Some((40_000, 50_000)));
    }

    #[tokio::test]
    async fn test_window_saturates_near_genesis() {
        let contract = WindowRecorder {
            head: 300,
            window: Mutex::new(None),
        };
        fetch_recent_runs(&contract, 10_000).await.unwrap();
        assert_eq!(*contract.window.lock().unwrap(), Some((0, 300)));
    }

    #[test]
    fn test_connect_rejects_bad_address() {
        assert!(RpcGameContract::connect("https://polygon-rpc.com", "not-an-address").is_err());
        let contract = RpcGameContract::connect(
            "https://polygon-rpc.com",
            "0x9d0c114Ac1C3cD1276B0366160B3354ca0f9377E",
        )
        .unwrap();
        assert_eq!(
            contract.address(),
            Address::from_str("0x9d0c114Ac1C3cD1276B0366160B3354ca0f9377E").unwrap()
        );
    }
}
