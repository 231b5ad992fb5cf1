//! Per-run augmentation: on-chain `RunData` and runner metadata, both
//! cache-first against the `RunStore`.

pub mod runner;

pub use runner::{Runner, RunnerClient};

use crate::onchain::{GameContract, RunData};
use crate::store::RunStore;

use alloy::primitives::U256;
use anyhow::Context;
use tracing::debug;

/// Resolve a run's `RunData`.
///
/// A cached value is returned without touching the network. On a miss the
/// record is read with one `runsById` call, converted, and cached. Without
/// a bound contract there is nothing to read from and the result is `None`.
pub async fn fetch_run_data(
    store: &RunStore,
    contract: Option<&dyn GameContract>,
    run_id: U256,
) -> anyhow::Result<Option<RunData>> {
    if let Some(data) = store.cached_run_data(run_id) {
        return Ok(Some(data));
    }
    let Some(contract) = contract else {
        return Ok(None);
    };

    let raw = contract.runs_by_id(run_id).await?;
    let data = RunData::try_from(raw).with_context(|| format!("run {run_id} record"))?;
    store.store_run_data(run_id, data);
    debug!(run_id = %run_id, end_time = data.end_time, "run data cached");
    Ok(Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onchain::{RawRunRecord, Run};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingContract {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GameContract for CountingContract {
        async fn block_number(&self) -> anyhow::Result<u64> {
            Ok(0)
        }

        async fn run_ended_logs(&self, _from: u64, _to: u64) -> anyhow::Result<Vec<Run>> {
            Ok(Vec::new())
        }

        async fn runs_by_id(&self, run_id: U256) -> anyhow::Result<RawRunRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawRunRecord {
                notoriety_points: U256::from(3u64),
                data: U256::from(42_900_000_000_000_000_000u128),
                start_time: run_id,
                end_time: run_id + U256::from(60u64),
            })
        }
    }

    #[tokio::test]
    async fn test_cache_hit_skips_contract() {
        let store = RunStore::new();
        let contract = CountingContract {
            calls: AtomicUsize::new(0),
        };

        let first = fetch_run_data(&store, Some(&contract), U256::from(1000u64))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.data, 42);
        assert_eq!(first.end_time, 1060);
        assert_eq!(contract.calls.load(Ordering::SeqCst), 1);

        let second = fetch_run_data(&store, Some(&contract), U256::from(1000u64))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(contract.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_value_served_without_contract() {
        let store = RunStore::new();
        let cached = RunData {
            notoriety_points: 1,
            data: 2,
            start_time: 3,
            end_time: 4,
        };
        store.store_run_data(U256::from(9u64), cached);

        let data = fetch_run_data(&store, None, U256::from(9u64)).await.unwrap();
        assert_eq!(data, Some(cached));
    }

    #[tokio::test]
    async fn test_no_contract_yields_none() {
        let store = RunStore::new();
        let data = fetch_run_data(&store, None, U256::from(9u64)).await.unwrap();
        assert!(data.is_none());
        assert_eq!(store.cache_sizes(), (0, 0));
    }
}
