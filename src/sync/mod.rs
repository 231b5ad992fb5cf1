//! Run synchronization: chain read → augmentation → sort → publish.
//!
//! `Synchronizer::refresh_all_runs` is the whole pipeline. `Poller` drives
//! it on a timer, first tick immediately.

use crate::config::OverlapPolicy;
use crate::metadata::{fetch_run_data, RunnerClient};
use crate::onchain::{fetch_recent_runs, GameContract, Run};
use crate::store::{AugmentedRun, RunStore};

use chrono::Utc;
use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No contract bound yet; nothing was read or written.
    NotBound,
    /// Another refresh was in flight.
    Skipped,
    Published { runs: usize },
}

pub struct Synchronizer {
    store: RunStore,
    contract: RwLock<Option<Arc<dyn GameContract>>>,
    runners: Option<RunnerClient>,
    lookback_blocks: u64,
    max_runs: Option<usize>,
    overlap: OverlapPolicy,
    in_flight: AtomicBool,
}

/// Holds the single-flight flag for the duration of one refresh.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Synchronizer {
    pub fn new(
        store: RunStore,
        runners: Option<RunnerClient>,
        lookback_blocks: u64,
        max_runs: Option<usize>,
        overlap: OverlapPolicy,
    ) -> Self {
        Self {
            store,
            contract: RwLock::new(None),
            runners,
            lookback_blocks,
            max_runs,
            overlap,
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn bind(&self, contract: Arc<dyn GameContract>) {
        *self.contract.write().await = Some(contract);
        debug!("game contract bound");
    }

    pub async fn unbind(&self) {
        *self.contract.write().await = None;
    }

    pub async fn is_bound(&self) -> bool {
        self.contract.read().await.is_some()
    }

    /// Read recent runs, augment them concurrently, sort newest-first and
    /// publish the list with a timestamp.
    ///
    /// Any run-data failure aborts the refresh and leaves the published list
    /// as it was. Runner lookups never fail.
    pub async fn refresh_all_runs(&self) -> anyhow::Result<RefreshOutcome> {
        let Some(contract) = self.contract.read().await.clone() else {
            debug!("refresh skipped, no contract bound");
            return Ok(RefreshOutcome::NotBound);
        };

        let _guard = match self.overlap {
            OverlapPolicy::Skip => match InFlightGuard::acquire(&self.in_flight) {
                Some(guard) => Some(guard),
                None => {
                    debug!("refresh already in flight, skipping");
                    return Ok(RefreshOutcome::Skipped);
                }
            },
            OverlapPolicy::Race => None,
        };

        let started = Instant::now();
        let mut runs = fetch_recent_runs(contract.as_ref(), self.lookback_blocks).await?;

        if let Some(max) = self.max_runs {
            runs.reverse();
            runs.truncate(max);
        }

        let mut augmented = try_join_all(
            runs.into_iter()
                .map(|run| self.augment_run(contract.as_ref(), run)),
        )
        .await?;
        sort_by_end_time_desc(&mut augmented);

        let count = augmented.len();
        self.store.runs_refreshed(augmented, Utc::now());
        info!(
            runs = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "runs refreshed"
        );
        Ok(RefreshOutcome::Published { runs: count })
    }

    async fn augment_run(
        &self,
        contract: &dyn GameContract,
        run: Run,
    ) -> anyhow::Result<AugmentedRun> {
        let run_id = run.run_id;
        let token_id = run.token_id;

        let runner = async {
            match &self.runners {
                Some(client) => client.fetch_runner(&self.store, token_id).await,
                None => None,
            }
        };
        let (run_data, runner) =
            tokio::join!(fetch_run_data(&self.store, Some(contract), run_id), runner);

        Ok(AugmentedRun {
            run,
            run_data: run_data?,
            runner,
        })
    }
}

/// Newest end time first. Runs with no data go last.
pub fn sort_by_end_time_desc(runs: &mut [AugmentedRun]) {
    runs.sort_by(|a, b| b.end_time().cmp(&a.end_time()));
}

/// Timer task calling `refresh_all_runs`. Dropping the poller stops the
/// timer and aborts refreshes it started.
pub struct Poller {
    handle: tokio::task::JoinHandle<()>,
}

impl Poller {
    pub fn start(sync: Arc<Synchronizer>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut refreshes = JoinSet::new();

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let sync = sync.clone();
                        refreshes.spawn(async move { sync.refresh_all_runs().await });
                    }
                    Some(done) = refreshes.join_next() => match done {
                        Ok(Ok(outcome)) => debug!(?outcome, "refresh finished"),
                        Ok(Err(e)) => warn!(error = %format!("{e:#}"), "refresh failed, retrying next tick"),
                        Err(e) => warn!(error = %e, "refresh task panicked"),
                    },
                }
            }
        });
        info!(period_secs = period.as_secs(), "poller started");
        Self { handle }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
