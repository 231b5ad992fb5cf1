//! In-memory state owner for the run dashboard.
//!
//! Everything the presentation layer reads lives here:
//!   SyncState                 → connection flag, account, last refresh, sorted runs, prompt
//!   run_cache[run_id]         → RunData    (never evicted)
//!   runner_cache[token_id]    → Runner     (never evicted, failures not cached)
//!
//! State changes go through one method per transition and are published on a
//! `tokio::sync::watch` channel, so a reader always sees a whole transition.
//! The caches only grow. A session touches a few thousand runs at most; a
//! chain-change reset drops everything.

use crate::metadata::Runner;
use crate::onchain::{Run, RunData};
use crate::wallet::Prompt;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// A run with whatever augmentation could be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedRun {
    pub run: Run,
    pub run_data: Option<RunData>,
    pub runner: Option<Runner>,
}

impl AugmentedRun {
    pub fn end_time(&self) -> Option<u64> {
        self.run_data.map(|d| d.end_time)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub connected: bool,
    pub account: Option<Address>,
    pub last_refresh: Option<DateTime<Utc>>,
    /// Sorted by end time, newest first.
    pub runs: Vec<AugmentedRun>,
    pub prompt: Option<Prompt>,
}

struct Inner {
    state: watch::Sender<SyncState>,
    run_cache: DashMap<U256, RunData>,
    runner_cache: DashMap<U256, Runner>,
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct RunStore {
    inner: Arc<Inner>,
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: watch::Sender::new(SyncState::default()),
                run_cache: DashMap::new(),
                runner_cache: DashMap::new(),
            }),
        }
    }

    // --- Transitions ---

    /// The wallet reached the target network with `account`.
    pub fn connected(&self, account: Address) {
        info!(account = %account, "store: connected");
        self.inner.state.send_modify(|s| {
            s.connected = true;
            s.account = Some(account);
            s.prompt = None;
        });
    }

    pub fn account_changed(&self, account: Option<Address>) {
        debug!(account = ?account, "store: account changed");
        self.inner.state.send_modify(|s| {
            s.connected = account.is_some();
            s.account = account;
        });
    }

    pub fn set_prompt(&self, prompt: Option<Prompt>) {
        self.inner.state.send_if_modified(|s| {
            if s.prompt == prompt {
                return false;
            }
            s.prompt = prompt;
            true
        });
    }

    /// Replace the run list and stamp the refresh time in one step.
    pub fn runs_refreshed(&self, runs: Vec<AugmentedRun>, at: DateTime<Utc>) {
        let count = runs.len();
        self.inner.state.send_modify(|s| {
            s.runs = runs;
            s.last_refresh = Some(at);
        });
        debug!(runs = count, "store: runs published");
    }

    pub fn store_run_data(&self, run_id: U256, data: RunData) {
        self.inner.run_cache.insert(run_id, data);
    }

    pub fn store_runner(&self, token_id: U256, runner: Runner) {
        self.inner.runner_cache.insert(token_id, runner);
    }

    /// Drop all state and both caches.
    pub fn reset(&self) {
        self.inner.run_cache.clear();
        self.inner.runner_cache.clear();
        self.inner.state.send_replace(SyncState::default());
        info!("store: reset");
    }

    // --- Selectors ---

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().connected
    }

    pub fn address(&self) -> Option<Address> {
        self.inner.state.borrow().account
    }

    pub fn runs(&self) -> Vec<AugmentedRun> {
        self.inner.state.borrow().runs.clone()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.state.borrow().last_refresh
    }

    pub fn prompt(&self) -> Option<Prompt> {
        self.inner.state.borrow().prompt.clone()
    }

    pub fn snapshot(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    pub fn cached_run_data(&self, run_id: U256) -> Option<RunData> {
        self.inner.run_cache.get(&run_id).map(|d| *d)
    }

    pub fn cached_runner(&self, token_id: U256) -> Option<Runner> {
        self.inner.runner_cache.get(&token_id).map(|r| r.clone())
    }

    pub fn cache_sizes(&self) -> (usize, usize) {
        (self.inner.run_cache.len(), self.inner.runner_cache.len())
    }

    /// Receiver that wakes on every published transition.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }
}
