//! Wallet onboarding state machine.
//!
//! State is derived from three facts: is a wallet installed, which accounts
//! are authorized, and which chain is active. Every input returns an
//! optional `Signal` for the session to act on.
//!
//!   Uninstalled   no wallet answered
//!   Disconnected  wallet present, no authorized account
//!   Connecting    account authorized, chain not reported yet
//!   WrongNetwork  chain reported and not the target
//!   Connected     account authorized on the target chain
//!
//! `Signal::Connected` is emitted on the first entry into `Connected` and
//! never again for the lifetime of the machine.

use crate::wallet::network::NetworkParams;
use crate::wallet::provider::WalletEvent;

use alloy::primitives::Address;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingState {
    Uninstalled,
    Disconnected,
    Connecting,
    WrongNetwork,
    Connected,
}

/// What the user is being asked to do, with the data the action needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prompt {
    Install {
        message: String,
        install_url: String,
    },
    Connect {
        message: String,
    },
    SwitchNetwork {
        message: String,
        /// Chain the wallet is on right now
        chain_id: String,
        account: String,
        network: NetworkParams,
    },
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// First entry into Connected.
    Connected { account: Address },
    /// Active account changed after the first connection. `None` when every
    /// account was revoked.
    AccountChanged { account: Option<Address> },
    /// The wallet switched chains; tear the session down and start over.
    Reload,
}

#[derive(Debug)]
pub struct Onboarding {
    target: NetworkParams,
    install_url: String,
    installed: bool,
    accounts: Vec<Address>,
    chain_id: Option<String>,
    connected_fired: bool,
    reported_account: Option<Address>,
}

impl Onboarding {
    pub fn new(target: NetworkParams, install_url: impl Into<String>) -> Self {
        Self {
            target,
            install_url: install_url.into(),
            installed: false,
            accounts: Vec::new(),
            chain_id: None,
            connected_fired: false,
            reported_account: None,
        }
    }

    /// Record the result of wallet detection.
    pub fn mounted(&mut self, installed: bool) -> Option<Signal> {
        self.installed = installed;
        debug!(installed, "wallet detection finished");
        self.settle()
    }

    pub fn state(&self) -> OnboardingState {
        if !self.installed {
            return OnboardingState::Uninstalled;
        }
        if self.accounts.is_empty() {
            return OnboardingState::Disconnected;
        }
        match &self.chain_id {
            None => OnboardingState::Connecting,
            Some(chain_id) if !self.target.matches(chain_id) => OnboardingState::WrongNetwork,
            Some(_) => OnboardingState::Connected,
        }
    }

    pub fn account(&self) -> Option<Address> {
        self.accounts.first().copied()
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.chain_id.as_deref()
    }

    pub fn target(&self) -> &NetworkParams {
        &self.target
    }

    pub fn install_url(&self) -> &str {
        &self.install_url
    }

    /// Prompt for the current state. `Connecting` and `Connected` need no action.
    pub fn prompt(&self) -> Option<Prompt> {
        match self.state() {
            OnboardingState::Uninstalled => Some(Prompt::Install {
                message: "A JSON-RPC wallet is required to read your runs.".to_string(),
                install_url: self.install_url.clone(),
            }),
            OnboardingState::Disconnected => Some(Prompt::Connect {
                message: "Connect your wallet to continue.".to_string(),
            }),
            OnboardingState::WrongNetwork => Some(Prompt::SwitchNetwork {
                message: format!("Switch to the {} chain.", self.target.chain_name),
                chain_id: self.chain_id.clone().unwrap_or_default(),
                account: self
                    .account()
                    .map(|a| a.to_string())
                    .unwrap_or_default(),
                network: self.target.clone(),
            }),
            OnboardingState::Connecting | OnboardingState::Connected => None,
        }
    }

    pub fn accounts_changed(&mut self, accounts: Vec<Address>) -> Option<Signal> {
        debug!(accounts = accounts.len(), "accounts updated");
        self.accounts = accounts;
        self.settle()
    }

    /// The wallet's first connect notification, carrying the active chain.
    pub fn connect_notified(&mut self, chain_id: String) -> Option<Signal> {
        debug!(chain_id = %chain_id, "wallet connect notification");
        self.chain_id = Some(chain_id);
        self.settle()
    }

    pub fn chain_changed(&mut self, chain_id: String) -> Option<Signal> {
        info!(chain_id = %chain_id, "chain changed, session will reload");
        self.chain_id = Some(chain_id);
        Some(Signal::Reload)
    }

    pub fn handle(&mut self, event: WalletEvent) -> Option<Signal> {
        match event {
            WalletEvent::Connect { chain_id } => self.connect_notified(chain_id),
            WalletEvent::AccountsChanged(accounts) => self.accounts_changed(accounts),
            WalletEvent::ChainChanged(chain_id) => self.chain_changed(chain_id),
        }
    }

    fn settle(&mut self) -> Option<Signal> {
        let current = match self.state() {
            OnboardingState::Connected => self.account(),
            _ => None,
        };
        if current == self.reported_account {
            return None;
        }
        self.reported_account = current;

        match current {
            Some(account) if !self.connected_fired => {
                self.connected_fired = true;
                info!(account = %account, chain_id = %self.target.chain_id, "wallet connected");
                Some(Signal::Connected { account })
            }
            account => Some(Signal::AccountChanged { account }),
        }
    }
}
