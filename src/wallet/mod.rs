pub mod network;
pub mod onboarding;
pub mod provider;

pub use network::NetworkParams;
pub use onboarding::{Onboarding, OnboardingState, Prompt, Signal};
pub use provider::{spawn_watcher, JsonRpcWallet, WalletError, WalletEvent, WalletProvider};
