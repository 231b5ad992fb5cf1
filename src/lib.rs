//! Library modules for the data-runs dashboard.
//!
//! The binary in `main.rs` wires these together; tests exercise them
//! directly.

pub mod config;
pub mod dashboard;
pub mod metadata;
pub mod onchain;
pub mod session;
pub mod store;
pub mod sync;
pub mod wallet;
