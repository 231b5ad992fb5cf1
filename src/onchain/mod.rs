//! On-chain access to the game contract on Polygon.
//!
//! - `abi`: RunEnded topic, runsById selector, hand-rolled word decoding
//! - `types`: `Run`, `RawRunRecord`, and the derived `RunData`
//! - `reader`: the `GameContract` boundary, its alloy HTTP implementation,
//!   and the bounded-window chain reader used by every refresh

pub mod abi;
pub mod reader;
pub mod types;

pub use reader::{fetch_recent_runs, GameContract, RpcGameContract};
pub use types::{DecodeError, RawRunRecord, Run, RunData};
