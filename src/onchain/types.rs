//! Run types read from the game contract.

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

/// Fixed-point scale of the `data` resource amount (18 decimals).
const DATA_UNIT: u128 = 1_000_000_000_000_000_000;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("log is missing topic {index}")]
    MissingTopic { index: usize },
    #[error("log topic0 {topic0} is not RunEnded")]
    UnexpectedEvent { topic0: B256 },
    #[error("runsById returned {len} bytes, expected at least 128")]
    ShortReturnData { len: usize },
    #[error("{field} value {value} does not fit in u64")]
    Overflow { field: &'static str, value: U256 },
}

/// A RunEnded event. Immutable once read from the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub run_id: U256,
    /// Runner token that performed the run.
    pub token_id: U256,
    pub owner: Address,
    pub block_number: u64,
    pub log_index: u64,
}

/// Raw words returned by `runsById`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRunRecord {
    pub notoriety_points: U256,
    /// Fixed point, 18 decimals.
    pub data: U256,
    pub start_time: U256,
    pub end_time: U256,
}

/// Derived per-run numbers. Runs never change on-chain, so a RunData is
/// valid forever once fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunData {
    pub notoriety_points: u64,
    /// Whole units of DATA, truncated.
    pub data: u64,
    pub start_time: u64,
    pub end_time: u64,
}

impl TryFrom<RawRunRecord> for RunData {
    type Error = DecodeError;

    fn try_from(raw: RawRunRecord) -> Result<Self, Self::Error> {
        Ok(RunData {
            notoriety_points: to_u64("notoriety_points", raw.notoriety_points)?,
            data: to_u64("data", raw.data / U256::from(DATA_UNIT))?,
            start_time: to_u64("start_time", raw.start_time)?,
            end_time: to_u64("end_time", raw.end_time)?,
        })
    }
}

fn to_u64(field: &'static str, value: U256) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::Overflow { field, value })
}
