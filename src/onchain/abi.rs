//! Game contract ABI: event topic, call selector, and word decoding.
//!
//! Only two items of the game contract are touched, so logs and eth_call
//! return data are decoded by hand from 32-byte words.

use crate::onchain::types::{DecodeError, RawRunRecord, Run};
use alloy::primitives::{keccak256, Address, B256, U256};

/// RunEnded(uint256 indexed runId, uint256 indexed tokenId, address indexed owner)
pub const RUN_ENDED_SIGNATURE: &str = "RunEnded(uint256,uint256,address)";

/// runsById(uint256) returns (notorietyPoints, data, startTime, endTime)
pub const RUNS_BY_ID_SIGNATURE: &str = "runsById(uint256)";

/// Number of 32-byte words in the runsById return tuple.
const RUNS_BY_ID_WORDS: usize = 4;

/// topic0 for RunEnded log filters.
pub fn run_ended_topic() -> B256 {
    keccak256(RUN_ENDED_SIGNATURE.as_bytes())
}

/// First four bytes of keccak256("runsById(uint256)").
pub fn runs_by_id_selector() -> [u8; 4] {
    let hash = keccak256(RUNS_BY_ID_SIGNATURE.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Calldata for `runsById(run_id)`: selector followed by the id as one word.
pub fn encode_runs_by_id(run_id: U256) -> Vec<u8> {
    let mut calldata = Vec::with_capacity(4 + 32);
    calldata.extend_from_slice(&runs_by_id_selector());
    calldata.extend_from_slice(&run_id.to_be_bytes::<32>());
    calldata
}

/// Decode a RunEnded log from its topics. All three arguments are indexed:
/// topics[1] = runId, topics[2] = tokenId, topics[3] = owner.
pub fn decode_run_ended(
    topics: &[B256],
    block_number: u64,
    log_index: u64,
) -> Result<Run, DecodeError> {
    let topic0 = topics.first().ok_or(DecodeError::MissingTopic { index: 0 })?;
    if *topic0 != run_ended_topic() {
        return Err(DecodeError::UnexpectedEvent { topic0: *topic0 });
    }

    let topic = |index: usize| {
        topics
            .get(index)
            .copied()
            .ok_or(DecodeError::MissingTopic { index })
    };

    let run_id = U256::from_be_bytes(topic(1)?.0);
    let token_id = U256::from_be_bytes(topic(2)?.0);
    let owner = Address::from_slice(&topic(3)?.0[12..]);

    Ok(Run {
        run_id,
        token_id,
        owner,
        block_number,
        log_index,
    })
}

/// Decode the eth_call return data of `runsById`.
pub fn decode_runs_by_id(data: &[u8]) -> Result<RawRunRecord, DecodeError> {
    if data.len() < RUNS_BY_ID_WORDS * 32 {
        return Err(DecodeError::ShortReturnData { len: data.len() });
    }

    Ok(RawRunRecord {
        notoriety_points: word(data, 0),
        data: word(data, 1),
        start_time: word(data, 2),
        end_time: word(data, 3),
    })
}

fn word(data: &[u8], index: usize) -> U256 {
    let start = index * 32;
    U256::from_be_slice(&data[start..start + 32])
}
