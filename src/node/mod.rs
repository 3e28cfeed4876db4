//! Full node interface
//!
//! - `FullNodeApi`: the four calls the listener needs from a node
//! - `FullNodeClient`: JSON-over-HTTPS implementation
//! - `NodeRegistry`: one client per configured chain, swapped atomically

mod http;
mod registry;

pub use http::FullNodeClient;
pub use registry::{NodeRegistry, NodeSnapshot};

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use crate::bytes::Bytes32;
use crate::error::NodeError;

/// Chain state as reported by the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainState {
    pub peak_height: u64,
    pub synced: bool,
    pub sync_progress_height: u64,
    pub sync_tip_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub height: u64,
    pub header_hash: Bytes32,
    pub is_transaction_block: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Coin {
    pub parent_coin_info: Bytes32,
    pub puzzle_hash: Bytes32,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: BigUint,
}

impl Coin {
    pub fn new(parent_coin_info: Bytes32, puzzle_hash: Bytes32, amount: impl Into<BigUint>) -> Self {
        Self {
            parent_coin_info,
            puzzle_hash,
            amount: amount.into(),
        }
    }

    /// `sha256(parent || puzzle_hash || amount)`, the amount encoded as a
    /// minimal signed big-endian integer
    pub fn coin_id(&self) -> Bytes32 {
        let mut hasher = Sha256::new();
        hasher.update(self.parent_coin_info.as_bytes());
        hasher.update(self.puzzle_hash.as_bytes());
        hasher.update(amount_bytes(&self.amount));
        Bytes32::new(hasher.finalize().into())
    }
}

fn amount_bytes(amount: &BigUint) -> Vec<u8> {
    if amount.bits() == 0 {
        return Vec::new();
    }
    let mut bytes = amount.to_bytes_be();
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    bytes
}

/// Accepts JSON numbers of any size as well as decimal strings
fn deserialize_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected an amount, got {}",
                other
            )))
        }
    };
    BigUint::from_str(&text).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoinRecord {
    pub coin: Coin,
    #[serde(default)]
    pub confirmed_block_index: u64,
    #[serde(default)]
    pub spent_block_index: u64,
    #[serde(default)]
    pub spent: bool,
    #[serde(default)]
    pub coinbase: bool,
    #[serde(default)]
    pub timestamp: u64,
}

impl CoinRecord {
    pub fn new(coin: Coin, confirmed_block_index: u64) -> Self {
        Self {
            coin,
            confirmed_block_index,
            spent_block_index: 0,
            spent: false,
            coinbase: false,
            timestamp: 0,
        }
    }

    pub fn coin_id(&self) -> Bytes32 {
        self.coin.coin_id()
    }
}

/// Coins created and spent by one block
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AdditionsAndRemovals {
    pub additions: Vec<CoinRecord>,
    pub removals: Vec<CoinRecord>,
}

#[async_trait]
pub trait FullNodeApi: Send + Sync {
    async fn get_chain_state(&self) -> Result<ChainState, NodeError>;

    /// Fails with `NodeError::NotFound` while the block is not produced yet
    async fn get_block_by_height(&self, height: u64) -> Result<BlockRecord, NodeError>;

    async fn get_additions_and_removals(
        &self,
        header_hash: &Bytes32,
    ) -> Result<AdditionsAndRemovals, NodeError>;

    async fn get_coin_records_by_puzzle_hashes(
        &self,
        puzzle_hashes: &[Bytes32],
        include_spent_coins: bool,
    ) -> Result<Vec<CoinRecord>, NodeError>;
}
