use num_bigint::BigUint;
use std::collections::HashMap;
use std::sync::Arc;

use crate::address::{normalize_address, AddressCodec};
use crate::amount::Amount;
use crate::bytes::Bytes32;
use crate::config::ChainConfig;
use crate::error::ListenerError;
use crate::node::NodeRegistry;

/// Unspent balances of watched addresses
pub struct BalanceChecker {
    chain: ChainConfig,
    codec: AddressCodec,
    nodes: Arc<NodeRegistry>,
}

impl BalanceChecker {
    pub fn new(chain: ChainConfig, nodes: Arc<NodeRegistry>) -> Result<Self, ListenerError> {
        let codec = chain.codec()?;
        Ok(Self { chain, codec, nodes })
    }

    /// Sum of unspent coins per address, in the order given
    ///
    /// Addresses without coins report zero. An address that does not
    /// decode fails the whole call.
    pub async fn get_balances(
        &self,
        addresses: &[String],
    ) -> Result<Vec<(String, Amount)>, ListenerError> {
        let decoded = addresses
            .iter()
            .map(|address| {
                let address = normalize_address(address);
                self.codec.decode(&address).map(|hash| (address, hash))
            })
            .collect::<Result<Vec<(String, Bytes32)>, _>>()?;

        if decoded.is_empty() {
            return Ok(Vec::new());
        }

        let hashes: Vec<Bytes32> = decoded.iter().map(|(_, hash)| *hash).collect();
        let node = self.nodes.client(&self.chain.chain_id())?;
        let records = node.get_coin_records_by_puzzle_hashes(&hashes, false).await?;

        let mut totals: HashMap<Bytes32, BigUint> = HashMap::new();
        for record in records.iter().filter(|r| !r.spent) {
            *totals.entry(record.coin.puzzle_hash).or_default() += &record.coin.amount;
        }

        Ok(decoded
            .into_iter()
            .map(|(address, hash)| {
                let units = totals.get(&hash).cloned().unwrap_or_default();
                (address, Amount::from_units(units, self.chain.divisibility))
            })
            .collect())
    }
}
