//! Watched address pool
//!
//! A pool is the block of receive addresses derived from one master key,
//! from index 0 upwards. Re-derivation replaces the pool wholesale; since
//! derivation is deterministic, the same key always reproduces the same
//! prefix of addresses.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

use crate::address::{normalize_address, AddressCodec, DerivedAddress};
use crate::bytes::Bytes32;
use crate::config::ChainConfig;
use crate::error::ListenerError;
use crate::keys::MasterPublicKey;
use crate::requests::PaymentRequestRepository;
use crate::storage::{SettingsRepository, SettingsRepositoryExt};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPool {
    /// Compressed hex of the key the pool was derived from
    pub master_public_key: Option<String>,
    /// Bech32m prefix the addresses were encoded with
    #[serde(default)]
    pub address_prefix: Option<String>,
    pub addresses: Vec<DerivedAddress>,
    /// First index not yet derived
    pub next_index: u32,
}

impl AddressPool {
    pub fn derive_fresh(
        codec: &AddressCodec,
        master: &MasterPublicKey,
        count: u32,
    ) -> Result<Self, ListenerError> {
        let addresses = (0..count)
            .map(|index| codec.derive_address(master, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            master_public_key: Some(master.to_hex()),
            address_prefix: Some(codec.prefix().to_string()),
            addresses,
            next_index: count,
        })
    }

    /// Whether every address was encoded for `codec`'s network
    ///
    /// Pools stored without a prefix are checked address by address.
    pub fn matches_codec(&self, codec: &AddressCodec) -> bool {
        match &self.address_prefix {
            Some(prefix) => prefix == codec.prefix(),
            None => self.addresses.iter().all(|a| codec.decode(&a.address).is_ok()),
        }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        let address = normalize_address(address);
        self.addresses.iter().any(|a| a.address == address)
    }

    pub fn address_set(&self) -> HashSet<String> {
        self.addresses.iter().map(|a| a.address.clone()).collect()
    }

    pub fn puzzle_hashes(&self) -> Vec<Bytes32> {
        self.addresses.iter().map(|a| a.puzzle_hash).collect()
    }

    /// First address in pool order that is not reserved
    pub fn pick_available(&self, reserved: &HashSet<String>) -> Option<&DerivedAddress> {
        self.addresses
            .iter()
            .find(|a| !reserved.contains(&a.address))
    }
}

/// Owns the pool of one chain: persists it and publishes every
/// replacement to subscribers
pub struct AddressPoolManager {
    chain: ChainConfig,
    codec: AddressCodec,
    settings: Arc<dyn SettingsRepository>,
    pool: watch::Sender<Arc<AddressPool>>,
}

impl AddressPoolManager {
    /// Restore the persisted pool, or start empty
    pub fn load(
        chain: ChainConfig,
        settings: Arc<dyn SettingsRepository>,
    ) -> Result<Self, ListenerError> {
        let codec = chain.codec()?;
        let stored: Option<AddressPool> = settings.get_setting(&chain.address_pool_key())?;
        let pool = match stored {
            Some(pool) if !pool.matches_codec(&codec) => {
                log::warn!(
                    "Stored address pool for {} was encoded for another network, ignoring it",
                    chain.chain_id()
                );
                AddressPool::default()
            }
            stored => stored.unwrap_or_default(),
        };
        if !pool.is_empty() {
            log::info!(
                "Loaded {} watched addresses for {}",
                pool.len(),
                chain.chain_id()
            );
        }

        let (pool, _) = watch::channel(Arc::new(pool));
        Ok(Self {
            chain,
            codec,
            settings,
            pool,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AddressPool>> {
        self.pool.subscribe()
    }

    pub fn current(&self) -> Arc<AddressPool> {
        self.pool.borrow().clone()
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    /// Validate `master_key_hex` and derive `count` addresses from it
    ///
    /// The key is checked before anything is derived or persisted. The
    /// pool is only rebuilt when the key, the size or the network changed.
    pub fn configure(
        &self,
        master_key_hex: &str,
        count: u32,
    ) -> Result<Arc<AddressPool>, ListenerError> {
        let master = MasterPublicKey::parse(master_key_hex)?;

        let current = self.current();
        if current.master_public_key.as_deref() == Some(master.to_hex().as_str())
            && current.len() == count as usize
            && current.matches_codec(&self.codec)
        {
            log::debug!("Address pool for {} unchanged", self.chain.chain_id());
            return Ok(current);
        }

        let pool = AddressPool::derive_fresh(&self.codec, &master, count)?;
        self.settings
            .put_setting(&self.chain.address_pool_key(), &pool)?;

        log::info!(
            "Derived {} addresses for {} from {}",
            pool.len(),
            self.chain.chain_id(),
            master.to_hex()
        );

        let pool = Arc::new(pool);
        self.pool.send_replace(pool.clone());
        Ok(pool)
    }

    /// Pool addresses claimed by an active request
    pub async fn reserved_addresses(
        &self,
        requests: &dyn PaymentRequestRepository,
    ) -> Result<HashSet<String>, ListenerError> {
        let pool = self.current();
        let active = requests
            .list_monitored(&self.chain.chain_id(), Some(&pool.address_set()), true)
            .await?;
        Ok(active.into_iter().map(|r| r.destination).collect())
    }

    /// Address for a new request, `None` when every address is claimed
    pub async fn next_available(
        &self,
        requests: &dyn PaymentRequestRepository,
    ) -> Result<Option<DerivedAddress>, ListenerError> {
        let reserved = self.reserved_addresses(requests).await?;
        Ok(self.current().pick_available(&reserved).cloned())
    }
}
