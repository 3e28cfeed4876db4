use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{FullNodeApi, FullNodeClient};
use crate::config::{ChainConfig, ChainId};
use crate::error::ListenerError;

/// Immutable set of node clients, one per chain
pub struct NodeSnapshot {
    pub version: u64,
    clients: HashMap<ChainId, Arc<dyn FullNodeApi>>,
}

impl NodeSnapshot {
    pub fn client(&self, chain: &ChainId) -> Option<Arc<dyn FullNodeApi>> {
        self.clients.get(chain).cloned()
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainId> {
        self.clients.keys()
    }
}

/// Lookup table of node clients
///
/// Reconfiguration builds a complete new snapshot and swaps it in; a
/// snapshot is never changed once published, so holders of an older one
/// keep a consistent view until they fetch again.
pub struct NodeRegistry {
    current: RwLock<Arc<NodeSnapshot>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(NodeSnapshot {
                version: 0,
                clients: HashMap::new(),
            })),
        }
    }

    pub fn from_config(chains: &[ChainConfig]) -> Result<Self, ListenerError> {
        let registry = Self::new();
        registry.reload_from_config(chains)?;
        Ok(registry)
    }

    /// Build HTTP clients for every chain and publish them as a new snapshot
    pub fn reload_from_config(&self, chains: &[ChainConfig]) -> Result<u64, ListenerError> {
        let mut clients: HashMap<ChainId, Arc<dyn FullNodeApi>> = HashMap::new();
        for chain in chains {
            let client = FullNodeClient::new(chain.full_node_url.clone())?;
            clients.insert(chain.chain_id(), Arc::new(client));
        }
        Ok(self.replace(clients))
    }

    /// Publish `clients` as the new snapshot and return its version
    pub fn replace(&self, clients: HashMap<ChainId, Arc<dyn FullNodeApi>>) -> u64 {
        let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
        let version = current.version + 1;
        *current = Arc::new(NodeSnapshot { version, clients });
        log::info!("Node registry updated to version {}", version);
        version
    }

    pub fn snapshot(&self) -> Arc<NodeSnapshot> {
        self.current.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn client(&self, chain: &ChainId) -> Result<Arc<dyn FullNodeApi>, ListenerError> {
        self.snapshot()
            .client(chain)
            .ok_or_else(|| ListenerError::UnknownChain(chain.to_string()))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
