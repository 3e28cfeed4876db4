//! Listener service
//!
//! Wires one health tracker and one scanner per configured chain onto a
//! shared cancellation token.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ChainConfig, ChainId, ListenerConfig};
use crate::error::ListenerError;
use crate::events::{EventBus, ListenerEvent};
use crate::health::{ChainHealthTracker, SyncSummary};
use crate::node::NodeRegistry;
use crate::pool::AddressPoolManager;
use crate::requests::PaymentRequestRepository;
use crate::scanner::ChainScanner;
use crate::storage::SettingsRepository;

/// Handles for one watched chain
pub struct ChainHandle {
    pub config: ChainConfig,
    pub pool: Arc<AddressPoolManager>,
    pub health: watch::Receiver<Option<SyncSummary>>,
}

pub struct ListenerService {
    token: CancellationToken,
    events: EventBus,
    chains: HashMap<ChainId, ChainHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerService {
    /// Configure every chain and spawn its loops
    ///
    /// A configured master key is validated and expanded into the address
    /// pool before anything is spawned, so an invalid key fails here.
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: &ListenerConfig,
        nodes: Arc<NodeRegistry>,
        settings: Arc<dyn SettingsRepository>,
        requests: Arc<dyn PaymentRequestRepository>,
        events: EventBus,
    ) -> Result<Self, ListenerError> {
        let mut prepared = Vec::new();
        for chain in &config.chains {
            let pool = Arc::new(AddressPoolManager::load(chain.clone(), settings.clone())?);
            if let Some(key) = &chain.master_public_key {
                pool.configure(key, chain.address_pool_size)?;
            }

            let health = ChainHealthTracker::new(
                chain.clone(),
                nodes.clone(),
                settings.clone(),
                events.clone(),
                config.timings.health_poll,
            );
            let scanner = ChainScanner::new(
                chain.clone(),
                nodes.clone(),
                settings.clone(),
                requests.clone(),
                pool.subscribe(),
                events.clone(),
                config.timings.clone(),
            )?;
            prepared.push((chain.clone(), pool, health, scanner));
        }

        let token = CancellationToken::new();
        let mut chains = HashMap::new();
        let mut tasks = Vec::new();

        for (chain, pool, health, scanner) in prepared {
            let handle = ChainHandle {
                config: chain.clone(),
                pool,
                health: health.subscribe(),
            };
            tasks.push(tokio::spawn(health.run(token.child_token())));
            tasks.push(tokio::spawn(scanner.run(token.child_token())));
            log::info!("Listening on {}", chain.display_name);
            chains.insert(chain.chain_id(), handle);
        }

        Ok(Self {
            token,
            events,
            chains,
            tasks,
        })
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ListenerEvent> {
        self.events.subscribe()
    }

    pub fn chain(&self, chain: &ChainId) -> Option<&ChainHandle> {
        self.chains.get(chain)
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainHandle> {
        self.chains.values()
    }

    pub fn sync_summary(&self, chain: &ChainId) -> Option<SyncSummary> {
        self.chains
            .get(chain)
            .and_then(|handle| handle.health.borrow().clone())
    }

    pub fn is_available(&self, chain: &ChainId) -> bool {
        self.sync_summary(chain).map_or(false, |s| s.is_available())
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel every loop and wait for them to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Listener task failed: {}", e);
            }
        }
        log::info!("Listener stopped");
    }
}
