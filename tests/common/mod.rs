//! Shared test fixtures: an in-memory full node and a scanner harness

#![allow(dead_code)]

use async_trait::async_trait;
use chia_pay_listener::node::{AdditionsAndRemovals, BlockRecord, ChainState, Coin, CoinRecord};
use chia_pay_listener::{
    AddressPoolManager, Bytes32, ChainConfig, ChainScanner, EventBus, FullNodeApi,
    InMemoryRequestRepository, ListenerEvent, MemorySettingsStore, Network, NodeError,
    NodeRegistry, ScannerTimings, SettingsRepository,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Compressed BLS12-381 G1 generator, a valid master key
pub const GENERATOR_HEX: &str = "97f1d3a73197d7942695638c4fa9ac0fc3688c4f9774b905a14e3a3f171bac586c55e83ff97a1aeffb3af00adb22c6bb";

/// 42 * generator
pub const MASTER_42_HEX: &str = "8ce3b57b791798433fd323753489cac9bca43b98deaafaed91f4cb010730ae1e38b186ccd37a09b8aed62ce23b699c48";

// ============================================================================
// Mock full node
// ============================================================================

#[derive(Default)]
struct MockChain {
    peak: u64,
    synced: bool,
    sync_progress_height: u64,
    sync_tip_height: u64,
    blocks: HashMap<u64, (BlockRecord, AdditionsAndRemovals)>,
    coin_records: Vec<CoinRecord>,
    unavailable: bool,
}

/// Full node answering from memory
#[derive(Default)]
pub struct MockFullNode {
    chain: Mutex<MockChain>,
    block_fetches: AtomicUsize,
    additions_fetches: AtomicUsize,
}

pub fn header_hash(height: u64) -> Bytes32 {
    let mut bytes = [0xbbu8; 32];
    bytes[24..].copy_from_slice(&height.to_be_bytes());
    Bytes32::new(bytes)
}

impl MockFullNode {
    pub fn new(peak: u64) -> Arc<Self> {
        let node = Self::default();
        {
            let mut chain = node.chain.lock().unwrap();
            chain.peak = peak;
            chain.synced = true;
        }
        Arc::new(node)
    }

    pub fn set_peak(&self, peak: u64) {
        self.chain.lock().unwrap().peak = peak;
    }

    pub fn set_syncing(&self, progress: u64, tip: u64) {
        let mut chain = self.chain.lock().unwrap();
        chain.synced = false;
        chain.sync_progress_height = progress;
        chain.sync_tip_height = tip;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.chain.lock().unwrap().unavailable = unavailable;
    }

    /// Transaction block with the given coin changes; raises the peak
    pub fn add_block(&self, height: u64, additions: Vec<CoinRecord>, removals: Vec<CoinRecord>) {
        self.insert_block(height, true, AdditionsAndRemovals { additions, removals });
    }

    pub fn add_non_transaction_block(&self, height: u64) {
        self.insert_block(height, false, AdditionsAndRemovals::default());
    }

    /// Transaction blocks carrying only a reward coin to an unwatched hash
    pub fn add_filler_blocks(&self, heights: std::ops::RangeInclusive<u64>) {
        for height in heights {
            let reward = Coin::new(header_hash(height), Bytes32::new([0xee; 32]), 250_000_000_000u64);
            self.add_block(height, vec![CoinRecord::new(reward, height)], vec![]);
        }
    }

    fn insert_block(&self, height: u64, is_transaction_block: bool, changes: AdditionsAndRemovals) {
        let mut chain = self.chain.lock().unwrap();
        let record = BlockRecord {
            height,
            header_hash: header_hash(height),
            is_transaction_block,
        };
        chain.blocks.insert(height, (record, changes));
        chain.peak = chain.peak.max(height);
    }

    pub fn add_coin_record(&self, record: CoinRecord) {
        self.chain.lock().unwrap().coin_records.push(record);
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    pub fn additions_fetches(&self) -> usize {
        self.additions_fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<std::sync::MutexGuard<'_, MockChain>, NodeError> {
        let chain = self.chain.lock().unwrap();
        if chain.unavailable {
            return Err(NodeError::Transport("connection refused".into()));
        }
        Ok(chain)
    }
}

#[async_trait]
impl FullNodeApi for MockFullNode {
    async fn get_chain_state(&self) -> Result<ChainState, NodeError> {
        let chain = self.check_available()?;
        Ok(ChainState {
            peak_height: chain.peak,
            synced: chain.synced,
            sync_progress_height: chain.sync_progress_height,
            sync_tip_height: chain.sync_tip_height,
        })
    }

    async fn get_block_by_height(&self, height: u64) -> Result<BlockRecord, NodeError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        let chain = self.check_available()?;
        chain
            .blocks
            .get(&height)
            .map(|(record, _)| record.clone())
            .ok_or_else(|| NodeError::NotFound(format!("Height not in blockchain: {}", height)))
    }

    async fn get_additions_and_removals(
        &self,
        header_hash: &Bytes32,
    ) -> Result<AdditionsAndRemovals, NodeError> {
        self.additions_fetches.fetch_add(1, Ordering::SeqCst);
        let chain = self.check_available()?;
        chain
            .blocks
            .values()
            .find(|(record, _)| &record.header_hash == header_hash)
            .map(|(_, changes)| changes.clone())
            .ok_or_else(|| NodeError::NotFound(format!("Record not found: {}", header_hash)))
    }

    async fn get_coin_records_by_puzzle_hashes(
        &self,
        puzzle_hashes: &[Bytes32],
        include_spent_coins: bool,
    ) -> Result<Vec<CoinRecord>, NodeError> {
        let chain = self.check_available()?;
        Ok(chain
            .coin_records
            .iter()
            .filter(|r| puzzle_hashes.contains(&r.coin.puzzle_hash))
            .filter(|r| include_spent_coins || !r.spent)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn test_chain() -> ChainConfig {
    let mut chain = ChainConfig::for_network(Network::Mainnet);
    chain.full_node_url = "http://127.0.0.1:1".to_string();
    chain.master_public_key = Some(GENERATOR_HEX.to_string());
    chain.address_pool_size = 3;
    chain
}

pub fn registry_with(chain: &ChainConfig, node: Arc<MockFullNode>) -> Arc<NodeRegistry> {
    let registry = NodeRegistry::new();
    let mut clients: HashMap<_, Arc<dyn FullNodeApi>> = HashMap::new();
    clients.insert(chain.chain_id(), node);
    registry.replace(clients);
    Arc::new(registry)
}

/// Coin paying `amount` to `puzzle_hash`, funded by a spent parent that
/// belonged to `sender`
pub fn payment_coins(puzzle_hash: Bytes32, amount: u64, sender: Bytes32) -> (CoinRecord, CoinRecord) {
    let parent = Coin::new(Bytes32::new([0x11; 32]), sender, amount + 1_000);
    let child = Coin::new(parent.coin_id(), puzzle_hash, amount);
    (CoinRecord::new(child, 0), CoinRecord::new(parent, 0))
}

/// Scanner wired to a mock node and in-memory collaborators
pub struct ScannerHarness {
    pub chain: ChainConfig,
    pub node: Arc<MockFullNode>,
    pub nodes: Arc<NodeRegistry>,
    pub settings: Arc<MemorySettingsStore>,
    pub requests: Arc<InMemoryRequestRepository>,
    pub pool: AddressPoolManager,
    pub events: EventBus,
    pub receiver: broadcast::Receiver<ListenerEvent>,
    pub scanner: ChainScanner,
    pub token: CancellationToken,
}

impl ScannerHarness {
    pub fn new(peak: u64) -> Self {
        let chain = test_chain();
        let node = MockFullNode::new(peak);
        let nodes = registry_with(&chain, node.clone());
        let settings = Arc::new(MemorySettingsStore::new());
        let requests = Arc::new(InMemoryRequestRepository::new());
        let events = EventBus::default();
        let receiver = events.subscribe();

        let pool = AddressPoolManager::load(chain.clone(), settings.clone() as Arc<dyn SettingsRepository>)
            .unwrap();
        pool.configure(GENERATOR_HEX, chain.address_pool_size).unwrap();

        let scanner = Self::scanner_for(&chain, &nodes, &settings, &requests, &pool, &events);

        Self {
            chain,
            node,
            nodes,
            settings,
            requests,
            pool,
            events,
            receiver,
            scanner,
            token: CancellationToken::new(),
        }
    }

    /// Harness whose cursor is already initialised at `peak`
    pub async fn started(peak: u64) -> Self {
        let mut harness = Self::new(peak);
        harness.scanner.initialize(&harness.token).await.unwrap();
        harness
    }

    fn scanner_for(
        chain: &ChainConfig,
        nodes: &Arc<NodeRegistry>,
        settings: &Arc<MemorySettingsStore>,
        requests: &Arc<InMemoryRequestRepository>,
        pool: &AddressPoolManager,
        events: &EventBus,
    ) -> ChainScanner {
        ChainScanner::new(
            chain.clone(),
            nodes.clone(),
            settings.clone(),
            requests.clone(),
            pool.subscribe(),
            events.clone(),
            ScannerTimings::immediate(),
        )
        .unwrap()
    }

    /// Fresh scanner over the same state, as after a restart
    pub fn restart(&mut self) {
        self.scanner = Self::scanner_for(
            &self.chain,
            &self.nodes,
            &self.settings,
            &self.requests,
            &self.pool,
            &self.events,
        );
    }

    pub fn address(&self, index: usize) -> String {
        self.pool.current().addresses[index].address.clone()
    }

    pub fn puzzle_hash(&self, index: usize) -> Bytes32 {
        self.pool.current().addresses[index].puzzle_hash
    }

    pub fn drain_events(&mut self) -> Vec<ListenerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}
