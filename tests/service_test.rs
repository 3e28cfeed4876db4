//! Service wiring and balance tests

mod common;

use chia_pay_listener::node::{Coin, CoinRecord};
use chia_pay_listener::{
    BalanceChecker, Bytes32, EventBus, InMemoryRequestRepository, ListenerConfig, ListenerError,
    ListenerService, MemorySettingsStore, ScannerTimings,
};
use common::{registry_with, test_chain, MockFullNode};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(temp_dir: &TempDir) -> ListenerConfig {
    ListenerConfig {
        chains: vec![test_chain()],
        data_dir: temp_dir.path().to_path_buf(),
        timings: ScannerTimings::immediate(),
    }
}

// ============================================================================
// Service
// ============================================================================

#[tokio::test]
async fn test_service_derives_pool_and_reports_health() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config(&temp_dir);
    let chain = config.chains[0].clone();
    let node = MockFullNode::new(1000);

    let service = ListenerService::start(
        &config,
        registry_with(&chain, node),
        Arc::new(MemorySettingsStore::new()),
        Arc::new(InMemoryRequestRepository::new()),
        EventBus::default(),
    )?;

    let handle = service.chain(&chain.chain_id()).unwrap();
    assert_eq!(handle.pool.current().len(), 3);

    let mut available = false;
    for _ in 0..200 {
        if service.is_available(&chain.chain_id()) {
            available = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(available);

    tokio::time::timeout(Duration::from_secs(5), service.shutdown()).await?;
    Ok(())
}

#[tokio::test]
async fn test_service_rejects_invalid_master_key() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config(&temp_dir);
    config.chains[0].master_public_key = Some("00".repeat(48));
    let chain = config.chains[0].clone();

    let result = ListenerService::start(
        &config,
        registry_with(&chain, MockFullNode::new(1000)),
        Arc::new(MemorySettingsStore::new()),
        Arc::new(InMemoryRequestRepository::new()),
        EventBus::default(),
    );

    assert!(matches!(result, Err(ListenerError::InvalidKey(_))));
}

// ============================================================================
// Balances
// ============================================================================

#[tokio::test]
async fn test_balances_sum_unspent_coins() -> anyhow::Result<()> {
    let chain = test_chain();
    let node = MockFullNode::new(1000);
    let codec = chain.codec()?;
    let watched = Bytes32::new([0x31; 32]);
    let empty = Bytes32::new([0x32; 32]);

    node.add_coin_record(CoinRecord::new(
        Coin::new(Bytes32::new([1; 32]), watched, 1_500_000_000_000u64),
        10,
    ));
    node.add_coin_record(CoinRecord::new(
        Coin::new(Bytes32::new([2; 32]), watched, 500_000_000_000u64),
        11,
    ));
    let mut spent = CoinRecord::new(Coin::new(Bytes32::new([3; 32]), watched, 9u64), 12);
    spent.spent = true;
    node.add_coin_record(spent);

    let checker = BalanceChecker::new(chain.clone(), registry_with(&chain, node))?;
    let addresses = vec![codec.encode(&watched)?, codec.encode(&empty)?.to_uppercase()];

    let balances = checker.get_balances(&addresses).await?;

    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].0, addresses[0]);
    assert_eq!(balances[0].1.to_string(), "2.000000000000");
    assert_eq!(balances[1].0, addresses[1].to_lowercase());
    assert_eq!(balances[1].1.to_string(), "0.000000000000");
    Ok(())
}

#[tokio::test]
async fn test_balances_reject_foreign_address() -> anyhow::Result<()> {
    let chain = test_chain();
    let checker = BalanceChecker::new(chain.clone(), registry_with(&chain, MockFullNode::new(1)))?;
    let testnet = chia_pay_listener::AddressCodec::testnet().encode(&Bytes32::new([5; 32]))?;

    let result = checker.get_balances(&[testnet]).await;

    assert!(matches!(result, Err(ListenerError::InvalidAddress(_))));
    Ok(())
}
