/// Listener configuration from environment variables
///
/// Controls which Chia network is watched, the full node endpoint, the
/// address pool and confirmation thresholds. Defaults to mainnet.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::address::{AddressCodec, MAINNET_PREFIX, TESTNET_PREFIX};
use crate::confirmation::ConfirmationPolicy;
use crate::error::ListenerError;

pub const CHAIN_NAME: &str = "Chia";
pub const XCH_CURRENCY: &str = "XCH";
pub const DEFAULT_DIVISIBILITY: u32 = 12;
pub const DEFAULT_POOL_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

/// Identifies one watched chain configuration (`"{currency}-{chain}"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Loop intervals
///
/// The defaults are the production values; tests zero them out.
#[derive(Debug, Clone)]
pub struct ScannerTimings {
    /// Delay between checks while no request is pending
    pub idle_poll: Duration,
    /// Delay before retrying a block that is missing or reported empty
    pub block_retry: Duration,
    /// How long a block may stay missing before a warning is logged
    pub not_found_warning: Duration,
    /// Delay after a failed iteration before re-initialising
    pub error_backoff: Duration,
    /// Interval between node health polls
    pub health_poll: Duration,
    /// Retries for a transaction block that reports no additions before it
    /// is accepted as empty
    pub empty_block_retries: u32,
}

impl ScannerTimings {
    pub fn immediate() -> Self {
        Self {
            idle_poll: Duration::ZERO,
            block_retry: Duration::ZERO,
            not_found_warning: Duration::ZERO,
            error_backoff: Duration::ZERO,
            health_poll: Duration::ZERO,
            empty_block_retries: 3,
        }
    }
}

impl Default for ScannerTimings {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_secs(30),
            block_retry: Duration::from_secs(5),
            not_found_warning: Duration::from_secs(120),
            error_backoff: Duration::from_secs(10),
            health_poll: Duration::from_secs(10),
            empty_block_retries: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub network: Network,
    pub currency: String,
    pub chain_name: String,
    pub display_name: String,
    pub divisibility: u32,
    /// Full node RPC base URL
    pub full_node_url: String,
    pub address_prefix: String,
    /// Explorer URL with `{0}` where the coin id goes
    pub block_explorer_link: String,
    pub address_pool_size: u32,
    pub confirmations: ConfirmationPolicy,
    pub master_public_key: Option<String>,
}

impl ChainConfig {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self {
                network,
                currency: XCH_CURRENCY.to_string(),
                chain_name: CHAIN_NAME.to_string(),
                display_name: format!("{} on {}", XCH_CURRENCY, CHAIN_NAME),
                divisibility: DEFAULT_DIVISIBILITY,
                full_node_url: "https://api.coinset.org".to_string(),
                address_prefix: MAINNET_PREFIX.to_string(),
                block_explorer_link: "https://www.spacescan.io/coin/{0}".to_string(),
                address_pool_size: DEFAULT_POOL_SIZE,
                confirmations: ConfirmationPolicy::default(),
                master_public_key: None,
            },
            Network::Testnet => Self {
                network,
                currency: XCH_CURRENCY.to_string(),
                chain_name: CHAIN_NAME.to_string(),
                display_name: format!("{} on {} Testnet", XCH_CURRENCY, CHAIN_NAME),
                divisibility: DEFAULT_DIVISIBILITY,
                full_node_url: "https://testnet11.api.coinset.org".to_string(),
                address_prefix: TESTNET_PREFIX.to_string(),
                block_explorer_link: "https://testnet11.spacescan.io/coin/{0}".to_string(),
                address_pool_size: DEFAULT_POOL_SIZE,
                confirmations: ConfirmationPolicy::default(),
                master_public_key: None,
            },
        }
    }

    /// `"XCH-Chia"` on mainnet, `"XCH-Chia-Testnet"` on testnet
    pub fn chain_id(&self) -> ChainId {
        match self.network {
            Network::Mainnet => ChainId::new(format!("{}-{}", self.currency, self.chain_name)),
            Network::Testnet => {
                ChainId::new(format!("{}-{}-Testnet", self.currency, self.chain_name))
            }
        }
    }

    /// Prefix for every persisted setting of this chain
    ///
    /// Each network keeps its own cursor and pool.
    pub fn setting_prefix(&self) -> String {
        match self.network {
            Network::Mainnet => format!("{}_{}", self.currency, self.chain_name),
            Network::Testnet => format!("{}_{}_Testnet", self.currency, self.chain_name),
        }
    }

    pub fn listener_state_key(&self) -> String {
        format!("{}_LISTENER_STATE", self.setting_prefix())
    }

    pub fn address_pool_key(&self) -> String {
        format!("{}_ADDRESS_POOL", self.setting_prefix())
    }

    pub fn codec(&self) -> Result<AddressCodec, ListenerError> {
        AddressCodec::new(&self.address_prefix)
    }

    /// Explorer link for a coin id
    pub fn transaction_link(&self, coin_id: &str) -> String {
        self.block_explorer_link
            .replace("{0}", &crate::bytes::normalize_hex(coin_id))
    }
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub chains: Vec<ChainConfig>,
    pub data_dir: PathBuf,
    pub timings: ScannerTimings,
}

impl ListenerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CHIA_NETWORK`: "mainnet" (default) or "testnet"
    /// - `CHIA_FULL_NODE_URL`: full node RPC endpoint (optional)
    /// - `CHIA_MASTER_PUBLIC_KEY`: master public key to derive addresses from
    /// - `CHIA_ADDRESS_POOL_SIZE`: number of addresses to derive (default 100)
    /// - `CHIA_CONFIRMATION_THRESHOLDS`: `high,medium,lowmedium,low`
    /// - `LISTENER_DATA_DIR`: where settings are persisted
    ///
    /// # Examples
    ///
    /// ```bash
    /// CHIA_NETWORK=testnet CHIA_MASTER_PUBLIC_KEY=97f1... cargo run
    /// ```
    pub fn from_env() -> Result<Self, ListenerError> {
        dotenv::dotenv().ok();

        let network_str = env::var("CHIA_NETWORK")
            .unwrap_or_else(|_| "mainnet".to_string())
            .to_lowercase();

        let network = match network_str.as_str() {
            "testnet" | "testnet11" => {
                log::info!("Using TESTNET network");
                Network::Testnet
            }
            "mainnet" | "" => {
                log::info!("Using MAINNET network");
                Network::Mainnet
            }
            other => {
                log::warn!("Unknown network '{}', defaulting to mainnet", other);
                Network::Mainnet
            }
        };

        let mut chain = ChainConfig::for_network(network);

        if let Ok(url) = env::var("CHIA_FULL_NODE_URL") {
            chain.full_node_url = url;
        }
        log::info!("Full node URL: {}", chain.full_node_url);

        chain.master_public_key = env::var("CHIA_MASTER_PUBLIC_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        if let Ok(size) = env::var("CHIA_ADDRESS_POOL_SIZE") {
            chain.address_pool_size = size.parse().map_err(|_| {
                ListenerError::Config(format!("CHIA_ADDRESS_POOL_SIZE is not a number: {}", size))
            })?;
        }

        if let Ok(thresholds) = env::var("CHIA_CONFIRMATION_THRESHOLDS") {
            chain.confirmations = ConfirmationPolicy::from_csv(&thresholds).ok_or_else(|| {
                ListenerError::Config(format!(
                    "CHIA_CONFIRMATION_THRESHOLDS must be four comma separated numbers: {}",
                    thresholds
                ))
            })?;
        }

        let data_dir = env::var("LISTENER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./listener-data"));

        Ok(Self {
            chains: vec![chain],
            data_dir,
            timings: ScannerTimings::default(),
        })
    }
}

impl Default for ListenerConfig {
    /// Default configuration (mainnet)
    fn default() -> Self {
        Self {
            chains: vec![ChainConfig::for_network(Network::Mainnet)],
            data_dir: PathBuf::from("./listener-data"),
            timings: ScannerTimings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_mainnet() {
        let config = ListenerConfig::default();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].network, Network::Mainnet);
        assert_eq!(config.chains[0].address_prefix, "xch");
    }

    #[test]
    fn test_keys_and_ids() {
        let chain = ChainConfig::for_network(Network::Mainnet);
        assert_eq!(chain.chain_id().as_str(), "XCH-Chia");
        assert_eq!(chain.listener_state_key(), "XCH_Chia_LISTENER_STATE");
        assert_eq!(chain.address_pool_key(), "XCH_Chia_ADDRESS_POOL");
        assert_eq!(chain.codec().unwrap().prefix(), "xch");
    }

    #[test]
    fn test_testnet_keeps_separate_state() {
        let mainnet = ChainConfig::for_network(Network::Mainnet);
        let testnet = ChainConfig::for_network(Network::Testnet);
        assert_eq!(testnet.chain_id().as_str(), "XCH-Chia-Testnet");
        assert_eq!(testnet.listener_state_key(), "XCH_Chia_Testnet_LISTENER_STATE");
        assert_eq!(testnet.address_pool_key(), "XCH_Chia_Testnet_ADDRESS_POOL");
        assert_ne!(testnet.chain_id(), mainnet.chain_id());
        assert_eq!(testnet.codec().unwrap().prefix(), "txch");
    }

    #[test]
    fn test_transaction_link() {
        let chain = ChainConfig::for_network(Network::Mainnet);
        assert_eq!(
            chain.transaction_link("0xABCD"),
            "https://www.spacescan.io/coin/abcd"
        );
    }
}
