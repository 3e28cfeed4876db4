//! Chia Pay Listener: payment detection for XCH receive addresses
//!
//! Derives a pool of receive addresses from a master public key, walks the
//! chain block by block through a full node, and matches newly created
//! coins against pending payment requests until they collect enough
//! confirmations to settle.
//!
//! # Architecture
//!
//! - **Keys and addresses**: unhardened BLS12-381 derivation, synthetic
//!   keys, standard puzzle hashing and bech32m encoding
//! - **Chain scanner**: sequential block walker with a persisted cursor
//! - **Health tracker**: node sync status and availability notifications
//! - **Address pool**: derived addresses and which of them are claimed
//!
//! # Example
//!
//! ```ignore
//! use chia_pay_listener::{AddressCodec, MasterPublicKey};
//!
//! let master = MasterPublicKey::parse(&master_key_hex)?;
//! let first = AddressCodec::mainnet().derive_address(&master, 0)?;
//! println!("{}", first.address);
//! ```

// Public modules
pub mod address;
pub mod amount;
pub mod balance;
pub mod bytes;
pub mod clvm;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod events;
pub mod health;
pub mod keys;
pub mod node;
pub mod pool;
pub mod requests;
pub mod scanner;
pub mod service;
pub mod storage;
pub mod task;

// Re-exports for convenience
pub use address::{AddressCodec, DerivedAddress, DEFAULT_HIDDEN_PUZZLE_HASH};
pub use amount::Amount;
pub use balance::BalanceChecker;
pub use bytes::Bytes32;
pub use config::{ChainConfig, ChainId, ListenerConfig, Network, ScannerTimings};
pub use confirmation::{ConfirmationPolicy, SpeedPolicy};
pub use error::{ListenerError, NodeError, StorageError};
pub use events::{EventBus, ListenerEvent};
pub use health::{ChainHealthTracker, SyncSummary};
pub use keys::{MasterPublicKey, PublicKey};
pub use node::{FullNodeApi, FullNodeClient, NodeRegistry};
pub use pool::{AddressPool, AddressPoolManager};
pub use requests::{
    InMemoryRequestRepository, Payment, PaymentRecord, PaymentRequestRepository, PaymentStatus,
    PendingRequest, RequestStatus,
};
pub use scanner::{ChainScanner, ScannerState, StepOutcome};
pub use service::{ChainHandle, ListenerService};
pub use storage::{FileSettingsStore, MemorySettingsStore, ScanCursor, SettingsRepository};

// Common result type
pub type Result<T> = std::result::Result<T, ListenerError>;
