//! Error types for the payment listener
//!
//! Configuration-time failures (`InvalidKey`, `InvalidAddress`) are surfaced
//! to the caller. Node and storage failures are recovered inside the scan
//! and health loops and only ever show up as an availability flip.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Invalid master public key: {0}")]
    InvalidKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Request repository error: {0}")]
    Repository(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No node client configured for chain {0}")]
    UnknownChain(String),

    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    /// The node has not produced the requested record yet
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid response from node: {0}")]
    InvalidResponse(String),
}

impl NodeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, NodeError::NotFound(_))
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            NodeError::InvalidResponse(e.to_string())
        } else {
            NodeError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ListenerError {
    /// True when the failure came from the node not having the record yet
    pub fn is_not_found(&self) -> bool {
        matches!(self, ListenerError::Node(e) if e.is_not_found())
    }
}
