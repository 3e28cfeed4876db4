use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{AdditionsAndRemovals, BlockRecord, ChainState, CoinRecord, FullNodeApi};
use crate::bytes::Bytes32;
use crate::error::NodeError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Full node RPC over HTTPS (`POST {base}/{endpoint}` with a JSON body)
pub struct FullNodeClient {
    client: reqwest::Client,
    base_url: String,
}

impl FullNodeClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, NodeError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        log::debug!("POST {}", url);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();

        // the node answers errors with a JSON body too, so only give up on
        // the status when the body is unreadable
        let value: serde_json::Value = match response.json().await {
            Ok(value) => value,
            Err(e) if !status.is_success() => {
                return Err(NodeError::Transport(format!("{} returned {}: {}", url, status, e)))
            }
            Err(e) => return Err(e.into()),
        };

        if value["success"].as_bool() != Some(true) {
            let message = value["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} failed with status {}", endpoint, status));
            return Err(classify_rpc_error(message));
        }

        serde_json::from_value(value).map_err(|e| {
            NodeError::InvalidResponse(format!("{}: {}", endpoint, e))
        })
    }
}

/// The node has no dedicated code for missing records, only messages
fn classify_rpc_error(message: String) -> NodeError {
    let lower = message.to_lowercase();
    if lower.contains("not found")
        || lower.contains("not in blockchain")
        || lower.contains("does not exist")
    {
        NodeError::NotFound(message)
    } else {
        NodeError::Rpc(message)
    }
}

#[derive(Deserialize)]
struct BlockchainStateResponse {
    blockchain_state: RawBlockchainState,
}

#[derive(Deserialize)]
struct RawBlockchainState {
    peak: Option<RawPeak>,
    sync: RawSync,
}

#[derive(Deserialize)]
struct RawPeak {
    height: u64,
}

#[derive(Deserialize)]
struct RawSync {
    synced: bool,
    #[serde(default)]
    sync_progress_height: u64,
    #[serde(default)]
    sync_tip_height: u64,
}

#[derive(Deserialize)]
struct BlockRecordResponse {
    block_record: Option<RawBlockRecord>,
}

#[derive(Deserialize)]
struct RawBlockRecord {
    header_hash: Bytes32,
    height: u64,
    /// Only transaction blocks carry a timestamp
    #[serde(default)]
    timestamp: Option<u64>,
}

#[derive(Deserialize)]
struct CoinRecordsResponse {
    coin_records: Vec<CoinRecord>,
}

#[async_trait]
impl FullNodeApi for FullNodeClient {
    async fn get_chain_state(&self) -> Result<ChainState, NodeError> {
        let response: BlockchainStateResponse = self.call("get_blockchain_state", json!({})).await?;
        let state = response.blockchain_state;
        let peak = state
            .peak
            .ok_or_else(|| NodeError::InvalidResponse("node reports no peak".into()))?;

        Ok(ChainState {
            peak_height: peak.height,
            synced: state.sync.synced,
            sync_progress_height: state.sync.sync_progress_height,
            sync_tip_height: state.sync.sync_tip_height,
        })
    }

    async fn get_block_by_height(&self, height: u64) -> Result<BlockRecord, NodeError> {
        let response: BlockRecordResponse = self
            .call("get_block_record_by_height", json!({ "height": height }))
            .await?;
        let record = response
            .block_record
            .ok_or_else(|| NodeError::NotFound(format!("block at height {}", height)))?;

        Ok(BlockRecord {
            height: record.height,
            header_hash: record.header_hash,
            is_transaction_block: record.timestamp.is_some(),
        })
    }

    async fn get_additions_and_removals(
        &self,
        header_hash: &Bytes32,
    ) -> Result<AdditionsAndRemovals, NodeError> {
        self.call(
            "get_additions_and_removals",
            json!({ "header_hash": format!("0x{}", header_hash) }),
        )
        .await
    }

    async fn get_coin_records_by_puzzle_hashes(
        &self,
        puzzle_hashes: &[Bytes32],
        include_spent_coins: bool,
    ) -> Result<Vec<CoinRecord>, NodeError> {
        let hashes: Vec<String> = puzzle_hashes.iter().map(|h| format!("0x{}", h)).collect();
        let response: CoinRecordsResponse = self
            .call(
                "get_coin_records_by_puzzle_hashes",
                json!({ "puzzle_hashes": hashes, "include_spent_coins": include_spent_coins }),
            )
            .await?;
        Ok(response.coin_records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rpc_error() {
        assert!(classify_rpc_error("Record not found".into()).is_not_found());
        assert!(classify_rpc_error("Height not in blockchain: 1001".into()).is_not_found());
        assert!(!classify_rpc_error("Internal error".into()).is_not_found());
    }

    #[test]
    fn test_block_record_transaction_flag() {
        let json = format!(
            r#"{{"block_record": {{"header_hash": "0x{}", "height": 12, "timestamp": null}}, "success": true}}"#,
            "aa".repeat(32)
        );
        let response: BlockRecordResponse = serde_json::from_str(&json).unwrap();
        let record = response.block_record.unwrap();
        assert_eq!(record.height, 12);
        assert!(record.timestamp.is_none());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = FullNodeClient::new("https://api.coinset.org/").unwrap();
        assert_eq!(client.base_url(), "https://api.coinset.org");
    }
}
