//! Node health tracking
//!
//! Polls the node's sync state on a fixed interval and publishes a
//! [`SyncSummary`]. The scan is considered caught up once the cursor is
//! within [`SYNC_TOLERANCE`] blocks of the chain tip. An
//! `AvailabilityChanged` event goes out on the first poll and afterwards
//! only when `synced && rpc_available` flips.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{ChainConfig, ChainId};
use crate::error::ListenerError;
use crate::events::{EventBus, ListenerEvent};
use crate::node::{ChainState, NodeRegistry};
use crate::storage::{ScanCursor, SettingsRepository, SettingsRepositoryExt};
use crate::task::{sleep_or_cancel, with_cancel};

pub const SYNC_TOLERANCE: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub latest_block_scanned: u64,
    pub latest_block_on_node: u64,
    pub highest_block_on_chain: u64,
    pub synced: bool,
    pub syncing: bool,
    pub rpc_available: bool,
    pub updated_at: DateTime<Utc>,
}

impl SyncSummary {
    /// Summary computed from a successful node answer
    pub fn from_chain_state(state: &ChainState, latest_block_scanned: u64) -> Self {
        let (latest_block_on_node, highest_block_on_chain, syncing) = if state.synced {
            (state.peak_height, state.peak_height, false)
        } else {
            (state.sync_progress_height, state.sync_tip_height, true)
        };

        Self {
            latest_block_scanned,
            latest_block_on_node,
            highest_block_on_chain,
            synced: highest_block_on_chain.saturating_sub(latest_block_scanned) < SYNC_TOLERANCE,
            syncing,
            rpc_available: true,
            updated_at: Utc::now(),
        }
    }

    /// Summary after the node could not be reached: heights and flags stay
    /// as they were
    pub fn unavailable(previous: Option<&SyncSummary>) -> Self {
        let mut summary = previous.cloned().unwrap_or_else(|| Self {
            latest_block_scanned: 0,
            latest_block_on_node: 0,
            highest_block_on_chain: 0,
            synced: false,
            syncing: false,
            rpc_available: false,
            updated_at: Utc::now(),
        });
        summary.rpc_available = false;
        summary.updated_at = Utc::now();
        summary
    }

    pub fn is_available(&self) -> bool {
        self.synced && self.rpc_available
    }
}

pub struct ChainHealthTracker {
    chain: ChainConfig,
    nodes: Arc<NodeRegistry>,
    settings: Arc<dyn SettingsRepository>,
    events: EventBus,
    interval: Duration,
    summary: watch::Sender<Option<SyncSummary>>,
}

impl ChainHealthTracker {
    pub fn new(
        chain: ChainConfig,
        nodes: Arc<NodeRegistry>,
        settings: Arc<dyn SettingsRepository>,
        events: EventBus,
        interval: Duration,
    ) -> Self {
        let (summary, _) = watch::channel(None);
        Self {
            chain,
            nodes,
            settings,
            events,
            interval,
            summary,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SyncSummary>> {
        self.summary.subscribe()
    }

    pub fn current(&self) -> Option<SyncSummary> {
        self.summary.borrow().clone()
    }

    pub fn is_available(&self) -> bool {
        self.current().map_or(false, |s| s.is_available())
    }

    /// Poll the node once, publish the new summary and notify on a change
    /// of availability
    pub async fn poll(&self, token: &CancellationToken) -> Result<SyncSummary, ListenerError> {
        let previous = self.current();

        let summary = match self.query(token).await {
            Ok(summary) => summary,
            Err(ListenerError::Cancelled) => return Err(ListenerError::Cancelled),
            Err(e) => {
                log::warn!("{}: node unavailable: {}", self.chain_id(), e);
                SyncSummary::unavailable(previous.as_ref())
            }
        };

        let changed = previous
            .as_ref()
            .map_or(true, |p| p.is_available() != summary.is_available());

        self.summary.send_replace(Some(summary.clone()));

        if changed {
            log::info!(
                "{} availability: {} (scanned {}, chain {})",
                self.chain_id(),
                summary.is_available(),
                summary.latest_block_scanned,
                summary.highest_block_on_chain
            );
            self.events.publish(ListenerEvent::AvailabilityChanged {
                chain: self.chain_id(),
                available: summary.is_available(),
                summary: summary.clone(),
            });
        }

        Ok(summary)
    }

    async fn query(&self, token: &CancellationToken) -> Result<SyncSummary, ListenerError> {
        let cursor: Option<ScanCursor> = self.settings.get_setting(&self.chain.listener_state_key())?;
        let node = self.nodes.client(&self.chain_id())?;
        let state = with_cancel(token, node.get_chain_state()).await?;

        let scanned = cursor.map_or(0, |c| c.last_scanned_height);
        Ok(SyncSummary::from_chain_state(&state, scanned))
    }

    pub async fn run(self, token: CancellationToken) {
        log::info!("Starting health tracker for {}", self.chain_id());
        loop {
            if self.poll(&token).await.is_err() {
                break;
            }
            if !sleep_or_cancel(&token, self.interval).await {
                break;
            }
        }
        log::info!("Health tracker for {} stopped", self.chain_id());
    }
}
