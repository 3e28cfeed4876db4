//! Chain scanner
//!
//! Walks the chain one block at a time from a persisted cursor and matches
//! created coins against pending requests.
//!
//! # States
//!
//! - **Initializing**: load the cursor, or start it at the node's peak
//!   (history before activation is never scanned)
//! - **Idle**: no pending request; fast-forward the cursor to the peak
//!   without fetching block contents
//! - **Advancing**: fetch block `cursor + 1`, register matching payments,
//!   move the cursor
//!
//! After every iteration confirmation counts are recomputed and the cursor
//! is persisted. Cursor writes always follow the block they describe, so a
//! restart resumes at or before the true frontier. Reprocessing a block is
//! harmless because payments are keyed by coin id.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::address::{normalize_address, AddressCodec};
use crate::amount::Amount;
use crate::bytes::Bytes32;
use crate::config::{ChainConfig, ChainId, ScannerTimings};
use crate::error::ListenerError;
use crate::events::{EventBus, ListenerEvent};
use crate::node::{AdditionsAndRemovals, BlockRecord, CoinRecord, FullNodeApi, NodeRegistry};
use crate::pool::AddressPool;
use crate::requests::{Payment, PaymentRecord, PaymentRequestRepository, PaymentStatus, PendingRequest};
use crate::storage::{ScanCursor, SettingsRepository, SettingsRepositoryExt};
use crate::task::{sleep_or_cancel, with_cancel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    Uninitialized,
    Initializing,
    Idle,
    Advancing,
}

/// What one iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing pending; cursor moved straight to the peak
    FastForwarded { from: u64, to: u64 },
    /// Nothing pending and no new blocks
    Waiting,
    /// Block `height` is not on the node yet
    BlockNotFound { height: u64 },
    /// Transaction block `height` reported no additions; will be fetched again
    EmptyBlockRetry { height: u64, attempt: u32 },
    BlockProcessed { height: u64, payments: usize },
}

struct MissingBlock {
    height: u64,
    since: Instant,
    warned: bool,
}

pub struct ChainScanner {
    chain: ChainConfig,
    codec: AddressCodec,
    nodes: Arc<NodeRegistry>,
    settings: Arc<dyn SettingsRepository>,
    requests: Arc<dyn PaymentRequestRepository>,
    pool: watch::Receiver<Arc<AddressPool>>,
    events: EventBus,
    timings: ScannerTimings,
    state: ScannerState,
    cursor: Option<ScanCursor>,
    node: Option<Arc<dyn FullNodeApi>>,
    missing: Option<MissingBlock>,
    empty_retries: Option<(u64, u32)>,
}

impl ChainScanner {
    pub fn new(
        chain: ChainConfig,
        nodes: Arc<NodeRegistry>,
        settings: Arc<dyn SettingsRepository>,
        requests: Arc<dyn PaymentRequestRepository>,
        pool: watch::Receiver<Arc<AddressPool>>,
        events: EventBus,
        timings: ScannerTimings,
    ) -> Result<Self, ListenerError> {
        let codec = chain.codec()?;
        Ok(Self {
            chain,
            codec,
            nodes,
            settings,
            requests,
            pool,
            events,
            timings,
            state: ScannerState::Uninitialized,
            cursor: None,
            node: None,
            missing: None,
            empty_retries: None,
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    pub fn state(&self) -> ScannerState {
        self.state
    }

    pub fn cursor(&self) -> Option<ScanCursor> {
        self.cursor
    }

    /// Load the cursor, creating it at the node's peak when absent
    pub async fn initialize(&mut self, token: &CancellationToken) -> Result<ScanCursor, ListenerError> {
        self.state = ScannerState::Initializing;
        self.missing = None;
        self.empty_retries = None;

        let node = self.nodes.client(&self.chain_id())?;
        let chain_state = with_cancel(token, node.get_chain_state()).await?;
        let key = self.chain.listener_state_key();

        let cursor = match self.settings.get_setting::<ScanCursor>(&key)? {
            Some(cursor) => {
                log::info!(
                    "{}: tracking state, current={}, latest={}",
                    self.chain_id(),
                    cursor.last_scanned_height,
                    chain_state.peak_height
                );
                cursor
            }
            None => {
                log::info!(
                    "{}: no tracking state found, starting at peak {}",
                    self.chain_id(),
                    chain_state.peak_height
                );
                let cursor = ScanCursor::new(chain_state.peak_height);
                self.settings.put_setting(&key, &cursor)?;
                cursor
            }
        };

        self.cursor = Some(cursor);
        self.node = Some(node);
        Ok(cursor)
    }

    /// Run one iteration of the scan loop
    pub async fn step(&mut self, token: &CancellationToken) -> Result<StepOutcome, ListenerError> {
        let (node, mut cursor) = match (self.node.clone(), self.cursor) {
            (Some(node), Some(cursor)) => (node, cursor),
            _ => {
                let cursor = self.initialize(token).await?;
                let node = self.nodes.client(&self.chain_id())?;
                (node, cursor)
            }
        };

        let destinations = self.watched_destinations();
        let pending = self.pending_requests(&destinations).await?;

        let outcome = if pending.is_empty() {
            self.state = ScannerState::Idle;
            let chain_state = with_cancel(token, node.get_chain_state()).await?;
            let from = cursor.last_scanned_height;
            if cursor.advance_to(chain_state.peak_height) {
                log::info!(
                    "{}: no open requests, skipping from {} to {}",
                    self.chain_id(),
                    from,
                    cursor.last_scanned_height
                );
                StepOutcome::FastForwarded {
                    from,
                    to: cursor.last_scanned_height,
                }
            } else {
                StepOutcome::Waiting
            }
        } else {
            self.state = ScannerState::Advancing;
            self.advance(node.as_ref(), &mut cursor, &pending, token).await?
        };

        if !pending.is_empty() {
            // payments registered above are only visible after a reload
            let pending = self.pending_requests(&destinations).await?;
            self.update_confirmations(&pending, cursor.last_scanned_height)
                .await?;
        }

        self.settings
            .put_setting(&self.chain.listener_state_key(), &cursor)?;
        self.cursor = Some(cursor);
        Ok(outcome)
    }

    async fn advance(
        &mut self,
        node: &dyn FullNodeApi,
        cursor: &mut ScanCursor,
        pending: &[PendingRequest],
        token: &CancellationToken,
    ) -> Result<StepOutcome, ListenerError> {
        let height = cursor.next_height();

        let block = match with_cancel(token, node.get_block_by_height(height)).await {
            Ok(block) => block,
            Err(e) if e.is_not_found() => {
                self.note_missing(height);
                return Ok(StepOutcome::BlockNotFound { height });
            }
            Err(e) => return Err(e),
        };
        self.missing = None;

        let payments = if block.is_transaction_block {
            let changes = with_cancel(token, node.get_additions_and_removals(&block.header_hash)).await?;

            if changes.additions.is_empty() {
                let attempt = self.note_empty(height);
                if attempt <= self.timings.empty_block_retries {
                    log::warn!(
                        "{}: no additions found in block {}, retrying ({}/{})",
                        self.chain_id(),
                        height,
                        attempt,
                        self.timings.empty_block_retries
                    );
                    return Ok(StepOutcome::EmptyBlockRetry { height, attempt });
                }
                log::warn!(
                    "{}: block {} still reports no additions, accepting it as empty",
                    self.chain_id(),
                    height
                );
            }
            self.empty_retries = None;

            self.process_block(&block, &changes, pending).await?
        } else {
            0
        };

        cursor.advance_to(height);
        log::info!("{}: new block indexed {}", self.chain_id(), height);
        Ok(StepOutcome::BlockProcessed { height, payments })
    }

    fn note_missing(&mut self, height: u64) {
        let missing = match self.missing.take() {
            Some(m) if m.height == height => m,
            _ => MissingBlock {
                height,
                since: Instant::now(),
                warned: false,
            },
        };

        let elapsed = missing.since.elapsed();
        let warned = if !missing.warned && elapsed >= self.timings.not_found_warning {
            log::warn!(
                "{}: block {} still not present on node after {}s",
                self.chain_id(),
                height,
                elapsed.as_secs()
            );
            true
        } else {
            log::info!("{}: block not present on node yet {}", self.chain_id(), height);
            missing.warned
        };

        self.missing = Some(MissingBlock { warned, ..missing });
    }

    fn note_empty(&mut self, height: u64) -> u32 {
        let attempt = match self.empty_retries {
            Some((h, attempts)) if h == height => attempts + 1,
            _ => 1,
        };
        self.empty_retries = Some((height, attempt));
        attempt
    }

    /// Register payments for coins created (and not spent) in `block`
    ///
    /// Returns the number of newly registered payments. Coins already
    /// recorded for a request are skipped, so a block may be processed
    /// more than once.
    pub async fn process_block(
        &self,
        block: &BlockRecord,
        changes: &AdditionsAndRemovals,
        pending: &[PendingRequest],
    ) -> Result<usize, ListenerError> {
        let by_puzzle_hash = self.index_by_puzzle_hash(pending);
        if by_puzzle_hash.is_empty() {
            return Ok(0);
        }

        let removals: HashMap<Bytes32, &CoinRecord> = changes
            .removals
            .iter()
            .map(|record| (record.coin_id(), record))
            .collect();

        let mut registered = 0;
        for addition in &changes.additions {
            let coin_id = addition.coin_id();
            if removals.contains_key(&coin_id) {
                continue;
            }
            let Some(request) = by_puzzle_hash.get(&addition.coin.puzzle_hash) else {
                continue;
            };
            if request.has_payment(&coin_id) {
                log::debug!("{}: coin {} already recorded for {}", self.chain_id(), coin_id, request.id);
                continue;
            }

            let from = removals
                .get(&addition.coin.parent_coin_info)
                .map(|parent| self.codec.encode(&parent.coin.puzzle_hash))
                .transpose()?;

            let payment = Payment {
                record: PaymentRecord {
                    to: self.codec.encode(&addition.coin.puzzle_hash)?,
                    from,
                    transaction_id: coin_id,
                    block_height: block.height,
                    confirmation_count: 0,
                },
                amount: Amount::from_units(addition.coin.amount.clone(), self.chain.divisibility),
                status: PaymentStatus::Processing,
                created_at: Utc::now(),
            };

            if self.requests.add_payment(&request.id, payment.clone()).await? {
                log::info!(
                    "{}: payment {} of {} {} to {} for request {}",
                    self.chain_id(),
                    coin_id,
                    payment.amount,
                    self.chain.currency,
                    payment.record.to,
                    request.id
                );
                self.events.publish(ListenerEvent::PaymentReceived {
                    chain: self.chain_id(),
                    request_id: request.id.clone(),
                    payment,
                });
                registered += 1;
            }
        }

        Ok(registered)
    }

    /// Recompute confirmation counts of unsettled payments against
    /// `current_height`; returns the number of payments that settled
    pub async fn update_confirmations(
        &self,
        pending: &[PendingRequest],
        current_height: u64,
    ) -> Result<usize, ListenerError> {
        let mut settled = 0;

        for request in pending {
            let mut changed = Vec::new();

            for payment in request
                .payments
                .iter()
                .filter(|p| p.status == PaymentStatus::Processing)
            {
                let count = current_height.saturating_sub(payment.record.block_height);
                let is_settled = self.chain.confirmations.is_settled(count, request.speed_policy);
                if count == payment.record.confirmation_count && !is_settled {
                    continue;
                }

                let mut updated = payment.clone();
                updated.record.confirmation_count = count;
                if is_settled {
                    updated.status = PaymentStatus::Settled;
                    settled += 1;
                }

                log::debug!(
                    "{}: {} has {} confirmations ({:?})",
                    self.chain_id(),
                    updated.record.transaction_id,
                    count,
                    updated.status
                );
                self.events.publish(ListenerEvent::ConfirmationsUpdated {
                    chain: self.chain_id(),
                    request_id: request.id.clone(),
                    transaction_id: updated.record.transaction_id,
                    confirmation_count: count,
                    status: updated.status,
                });
                changed.push(updated);
            }

            if !changed.is_empty() {
                self.requests.update_payments(&request.id, changed).await?;
            }
        }

        Ok(settled)
    }

    fn watched_destinations(&self) -> HashSet<String> {
        self.pool.borrow().address_set()
    }

    async fn pending_requests(
        &self,
        destinations: &HashSet<String>,
    ) -> Result<Vec<PendingRequest>, ListenerError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }
        self.requests
            .list_monitored(&self.chain_id(), Some(destinations), true)
            .await
    }

    fn index_by_puzzle_hash<'a>(
        &self,
        pending: &'a [PendingRequest],
    ) -> HashMap<Bytes32, &'a PendingRequest> {
        let mut index = HashMap::new();
        for request in pending {
            match self.codec.decode(&normalize_address(&request.destination)) {
                Ok(puzzle_hash) => {
                    index.entry(puzzle_hash).or_insert(request);
                }
                Err(e) => log::warn!("{}: request {} skipped: {}", self.chain_id(), request.id, e),
            }
        }
        index
    }

    fn delay_after(&self, outcome: &StepOutcome) -> Duration {
        match outcome {
            StepOutcome::FastForwarded { .. } | StepOutcome::Waiting => self.timings.idle_poll,
            StepOutcome::BlockNotFound { .. } | StepOutcome::EmptyBlockRetry { .. } => {
                self.timings.block_retry
            }
            StepOutcome::BlockProcessed { .. } => Duration::ZERO,
        }
    }

    /// Scan until `token` is cancelled
    ///
    /// Iteration failures are logged and followed by a backoff, after which
    /// the scanner starts over from initialisation.
    pub async fn run(mut self, token: CancellationToken) {
        log::info!("Starting scanner for {}", self.chain_id());

        while !token.is_cancelled() {
            let delay = match self.step(&token).await {
                Ok(outcome) => self.delay_after(&outcome),
                Err(ListenerError::Cancelled) => break,
                Err(e) => {
                    log::error!("{}: an error occurred while indexing: {}", self.chain_id(), e);
                    self.state = ScannerState::Uninitialized;
                    self.cursor = None;
                    self.node = None;
                    self.timings.error_backoff
                }
            };

            if !sleep_or_cancel(&token, delay).await {
                break;
            }
        }

        log::info!("Scanner for {} stopped", self.chain_id());
    }
}
