//! Pending payment requests
//!
//! The listener does not own payment requests. It reads the ones waiting on
//! a watched address through [`PaymentRequestRepository`] and writes
//! payments and confirmation counts back through it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::address::normalize_address;
use crate::amount::Amount;
use crate::bytes::Bytes32;
use crate::config::ChainId;
use crate::confirmation::SpeedPolicy;
use crate::error::ListenerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    New,
    Processing,
    Settled,
    Expired,
    Invalid,
}

impl RequestStatus {
    /// Requests in these states still claim their destination address
    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::New | RequestStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Processing,
    Settled,
}

/// On-chain facts about one received coin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub to: String,
    /// Address of the spent parent coin, when the block spent it
    pub from: Option<String>,
    /// Id of the created coin
    pub transaction_id: Bytes32,
    pub block_height: u64,
    pub confirmation_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub record: PaymentRecord,
    pub amount: Amount,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: String,
    pub chain: ChainId,
    pub destination: String,
    pub status: RequestStatus,
    pub speed_policy: SpeedPolicy,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

impl PendingRequest {
    pub fn new(
        id: impl Into<String>,
        chain: ChainId,
        destination: impl Into<String>,
        speed_policy: SpeedPolicy,
    ) -> Self {
        Self {
            id: id.into(),
            chain,
            destination: normalize_address(&destination.into()),
            status: RequestStatus::New,
            speed_policy,
            payments: Vec::new(),
        }
    }

    pub fn has_payment(&self, transaction_id: &Bytes32) -> bool {
        self.payments
            .iter()
            .any(|p| &p.record.transaction_id == transaction_id)
    }

    pub fn payment(&self, transaction_id: &Bytes32) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|p| &p.record.transaction_id == transaction_id)
    }
}

#[async_trait]
pub trait PaymentRequestRepository: Send + Sync {
    /// Requests for `chain` whose destination is in `destinations` (all of
    /// the chain's requests when `None`); `active_only` keeps New and
    /// Processing requests
    ///
    /// Destinations compare case-insensitively and come back normalised.
    async fn list_monitored(
        &self,
        chain: &ChainId,
        destinations: Option<&HashSet<String>>,
        active_only: bool,
    ) -> Result<Vec<PendingRequest>, ListenerError>;

    /// Attach a new payment; returns `false` if the request already holds a
    /// payment with the same transaction id
    async fn add_payment(&self, request_id: &str, payment: Payment) -> Result<bool, ListenerError>;

    /// Write back confirmation counts and payment statuses, matched by
    /// transaction id
    async fn update_payments(
        &self,
        request_id: &str,
        payments: Vec<Payment>,
    ) -> Result<(), ListenerError>;
}

/// Request repository kept in memory
#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: Mutex<HashMap<String, PendingRequest>>,
}

impl InMemoryRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, request: PendingRequest) {
        self.lock().insert(request.id.clone(), request);
    }

    pub fn get(&self, id: &str) -> Option<PendingRequest> {
        self.lock().get(id).cloned()
    }

    pub fn set_status(&self, id: &str, status: RequestStatus) -> Result<(), ListenerError> {
        let mut requests = self.lock();
        let request = requests
            .get_mut(id)
            .ok_or_else(|| ListenerError::Repository(format!("unknown request {}", id)))?;
        request.status = status;
        Ok(())
    }
}

/// New -> Processing on the first payment, Processing -> Settled once every
/// payment is settled
fn refresh_status(request: &mut PendingRequest) {
    if !request.status.is_active() || request.payments.is_empty() {
        return;
    }
    let all_settled = request
        .payments
        .iter()
        .all(|p| p.status == PaymentStatus::Settled);
    request.status = if all_settled {
        RequestStatus::Settled
    } else {
        RequestStatus::Processing
    };
}

#[async_trait]
impl PaymentRequestRepository for InMemoryRequestRepository {
    async fn list_monitored(
        &self,
        chain: &ChainId,
        destinations: Option<&HashSet<String>>,
        active_only: bool,
    ) -> Result<Vec<PendingRequest>, ListenerError> {
        let wanted: Option<HashSet<String>> =
            destinations.map(|set| set.iter().map(|d| normalize_address(d)).collect());

        let mut matching: Vec<PendingRequest> = self
            .lock()
            .values()
            .filter(|r| &r.chain == chain)
            .filter(|r| !active_only || r.status.is_active())
            .map(|r| {
                let mut request = r.clone();
                request.destination = normalize_address(&request.destination);
                request
            })
            .filter(|r| wanted.as_ref().map_or(true, |set| set.contains(&r.destination)))
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn add_payment(&self, request_id: &str, payment: Payment) -> Result<bool, ListenerError> {
        let mut requests = self.lock();
        let request = requests
            .get_mut(request_id)
            .ok_or_else(|| ListenerError::Repository(format!("unknown request {}", request_id)))?;

        if request.has_payment(&payment.record.transaction_id) {
            return Ok(false);
        }
        request.payments.push(payment);
        refresh_status(request);
        Ok(true)
    }

    async fn update_payments(
        &self,
        request_id: &str,
        payments: Vec<Payment>,
    ) -> Result<(), ListenerError> {
        let mut requests = self.lock();
        let request = requests
            .get_mut(request_id)
            .ok_or_else(|| ListenerError::Repository(format!("unknown request {}", request_id)))?;

        for updated in payments {
            if let Some(existing) = request
                .payments
                .iter_mut()
                .find(|p| p.record.transaction_id == updated.record.transaction_id)
            {
                *existing = updated;
            }
        }
        refresh_status(request);
        Ok(())
    }
}
