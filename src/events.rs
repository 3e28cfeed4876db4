//! Listener notifications
//!
//! Every loop publishes into one broadcast channel; subscribers that fall
//! behind lose the oldest events, never block the loops.

use tokio::sync::broadcast;

use crate::bytes::Bytes32;
use crate::config::ChainId;
use crate::health::SyncSummary;
use crate::requests::{Payment, PaymentStatus};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ListenerEvent {
    /// A coin paying a pending request was found
    PaymentReceived {
        chain: ChainId,
        request_id: String,
        payment: Payment,
    },
    ConfirmationsUpdated {
        chain: ChainId,
        request_id: String,
        transaction_id: Bytes32,
        confirmation_count: u64,
        status: PaymentStatus,
    },
    /// `synced && rpc_available` flipped
    AvailabilityChanged {
        chain: ChainId,
        available: bool,
        summary: SyncSummary,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ListenerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListenerEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers that received the event
    pub fn publish(&self, event: ListenerEvent) -> usize {
        // no subscribers is not an error
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
