use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout and fulfillment core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    OrderRefunded(Uuid),

    // Payment events
    PaymentVerified {
        order_id: Uuid,
        gateway_payment_id: String,
    },
    PaymentFailed {
        order_id: Uuid,
        reason: String,
    },

    // Inventory events
    InventoryCommitted {
        order_id: Uuid,
    },
    InventoryRestored {
        order_id: Uuid,
    },

    // Coupon events
    CouponRedeemed {
        order_id: Uuid,
        code: String,
    },

    // Cart events
    CartCleared(Uuid),

    // Shipment events
    ShipmentRegistered {
        order_id: Uuid,
        carrier_order_id: String,
    },
    ShipmentRegistrationFailed {
        order_id: Uuid,
        attempts: u32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously. A full or closed channel is reported to
    /// the caller; event delivery is never load-bearing for correctness.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }
}

/// Builds an event channel. The receiver is usually handed straight to
/// [`process_events`] on a spawned task.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Runs until all senders drop.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::ShipmentRegistrationFailed { order_id, attempts } => {
                warn!(%order_id, attempts, "shipment registration failed");
            }
            other => {
                info!(event = ?other, "domain event");
            }
        }
    }
    info!("event channel closed; consumer exiting");
}
