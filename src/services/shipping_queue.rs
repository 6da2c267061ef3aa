use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::*;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::retry::RetryPolicy;
use crate::adapters::shipping::{ShipmentItem, ShipmentRequest, ShippingCarrier};
use crate::config::CarrierConfig;
use crate::db::DbPool;
use crate::entities::order::{self, PaymentMethod};
use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

const QUEUE_BUFFER: usize = 256;

/// Handle for enqueueing shipment registrations. Registration is best-effort
/// and asynchronous: a confirmed order is never un-confirmed because the
/// carrier was down.
#[derive(Clone)]
pub struct ShippingQueue {
    tx: mpsc::Sender<Uuid>,
}

impl ShippingQueue {
    /// Spawns the background worker and returns the enqueue handle.
    pub fn start(
        db: Arc<DbPool>,
        carrier: Arc<dyn ShippingCarrier>,
        config: &CarrierConfig,
        event_sender: EventSender,
    ) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_BUFFER);
        let worker = ShippingWorker {
            db,
            carrier,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                ..RetryPolicy::default()
            },
            event_sender,
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Queues an order for carrier registration. A full queue is logged and
    /// dropped; the order stays registered for manual reconciliation.
    pub async fn enqueue(&self, order_id: Uuid) {
        if let Err(e) = self.tx.send(order_id).await {
            error!(%order_id, error = %e, "shipping queue unavailable");
        }
    }
}

struct ShippingWorker {
    db: Arc<DbPool>,
    carrier: Arc<dyn ShippingCarrier>,
    retry: RetryPolicy,
    event_sender: EventSender,
}

impl ShippingWorker {
    async fn run(self, mut rx: mpsc::Receiver<Uuid>) {
        info!("shipping registration worker started");
        while let Some(order_id) = rx.recv().await {
            self.register_with_retries(order_id).await;
        }
        info!("shipping registration worker stopped");
    }

    /// Registers one order, retrying transient carrier failures with capped
    /// backoff. Exhausted attempts emit an event and leave the order without
    /// carrier ids.
    async fn register_with_retries(&self, order_id: Uuid) {
        let mut attempt = 1u32;
        loop {
            match self.register_once(order_id).await {
                Ok(carrier_order_id) => {
                    let _ = self
                        .event_sender
                        .send(Event::ShipmentRegistered {
                            order_id,
                            carrier_order_id,
                        })
                        .await;
                    return;
                }
                Err(err) if err.retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(%order_id, attempt, delay_ms = delay.as_millis() as u64,
                        error = %err, "shipment registration failed; will retry");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(%order_id, attempt, error = %err,
                        "shipment registration abandoned");
                    let _ = self
                        .event_sender
                        .send(Event::ShipmentRegistrationFailed {
                            order_id,
                            attempts: attempt,
                        })
                        .await;
                    return;
                }
            }
        }
    }

    async fn register_once(&self, order_id: Uuid) -> Result<String, RegistrationError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::from)?
            .ok_or_else(|| {
                RegistrationError::Fatal(format!("order {order_id} vanished before registration"))
            })?;

        // Replayed enqueue after a crash or duplicate event.
        if let Some(existing) = order.carrier_order_id.clone() {
            return Ok(existing);
        }

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::from)?;

        let shipping_address: serde_json::Value = serde_json::from_str(&order.shipping_address)
            .map_err(|e| RegistrationError::Fatal(format!("bad address snapshot: {e}")))?;
        let billing_address = order
            .billing_address
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        let request = ShipmentRequest {
            order_id,
            order_number: order.order_number.clone(),
            shipping_address,
            billing_address,
            items: items
                .iter()
                .map(|i| ShipmentItem {
                    sku: i.sku.clone(),
                    name: i.name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            total: order.total,
            cod: order.payment_method == PaymentMethod::CashOnDelivery,
            weight_kg: 0.0,
            dimensions_cm: [0.0; 3],
        };

        let shipment = self
            .carrier
            .register_shipment(&request)
            .await
            .map_err(|e| {
                if e.is_transient() {
                    RegistrationError::Transient(e.to_string())
                } else {
                    RegistrationError::Fatal(e.to_string())
                }
            })?;

        order::Entity::update_many()
            .col_expr(
                order::Column::CarrierOrderId,
                Expr::value(Some(shipment.carrier_order_id.clone())),
            )
            .col_expr(
                order::Column::ShipmentId,
                Expr::value(Some(shipment.shipment_id.clone())),
            )
            .col_expr(
                order::Column::TrackingNumber,
                Expr::value(shipment.tracking_number.clone()),
            )
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::from)?;

        info!(%order_id, carrier_order_id = %shipment.carrier_order_id,
            "shipment registered with carrier");
        Ok(shipment.carrier_order_id)
    }
}

#[derive(Debug, thiserror::Error)]
enum RegistrationError {
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl RegistrationError {
    fn retryable(&self) -> bool {
        // Database hiccups are worth retrying too.
        matches!(
            self,
            RegistrationError::Transient(_) | RegistrationError::Service(_)
        )
    }
}
