use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::{error, info, warn};

use crate::adapters::payment::PaymentGateway;
use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::carts::CartService;
use crate::services::inventory::{InventoryLedger, StockLine};
use crate::services::order_status::OrderStateMachine;
use crate::services::orders::OrderService;
use crate::services::shipping_queue::ShippingQueue;

/// Gateway callback payload after handler-level validation.
#[derive(Debug, Clone)]
pub struct VerifyPaymentInput {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

/// Confirms online payments reported back by the gateway.
///
/// Confirmation is idempotent: the payment status flip is a compare-and-set,
/// so the gateway retrying its callback (or the client racing the webhook)
/// settles the order exactly once. The caller's signature is recomputed
/// server-side; a success flag in the payload means nothing.
pub struct PaymentConfirmationHandler {
    db: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    orders: OrderService,
    state_machine: OrderStateMachine,
    ledger: InventoryLedger,
    carts: CartService,
    shipping_queue: ShippingQueue,
    event_sender: EventSender,
}

impl PaymentConfirmationHandler {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        orders: OrderService,
        shipping_queue: ShippingQueue,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            gateway,
            orders,
            state_machine: OrderStateMachine::new(),
            ledger: InventoryLedger::new(),
            carts: CartService::new(),
            shipping_queue,
            event_sender,
        }
    }

    pub async fn confirm(&self, input: VerifyPaymentInput) -> Result<order::Model, ServiceError> {
        let order = order::Entity::find()
            .filter(order::Column::GatewayOrderId.eq(input.gateway_order_id.as_str()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "order for gateway reference {}",
                    input.gateway_order_id
                ))
            })?;

        if order.payment_method == PaymentMethod::CashOnDelivery {
            return Err(ServiceError::InvalidOperation(
                "cash-on-delivery orders have no online payment to verify".into(),
            ));
        }

        // Duplicate callback after a completed confirmation.
        if order.payment_status == PaymentStatus::Paid {
            info!(order_id = %order.id, "payment already confirmed; replaying success");
            return Ok(order);
        }

        if !self.gateway.verify_signature(
            &input.gateway_order_id,
            &input.gateway_payment_id,
            &input.signature,
        ) {
            warn!(order_id = %order.id, "payment signature mismatch");
            self.mark_failed(&order, "signature mismatch").await?;
            return Err(ServiceError::PaymentVerificationFailed(
                "signature mismatch".into(),
            ));
        }

        // A valid payment can still arrive after the customer cancelled the
        // pending order. Money was captured but the order must not confirm;
        // leave the payment for manual reconciliation.
        if order.status != OrderStatus::Pending {
            error!(order_id = %order.id, status = ?order.status,
                "valid payment for an order no longer awaiting confirmation; needs manual reconciliation");
            return Err(ServiceError::Conflict(format!(
                "order {} can no longer be confirmed",
                order.order_number
            )));
        }

        let stock: Vec<StockLine> = self
            .orders
            .items(order.id)
            .await?
            .into_iter()
            .map(|i| StockLine {
                item_id: i.item_id,
                quantity: i.quantity,
            })
            .collect();

        let txn = self.db.begin().await?;

        // One winner: flip pending/failed to paid, everyone else replays.
        let claimed = order::Entity::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Paid))
            .col_expr(order::Column::PaidAt, Expr::value(Some(Utc::now())))
            .col_expr(
                order::Column::GatewayPaymentId,
                Expr::value(Some(input.gateway_payment_id.clone())),
            )
            .filter(order::Column::Id.eq(order.id))
            .filter(
                order::Column::PaymentStatus
                    .is_in([PaymentStatus::Pending, PaymentStatus::Failed]),
            )
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            txn.rollback().await?;
            info!(order_id = %order.id, "lost confirmation race; replaying success");
            return self.orders.get(order.id).await;
        }

        match self.ledger.commit(&txn, order.id, &stock).await {
            Ok(_) => {}
            Err(err) => {
                txn.rollback().await?;
                error!(order_id = %order.id, error = %err,
                    "paid order could not reserve stock; payment needs manual reconciliation");
                return Err(err);
            }
        }

        // Unconditional: a cancel racing in after the fetch above changed the
        // order's version, so this CAS fails and the whole transaction (paid
        // flip included) rolls back.
        self.state_machine
            .transition(
                &txn,
                &order,
                OrderStatus::Confirmed,
                Some("Payment received".to_string()),
                None,
            )
            .await?;

        if let Some(cart_id) = order.cart_id {
            self.carts.clear(&txn, cart_id).await?;
        }

        txn.commit().await?;

        let _ = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: OrderStatus::Pending.to_value(),
                new_status: OrderStatus::Confirmed.to_value(),
            })
            .await;
        let _ = self
            .event_sender
            .send(Event::PaymentVerified {
                order_id: order.id,
                gateway_payment_id: input.gateway_payment_id,
            })
            .await;
        let _ = self
            .event_sender
            .send(Event::InventoryCommitted { order_id: order.id })
            .await;
        if let Some(cart_id) = order.cart_id {
            let _ = self.event_sender.send(Event::CartCleared(cart_id)).await;
        }
        self.shipping_queue.enqueue(order.id).await;

        info!(order_id = %order.id, "payment confirmed");
        self.orders.get(order.id).await
    }

    /// Records a failed verification so the client can retry payment. The
    /// order itself stays pending.
    async fn mark_failed(&self, order: &order::Model, reason: &str) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        order::Entity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed),
            )
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(&txn)
            .await?;
        self.state_machine
            .append_timeline(
                &txn,
                order.id,
                order.status,
                Some(format!("Payment failed: {reason}")),
                None,
            )
            .await?;
        txn.commit().await?;

        let _ = self
            .event_sender
            .send(Event::PaymentFailed {
                order_id: order.id,
                reason: reason.to_string(),
            })
            .await;
        Ok(())
    }
}
