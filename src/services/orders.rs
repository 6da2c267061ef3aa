use std::sync::Arc;

use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::info;
use uuid::Uuid;

use crate::adapters::shipping::{ShippingCarrier, TrackingInfo};
use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::{order_item, order_timeline};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory::{InventoryLedger, StockLine};
use crate::services::order_status::OrderStateMachine;

/// Filters for the order list endpoint.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
}

/// Order queries and lifecycle operations after checkout.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    state_machine: OrderStateMachine,
    ledger: InventoryLedger,
    carrier: Arc<dyn ShippingCarrier>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        carrier: Arc<dyn ShippingCarrier>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            state_machine: OrderStateMachine::new(),
            ledger: InventoryLedger::new(),
            carrier,
            event_sender,
        }
    }

    pub async fn get(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))
    }

    pub async fn get_by_number(&self, order_number: &str) -> Result<order::Model, ServiceError> {
        order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_number}")))
    }

    pub async fn items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok(items)
    }

    /// Paginated listing, newest first.
    pub async fn list(
        &self,
        filter: OrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }

        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    pub async fn timeline(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_timeline::Model>, ServiceError> {
        // Existence check first so an unknown id is a 404, not an empty list.
        self.get(order_id).await?;
        let entries = order_timeline::Entity::find()
            .filter(order_timeline::Column::OrderId.eq(order_id))
            .order_by_asc(order_timeline::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(entries)
    }

    /// Cancels an order that has not shipped. Restores any committed stock;
    /// repeated restore attempts are absorbed by the ledger.
    pub async fn cancel(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get(order_id).await?;
        let lines = self.stock_lines(order_id).await?;

        let txn = self.db.begin().await?;
        let updated = self
            .state_machine
            .transition(&txn, &order, OrderStatus::Cancelled, reason, None)
            .await?;
        let restored = self.ledger.restore(&txn, order_id, &lines).await?;
        txn.commit().await?;

        if restored {
            let _ = self
                .event_sender
                .send(Event::InventoryRestored { order_id })
                .await;
        }
        let _ = self.event_sender.send(Event::OrderCancelled(order_id)).await;
        info!(%order_id, restored, "order cancelled");
        Ok(updated)
    }

    /// Marks a cancelled or returned order refunded. Stock restoration rides
    /// along for the return path; the ledger keeps it single-shot.
    pub async fn refund(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let order = self.get(order_id).await?;
        let lines = self.stock_lines(order_id).await?;

        let txn = self.db.begin().await?;
        let updated = self
            .state_machine
            .transition(&txn, &order, OrderStatus::Refunded, reason, None)
            .await?;
        let restored = self.ledger.restore(&txn, order_id, &lines).await?;

        if order.payment_status == PaymentStatus::Paid {
            order::Entity::update_many()
                .col_expr(
                    order::Column::PaymentStatus,
                    Expr::value(PaymentStatus::Refunded),
                )
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::PaymentStatus.eq(PaymentStatus::Paid))
                .exec(&txn)
                .await?;
        }
        txn.commit().await?;

        if restored {
            let _ = self
                .event_sender
                .send(Event::InventoryRestored { order_id })
                .await;
        }
        let _ = self.event_sender.send(Event::OrderRefunded(order_id)).await;
        info!(%order_id, "order refunded");
        Ok(updated)
    }

    /// Live tracking from the carrier for a shipped order.
    pub async fn tracking(&self, order_id: Uuid) -> Result<TrackingInfo, ServiceError> {
        let order = self.get(order_id).await?;
        let awb = order.tracking_number.ok_or_else(|| {
            ServiceError::InvalidOperation(format!("order {order_id} has no tracking number yet"))
        })?;
        let info = self.carrier.track(&awb).await?;
        Ok(info)
    }

    async fn stock_lines(&self, order_id: Uuid) -> Result<Vec<StockLine>, ServiceError> {
        let items = self.items(order_id).await?;
        Ok(items
            .into_iter()
            .map(|i| StockLine {
                item_id: i.item_id,
                quantity: i.quantity,
            })
            .collect())
    }
}
