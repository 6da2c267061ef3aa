use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::info;
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::order_timeline;
use crate::errors::ServiceError;

/// Legal follow-on statuses for each order status.
///
/// Terminal states return an empty slice. Cancelled orders may still move to
/// Refunded so a prepaid cancellation can settle its refund.
pub fn allowed_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Pending => &[Confirmed, Cancelled],
        Confirmed => &[Processing, Cancelled],
        Processing => &[Shipped, Cancelled],
        Shipped => &[OutForDelivery, Delivered, Returned],
        OutForDelivery => &[Delivered, Returned],
        Delivered => &[Returned],
        Returned => &[Refunded],
        Cancelled => &[Refunded],
        Refunded => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Legal payment status moves. Failed payments may be retried to Paid.
pub fn payment_can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (Pending, Paid)
            | (Pending, Failed)
            | (Failed, Paid)
            | (CodPending, Paid)
            | (Paid, Refunded)
    )
}

/// Timeline headline for a status.
pub fn timeline_title(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Order placed",
        OrderStatus::Confirmed => "Order confirmed",
        OrderStatus::Processing => "Order is being processed",
        OrderStatus::Shipped => "Order shipped",
        OrderStatus::OutForDelivery => "Out for delivery",
        OrderStatus::Delivered => "Order delivered",
        OrderStatus::Cancelled => "Order cancelled",
        OrderStatus::Returned => "Order returned",
        OrderStatus::Refunded => "Refund completed",
    }
}

/// Applies order status transitions with the guarantees checkout relies on:
/// only legal moves, a timeline entry per transition, lifecycle timestamps
/// set at most once, and optimistic locking against concurrent writers.
#[derive(Clone)]
pub struct OrderStateMachine;

impl OrderStateMachine {
    pub fn new() -> Self {
        Self
    }

    /// Moves `order` to `new_status` and appends the timeline entry, both
    /// against the given connection so callers control atomicity.
    ///
    /// Fails with `InvalidTransition` for an illegal move and with
    /// `ConcurrentModification` when another writer got there first.
    pub async fn transition<C: ConnectionTrait>(
        &self,
        db: &C,
        current: &order::Model,
        new_status: OrderStatus,
        description: Option<String>,
        location: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        if !can_transition(current.status, new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "{} -> {}",
                current.status.as_str(),
                new_status.as_str()
            )));
        }

        let now = Utc::now();
        let mut update = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)));

        // Lifecycle timestamps stick at their first value.
        match new_status {
            OrderStatus::Shipped if current.shipped_at.is_none() => {
                update = update.col_expr(order::Column::ShippedAt, Expr::value(Some(now)));
            }
            OrderStatus::Delivered if current.delivered_at.is_none() => {
                update = update.col_expr(order::Column::DeliveredAt, Expr::value(Some(now)));
            }
            OrderStatus::Cancelled if current.cancelled_at.is_none() => {
                update = update.col_expr(order::Column::CancelledAt, Expr::value(Some(now)));
            }
            _ => {}
        }

        let result = update
            .filter(order::Column::Id.eq(current.id))
            .filter(order::Column::Version.eq(current.version))
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(current.id));
        }

        self.append_timeline(db, current.id, new_status, description, location)
            .await?;

        info!(
            order_id = %current.id,
            from = current.status.as_str(),
            to = new_status.as_str(),
            "order status transition"
        );

        order::Entity::find_by_id(current.id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("order {}", current.id)))
    }

    /// Appends one timeline row. Used by transitions and by tracking sync
    /// when the carrier reports a location.
    pub async fn append_timeline<C: ConnectionTrait>(
        &self,
        db: &C,
        order_id: Uuid,
        status: OrderStatus,
        description: Option<String>,
        location: Option<String>,
    ) -> Result<(), ServiceError> {
        let entry = order_timeline::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(status),
            title: Set(timeline_title(status).to_string()),
            description: Set(description),
            location: Set(location),
            created_at: Set(Utc::now()),
        };
        order_timeline::Entity::insert(entry).exec(db).await?;
        Ok(())
    }
}

impl Default for OrderStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn happy_path_is_legal() {
        for (from, to) in [
            (Pending, Confirmed),
            (Confirmed, Processing),
            (Processing, Shipped),
            (Shipped, OutForDelivery),
            (OutForDelivery, Delivered),
        ] {
            assert!(can_transition(from, to), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn cancellation_allowed_until_shipped() {
        assert!(can_transition(Pending, Cancelled));
        assert!(can_transition(Confirmed, Cancelled));
        assert!(can_transition(Processing, Cancelled));
        assert!(!can_transition(Shipped, Cancelled));
        assert!(!can_transition(OutForDelivery, Cancelled));
        assert!(!can_transition(Delivered, Cancelled));
    }

    #[test]
    fn returns_only_after_shipping() {
        assert!(can_transition(Shipped, Returned));
        assert!(can_transition(OutForDelivery, Returned));
        assert!(can_transition(Delivered, Returned));
        assert!(!can_transition(Pending, Returned));
        assert!(!can_transition(Confirmed, Returned));
    }

    #[test]
    fn refund_reachable_from_returned_and_cancelled_only() {
        assert!(can_transition(Returned, Refunded));
        assert!(can_transition(Cancelled, Refunded));
        assert!(!can_transition(Delivered, Refunded));
        assert!(!can_transition(Pending, Refunded));
    }

    #[test]
    fn refunded_is_terminal() {
        assert!(allowed_transitions(Refunded).is_empty());
    }

    #[test]
    fn no_backward_moves() {
        assert!(!can_transition(Confirmed, Pending));
        assert!(!can_transition(Shipped, Processing));
        assert!(!can_transition(Delivered, Shipped));
    }

    #[test]
    fn payment_transitions() {
        use PaymentStatus::*;
        assert!(payment_can_transition(Pending, Paid));
        assert!(payment_can_transition(Pending, Failed));
        assert!(payment_can_transition(Failed, Paid));
        assert!(payment_can_transition(CodPending, Paid));
        assert!(payment_can_transition(Paid, Refunded));
        assert!(!payment_can_transition(Paid, Pending));
        assert!(!payment_can_transition(Refunded, Paid));
        assert!(!payment_can_transition(CodPending, Failed));
    }
}
