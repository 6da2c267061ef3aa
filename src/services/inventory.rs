use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{inventory_record, stock_movement};
use crate::errors::ServiceError;

/// Quantity delta for one catalog item.
#[derive(Debug, Clone, Copy)]
pub struct StockLine {
    pub item_id: Uuid,
    pub quantity: i32,
}

/// Stock ledger for order fulfillment.
///
/// Every mutation is a conditional UPDATE so stock can never go negative, and
/// every order-level movement is recorded in `stock_movements` exactly once.
/// Commit and restore are therefore idempotent per order: replaying either
/// returns `Ok(false)` instead of double-applying. Callers run these inside a
/// transaction so a failed line rolls back the movement record too.
#[derive(Clone)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Non-binding availability pre-check at checkout time. Nothing is held;
    /// the binding check is the conditional decrement in [`commit`].
    ///
    /// [`commit`]: InventoryLedger::commit
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        db: &C,
        lines: &[StockLine],
    ) -> Result<(), ServiceError> {
        for line in lines {
            let available = inventory_record::Entity::find_by_id(line.item_id)
                .one(db)
                .await?
                .map(|r| r.stock_quantity)
                .unwrap_or(0);
            if available < line.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "item {} (requested {}, available {})",
                    line.item_id, line.quantity, available
                )));
            }
        }
        Ok(())
    }

    /// Permanently deducts stock for a confirmed order.
    ///
    /// Returns `Ok(true)` when the deduction was applied, `Ok(false)` when
    /// this order was already committed. Fails with `Conflict` when any line
    /// no longer has enough stock; the caller must abort the surrounding
    /// transaction so nothing partial persists.
    pub async fn commit<C: ConnectionTrait>(
        &self,
        db: &C,
        order_id: Uuid,
        lines: &[StockLine],
    ) -> Result<bool, ServiceError> {
        if !self
            .record_movement(db, order_id, stock_movement::Model::COMMIT)
            .await?
        {
            debug!(%order_id, "inventory commit already applied");
            return Ok(false);
        }

        for line in lines {
            let result = inventory_record::Entity::update_many()
                .col_expr(
                    inventory_record::Column::StockQuantity,
                    Expr::col(inventory_record::Column::StockQuantity).sub(line.quantity),
                )
                .col_expr(
                    inventory_record::Column::UpdatedAt,
                    Expr::value(Some(Utc::now())),
                )
                .filter(inventory_record::Column::ItemId.eq(line.item_id))
                .filter(inventory_record::Column::StockQuantity.gte(line.quantity))
                .exec(db)
                .await?;

            if result.rows_affected == 0 {
                warn!(%order_id, item_id = %line.item_id, quantity = line.quantity,
                    "stock ran out between checkout and confirmation");
                return Err(ServiceError::Conflict(format!(
                    "insufficient stock for item {}",
                    line.item_id
                )));
            }
        }

        self.refresh_availability(db, lines).await?;
        Ok(true)
    }

    /// Returns stock for a cancelled or refunded order.
    ///
    /// Applies only when a commit was actually recorded, and at most once:
    /// repeated cancellation paths (cancel then refund) restore a single
    /// time. Returns `Ok(true)` only when stock was added back.
    pub async fn restore<C: ConnectionTrait>(
        &self,
        db: &C,
        order_id: Uuid,
        lines: &[StockLine],
    ) -> Result<bool, ServiceError> {
        let committed = stock_movement::Entity::find_by_id((
            order_id,
            stock_movement::Model::COMMIT.to_string(),
        ))
        .one(db)
        .await?
        .is_some();

        if !committed {
            debug!(%order_id, "no inventory commit on record; nothing to restore");
            return Ok(false);
        }

        if !self
            .record_movement(db, order_id, stock_movement::Model::RESTORE)
            .await?
        {
            debug!(%order_id, "inventory restore already applied");
            return Ok(false);
        }

        for line in lines {
            inventory_record::Entity::update_many()
                .col_expr(
                    inventory_record::Column::StockQuantity,
                    Expr::col(inventory_record::Column::StockQuantity).add(line.quantity),
                )
                .col_expr(
                    inventory_record::Column::UpdatedAt,
                    Expr::value(Some(Utc::now())),
                )
                .filter(inventory_record::Column::ItemId.eq(line.item_id))
                .exec(db)
                .await?;
        }

        self.refresh_availability(db, lines).await?;
        Ok(true)
    }

    /// Inserts the movement row. `Ok(false)` means the row already existed,
    /// detected by the unique-constraint violation on the composite key.
    async fn record_movement<C: ConnectionTrait>(
        &self,
        db: &C,
        order_id: Uuid,
        direction: &str,
    ) -> Result<bool, ServiceError> {
        let movement = stock_movement::ActiveModel {
            order_id: Set(order_id),
            direction: Set(direction.to_string()),
            created_at: Set(Utc::now()),
        };
        match stock_movement::Entity::insert(movement).exec(db).await {
            Ok(_) => Ok(true),
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Ok(false),
                _ => Err(err.into()),
            },
        }
    }

    /// Recomputes the denormalized `is_in_stock` flag for the touched items.
    async fn refresh_availability<C: ConnectionTrait>(
        &self,
        db: &C,
        lines: &[StockLine],
    ) -> Result<(), ServiceError> {
        for line in lines {
            inventory_record::Entity::update_many()
                .col_expr(
                    inventory_record::Column::IsInStock,
                    Expr::col(inventory_record::Column::StockQuantity).gt(0),
                )
                .filter(inventory_record::Column::ItemId.eq(line.item_id))
                .exec(db)
                .await?;
        }
        Ok(())
    }
}

impl Default for InventoryLedger {
    fn default() -> Self {
        Self::new()
    }
}
