use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{cart, cart_item};
use crate::errors::ServiceError;

/// Cart lookups for checkout and cart clearing after confirmation.
#[derive(Clone)]
pub struct CartService;

impl CartService {
    pub fn new() -> Self {
        Self
    }

    /// Loads an active cart together with its lines. A converted cart cannot
    /// be checked out again.
    pub async fn load_active<C: ConnectionTrait>(
        &self,
        db: &C,
        cart_id: Uuid,
    ) -> Result<(cart::Model, Vec<cart_item::Model>), ServiceError> {
        let cart = cart::Entity::find_by_id(cart_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart {cart_id}")))?;

        if cart.status != cart::CartStatus::Active {
            return Err(ServiceError::InvalidOperation(format!(
                "cart {cart_id} has already been checked out"
            )));
        }

        let items = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .all(db)
            .await?;

        Ok((cart, items))
    }

    /// Empties the cart and marks it converted. Idempotent: clearing an
    /// already-converted cart is a no-op.
    pub async fn clear<C: ConnectionTrait>(
        &self,
        db: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(db)
            .await?;

        let updated = cart::Entity::update_many()
            .col_expr(
                cart::Column::Status,
                Expr::value(cart::CartStatus::Converted),
            )
            .col_expr(cart::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(cart::CartStatus::Active))
            .exec(db)
            .await?;

        debug!(%cart_id, converted = updated.rows_affected, "cart cleared");
        Ok(())
    }
}

impl Default for CartService {
    fn default() -> Self {
        Self::new()
    }
}
