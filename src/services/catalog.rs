use rust_decimal::Decimal;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{inventory_record, prebuilt_pc, product, ItemKind};
use crate::errors::ServiceError;

/// Reference to one purchasable catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemRef {
    pub item_kind: ItemKind,
    pub item_id: Uuid,
}

/// Catalog snapshot for one line at checkout time: authoritative price and
/// stock, resolved server-side. Client-supplied prices are never used.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLine {
    pub item_kind: ItemKind,
    pub item_id: Uuid,
    pub sku: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub stock_quantity: i32,
}

impl ResolvedLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Read-side catalog lookups for checkout.
#[derive(Clone)]
pub struct CatalogService;

impl CatalogService {
    pub fn new() -> Self {
        Self
    }

    /// Resolves `(item, quantity)` pairs against the catalog. Fails if any
    /// item is missing or inactive; a missing inventory record reads as zero
    /// stock rather than an error.
    pub async fn resolve_lines<C: ConnectionTrait>(
        &self,
        db: &C,
        requested: &[(ItemRef, i32)],
    ) -> Result<Vec<ResolvedLine>, ServiceError> {
        let mut lines = Vec::with_capacity(requested.len());
        for (item, quantity) in requested {
            if *quantity <= 0 {
                return Err(ServiceError::InvalidInput(format!(
                    "quantity must be positive for item {}",
                    item.item_id
                )));
            }
            let line = self.resolve_one(db, *item, *quantity).await?;
            lines.push(line);
        }
        Ok(lines)
    }

    async fn resolve_one<C: ConnectionTrait>(
        &self,
        db: &C,
        item: ItemRef,
        quantity: i32,
    ) -> Result<ResolvedLine, ServiceError> {
        let (sku, name, unit_price, is_active) = match item.item_kind {
            ItemKind::Product => {
                let p = product::Entity::find_by_id(item.item_id)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("product {}", item.item_id))
                    })?;
                (p.sku, p.name, p.price, p.is_active)
            }
            ItemKind::PrebuiltPc => {
                let p = prebuilt_pc::Entity::find_by_id(item.item_id)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("prebuilt PC {}", item.item_id))
                    })?;
                (p.sku, p.name, p.price, p.is_active)
            }
        };

        if !is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "item {sku} is no longer available"
            )));
        }

        let stock_quantity = inventory_record::Entity::find_by_id(item.item_id)
            .one(db)
            .await?
            .map(|r| r.stock_quantity)
            .unwrap_or(0);

        Ok(ResolvedLine {
            item_kind: item.item_kind,
            item_id: item.item_id,
            sku,
            name,
            unit_price,
            quantity,
            stock_quantity,
        })
    }
}

impl Default for CatalogService {
    fn default() -> Self {
        Self::new()
    }
}
