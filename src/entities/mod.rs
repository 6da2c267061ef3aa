//! Database entities.
//!
//! One file per table, sea-orm `DeriveEntityModel` style. Status columns are
//! string-backed active enums so the state machine operates on typed values.

pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod inventory_record;
pub mod order;
pub mod order_item;
pub mod order_timeline;
pub mod prebuilt_pc;
pub mod product;
pub mod stock_movement;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Discriminates what an order/cart line refers to: a single part or a
/// prebuilt PC build. A line references exactly one of the two.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "prebuilt_pc")]
    PrebuiltPc,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Product => "product",
            ItemKind::PrebuiltPc => "prebuilt_pc",
        }
    }
}
