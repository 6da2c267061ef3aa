use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Idempotency guard for inventory commits and restores.
///
/// The composite primary key (order_id, direction) makes the second attempt
/// to apply the same movement fail with a unique-constraint violation, which
/// the ledger treats as "already applied". One row per order per direction.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub order_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub direction: String,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub const COMMIT: &'static str = "commit";
    pub const RESTORE: &'static str = "restore";
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
