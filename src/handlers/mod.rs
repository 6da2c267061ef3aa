//! HTTP handlers. Thin: validate input, call the service, map the result.

pub mod checkout;
pub mod orders;
pub mod payments;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::{order_item, order_timeline, ItemKind};

/// Order as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub subtotal: Decimal,
    pub coupon_discount: Decimal,
    pub shipping_charge: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub gateway_order_id: Option<String>,
    pub tracking_number: Option<String>,
    pub shipping_address: serde_json::Value,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<order::Model> for OrderResponse {
    fn from(m: order::Model) -> Self {
        let shipping_address = serde_json::from_str(&m.shipping_address)
            .unwrap_or(serde_json::Value::Null);
        Self {
            id: m.id,
            order_number: m.order_number,
            customer_id: m.customer_id,
            status: m.status,
            payment_status: m.payment_status,
            payment_method: m.payment_method,
            subtotal: m.subtotal,
            coupon_discount: m.coupon_discount,
            shipping_charge: m.shipping_charge,
            tax: m.tax,
            total: m.total,
            currency: m.currency,
            coupon_code: m.coupon_code,
            gateway_order_id: m.gateway_order_id,
            tracking_number: m.tracking_number,
            shipping_address,
            notes: m.notes,
            created_at: m.created_at,
            paid_at: m.paid_at,
            shipped_at: m.shipped_at,
            delivered_at: m.delivered_at,
            cancelled_at: m.cancelled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub item_kind: ItemKind,
    pub item_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(m: order_item::Model) -> Self {
        Self {
            item_kind: m.item_kind,
            item_id: m.item_id,
            sku: m.sku,
            name: m.name,
            quantity: m.quantity,
            unit_price: m.unit_price,
            total_price: m.total_price,
        }
    }
}

/// Order plus its line items, for the detail endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimelineEntryResponse {
    pub status: OrderStatus,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<order_timeline::Model> for TimelineEntryResponse {
    fn from(m: order_timeline::Model) -> Self {
        Self {
            status: m.status,
            title: m.title,
            description: m.description,
            location: m.location,
            created_at: m.created_at,
        }
    }
}

/// Paginated order listing.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}
