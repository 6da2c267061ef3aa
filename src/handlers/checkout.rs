use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::adapters::payment::PaymentIntent;
use crate::entities::order::PaymentMethod;
use crate::errors::ServiceError;
use crate::services::checkout::CheckoutInput;
use crate::AppState;

use super::OrderResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    pub cart_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    /// Delivery address snapshot; stored verbatim on the order.
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
    #[validate(length(min = 1, max = 50))]
    pub coupon_code: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    /// Client-generated key; replaying the same key returns the original
    /// order instead of creating a duplicate.
    #[validate(length(min = 8, max = 128))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    /// Present for online orders that still need the client to pay.
    pub payment_intent: Option<PaymentIntent>,
    /// True when this response replays an earlier checkout with the same
    /// idempotency key.
    pub replayed: bool,
    /// Why the supplied coupon code did not apply, if it didn't. The order
    /// still goes through without the discount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_rejection: Option<String>,
}

/// Places an order from a cart.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order created", body = CheckoutResponse),
        (status = 200, description = "Replayed earlier checkout", body = CheckoutResponse),
        (status = 400, description = "Invalid request"),
        (status = 402, description = "Payment could not be initiated"),
        (status = 404, description = "Cart or item not found"),
        (status = 409, description = "Stock taken by a concurrent order"),
        (status = 422, description = "Insufficient stock"),
    ),
    tag = "checkout"
)]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ServiceError> {
    payload.validate()?;
    if !payload.shipping_address.is_object() || payload.shipping_address == serde_json::json!({}) {
        return Err(ServiceError::ValidationError(
            "shipping_address must be a non-empty object".into(),
        ));
    }

    let outcome = state
        .services
        .checkout
        .checkout(CheckoutInput {
            cart_id: payload.cart_id,
            customer_id: payload.customer_id,
            payment_method: payload.payment_method,
            shipping_address: payload.shipping_address,
            billing_address: payload.billing_address,
            coupon_code: payload.coupon_code,
            notes: payload.notes,
            idempotency_key: payload.idempotency_key,
        })
        .await?;

    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(CheckoutResponse {
            order: outcome.order.into(),
            payment_intent: outcome.payment_intent,
            replayed: outcome.replayed,
            coupon_rejection: outcome.coupon_rejection,
        }),
    ))
}
