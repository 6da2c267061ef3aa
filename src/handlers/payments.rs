use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::payment_confirmation::VerifyPaymentInput;
use crate::AppState;

use super::OrderResponse;

/// Gateway callback payload. The signature is recomputed server-side; no
/// success flag in the body is trusted.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 128))]
    pub gateway_order_id: String,
    #[validate(length(min = 1, max = 128))]
    pub gateway_payment_id: String,
    #[validate(length(min = 1, max = 256))]
    pub signature: String,
}

/// Verifies and settles an online payment. Safe to call repeatedly for the
/// same payment.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed", body = OrderResponse),
        (status = 400, description = "Signature mismatch or COD order"),
        (status = 404, description = "No order for this gateway reference"),
        (status = 409, description = "Stock conflict; payment needs reconciliation"),
    ),
    tag = "payments"
)]
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<OrderResponse>, ServiceError> {
    payload.validate()?;
    let order = state
        .services
        .payments
        .confirm(VerifyPaymentInput {
            gateway_order_id: payload.gateway_order_id,
            gateway_payment_id: payload.gateway_payment_id,
            signature: payload.signature,
        })
        .await?;
    Ok(Json(order.into()))
}
