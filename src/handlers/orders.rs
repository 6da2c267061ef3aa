use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::adapters::shipping::TrackingInfo;
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::services::orders::OrderFilter;
use crate::AppState;

use super::{OrderDetailResponse, OrderListResponse, OrderResponse, TimelineEntryResponse};

const DEFAULT_PER_PAGE: u64 = 20;
const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListOrdersQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
}

/// Lists orders, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Orders", body = OrderListResponse),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);

    let (orders, total) = state
        .services
        .orders
        .list(
            OrderFilter {
                status: query.status,
                customer_id: query.customer_id,
            },
            page,
            per_page,
        )
        .await?;

    Ok(Json(OrderListResponse {
        orders: orders.into_iter().map(OrderResponse::from).collect(),
        total,
        page,
        per_page,
    }))
}

/// Fetches one order with its items.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = OrderDetailResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetailResponse>, ServiceError> {
    let order = state.services.orders.get(id).await?;
    let items = state.services.orders.items(id).await?;
    Ok(Json(OrderDetailResponse {
        order: order.into(),
        items: items.into_iter().map(Into::into).collect(),
    }))
}

/// Fetches one order by its human-facing number.
#[utoipa::path(
    get,
    path = "/api/v1/orders/number/{order_number}",
    params(("order_number" = String, Path, description = "Order number, e.g. ORD-1A2B3C4D5E6F")),
    responses(
        (status = 200, description = "Order", body = OrderDetailResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order_by_number(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderDetailResponse>, ServiceError> {
    let order = state.services.orders.get_by_number(&order_number).await?;
    let items = state.services.orders.items(order.id).await?;
    Ok(Json(OrderDetailResponse {
        order: order.into(),
        items: items.into_iter().map(Into::into).collect(),
    }))
}

/// Timeline of status changes for an order.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/timeline",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Timeline entries", body = [TimelineEntryResponse]),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order_timeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TimelineEntryResponse>>, ServiceError> {
    let entries = state.services.orders.timeline(id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Live carrier tracking for a shipped order.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/tracking",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Tracking info", body = TrackingInfo),
        (status = 400, description = "Order has no tracking number yet"),
        (status = 404, description = "Order not found"),
        (status = 502, description = "Carrier unavailable"),
    ),
    tag = "orders"
)]
pub async fn get_order_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackingInfo>, ServiceError> {
    let info = state.services.orders.tracking(id).await?;
    Ok(Json(info))
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Cancels an order that has not shipped, returning committed stock.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = OrderResponse),
        (status = 400, description = "Order can no longer be cancelled"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Concurrent modification"),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let order = state.services.orders.cancel(id, request.reason).await?;
    Ok(Json(order.into()))
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct RefundOrderRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Marks a cancelled or returned order refunded.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/refund",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = RefundOrderRequest,
    responses(
        (status = 200, description = "Order refunded", body = OrderResponse),
        (status = 400, description = "Order is not refundable in its current state"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Concurrent modification"),
    ),
    tag = "orders"
)]
pub async fn refund_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<RefundOrderRequest>>,
) -> Result<Json<OrderResponse>, ServiceError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let order = state.services.orders.refund(id, request.reason).await?;
    Ok(Json(order.into()))
}
