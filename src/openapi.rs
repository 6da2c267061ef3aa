use utoipa::OpenApi;

use crate::adapters::payment::PaymentIntent;
use crate::adapters::shipping::{TrackingInfo, TrackingStatus};
use crate::entities::order::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::ItemKind;
use crate::errors::ErrorResponse;
use crate::handlers;

/// OpenAPI document for the checkout and fulfillment API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "PCForge Checkout API",
        description = "Checkout and order fulfillment for a PC parts storefront",
        license(name = "MIT")
    ),
    paths(
        handlers::checkout::checkout,
        handlers::payments::verify_payment,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::get_order_by_number,
        handlers::orders::get_order_timeline,
        handlers::orders::get_order_tracking,
        handlers::orders::cancel_order,
        handlers::orders::refund_order,
    ),
    components(schemas(
        handlers::checkout::CheckoutRequest,
        handlers::checkout::CheckoutResponse,
        handlers::payments::VerifyPaymentRequest,
        handlers::orders::CancelOrderRequest,
        handlers::orders::RefundOrderRequest,
        handlers::OrderResponse,
        handlers::OrderDetailResponse,
        handlers::OrderItemResponse,
        handlers::OrderListResponse,
        handlers::TimelineEntryResponse,
        OrderStatus,
        PaymentStatus,
        PaymentMethod,
        ItemKind,
        PaymentIntent,
        TrackingInfo,
        TrackingStatus,
        ErrorResponse,
    )),
    tags(
        (name = "checkout", description = "Cart to order"),
        (name = "payments", description = "Online payment verification"),
        (name = "orders", description = "Order queries and lifecycle"),
    )
)]
pub struct ApiDoc;
