//! Checkout and fulfillment API for a PC parts storefront.
//!
//! The engine room is the checkout flow: carts become orders with
//! server-resolved pricing, online payments settle through signed gateway
//! callbacks, stock is committed exactly once per order, and shipments are
//! registered with the carrier asynchronously.

pub mod adapters;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod money;
pub mod openapi;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::adapters::payment::PaymentGateway;
use crate::adapters::shipping::ShippingCarrier;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::checkout::CheckoutOrchestrator;
use crate::services::orders::OrderService;
use crate::services::payment_confirmation::PaymentConfirmationHandler;
use crate::services::shipping_queue::ShippingQueue;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container handed to every handler through [`AppState`].
pub struct AppServices {
    pub checkout: Arc<CheckoutOrchestrator>,
    pub payments: Arc<PaymentConfirmationHandler>,
    pub orders: Arc<OrderService>,
}

/// Shared application state.
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
}

impl AppState {
    /// Wires the services from their collaborators. The shipping queue must
    /// already be started so both checkout paths can enqueue registrations.
    pub fn new(
        db: Arc<DbPool>,
        config: AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        carrier: Arc<dyn ShippingCarrier>,
        shipping_queue: ShippingQueue,
        event_sender: EventSender,
    ) -> Self {
        let orders = Arc::new(OrderService::new(
            db.clone(),
            carrier,
            event_sender.clone(),
        ));
        let checkout = Arc::new(CheckoutOrchestrator::new(
            db.clone(),
            &config.pricing,
            gateway.clone(),
            shipping_queue.clone(),
            event_sender.clone(),
        ));
        let payments = Arc::new(PaymentConfirmationHandler::new(
            db.clone(),
            gateway,
            (*orders).clone(),
            shipping_queue,
            event_sender.clone(),
        ));

        Self {
            db,
            config,
            event_sender,
            services: AppServices {
                checkout,
                payments,
                orders,
            },
        }
    }
}

/// All versioned API routes.
pub fn api_v1_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/checkout", post(handlers::checkout::checkout))
        .route("/payments/verify", post(handlers::payments::verify_payment))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/number/:order_number",
            get(handlers::orders::get_order_by_number),
        )
        .route(
            "/orders/:id/timeline",
            get(handlers::orders::get_order_timeline),
        )
        .route(
            "/orders/:id/tracking",
            get(handlers::orders::get_order_tracking),
        )
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route("/orders/:id/refund", post(handlers::orders::refund_order))
        .with_state(state)
}

/// Builds the full application router with middleware.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.config.cors_allowed_origins.as_deref());
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .with_state(state.clone())
        .nest("/api/v1", api_v1_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(cors),
        )
}

/// Restricts CORS to the configured origins; permissive when none are set.
fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    match allowed_origins {
        Some(raw) if !raw.trim().is_empty() => {
            let origins: Vec<axum::http::HeaderValue> = raw
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        _ => CorsLayer::permissive(),
    }
}

/// Liveness probe.
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Readiness: checks the database round-trip.
pub async fn api_status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = state.db.ping().await.is_ok();
    let status = if db_ok { "ok" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(json!({
            "status": status,
            "database": db_ok,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
