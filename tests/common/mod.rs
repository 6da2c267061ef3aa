//! Shared test harness: in-memory database, seeded catalog, and test doubles
//! for the payment gateway and shipping carrier.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::*;
use uuid::Uuid;

use pcforge_api::adapters::payment::{
    compute_signature, CreateIntentRequest, PaymentGateway, PaymentIntent,
};
use pcforge_api::adapters::shipping::{
    CarrierShipment, ShipmentRequest, ShippingCarrier, TrackingInfo, TrackingStatus,
};
use pcforge_api::adapters::AdapterError;
use pcforge_api::config::{CarrierConfig, PricingConfig};
use pcforge_api::db::{self, DbConfig, DbPool};
use pcforge_api::entities::coupon::DiscountType;
use pcforge_api::entities::{cart, cart_item, coupon, inventory_record, product, ItemKind};
use pcforge_api::events::{self, EventSender};
use pcforge_api::services::checkout::CheckoutOrchestrator;
use pcforge_api::services::orders::OrderService;
use pcforge_api::services::payment_confirmation::PaymentConfirmationHandler;
use pcforge_api::services::shipping_queue::ShippingQueue;

pub const TEST_GATEWAY_SECRET: &str = "test_secret_0123456789abcdef";

/// Gateway double: deterministic intents, real HMAC verification against the
/// test secret, and a switch to simulate an outage.
pub struct TestGateway {
    pub fail_intents: AtomicBool,
    counter: AtomicU32,
}

impl TestGateway {
    pub fn new() -> Self {
        Self {
            fail_intents: AtomicBool::new(false),
            counter: AtomicU32::new(0),
        }
    }

    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        compute_signature(TEST_GATEWAY_SECRET, gateway_order_id, gateway_payment_id)
    }
}

#[async_trait]
impl PaymentGateway for TestGateway {
    async fn create_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> Result<PaymentIntent, AdapterError> {
        if self.fail_intents.load(Ordering::SeqCst) {
            return Err(AdapterError::Permanent("gateway rejected intent".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            intent_id: format!("gwo_test_{n}"),
            client_secret: Some(format!("secret_{n}")),
            amount: req.amount,
            currency: req.currency.clone(),
        })
    }

    fn verify_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        self.sign(gateway_order_id, gateway_payment_id) == signature
    }
}

/// Carrier double with a failure switch and a registration counter.
pub struct TestCarrier {
    pub fail: AtomicBool,
    pub registrations: AtomicU32,
}

impl TestCarrier {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            registrations: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ShippingCarrier for TestCarrier {
    async fn register_shipment(
        &self,
        req: &ShipmentRequest,
    ) -> Result<CarrierShipment, AdapterError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AdapterError::Permanent("carrier down".into()));
        }
        let n = self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(CarrierShipment {
            carrier_order_id: format!("carrier_{}", req.order_number),
            shipment_id: format!("ship_{n}"),
            tracking_number: Some(format!("AWB{n:06}")),
        })
    }

    async fn track(&self, awb: &str) -> Result<TrackingInfo, AdapterError> {
        Ok(TrackingInfo {
            status: TrackingStatus::InTransit,
            description: Some(format!("Shipment {awb} in transit")),
            location: Some("Nagpur hub".into()),
            updated_at: Some(Utc::now()),
        })
    }
}

/// Everything a test needs, wired against one in-memory database.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub gateway: Arc<TestGateway>,
    pub carrier: Arc<TestCarrier>,
    pub checkout: CheckoutOrchestrator,
    pub payments: PaymentConfirmationHandler,
    pub orders: OrderService,
    pub events: EventSender,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let db = Arc::new(
            db::establish_connection_with_config(&config)
                .await
                .expect("connect to sqlite"),
        );
        db::init_schema(&db).await.expect("init schema");

        let (event_sender, event_rx) = events::channel(1024);
        tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(TestGateway::new());
        let carrier = Arc::new(TestCarrier::new());

        let carrier_cfg = CarrierConfig {
            max_attempts: 2,
            ..Default::default()
        };
        let shipping_queue = ShippingQueue::start(
            db.clone(),
            carrier.clone(),
            &carrier_cfg,
            event_sender.clone(),
        );

        let orders = OrderService::new(db.clone(), carrier.clone(), event_sender.clone());
        let checkout = CheckoutOrchestrator::new(
            db.clone(),
            &PricingConfig::default(),
            gateway.clone(),
            shipping_queue.clone(),
            event_sender.clone(),
        );
        let payments = PaymentConfirmationHandler::new(
            db.clone(),
            gateway.clone(),
            orders.clone(),
            shipping_queue,
            event_sender.clone(),
        );

        Self {
            db,
            gateway,
            carrier,
            checkout,
            payments,
            orders,
            events: event_sender,
        }
    }

    /// Seeds a product with stock and returns its id.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            sku: Set(format!("SKU-{}", &id.simple().to_string()[..8])),
            name: Set(name.to_string()),
            price: Set(price),
            mrp: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("insert product");

        inventory_record::ActiveModel {
            item_id: Set(id),
            item_kind: Set(ItemKind::Product),
            stock_quantity: Set(stock),
            is_in_stock: Set(stock > 0),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("insert inventory");

        id
    }

    /// Seeds an active cart with the given product quantities.
    pub async fn seed_cart(&self, items: &[(Uuid, i32)]) -> Uuid {
        let cart_id = Uuid::new_v4();
        cart::ActiveModel {
            id: Set(cart_id),
            customer_id: Set(None),
            status: Set(cart::CartStatus::Active),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("insert cart");

        for (item_id, quantity) in items {
            cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                item_kind: Set(ItemKind::Product),
                item_id: Set(*item_id),
                quantity: Set(*quantity),
                created_at: Set(Utc::now()),
            }
            .insert(&*self.db)
            .await
            .expect("insert cart item");
        }

        cart_id
    }

    /// Seeds a percentage coupon.
    pub async fn seed_coupon(
        &self,
        code: &str,
        percent: Decimal,
        max_discount: Option<Decimal>,
        min_order_amount: Option<Decimal>,
        usage_limit: Option<i32>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        coupon::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            discount_type: Set(DiscountType::Percentage),
            discount_value: Set(percent),
            min_order_amount: Set(min_order_amount),
            max_discount: Set(max_discount),
            usage_limit: Set(usage_limit),
            per_user_limit: Set(None),
            usage_count: Set(0),
            is_active: Set(true),
            start_date: Set(None),
            end_date: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("insert coupon");
        id
    }

    pub async fn stock_of(&self, item_id: Uuid) -> i32 {
        inventory_record::Entity::find_by_id(item_id)
            .one(&*self.db)
            .await
            .expect("query inventory")
            .expect("inventory record")
            .stock_quantity
    }

    /// Default shipping address for checkout inputs.
    pub fn address() -> serde_json::Value {
        serde_json::json!({
            "name": "Asha Rao",
            "line1": "14 MG Road",
            "city": "Bengaluru",
            "state": "KA",
            "postal_code": "560001",
            "country": "IN",
            "phone": "+91-9999999999"
        })
    }
}
