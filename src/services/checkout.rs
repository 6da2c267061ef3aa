use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::payment::{CreateIntentRequest, PaymentGateway, PaymentIntent};
use crate::config::PricingConfig;
use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::{coupon, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money;
use crate::services::carts::CartService;
use crate::services::catalog::{CatalogService, ItemRef, ResolvedLine};
use crate::services::coupons::CouponService;
use crate::services::inventory::{InventoryLedger, StockLine};
use crate::services::order_status::{timeline_title, OrderStateMachine};
use crate::services::pricing::{PriceBreakdown, PricingEngine};
use crate::services::shipping_queue::ShippingQueue;

/// Checkout input after handler-level validation.
#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub cart_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Result of a checkout: the created (or replayed) order, plus the payment
/// intent for online orders still awaiting payment.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: order::Model,
    pub payment_intent: Option<PaymentIntent>,
    pub replayed: bool,
    /// Set when a coupon code was supplied but did not apply. The checkout
    /// itself still succeeds without the discount.
    pub coupon_rejection: Option<String>,
}

/// Drives the whole checkout: cart load, catalog re-resolution, coupon,
/// pricing, order creation, and the payment-method branch.
///
/// Prices always come from the catalog at checkout time; nothing the client
/// sends about money is trusted. Everything that must hold together (order,
/// items, timeline, coupon usage) lands in one transaction.
pub struct CheckoutOrchestrator {
    db: Arc<DbPool>,
    catalog: CatalogService,
    carts: CartService,
    coupons: CouponService,
    pricing: PricingEngine,
    ledger: InventoryLedger,
    state_machine: OrderStateMachine,
    gateway: Arc<dyn PaymentGateway>,
    shipping_queue: ShippingQueue,
    event_sender: EventSender,
    seen_keys: IdempotencyCache,
}

const IDEMPOTENCY_CACHE_CAPACITY: usize = 10_000;

/// Fast-path replay detection. The unique `idempotency_key` column is the
/// durable guard, so the cache can be dropped wholesale when it fills up;
/// evicted keys just fall through to the database lookup.
struct IdempotencyCache {
    keys: DashMap<String, Uuid>,
    capacity: usize,
}

impl IdempotencyCache {
    fn new(capacity: usize) -> Self {
        Self {
            keys: DashMap::new(),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<Uuid> {
        self.keys.get(key).map(|entry| *entry.value())
    }

    fn insert(&self, key: String, order_id: Uuid) {
        if self.keys.len() >= self.capacity {
            self.keys.clear();
        }
        self.keys.insert(key, order_id);
    }

    fn remove(&self, key: &str) {
        self.keys.remove(key);
    }
}

impl CheckoutOrchestrator {
    pub fn new(
        db: Arc<DbPool>,
        pricing_config: &PricingConfig,
        gateway: Arc<dyn PaymentGateway>,
        shipping_queue: ShippingQueue,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            catalog: CatalogService::new(),
            carts: CartService::new(),
            coupons: CouponService::new(),
            pricing: PricingEngine::new(pricing_config),
            ledger: InventoryLedger::new(),
            state_machine: OrderStateMachine::new(),
            gateway,
            shipping_queue,
            event_sender,
            seen_keys: IdempotencyCache::new(IDEMPOTENCY_CACHE_CAPACITY),
        }
    }

    pub async fn checkout(&self, input: CheckoutInput) -> Result<CheckoutOutcome, ServiceError> {
        if let Some(key) = input.idempotency_key.as_deref() {
            if let Some(existing) = self.find_replay(key).await? {
                info!(order_id = %existing.id, key, "checkout replayed by idempotency key");
                return self.replay_outcome(existing).await;
            }
        }

        let (_cart, cart_items) = self.carts.load_active(&*self.db, input.cart_id).await?;
        if cart_items.is_empty() {
            return Err(ServiceError::ValidationError("cart is empty".into()));
        }

        let requested: Vec<(ItemRef, i32)> = cart_items
            .iter()
            .map(|i| {
                (
                    ItemRef {
                        item_kind: i.item_kind,
                        item_id: i.item_id,
                    },
                    i.quantity,
                )
            })
            .collect();
        let lines = self.catalog.resolve_lines(&*self.db, &requested).await?;

        // Coupon problems never block checkout; an unknown or rejected code
        // prices as no discount and the reason rides along in the outcome.
        let (coupon, mut coupon_rejection) = match input.coupon_code.as_deref() {
            Some(code) => match self.coupons.find_by_code(&*self.db, code).await? {
                Some(c) => (Some(c), None),
                None => (None, Some("coupon not found".to_string())),
            },
            None => (None, None),
        };

        let quote = self.pricing.quote(&lines, coupon.as_ref(), Utc::now())?;
        if coupon_rejection.is_none() {
            coupon_rejection = quote.coupon_rejection.clone();
        }
        if let Some(reason) = coupon_rejection.as_deref() {
            info!(cart_id = %input.cart_id, reason, "coupon did not apply");
        }

        let stock: Vec<StockLine> = lines
            .iter()
            .map(|l| StockLine {
                item_id: l.item_id,
                quantity: l.quantity,
            })
            .collect();
        self.ledger.reserve(&*self.db, &stock).await?;

        let order = match self
            .create_order(&input, &lines, coupon.as_ref(), &quote)
            .await
        {
            Ok(order) => order,
            Err(ServiceError::DatabaseError(db_err)) => {
                // A racing request with the same key won the insert.
                if let (Some(SqlErr::UniqueConstraintViolation(_)), Some(key)) =
                    (db_err.sql_err(), input.idempotency_key.as_deref())
                {
                    if let Some(existing) = self.find_replay(key).await? {
                        return self.replay_outcome(existing).await;
                    }
                }
                return Err(ServiceError::DatabaseError(db_err));
            }
            Err(e) => return Err(e),
        };

        if let Some(key) = input.idempotency_key.clone() {
            self.seen_keys.insert(key, order.id);
        }
        let _ = self.event_sender.send(Event::OrderCreated(order.id)).await;
        if quote.coupon_discount > 0 {
            if let Some(c) = coupon.as_ref() {
                let _ = self
                    .event_sender
                    .send(Event::CouponRedeemed {
                        order_id: order.id,
                        code: c.code.clone(),
                    })
                    .await;
            }
        }

        let mut outcome = match input.payment_method {
            PaymentMethod::Online => self.begin_online_payment(order).await?,
            PaymentMethod::CashOnDelivery => self.confirm_cod(order, &stock).await?,
        };
        outcome.coupon_rejection = coupon_rejection;
        Ok(outcome)
    }

    /// Inserts the order, its items, the opening timeline entry, the
    /// idempotency key, and the coupon usage in one transaction.
    async fn create_order(
        &self,
        input: &CheckoutInput,
        lines: &[ResolvedLine],
        coupon: Option<&coupon::Model>,
        quote: &PriceBreakdown,
    ) -> Result<order::Model, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let amounts = quote.as_decimals();
        let payment_status = match input.payment_method {
            PaymentMethod::Online => PaymentStatus::Pending,
            PaymentMethod::CashOnDelivery => PaymentStatus::CodPending,
        };
        let coupon_applied = coupon.filter(|_| quote.coupon_discount > 0);

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number()),
            customer_id: Set(input.customer_id),
            cart_id: Set(Some(input.cart_id)),
            status: Set(OrderStatus::Pending),
            payment_status: Set(payment_status),
            payment_method: Set(input.payment_method),
            subtotal: Set(amounts.subtotal),
            discount: Set(rust_decimal::Decimal::ZERO),
            coupon_discount: Set(amounts.coupon_discount),
            shipping_charge: Set(amounts.shipping_charge),
            tax: Set(amounts.tax),
            total: Set(amounts.total),
            currency: Set(self.pricing.currency.clone()),
            coupon_code: Set(coupon_applied.map(|c| c.code.clone())),
            gateway_order_id: Set(None),
            gateway_payment_id: Set(None),
            carrier_order_id: Set(None),
            shipment_id: Set(None),
            tracking_number: Set(None),
            shipping_address: Set(input.shipping_address.to_string()),
            billing_address: Set(input.billing_address.as_ref().map(|a| a.to_string())),
            notes: Set(input.notes.clone()),
            idempotency_key: Set(input.idempotency_key.clone()),
            created_at: Set(now),
            paid_at: Set(None),
            shipped_at: Set(None),
            delivered_at: Set(None),
            cancelled_at: Set(None),
            updated_at: Set(None),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        for line in lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                item_kind: Set(line.item_kind),
                item_id: Set(line.item_id),
                sku: Set(line.sku.clone()),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(money::from_minor(
                    money::to_minor(line.unit_price) * line.quantity as i64,
                )),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        self.state_machine
            .append_timeline(
                &txn,
                order_id,
                OrderStatus::Pending,
                Some(timeline_title(OrderStatus::Pending).to_string()),
                None,
            )
            .await?;

        if let Some(c) = coupon_applied {
            self.coupons.consume(&txn, c, order_id).await?;
        }

        txn.commit().await?;
        Ok(order)
    }

    /// Online branch: open a gateway intent for the pending order. A gateway
    /// failure removes the order entirely so the cart can retry cleanly.
    async fn begin_online_payment(
        &self,
        order: order::Model,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let request = CreateIntentRequest {
            amount: order.total,
            currency: order.currency.clone(),
            reference: order.order_number.clone(),
            metadata: serde_json::json!({ "order_id": order.id }),
        };

        let intent = match self.gateway.create_intent(&request).await {
            Ok(intent) => intent,
            Err(err) => {
                warn!(order_id = %order.id, error = %err,
                    "payment intent failed; rolling back order");
                self.discard_order(&order).await?;
                return Err(ServiceError::PaymentInitFailed(err.to_string()));
            }
        };

        let mut active: order::ActiveModel = order.into();
        active.gateway_order_id = Set(Some(intent.intent_id.clone()));
        let order = active.update(&*self.db).await?;

        info!(order_id = %order.id, gateway_order_id = %intent.intent_id,
            "online checkout awaiting payment");
        Ok(CheckoutOutcome {
            order,
            payment_intent: Some(intent),
            replayed: false,
            coupon_rejection: None,
        })
    }

    /// COD branch: no payment to wait for, so confirm immediately. Stock
    /// commit and cart clearing share the confirmation transaction; a stock
    /// conflict fails the whole checkout.
    async fn confirm_cod(
        &self,
        order: order::Model,
        stock: &[StockLine],
    ) -> Result<CheckoutOutcome, ServiceError> {
        let txn = self.db.begin().await?;
        let confirmed = self
            .state_machine
            .transition(
                &txn,
                &order,
                OrderStatus::Confirmed,
                Some("Cash on delivery".to_string()),
                None,
            )
            .await?;
        self.ledger.commit(&txn, order.id, stock).await?;
        if let Some(cart_id) = order.cart_id {
            self.carts.clear(&txn, cart_id).await?;
        }
        txn.commit().await?;

        let _ = self
            .event_sender
            .send(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: OrderStatus::Pending.to_value(),
                new_status: OrderStatus::Confirmed.to_value(),
            })
            .await;
        let _ = self
            .event_sender
            .send(Event::InventoryCommitted { order_id: order.id })
            .await;
        if let Some(cart_id) = order.cart_id {
            let _ = self.event_sender.send(Event::CartCleared(cart_id)).await;
        }
        self.shipping_queue.enqueue(order.id).await;

        info!(order_id = %confirmed.id, "cash-on-delivery order confirmed");
        Ok(CheckoutOutcome {
            order: confirmed,
            payment_intent: None,
            replayed: false,
            coupon_rejection: None,
        })
    }

    /// Outcome for a checkout replayed by idempotency key. An online order
    /// still awaiting payment gets its gateway intent back, since a client
    /// that lost the original response needs it to complete payment.
    async fn replay_outcome(&self, order: order::Model) -> Result<CheckoutOutcome, ServiceError> {
        let awaiting_payment = order.payment_method == PaymentMethod::Online
            && matches!(
                order.payment_status,
                PaymentStatus::Pending | PaymentStatus::Failed
            );
        if !awaiting_payment {
            return Ok(CheckoutOutcome {
                order,
                payment_intent: None,
                replayed: true,
                coupon_rejection: None,
            });
        }

        let (order, intent) = match order.gateway_order_id.clone() {
            Some(gateway_order_id) => {
                let intent = PaymentIntent {
                    intent_id: gateway_order_id,
                    client_secret: None,
                    amount: order.total,
                    currency: order.currency.clone(),
                };
                (order, intent)
            }
            // The first attempt stopped before the gateway call landed.
            None => {
                let request = CreateIntentRequest {
                    amount: order.total,
                    currency: order.currency.clone(),
                    reference: order.order_number.clone(),
                    metadata: serde_json::json!({ "order_id": order.id }),
                };
                let intent = self
                    .gateway
                    .create_intent(&request)
                    .await
                    .map_err(|e| ServiceError::PaymentInitFailed(e.to_string()))?;
                let mut active: order::ActiveModel = order.into();
                active.gateway_order_id = Set(Some(intent.intent_id.clone()));
                (active.update(&*self.db).await?, intent)
            }
        };

        Ok(CheckoutOutcome {
            order,
            payment_intent: Some(intent),
            replayed: true,
            coupon_rejection: None,
        })
    }

    /// Removes an order whose payment could not even start, together with
    /// its items and timeline, and hands the coupon usage back.
    async fn discard_order(&self, order: &order::Model) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        order_item::Entity::delete_many()
            .filter(order_item::Column::OrderId.eq(order.id))
            .exec(&txn)
            .await?;
        crate::entities::order_timeline::Entity::delete_many()
            .filter(crate::entities::order_timeline::Column::OrderId.eq(order.id))
            .exec(&txn)
            .await?;
        order::Entity::delete_by_id(order.id).exec(&txn).await?;

        if order.coupon_discount > rust_decimal::Decimal::ZERO {
            if let Some(code) = order.coupon_code.as_deref() {
                coupon::Entity::update_many()
                    .col_expr(
                        coupon::Column::UsageCount,
                        Expr::col(coupon::Column::UsageCount).sub(1),
                    )
                    .filter(coupon::Column::Code.eq(code))
                    .filter(coupon::Column::UsageCount.gt(0))
                    .exec(&txn)
                    .await?;
            }
        }
        txn.commit().await?;

        if let Some(key) = order.idempotency_key.as_deref() {
            self.seen_keys.remove(key);
        }
        Ok(())
    }

    /// Replay lookup: memory first, then the durable unique column.
    async fn find_replay(&self, key: &str) -> Result<Option<order::Model>, ServiceError> {
        if let Some(order_id) = self.seen_keys.get(key) {
            if let Some(order) = order::Entity::find_by_id(order_id).one(&*self.db).await? {
                return Ok(Some(order));
            }
            self.seen_keys.remove(key);
        }
        let found = order::Entity::find()
            .filter(order::Column::IdempotencyKey.eq(key))
            .one(&*self.db)
            .await?;
        Ok(found)
    }
}

/// Human-friendly unique order number.
fn generate_order_number() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", &suffix[..12].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_numbers_are_prefixed_and_unique() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert!(a.starts_with("ORD-"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn idempotency_cache_is_bounded() {
        let cache = IdempotencyCache::new(2);
        let a = Uuid::new_v4();
        cache.insert("a".into(), a);
        cache.insert("b".into(), Uuid::new_v4());
        assert_eq!(cache.get("a"), Some(a));

        // At capacity the cache resets; evicted keys fall through to the
        // durable column lookup.
        let c = Uuid::new_v4();
        cache.insert("c".into(), c);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(c));

        cache.remove("c");
        assert_eq!(cache.get("c"), None);
    }
}
