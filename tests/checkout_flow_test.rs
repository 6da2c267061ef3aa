mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

use common::TestApp;
use pcforge_api::entities::order::{OrderStatus, PaymentMethod, PaymentStatus};
use pcforge_api::entities::{cart, cart_item, coupon, order};
use pcforge_api::errors::ServiceError;
use pcforge_api::services::checkout::CheckoutInput;

fn input(app_cart: Uuid, method: PaymentMethod) -> CheckoutInput {
    CheckoutInput {
        cart_id: app_cart,
        customer_id: None,
        payment_method: method,
        shipping_address: TestApp::address(),
        billing_address: None,
        coupon_code: None,
        notes: None,
        idempotency_key: None,
    }
}

#[tokio::test]
async fn cod_checkout_confirms_order_and_commits_stock() {
    let app = TestApp::spawn().await;
    let gpu = app.seed_product("RTX 4070", dec!(1200), 5).await;
    let ram = app.seed_product("32GB DDR5", dec!(400), 5).await;
    app.seed_coupon("SAVE10", dec!(10), Some(dec!(150)), Some(dec!(500)), Some(100))
        .await;
    let cart_id = app.seed_cart(&[(gpu, 1), (ram, 2)]).await;

    let mut req = input(cart_id, PaymentMethod::CashOnDelivery);
    req.coupon_code = Some("save10".into());
    let outcome = app.checkout.checkout(req).await.unwrap();

    let order = &outcome.order;
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::CodPending);
    assert_eq!(order.subtotal, dec!(2000.00));
    assert_eq!(order.coupon_discount, dec!(150.00));
    assert_eq!(order.shipping_charge, dec!(99.00));
    assert_eq!(order.tax, dec!(333.00));
    assert_eq!(order.total, dec!(2282.00));
    assert!(outcome.payment_intent.is_none());
    assert!(!outcome.replayed);

    // Stock committed exactly once.
    assert_eq!(app.stock_of(gpu).await, 4);
    assert_eq!(app.stock_of(ram).await, 3);

    // Cart cleared and converted.
    let cart = cart::Entity::find_by_id(cart_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cart.status, cart::CartStatus::Converted);
    let remaining = cart_item::Entity::find().all(&*app.db).await.unwrap();
    assert!(remaining.is_empty());

    // Coupon usage consumed.
    let c = coupon::Entity::find()
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.usage_count, 1);
}

#[tokio::test]
async fn online_checkout_leaves_order_pending_with_intent() {
    let app = TestApp::spawn().await;
    let ssd = app.seed_product("990 Pro 2TB", dec!(14000), 3).await;
    let cart_id = app.seed_cart(&[(ssd, 1)]).await;

    let outcome = app
        .checkout
        .checkout(input(cart_id, PaymentMethod::Online))
        .await
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::Pending);
    assert_eq!(outcome.order.payment_status, PaymentStatus::Pending);
    assert!(outcome.order.gateway_order_id.is_some());
    let intent = outcome.payment_intent.expect("payment intent");
    assert_eq!(intent.amount, outcome.order.total);

    // Free shipping above the threshold, nothing committed yet.
    assert_eq!(outcome.order.shipping_charge, dec!(0.00));
    assert_eq!(app.stock_of(ssd).await, 3);
    let cart = cart::Entity::find_by_id(cart_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cart.status, cart::CartStatus::Active);
}

#[tokio::test]
async fn gateway_failure_rolls_back_the_order() {
    let app = TestApp::spawn().await;
    let cpu = app.seed_product("Ryzen 9", dec!(3500), 2).await;
    app.seed_coupon("SAVE10", dec!(10), None, None, Some(10)).await;
    let cart_id = app.seed_cart(&[(cpu, 1)]).await;
    app.gateway
        .fail_intents
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let mut req = input(cart_id, PaymentMethod::Online);
    req.coupon_code = Some("SAVE10".into());
    let err = app.checkout.checkout(req).await.unwrap_err();
    assert_matches!(err, ServiceError::PaymentInitFailed(_));

    // No orphan order, stock untouched, coupon usage handed back.
    assert!(order::Entity::find().all(&*app.db).await.unwrap().is_empty());
    assert_eq!(app.stock_of(cpu).await, 2);
    let c = coupon::Entity::find()
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.usage_count, 0);
}

#[tokio::test]
async fn empty_or_missing_cart_is_rejected() {
    let app = TestApp::spawn().await;
    let empty_cart = app.seed_cart(&[]).await;

    let err = app
        .checkout
        .checkout(input(empty_cart, PaymentMethod::CashOnDelivery))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .checkout
        .checkout(input(Uuid::new_v4(), PaymentMethod::CashOnDelivery))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn insufficient_stock_fails_checkout() {
    let app = TestApp::spawn().await;
    let psu = app.seed_product("850W PSU", dec!(900), 1).await;
    let cart_id = app.seed_cart(&[(psu, 2)]).await;

    let err = app
        .checkout
        .checkout(input(cart_id, PaymentMethod::CashOnDelivery))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert_eq!(app.stock_of(psu).await, 1);
}

#[tokio::test]
async fn rejected_coupon_degrades_to_no_discount() {
    let app = TestApp::spawn().await;
    let case = app.seed_product("NZXT case", dec!(700), 4).await;
    let cart_id = app.seed_cart(&[(case, 1)]).await;

    // Unknown code: the order still goes through at full price.
    let mut req = input(cart_id, PaymentMethod::CashOnDelivery);
    req.coupon_code = Some("NOPE".into());
    let outcome = app.checkout.checkout(req).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Confirmed);
    assert_eq!(outcome.order.coupon_discount, dec!(0.00));
    assert!(outcome.order.coupon_code.is_none());
    assert_eq!(outcome.coupon_rejection.as_deref(), Some("coupon not found"));
}

#[tokio::test]
async fn below_minimum_coupon_degrades_with_reason() {
    let app = TestApp::spawn().await;
    let fan = app.seed_product("120mm fan", dec!(300), 4).await;
    app.seed_coupon("SAVE10", dec!(10), Some(dec!(150)), Some(dec!(500)), Some(100))
        .await;
    let cart_id = app.seed_cart(&[(fan, 1)]).await;

    let mut req = input(cart_id, PaymentMethod::CashOnDelivery);
    req.coupon_code = Some("SAVE10".into());
    let outcome = app.checkout.checkout(req).await.unwrap();

    assert_eq!(outcome.order.coupon_discount, dec!(0.00));
    assert!(outcome
        .coupon_rejection
        .as_deref()
        .unwrap()
        .contains("below coupon minimum"));

    // No usage consumed for a coupon that did not apply.
    let c = coupon::Entity::find()
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.usage_count, 0);
}

#[tokio::test]
async fn idempotency_key_replays_instead_of_duplicating() {
    let app = TestApp::spawn().await;
    let mobo = app.seed_product("B650 board", dec!(1800), 5).await;
    let cart_id = app.seed_cart(&[(mobo, 1)]).await;

    let mut first = input(cart_id, PaymentMethod::CashOnDelivery);
    first.idempotency_key = Some("client-key-42".into());
    let created = app.checkout.checkout(first.clone()).await.unwrap();
    assert!(!created.replayed);

    let replayed = app.checkout.checkout(first).await.unwrap();
    assert!(replayed.replayed);
    assert_eq!(replayed.order.id, created.order.id);

    // One order, one stock commit.
    assert_eq!(order::Entity::find().all(&*app.db).await.unwrap().len(), 1);
    assert_eq!(app.stock_of(mobo).await, 4);
}

#[tokio::test]
async fn online_replay_returns_the_payment_intent_again() {
    let app = TestApp::spawn().await;
    let gpu = app.seed_product("RTX 4080", dec!(12000), 2).await;
    let cart_id = app.seed_cart(&[(gpu, 1)]).await;

    let mut first = input(cart_id, PaymentMethod::Online);
    first.idempotency_key = Some("client-key-77".into());
    let created = app.checkout.checkout(first.clone()).await.unwrap();
    let gwo = created.order.gateway_order_id.clone().unwrap();

    // The client lost the response and retries with the same key; it still
    // needs the intent to complete payment.
    let replayed = app.checkout.checkout(first).await.unwrap();
    assert!(replayed.replayed);
    let intent = replayed.payment_intent.expect("intent on replay");
    assert_eq!(intent.intent_id, gwo);
    assert_eq!(intent.amount, created.order.total);
    assert_eq!(order::Entity::find().all(&*app.db).await.unwrap().len(), 1);
}
