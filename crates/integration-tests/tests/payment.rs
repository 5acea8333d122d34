//! Checkout sessions and webhook reconciliation.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use pickup_api::db::OrderRepository;
use pickup_api::models::{LineItem, Order, Product};
use pickup_api::services::checkout::{CheckoutSession, MockPaymentProvider, ProviderError};
use pickup_core::{OrderId, PaymentStatus, PickupDate, Price, ProductId};
use pickup_integration_tests::{BASE_URL, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use testresult::TestResult;

fn catalog_order() -> (Product, Order) {
    let product = Product {
        id: ProductId::generate(),
        name: "Sourdough loaf".to_owned(),
        price: Price::new(dec!(4.5)).unwrap(),
    };
    let order = Order::new(
        None,
        vec![LineItem {
            product_ref: product.id,
            quantity: 3,
            unit_price: product.price,
        }],
        PickupDate::parse("2025-06-01").unwrap(),
        None,
        None,
    )
    .unwrap();
    (product, order)
}

fn completed_event(order_id: &str) -> String {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {"object": {"id": "cs_test_1", "metadata": {"orderId": order_id}}}
    })
    .to_string()
}

// ============================================================================
// Checkout
// ============================================================================

#[tokio::test]
async fn test_checkout_returns_provider_url() -> TestResult {
    let (product, order) = catalog_order();
    let order_id = order.id;

    let mut provider = MockPaymentProvider::new();
    provider
        .expect_create_checkout_session()
        .withf(move |request| {
            request.line_items.len() == 1
                && request.line_items[0].unit_amount == 450
                && request.line_items[0].quantity == 3
                && request.line_items[0].name == "Sourdough loaf"
                && request.cancel_url == format!("{BASE_URL}/checkout-cancel")
                && request.metadata.get("orderId") == Some(&order_id.to_string())
        })
        .times(1)
        .returning(|_| {
            Ok(CheckoutSession {
                id: "cs_test_1".to_owned(),
                url: "https://checkout.stripe.test/pay/cs_test_1".to_owned(),
            })
        });

    let app = TestApp::with_provider(vec![product], vec![], provider);
    app.orders.insert(&order).await?;

    let response = app
        .send(
            Method::POST,
            "/payment/create-checkout-session",
            None,
            Some(&json!({"orderId": order_id.to_string()})),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.body["url"],
        "https://checkout.stripe.test/pay/cs_test_1"
    );
    Ok(())
}

#[tokio::test]
async fn test_checkout_for_missing_order_is_not_found() {
    let app = TestApp::new(vec![], vec![]);

    let response = app
        .send(
            Method::POST,
            "/payment/create-checkout-session",
            None,
            Some(&json!({"orderId": OrderId::generate().to_string()})),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["message"], "Order not found");
}

#[tokio::test]
async fn test_checkout_provider_failure_is_internal_error() -> TestResult {
    let (product, order) = catalog_order();
    let mut provider = MockPaymentProvider::new();
    provider
        .expect_create_checkout_session()
        .returning(|_| Err(ProviderError::Transport("connection reset".to_owned())));

    let app = TestApp::with_provider(vec![product], vec![], provider);
    app.orders.insert(&order).await?;

    let response = app
        .send(
            Method::POST,
            "/payment/create-checkout-session",
            None,
            Some(&json!({"orderId": order.id.to_string()})),
        )
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["message"], "Could not create checkout session");
    Ok(())
}

// ============================================================================
// Webhook
// ============================================================================

#[tokio::test]
async fn test_signed_completion_marks_order_paid() -> TestResult {
    let (product, order) = catalog_order();
    let app = TestApp::new(vec![product], vec![]);
    app.orders.insert(&order).await?;

    let payload = completed_event(&order.id.to_string());
    let signature = app.sign(&payload);
    let response = app.deliver_webhook(&payload, Some(&signature)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"received": true}));
    let stored = app.orders.get(order.id).await?.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    Ok(())
}

#[tokio::test]
async fn test_redelivery_is_idempotent() -> TestResult {
    let (product, order) = catalog_order();
    let app = TestApp::new(vec![product], vec![]);
    app.orders.insert(&order).await?;

    let payload = completed_event(&order.id.to_string());
    let signature = app.sign(&payload);
    for _ in 0..2 {
        let response = app.deliver_webhook(&payload, Some(&signature)).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let stored = app.orders.get(order.id).await?.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    Ok(())
}

#[tokio::test]
async fn test_tampered_payload_is_rejected() -> TestResult {
    let (product, order) = catalog_order();
    let app = TestApp::new(vec![product], vec![]);
    app.orders.insert(&order).await?;

    let payload = completed_event(&order.id.to_string());
    let signature = app.sign(&payload);
    let tampered = payload.replace("cs_test_1", "cs_test_2");
    let response = app.deliver_webhook(&tampered, Some(&signature)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(
        response.body["message"]
            .as_str()
            .unwrap()
            .starts_with("Webhook Error:")
    );
    let stored = app.orders.get(order.id).await?.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn test_missing_signature_is_rejected() {
    let app = TestApp::new(vec![], vec![]);

    let payload = completed_event(&OrderId::generate().to_string());
    let response = app.deliver_webhook(&payload, None).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_completion_for_unknown_order_is_acknowledged() {
    let app = TestApp::new(vec![], vec![]);

    let payload = completed_event(&OrderId::generate().to_string());
    let signature = app.sign(&payload);
    let response = app.deliver_webhook(&payload, Some(&signature)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(app.orders.is_empty().await);
}

#[tokio::test]
async fn test_other_event_kinds_are_acknowledged_without_effect() -> TestResult {
    let (product, order) = catalog_order();
    let app = TestApp::new(vec![product], vec![]);
    app.orders.insert(&order).await?;

    let payload = json!({
        "id": "evt_2",
        "type": "payment_intent.created",
        "data": {"object": {"id": "pi_1", "metadata": {"orderId": order.id.to_string()}}}
    })
    .to_string();
    let signature = app.sign(&payload);
    let response = app.deliver_webhook(&payload, Some(&signature)).await;

    assert_eq!(response.status, StatusCode::OK);
    let stored = app.orders.get(order.id).await?.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    Ok(())
}
