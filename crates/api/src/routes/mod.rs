//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health                              - Liveness
//! GET   /health/ready                        - Readiness (database)
//!
//! # Orders
//! POST  /orders                              - Create order (guest or customer)
//! GET   /orders                              - List with aggregates (admin)
//! GET   /orders/myorders                     - Caller's orders (customer)
//! PATCH /orders/{order_id}/pickup-status     - Set pickup status (admin)
//! PATCH /orders/{order_id}/payment-status    - Set payment status (admin)
//!
//! # Payment
//! POST  /payment/create-checkout-session     - Open hosted checkout
//! POST  /payment/webhook                     - Provider callback (raw body)
//! ```

pub mod health;
pub mod orders;
pub mod payment;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::create).get(orders::list))
        .route("/myorders", get(orders::mine))
        .route("/{order_id}/pickup-status", patch(orders::update_pickup_status))
        .route("/{order_id}/payment-status", patch(orders::update_payment_status))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/create-checkout-session",
            post(payment::create_checkout_session),
        )
        .route("/webhook", post(payment::webhook))
}

/// Create all routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/orders", order_routes())
        .nest("/payment", payment_routes())
}
