//! Business logic behind the HTTP routes.
//!
//! Each service owns its collaborators as trait objects so the routes can be
//! tested against in-memory stores and mocks.

pub mod auth;
pub mod checkout;
pub mod email;
pub mod order_query;
pub mod orders;
pub mod webhook;

pub use auth::{AuthError, Authenticator, JwtAuthenticator};
pub use checkout::{CheckoutService, PaymentProvider};
pub use email::{EmailNotifier, LogNotifier, OrderNotifier};
pub use order_query::OrderQueryService;
pub use orders::OrderService;
pub use webhook::WebhookReconciler;
