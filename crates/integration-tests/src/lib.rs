//! Integration tests for the pickup order service.
//!
//! The full router is driven in-process with `tower::ServiceExt::oneshot`,
//! backed by the in-memory order store, a fixed catalog and a mocked payment
//! provider. No database or network is needed:
//!
//! ```bash
//! cargo test -p pickup-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `orders` - Order creation, listing, pagination and status mutation
//! - `payment` - Checkout sessions and webhook reconciliation
//! - `auth` - Token handling and admin gating

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use pickup_api::db::{InMemoryCatalog, InMemoryOrderRepository, InMemoryUserDirectory};
use pickup_api::models::{Customer, Principal, Product};
use pickup_api::services::checkout::MockPaymentProvider;
use pickup_api::services::{JwtAuthenticator, LogNotifier};
use pickup_api::stripe::{SIGNATURE_HEADER, WebhookVerifier};
use pickup_api::{AppParts, AppState};
use pickup_core::{Email, UserId};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

/// HS256 key shared by the app under test and [`TestApp::token_for`].
pub const JWT_SECRET: &str = "kR7#vQ2!mX9@pL4$wN8^zT1&yB6*hJ3%";

/// Endpoint secret used to sign webhook deliveries.
pub const WEBHOOK_SECRET: &str = "whsec_integration_test_secret";

/// Frontend origin the checkout redirect URLs are built from.
pub const BASE_URL: &str = "http://shop.test";

/// Largest response body the helpers will buffer.
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// A router wired to in-memory collaborators, plus handles for inspection.
pub struct TestApp {
    router: Router,
    pub orders: Arc<InMemoryOrderRepository>,
    authenticator: JwtAuthenticator,
    verifier: WebhookVerifier,
}

/// Status and decoded body of a response.
///
/// Non-JSON bodies are returned as a JSON string.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    /// App with a catalog and no expectations on the payment provider.
    #[must_use]
    pub fn new(products: Vec<Product>, customers: Vec<Customer>) -> Self {
        Self::with_provider(products, customers, MockPaymentProvider::new())
    }

    /// App whose payment provider follows the given mock.
    ///
    /// # Panics
    ///
    /// Panics if [`BASE_URL`] is not a valid URL.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn with_provider(
        products: Vec<Product>,
        customers: Vec<Customer>,
        provider: MockPaymentProvider,
    ) -> Self {
        let jwt_secret = SecretString::from(JWT_SECRET);
        let orders = Arc::new(InMemoryOrderRepository::new());

        let state = AppState::from_parts(AppParts {
            orders: orders.clone(),
            products: Arc::new(InMemoryCatalog::new(products)),
            users: Arc::new(InMemoryUserDirectory::new(customers)),
            notifier: Arc::new(LogNotifier),
            provider: Arc::new(provider),
            authenticator: Arc::new(JwtAuthenticator::new(&jwt_secret)),
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            base_url: Url::parse(BASE_URL).unwrap(),
            pool: None,
        });

        Self {
            router: pickup_api::app(state, &[]),
            orders,
            authenticator: JwtAuthenticator::new(&jwt_secret),
            verifier: WebhookVerifier::new(SecretString::from(WEBHOOK_SECRET)),
        }
    }

    /// Mint a one-hour bearer token for `principal`.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn token_for(&self, principal: &Principal) -> String {
        self.authenticator
            .issue(principal, chrono::Duration::hours(1))
            .unwrap()
    }

    /// `Stripe-Signature` header value for `payload`, timestamped now.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn sign(&self, payload: &str) -> String {
        self.verifier
            .signature_header(payload.as_bytes(), chrono::Utc::now().timestamp())
            .unwrap()
    }

    /// Send a request with an optional bearer token and JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::unwrap_used)]
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.dispatch(request).await
    }

    /// Deliver a raw webhook payload with the given signature header.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::unwrap_used)]
    pub async fn deliver_webhook(&self, payload: &str, signature: Option<&str>) -> TestResponse {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/payment/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        let request = builder.body(Body::from(payload.to_owned())).unwrap();
        self.dispatch(request).await
    }

    #[allow(clippy::unwrap_used)]
    async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        TestResponse { status, body }
    }
}

/// A registered customer and the matching principal.
///
/// # Panics
///
/// Panics if `email` is not a valid address.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn customer(name: &str, email: &str, is_admin: bool) -> (Customer, Principal) {
    let id = UserId::generate();
    let email = Email::parse(email).unwrap();
    (
        Customer {
            id,
            name: name.to_owned(),
            email: Some(email.clone()),
        },
        Principal {
            id,
            name: name.to_owned(),
            email: Some(email),
            is_admin,
        },
    )
}
