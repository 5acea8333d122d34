//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;
use url::Url;

use crate::config::ApiConfig;
use crate::db::{
    OrderRepository, PgOrderRepository, PgProductCatalog, PgUserDirectory, ProductLookup,
    UserDirectory,
};
use crate::services::checkout::ProviderError;
use crate::services::email::NotifyError;
use crate::services::{
    Authenticator, CheckoutService, EmailNotifier, JwtAuthenticator, LogNotifier,
    OrderNotifier, OrderQueryService, OrderService, PaymentProvider, WebhookReconciler,
};
use crate::stripe::{StripeClient, WebhookVerifier};

/// Error assembling the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("email setup failed: {0}")]
    Notifier(#[from] NotifyError),
}

/// Collaborators the services are built from.
///
/// Production wiring lives in [`AppState::new`]; tests assemble this directly
/// with in-memory stores and mocks.
pub struct AppParts {
    pub orders: Arc<dyn OrderRepository>,
    pub products: Arc<dyn ProductLookup>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn OrderNotifier>,
    pub provider: Arc<dyn PaymentProvider>,
    pub authenticator: Arc<dyn Authenticator>,
    pub webhook_secret: SecretString,
    pub base_url: Url,
    pub pool: Option<PgPool>,
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    orders: OrderService,
    query: OrderQueryService,
    checkout: CheckoutService,
    webhooks: WebhookReconciler,
    authenticator: Arc<dyn Authenticator>,
    pool: Option<PgPool>,
}

impl AppState {
    /// Wire the PostgreSQL stores, Stripe and SMTP from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Stripe client or the mail relay cannot be set up.
    pub fn new(config: &ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let notifier: Arc<dyn OrderNotifier> = match &config.email {
            Some(email) => Arc::new(EmailNotifier::new(email)?),
            None => {
                tracing::warn!("SMTP not configured, order confirmations will only be logged");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::from_parts(AppParts {
            orders: Arc::new(PgOrderRepository::new(pool.clone())),
            products: Arc::new(PgProductCatalog::new(pool.clone(), config.product_cache_ttl)),
            users: Arc::new(PgUserDirectory::new(pool.clone())),
            notifier,
            provider: Arc::new(StripeClient::new(&config.stripe)?),
            authenticator: Arc::new(JwtAuthenticator::new(&config.jwt_secret)),
            webhook_secret: config.stripe.webhook_secret.clone(),
            base_url: config.base_url.clone(),
            pool: Some(pool),
        }))
    }

    #[must_use]
    pub fn from_parts(parts: AppParts) -> Self {
        let AppParts {
            orders,
            products,
            users,
            notifier,
            provider,
            authenticator,
            webhook_secret,
            base_url,
            pool,
        } = parts;

        Self {
            inner: Arc::new(AppStateInner {
                orders: OrderService::new(Arc::clone(&orders), Arc::clone(&products), notifier),
                query: OrderQueryService::new(Arc::clone(&orders), Arc::clone(&products), users),
                checkout: CheckoutService::new(Arc::clone(&orders), products, provider, base_url),
                webhooks: WebhookReconciler::new(WebhookVerifier::new(webhook_secret), orders),
                authenticator,
                pool,
            }),
        }
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn order_query(&self) -> &OrderQueryService {
        &self.inner.query
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    #[must_use]
    pub fn webhooks(&self) -> &WebhookReconciler {
        &self.inner.webhooks
    }

    #[must_use]
    pub fn authenticator(&self) -> &dyn Authenticator {
        self.inner.authenticator.as_ref()
    }

    /// Database pool, absent when running on in-memory stores.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}
