//! Payment webhook reconciliation.
//!
//! Authenticity is checked against the raw body before anything is parsed.
//! Only `checkout.session.completed` changes state; every other event kind is
//! acknowledged untouched. Marking an order paid is a blind overwrite, so a
//! redelivered event lands on the same end state.

use std::sync::Arc;

use pickup_core::{OrderId, PaymentStatus};
use thiserror::Error;
use tracing::instrument;

use crate::db::{OrderRepository, RepositoryError};
use crate::stripe::{CheckoutSessionObject, SignatureError, StripeEvent, WebhookVerifier};

/// Event kind that marks an order as paid.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    InvalidSignature(#[from] SignatureError),

    #[error("malformed event payload: {0}")]
    MalformedEvent(#[source] serde_json::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What a delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The order was marked paid.
    PaymentRecorded(OrderId),
    /// The event referenced no stored order.
    OrderMissing,
    /// The event kind needs no action.
    Ignored(String),
}

#[derive(Clone)]
pub struct WebhookReconciler {
    verifier: WebhookVerifier,
    orders: Arc<dyn OrderRepository>,
}

impl WebhookReconciler {
    #[must_use]
    pub fn new(verifier: WebhookVerifier, orders: Arc<dyn OrderRepository>) -> Self {
        Self { verifier, orders }
    }

    /// Verify and apply one delivery using the current clock.
    ///
    /// # Errors
    ///
    /// See [`Self::handle_at`].
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.handle_at(payload, signature, chrono::Utc::now().timestamp())
            .await
    }

    /// Verify and apply one delivery as of `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// - [`WebhookError::InvalidSignature`] if the payload is not authentic
    /// - [`WebhookError::MalformedEvent`] if an authentic payload is not an event
    /// - [`WebhookError::Repository`] if the update fails, so the provider retries
    #[instrument(skip(self, payload, signature), fields(bytes = payload.len()))]
    pub async fn handle_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<WebhookOutcome, WebhookError> {
        self.verifier.verify(payload, signature, now).inspect_err(|e| {
            tracing::warn!(error = %e, "Webhook signature verification failed");
        })?;

        let event: StripeEvent =
            serde_json::from_slice(payload).map_err(WebhookError::MalformedEvent)?;

        if event.event_type != CHECKOUT_COMPLETED {
            tracing::info!(event_type = %event.event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored(event.event_type));
        }

        let session: CheckoutSessionObject =
            serde_json::from_value(event.data.object).map_err(WebhookError::MalformedEvent)?;

        let Some(order_id) = session
            .metadata
            .get("orderId")
            .and_then(|raw| raw.parse::<OrderId>().ok())
        else {
            tracing::warn!(
                session_id = session.id.as_deref().unwrap_or("unknown"),
                "Completed checkout session has no usable orderId"
            );
            return Ok(WebhookOutcome::OrderMissing);
        };

        match self
            .orders
            .set_payment_status(order_id, PaymentStatus::Paid)
            .await?
        {
            Some(_) => {
                tracing::info!(%order_id, "Payment recorded");
                Ok(WebhookOutcome::PaymentRecorded(order_id))
            }
            None => {
                tracing::warn!(%order_id, "Completed checkout for unknown order");
                Ok(WebhookOutcome::OrderMissing)
            }
        }
    }
}
