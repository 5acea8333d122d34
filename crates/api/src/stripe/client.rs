//! Checkout session creation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::config::StripeConfig;
use crate::services::checkout::{
    CheckoutSession, CheckoutSessionRequest, PaymentProvider, ProviderError,
};

/// Upper bound on a single Stripe API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Stripe REST client.
#[derive(Clone)]
pub struct StripeClient {
    inner: Arc<StripeClientInner>,
}

struct StripeClientInner {
    client: reqwest::Client,
    sessions_url: Url,
    secret_key: SecretString,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build or the base URL
    /// cannot be joined.
    pub fn new(config: &StripeConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let sessions_url = config
            .api_base
            .join("/v1/checkout/sessions")
            .map_err(|e| ProviderError::Transport(format!("Invalid API base: {e}")))?;

        Ok(Self {
            inner: Arc::new(StripeClientInner {
                client,
                sessions_url,
                secret_key: config.secret_key.clone(),
            }),
        })
    }
}

/// Flatten a session request into Stripe's bracketed form encoding.
fn form_fields(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut fields = vec![
        ("mode".to_owned(), "payment".to_owned()),
        ("payment_method_types[]".to_owned(), "card".to_owned()),
        ("success_url".to_owned(), request.success_url.clone()),
        ("cancel_url".to_owned(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        fields.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        fields.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.name.clone(),
        ));
        fields.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        fields.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    for (key, value) in &request.metadata {
        fields.push((format!("metadata[{key}]"), value.clone()));
    }

    fields
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[tracing::instrument(skip(self, request), fields(items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let response = self
            .inner
            .client
            .post(self.inner.sessions_url.clone())
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(&form_fields(request))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(text);
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        tracing::debug!(session_id = %session.id, "Checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::services::checkout::ProviderLineItem;

    #[test]
    fn test_form_fields_use_bracketed_keys() {
        let request = CheckoutSessionRequest {
            line_items: vec![
                ProviderLineItem {
                    name: "Bagel".to_owned(),
                    unit_amount: 250,
                    quantity: 4,
                },
                ProviderLineItem {
                    name: "Coffee".to_owned(),
                    unit_amount: 300,
                    quantity: 1,
                },
            ],
            currency: "usd".to_owned(),
            success_url: "https://shop.test/order-success?orderId=abc".to_owned(),
            cancel_url: "https://shop.test/order-cancelled".to_owned(),
            metadata: BTreeMap::from([
                ("orderId".to_owned(), "abc".to_owned()),
                ("pickupDate".to_owned(), "2025-05-05".to_owned()),
            ]),
        };

        let fields: BTreeMap<String, String> = form_fields(&request).into_iter().collect();
        assert_eq!(fields["mode"], "payment");
        assert_eq!(fields["payment_method_types[]"], "card");
        assert_eq!(fields["line_items[0][price_data][currency]"], "usd");
        assert_eq!(fields["line_items[0][price_data][product_data][name]"], "Bagel");
        assert_eq!(fields["line_items[0][price_data][unit_amount]"], "250");
        assert_eq!(fields["line_items[0][quantity]"], "4");
        assert_eq!(fields["line_items[1][price_data][unit_amount]"], "300");
        assert_eq!(fields["metadata[orderId]"], "abc");
        assert_eq!(fields["metadata[pickupDate]"], "2025-05-05");
    }

    #[test]
    fn test_sessions_url_joins_base() {
        let config = StripeConfig {
            api_base: Url::parse("http://localhost:12111").unwrap(),
            secret_key: SecretString::from("sk_test_x"),
            webhook_secret: SecretString::from("whsec_x"),
        };
        let client = StripeClient::new(&config).unwrap();
        assert_eq!(
            client.inner.sessions_url.as_str(),
            "http://localhost:12111/v1/checkout/sessions"
        );
    }
}
