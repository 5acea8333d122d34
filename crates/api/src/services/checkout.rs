//! Checkout session creation.
//!
//! Translates a stored order into a hosted payment page. The session carries
//! the order id and pickup date as metadata so the completion webhook can find
//! the order again. Payment status is never touched here.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use pickup_core::{OrderId, PriceError, ProductId};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::db::{OrderRepository, ProductLookup, RepositoryError};
use crate::models::{Order, Product};

/// Currency for every session.
pub const CURRENCY: &str = "usd";

/// Errors reported by a payment provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected provider response: {0}")]
    Malformed(String),
}

/// One provider-facing line item, priced in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLineItem {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: u32,
}

/// What the provider needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<ProviderLineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: BTreeMap<String, String>,
}

/// A session opened by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[automock]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Open a hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Order not found")]
    NotFound,

    #[error("payment provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("line item cannot be charged: {0}")]
    Amount(#[from] PriceError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Redirect target returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutRedirect {
    pub url: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductLookup>,
    provider: Arc<dyn PaymentProvider>,
    base_url: Url,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductLookup>,
        provider: Arc<dyn PaymentProvider>,
        base_url: Url,
    ) -> Self {
        Self {
            orders,
            products,
            provider,
            base_url,
        }
    }

    /// Open a checkout session for an existing order.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::InvalidInput`] if `order_id` is missing
    /// - [`CheckoutError::NotFound`] if it does not name a stored order
    /// - [`CheckoutError::Provider`] if the provider call fails
    #[instrument(skip(self))]
    pub async fn create_session(
        &self,
        order_id: Option<&str>,
    ) -> Result<CheckoutRedirect, CheckoutError> {
        let raw = order_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CheckoutError::InvalidInput("orderId is required".to_owned()))?;
        // An id that cannot exist is reported like one that does not.
        let id: OrderId = raw.parse().map_err(|_| CheckoutError::NotFound)?;

        let order = self.orders.get(id).await?.ok_or(CheckoutError::NotFound)?;

        let mut ids: Vec<ProductId> = order.line_items.iter().map(|i| i.product_ref).collect();
        ids.sort_unstable();
        ids.dedup();
        let products: HashMap<ProductId, Product> = self
            .products
            .find_many(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let request = self.session_request(&order, &products)?;
        let session = self.provider.create_checkout_session(&request).await?;

        tracing::info!(order_id = %order.id, session_id = %session.id, "Checkout session opened");
        Ok(CheckoutRedirect { url: session.url })
    }

    fn session_request(
        &self,
        order: &Order,
        products: &HashMap<ProductId, Product>,
    ) -> Result<CheckoutSessionRequest, CheckoutError> {
        let line_items = order
            .line_items
            .iter()
            .map(|item| {
                Ok(ProviderLineItem {
                    name: Product::display_name(products.get(&item.product_ref), item.product_ref),
                    unit_amount: item.unit_price.to_minor_units()?,
                    quantity: item.quantity,
                })
            })
            .collect::<Result<Vec<_>, PriceError>>()?;

        let mut success_url = self.page_url("checkout-success");
        // Stripe substitutes the literal placeholder, so it must stay unescaped.
        success_url.push_str("?session_id={CHECKOUT_SESSION_ID}&orderId=");
        success_url.push_str(&order.id.to_string());

        Ok(CheckoutSessionRequest {
            line_items,
            currency: CURRENCY.to_owned(),
            success_url,
            cancel_url: self.page_url("checkout-cancel"),
            metadata: BTreeMap::from([
                ("orderId".to_owned(), order.id.to_string()),
                ("pickupDate".to_owned(), order.pickup_date.to_string()),
            ]),
        })
    }

    fn page_url(&self, page: &str) -> String {
        format!("{}/{page}", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pickup_core::{PickupDate, Price};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::db::{InMemoryCatalog, InMemoryOrderRepository, MockOrderRepository};
    use crate::models::LineItem;

    fn base_url() -> Url {
        Url::parse("https://shop.example.com/").unwrap()
    }

    async fn stored_order(repo: &InMemoryOrderRepository, known: ProductId) -> Order {
        let order = Order::new(
            None,
            vec![
                LineItem {
                    product_ref: known,
                    quantity: 2,
                    unit_price: Price::new(dec!(4.995)).unwrap(),
                },
                LineItem {
                    product_ref: ProductId::generate(),
                    quantity: 1,
                    unit_price: Price::new(dec!(3.50)).unwrap(),
                },
            ],
            PickupDate::parse("2025-08-01").unwrap(),
            None,
            None,
        )
        .unwrap();
        repo.insert(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_session_built_from_persisted_items() {
        let product = Product {
            id: ProductId::generate(),
            name: "Croissant".to_owned(),
            price: Price::new(dec!(5)).unwrap(),
        };
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order = stored_order(&repo, product.id).await;
        let missing_ref = order.line_items[1].product_ref;
        let order_id = order.id;

        let mut provider = MockPaymentProvider::new();
        provider
            .expect_create_checkout_session()
            .withf(move |req| {
                req.currency == "usd"
                    && req.line_items
                        == vec![
                            ProviderLineItem {
                                name: "Croissant".to_owned(),
                                unit_amount: 500,
                                quantity: 2,
                            },
                            ProviderLineItem {
                                name: format!("Product {missing_ref}"),
                                unit_amount: 350,
                                quantity: 1,
                            },
                        ]
                    && req.metadata["orderId"] == order_id.to_string()
                    && req.metadata["pickupDate"] == "2025-08-01"
                    && req.success_url
                        == format!(
                            "https://shop.example.com/checkout-success?session_id={{CHECKOUT_SESSION_ID}}&orderId={order_id}"
                        )
                    && req.cancel_url == "https://shop.example.com/checkout-cancel"
            })
            .times(1)
            .returning(|_| {
                Ok(CheckoutSession {
                    id: "cs_test_1".to_owned(),
                    url: "https://pay.example/cs_test_1".to_owned(),
                })
            });

        let service = CheckoutService::new(
            repo.clone(),
            Arc::new(InMemoryCatalog::new([product])),
            Arc::new(provider),
            base_url(),
        );
        let redirect = service
            .create_session(Some(&order_id.to_string()))
            .await
            .unwrap();

        assert_eq!(redirect.url, "https://pay.example/cs_test_1");
        let stored = repo.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status, pickup_core::PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let mut provider = MockPaymentProvider::new();
        provider.expect_create_checkout_session().never();
        let service = CheckoutService::new(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::default()),
            Arc::new(provider),
            base_url(),
        );

        let err = service
            .create_session(Some(&OrderId::generate().to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound));

        let err = service.create_session(Some("not-an-id")).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound));
    }

    #[tokio::test]
    async fn test_missing_order_id_is_invalid() {
        let mut repo = MockOrderRepository::new();
        repo.expect_get().never();
        let service = CheckoutService::new(
            Arc::new(repo),
            Arc::new(InMemoryCatalog::default()),
            Arc::new(MockPaymentProvider::new()),
            base_url(),
        );
        assert!(matches!(
            service.create_session(None).await,
            Err(CheckoutError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let order = stored_order(&repo, ProductId::generate()).await;

        let mut provider = MockPaymentProvider::new();
        provider.expect_create_checkout_session().returning(|_| {
            Err(ProviderError::Rejected {
                status: 402,
                message: "card declined".to_owned(),
            })
        });

        let service = CheckoutService::new(
            repo,
            Arc::new(InMemoryCatalog::default()),
            Arc::new(provider),
            base_url(),
        );
        let err = service
            .create_session(Some(&order.id.to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Provider(_)));
    }
}
