//! Order creation and admin status updates.
//!
//! Creation resolves every requested product before anything is written; a
//! single unknown product aborts the whole order. Unit prices are snapshotted
//! at cent precision and the total is always recomputed from the line items,
//! so the stored total matches what the payment provider charges. The confirmation email is sent from a
//! detached task once the order is stored and can never fail the request.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use pickup_core::{
    OrderId, PaymentStatus, PickupDate, PickupStatus, PickupTime, Price, PriceError, ProductId,
    UserId,
};
use thiserror::Error;
use tracing::instrument;

use super::email::{ConfirmationLine, OrderConfirmation, OrderNotifier};
use crate::db::{OrderRepository, ProductLookup, RepositoryError};
use crate::models::{
    CreateOrderRequest, LineItem, Order, OrderDetail, Principal, Product, RequestedItem,
};

/// Most line items accepted in one order.
pub const MAX_LINE_ITEMS: usize = 100;

/// Longest accepted customer comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 1000;

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found")]
    NotFound,

    #[error("Product lookup failed: {0}")]
    ProductLookup(#[source] RepositoryError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A creation request after validation.
#[derive(Debug)]
struct ValidatedOrder {
    items: Vec<LineItem>,
    pickup_date: PickupDate,
    pickup_time: Option<PickupTime>,
    customer_comments: Option<String>,
}

/// Builds orders and applies admin status changes.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductLookup>,
    notifier: Arc<dyn OrderNotifier>,
}

impl OrderService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductLookup>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            orders,
            products,
            notifier,
        }
    }

    /// Validate, price and persist a new order.
    ///
    /// Guests (`requester == None`) may order; their order has no owner.
    ///
    /// # Errors
    ///
    /// - [`OrderError::InvalidInput`] for an empty or malformed request
    /// - [`OrderError::ProductNotFound`] for the first unknown product, in request order
    /// - [`OrderError::ProductLookup`] / [`OrderError::Repository`] on storage failure
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(
        &self,
        requester: Option<&Principal>,
        request: CreateOrderRequest,
    ) -> Result<Order, OrderError> {
        let validated = validate(request)?;
        let products = self.resolve_products(&validated.items).await?;

        let order = Order::new(
            requester.map(|p| p.id),
            validated.items,
            validated.pickup_date,
            validated.pickup_time,
            validated.customer_comments,
        )
        .map_err(|_| invalid("Order total is too large"))?;
        self.orders.insert(&order).await?;

        tracing::info!(
            order_id = %order.id,
            total = %order.total_price,
            guest = requester.is_none(),
            "Order created"
        );

        self.notify(requester, &order, &products);
        Ok(order)
    }

    /// Orders placed by `owner`, newest first, with products expanded.
    ///
    /// # Errors
    ///
    /// Returns an error if the orders or products cannot be loaded.
    #[instrument(skip(self))]
    pub async fn my_orders(&self, owner: UserId) -> Result<Vec<OrderDetail>, OrderError> {
        let orders = self.orders.list_by_owner(owner).await?;

        let mut ids: Vec<ProductId> = orders
            .iter()
            .flat_map(|o| o.line_items.iter().map(|i| i.product_ref))
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let products: HashMap<ProductId, Product> = self
            .products
            .find_many(&ids)
            .await
            .map_err(OrderError::ProductLookup)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(orders
            .into_iter()
            .map(|o| OrderDetail::expand(o, &HashMap::new(), &products))
            .collect())
    }

    /// Overwrite an order's pickup status. Any status may replace any other.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] if the order does not exist.
    #[instrument(skip(self))]
    pub async fn update_pickup_status(
        &self,
        id: OrderId,
        status: PickupStatus,
    ) -> Result<Order, OrderError> {
        let order = self
            .orders
            .set_pickup_status(id, status)
            .await?
            .ok_or(OrderError::NotFound)?;
        tracing::info!(order_id = %id, %status, "Pickup status updated");
        Ok(order)
    }

    /// Overwrite an order's payment status.
    ///
    /// This races with the payment webhook; whichever write lands last wins.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::NotFound`] if the order does not exist.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<Order, OrderError> {
        let order = self
            .orders
            .set_payment_status(id, status)
            .await?
            .ok_or(OrderError::NotFound)?;
        tracing::info!(order_id = %id, %status, "Payment status updated by admin");
        Ok(order)
    }

    /// Look up every product concurrently; fail on the first miss in request order.
    async fn resolve_products(
        &self,
        items: &[LineItem],
    ) -> Result<HashMap<ProductId, Product>, OrderError> {
        let lookups = items.iter().map(|item| self.products.find(item.product_ref));
        let results = join_all(lookups).await;

        let mut products = HashMap::with_capacity(items.len());
        for (item, result) in items.iter().zip(results) {
            match result.map_err(OrderError::ProductLookup)? {
                Some(product) => {
                    products.insert(product.id, product);
                }
                None => return Err(OrderError::ProductNotFound(item.product_ref)),
            }
        }
        Ok(products)
    }

    fn notify(
        &self,
        requester: Option<&Principal>,
        order: &Order,
        products: &HashMap<ProductId, Product>,
    ) {
        let Some((principal, to)) = requester.and_then(|p| p.email.clone().map(|e| (p, e))) else {
            tracing::debug!(order_id = %order.id, "No recipient for order confirmation");
            return;
        };

        let confirmation = OrderConfirmation {
            to,
            name: principal.name.clone(),
            order_id: order.id,
            pickup_date: order.pickup_date,
            pickup_time: order.pickup_time,
            lines: order
                .line_items
                .iter()
                .map(|item| ConfirmationLine {
                    name: Product::display_name(products.get(&item.product_ref), item.product_ref),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            total: order.total_price,
        };

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.order_confirmed(&confirmation).await {
                tracing::warn!(
                    order_id = %confirmation.order_id,
                    error = %e,
                    "Failed to send order confirmation"
                );
            }
        });
    }
}

fn validate(request: CreateOrderRequest) -> Result<ValidatedOrder, OrderError> {
    if request.items.is_empty() {
        return Err(invalid("No items in order"));
    }
    if request.items.len() > MAX_LINE_ITEMS {
        return Err(invalid(format!(
            "An order may contain at most {MAX_LINE_ITEMS} items"
        )));
    }

    let items = request
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| validate_item(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    let pickup_date = request
        .pickup_date
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| invalid("pickupDate is required"))
        .and_then(|s| PickupDate::parse(s).map_err(|e| invalid(e.to_string())))?;

    let pickup_time = request
        .pickup_time
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(PickupTime::parse)
        .transpose()
        .map_err(|e| invalid(e.to_string()))?;

    let customer_comments = request
        .customer_comments
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty());
    if customer_comments
        .as_ref()
        .is_some_and(|c| c.chars().count() > MAX_COMMENT_CHARS)
    {
        return Err(invalid(format!(
            "customerComments must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }

    Ok(ValidatedOrder {
        items,
        pickup_date,
        pickup_time,
        customer_comments,
    })
}

fn validate_item(index: usize, item: &RequestedItem) -> Result<LineItem, OrderError> {
    let product_ref: ProductId = item
        .product_id
        .parse()
        .map_err(|_| invalid(format!("items[{index}].productId is not a valid id")))?;

    let quantity = u32::try_from(item.quantity)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| invalid(format!("items[{index}].quantity must be a positive integer")))?;

    let unit_price = Price::new(item.price)
        .map_err(|e| match e {
            PriceError::Negative => invalid(format!("items[{index}].price cannot be negative")),
            PriceError::Overflow => invalid(format!("items[{index}].price is too large")),
        })?
        .rounded();

    let line = LineItem {
        product_ref,
        quantity,
        unit_price,
    };
    line.subtotal()
        .map_err(|_| invalid(format!("items[{index}] subtotal is too large")))?;
    Ok(line)
}

fn invalid(message: impl Into<String>) -> OrderError {
    OrderError::InvalidInput(message.into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use mockall::predicate::eq;
    use pickup_core::Email;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use testresult::TestResult;
    use tokio::sync::Notify;

    use super::*;
    use crate::db::{InMemoryCatalog, InMemoryOrderRepository, MockOrderRepository, MockProductLookup};
    use crate::services::email::{LogNotifier, MockOrderNotifier, NotifyError};

    fn product(name: &str, price: Decimal) -> Product {
        Product {
            id: ProductId::generate(),
            name: name.to_owned(),
            price: Price::new(price).unwrap(),
        }
    }

    fn item(product: &Product, quantity: i64, price: Decimal) -> RequestedItem {
        RequestedItem {
            product_id: product.id.to_string(),
            quantity,
            price,
        }
    }

    fn request(items: Vec<RequestedItem>) -> CreateOrderRequest {
        CreateOrderRequest {
            items,
            pickup_date: Some("2025-07-04".to_owned()),
            pickup_time: Some("12:00".to_owned()),
            customer_comments: None,
        }
    }

    fn shopper() -> Principal {
        Principal {
            id: UserId::generate(),
            name: "Ana".to_owned(),
            email: Some(Email::parse("ana@example.com").unwrap()),
            is_admin: false,
        }
    }

    fn service_with(
        repo: Arc<dyn OrderRepository>,
        catalog: Arc<dyn ProductLookup>,
    ) -> OrderService {
        OrderService::new(repo, catalog, Arc::new(LogNotifier))
    }

    #[tokio::test]
    async fn test_total_is_recomputed_from_items() {
        let p1 = product("Bread", dec!(5.00));
        let p2 = product("Jam", dec!(3.50));
        let repo = Arc::new(InMemoryOrderRepository::new());
        let service = service_with(
            repo.clone(),
            Arc::new(InMemoryCatalog::new([p1.clone(), p2.clone()])),
        );

        let order = service
            .create_order(
                None,
                request(vec![item(&p1, 2, dec!(5.00)), item(&p2, 1, dec!(3.50))]),
            )
            .await
            .unwrap();

        assert_eq!(order.total_price.amount(), dec!(13.50));
        assert_eq!(order.pickup_status, PickupStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.owner.is_none());
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_unit_price_comes_from_request() {
        let p = product("Cake", dec!(20));
        let service = service_with(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::new([p.clone()])),
        );

        let order = service
            .create_order(None, request(vec![item(&p, 3, dec!(1.10))]))
            .await
            .unwrap();

        assert_eq!(order.line_items[0].unit_price.amount(), dec!(1.10));
        assert_eq!(order.total_price.amount(), dec!(3.30));
    }

    #[tokio::test]
    async fn test_unit_price_is_snapshotted_in_cents() -> TestResult {
        let p = product("Mint", dec!(0.33));
        let repo = Arc::new(InMemoryOrderRepository::new());
        let service = service_with(repo.clone(), Arc::new(InMemoryCatalog::new([p.clone()])));

        let order = service
            .create_order(None, request(vec![item(&p, 3, dec!(0.333))]))
            .await?;

        let unit = order.line_items[0].unit_price;
        assert_eq!(unit.amount(), dec!(0.33));
        assert_eq!(order.total_price.amount(), dec!(0.99));
        assert_eq!(
            unit.to_minor_units()? * 3,
            order.total_price.to_minor_units()?
        );
        assert_eq!(repo.get(order.id).await?.map(|o| o.total_price), Some(order.total_price));

        let half_cent = service
            .create_order(None, request(vec![item(&p, 2, dec!(0.125))]))
            .await?;
        assert_eq!(half_cent.line_items[0].unit_price.amount(), dec!(0.13));
        assert_eq!(half_cent.total_price.amount(), dec!(0.26));
        Ok(())
    }

    #[tokio::test]
    async fn test_oversized_amounts_are_invalid_input() {
        let p = product("Bread", dec!(5));
        let mut repo = MockOrderRepository::new();
        repo.expect_insert().never();
        let service = service_with(Arc::new(repo), Arc::new(InMemoryCatalog::new([p.clone()])));
        let huge = Decimal::from_i128_with_scale(10_i128.pow(20), 0);

        let cases = [
            (vec![item(&p, 4_000_000_000, huge)], "items[0].price is too large"),
            (
                vec![item(&p, 4_000_000_000, dec!(1000))],
                "items[0] subtotal is too large",
            ),
            (
                vec![
                    item(&p, 1, Price::MAX.amount()),
                    item(&p, 1, Price::MAX.amount()),
                ],
                "Order total is too large",
            ),
        ];
        for (items, expected) in cases {
            let err = service.create_order(None, request(items)).await.unwrap_err();
            assert!(
                matches!(err, OrderError::InvalidInput(ref m) if m == expected),
                "{err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_empty_items_rejected() {
        let service = service_with(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::default()),
        );
        let err = service.create_order(None, request(vec![])).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidInput(ref m) if m == "No items in order"));
    }

    #[tokio::test]
    async fn test_unknown_product_persists_nothing() {
        let known = product("Bread", dec!(5));
        let unknown = product("Ghost", dec!(1));
        let mut repo = MockOrderRepository::new();
        repo.expect_insert().never();

        let service = service_with(
            Arc::new(repo),
            Arc::new(InMemoryCatalog::new([known.clone()])),
        );
        let err = service
            .create_order(
                None,
                request(vec![item(&known, 1, dec!(5)), item(&unknown, 1, dec!(1))]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::ProductNotFound(id) if id == unknown.id));
    }

    #[tokio::test]
    async fn test_lookup_failure_is_upstream_error() {
        let p = product("Bread", dec!(5));
        let mut catalog = MockProductLookup::new();
        catalog
            .expect_find()
            .with(eq(p.id))
            .returning(|_| Err(RepositoryError::DataCorruption("boom".into())));
        let mut repo = MockOrderRepository::new();
        repo.expect_insert().never();

        let service = service_with(Arc::new(repo), Arc::new(catalog));
        let err = service
            .create_order(None, request(vec![item(&p, 1, dec!(5))]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ProductLookup(_)));
    }

    #[tokio::test]
    async fn test_invalid_items_rejected() {
        let p = product("Bread", dec!(5));
        let service = service_with(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::new([p.clone()])),
        );

        for bad in [
            item(&p, 0, dec!(1)),
            item(&p, -2, dec!(1)),
            item(&p, 1, dec!(-0.01)),
            RequestedItem {
                product_id: "nope".to_owned(),
                quantity: 1,
                price: dec!(1),
            },
        ] {
            let err = service
                .create_order(None, request(vec![bad]))
                .await
                .unwrap_err();
            assert!(matches!(err, OrderError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_pickup_fields_validated() {
        let p = product("Bread", dec!(5));
        let service = service_with(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::new([p.clone()])),
        );

        let mut missing_date = request(vec![item(&p, 1, dec!(5))]);
        missing_date.pickup_date = None;
        assert!(matches!(
            service.create_order(None, missing_date).await,
            Err(OrderError::InvalidInput(_))
        ));

        let mut bad_time = request(vec![item(&p, 1, dec!(5))]);
        bad_time.pickup_time = Some("lunchtime".to_owned());
        assert!(matches!(
            service.create_order(None, bad_time).await,
            Err(OrderError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_recorded_and_notified() {
        let p = product("Bread", dec!(5));
        let who = shopper();
        let sent = Arc::new(Notify::new());
        let signal = Arc::clone(&sent);

        let mut notifier = MockOrderNotifier::new();
        notifier
            .expect_order_confirmed()
            .withf(|c| c.lines.len() == 1 && c.lines[0].name == "Bread")
            .times(1)
            .returning(move |_| {
                signal.notify_one();
                Ok(())
            });

        let service = OrderService::new(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::new([p.clone()])),
            Arc::new(notifier),
        );
        let order = service
            .create_order(Some(&who), request(vec![item(&p, 1, dec!(5))]))
            .await
            .unwrap();

        assert_eq!(order.owner, Some(who.id));
        tokio::time::timeout(Duration::from_secs(1), sent.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_order() {
        let p = product("Bread", dec!(5));
        let mut notifier = MockOrderNotifier::new();
        notifier
            .expect_order_confirmed()
            .returning(|_| Err(NotifyError::InvalidAddress("x".into())));

        let repo = Arc::new(InMemoryOrderRepository::new());
        let service = OrderService::new(
            repo.clone(),
            Arc::new(InMemoryCatalog::new([p.clone()])),
            Arc::new(notifier),
        );

        let result = service
            .create_order(Some(&shopper()), request(vec![item(&p, 1, dec!(5))]))
            .await;
        assert!(result.is_ok());
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_status_update_on_missing_order() {
        let service = service_with(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::default()),
        );
        let err = service
            .update_pickup_status(OrderId::generate(), PickupStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound));
    }

    #[tokio::test]
    async fn test_status_overwrite_is_permissive() {
        let p = product("Bread", dec!(5));
        let service = service_with(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::new([p.clone()])),
        );
        let order = service
            .create_order(None, request(vec![item(&p, 1, dec!(5))]))
            .await
            .unwrap();

        service
            .update_pickup_status(order.id, PickupStatus::Completed)
            .await
            .unwrap();
        let back = service
            .update_pickup_status(order.id, PickupStatus::Pending)
            .await
            .unwrap();
        assert_eq!(back.pickup_status, PickupStatus::Pending);

        let failed = service
            .update_payment_status(order.id, PaymentStatus::Failed)
            .await
            .unwrap();
        assert_eq!(failed.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_my_orders_expands_products() {
        let p = product("Bread", dec!(5));
        let who = shopper();
        let service = service_with(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCatalog::new([p.clone()])),
        );
        service
            .create_order(Some(&who), request(vec![item(&p, 1, dec!(5))]))
            .await
            .unwrap();
        service
            .create_order(None, request(vec![item(&p, 1, dec!(5))]))
            .await
            .unwrap();

        let mine = service.my_orders(who.id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].line_items[0].product.as_ref().unwrap().name, "Bread");
    }
}
