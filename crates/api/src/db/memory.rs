//! In-memory stores for tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use pickup_core::{OrderId, PaymentStatus, PickupStatus, ProductId, UserId};
use tokio::sync::RwLock;

use super::orders::{OrderFilter, OrderRepository, PageRequest, StatusCounts};
use super::products::ProductLookup;
use super::users::UserDirectory;
use super::RepositoryError;
use crate::models::{Customer, Order, Product};

/// Orders held in a vector behind an async lock.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<Order>>,
}

impl InMemoryOrderRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders, regardless of filter.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Whether no orders are stored.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    async fn matching(&self, filter: &OrderFilter) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        newest_first(&mut orders);
        orders
    }

    async fn update(
        &self,
        id: OrderId,
        apply: impl FnOnce(&mut Order) + Send,
    ) -> Option<Order> {
        let mut orders = self.orders.write().await;
        let order = orders.iter_mut().find(|o| o.id == id)?;
        apply(order);
        Some(order.clone())
    }
}

fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn usize_to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.id == order.id) {
            return Err(RepositoryError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        orders.push(order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.iter().find(|o| o.id == id).cloned())
    }

    async fn find_page(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Vec<Order>, RepositoryError> {
        let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        Ok(self
            .matching(filter)
            .await
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn count(&self, filter: &OrderFilter) -> Result<u64, RepositoryError> {
        Ok(usize_to_u64(self.matching(filter).await.len()))
    }

    async fn status_counts(&self, filter: &OrderFilter) -> Result<StatusCounts, RepositoryError> {
        let mut counts = StatusCounts::default();
        for order in self.matching(filter).await {
            counts.record(order.pickup_status);
        }
        Ok(counts)
    }

    async fn total_items(&self, filter: &OrderFilter) -> Result<u64, RepositoryError> {
        Ok(self.matching(filter).await.iter().map(Order::item_count).sum())
    }

    async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Order>, RepositoryError> {
        let filter = OrderFilter {
            owner: Some(owner),
            ..OrderFilter::default()
        };
        Ok(self.matching(&filter).await)
    }

    async fn set_pickup_status(
        &self,
        id: OrderId,
        status: PickupStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.update(id, |o| o.pickup_status = status).await)
    }

    async fn set_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.update(id, |o| o.payment_status = status).await)
    }
}

/// A fixed product catalog.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    products: HashMap<ProductId, Product>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

#[async_trait]
impl ProductLookup for InMemoryCatalog {
    async fn find(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).cloned())
            .collect())
    }
}

/// A fixed customer directory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserDirectory {
    customers: HashMap<UserId, Customer>,
}

impl InMemoryUserDirectory {
    #[must_use]
    pub fn new(customers: impl IntoIterator<Item = Customer>) -> Self {
        Self {
            customers: customers.into_iter().map(|c| (c.id, c)).collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<Customer>, RepositoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.customers.get(id).cloned())
            .collect())
    }
}
