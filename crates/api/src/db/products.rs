//! Read-only product lookup backed by the catalog tables.

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use moka::future::Cache;
use pickup_core::ProductId;
use sqlx::{PgPool, Postgres, query_as};
use tracing::instrument;

use super::RepositoryError;
use crate::models::Product;

const MAX_CACHED_PRODUCTS: u64 = 10_000;

#[automock]
#[async_trait]
pub trait ProductLookup: Send + Sync {
    /// Resolve a single product, `None` if it does not exist.
    async fn find(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Resolve many products at once. Unknown ids are omitted.
    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;
}

/// Catalog lookup over `shop.product` with a short-lived cache.
///
/// Only hits are cached so a product created after a miss becomes visible
/// immediately.
#[derive(Clone)]
pub struct PgProductCatalog {
    pool: PgPool,
    cache: Cache<ProductId, Product>,
}

impl PgProductCatalog {
    /// Create a new catalog lookup caching entries for `ttl`.
    #[must_use]
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_CACHED_PRODUCTS)
            .time_to_live(ttl)
            .build();
        Self { pool, cache }
    }
}

#[async_trait]
impl ProductLookup for PgProductCatalog {
    #[instrument(skip(self))]
    async fn find(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        if let Some(product) = self.cache.get(&id).await {
            return Ok(Some(product));
        }

        let product = query_as::<Postgres, Product>(
            "SELECT id, name, price FROM shop.product WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(product) = &product {
            self.cache.insert(id, product.clone()).await;
        }
        Ok(product)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.cache.get(id).await {
                Some(product) => found.push(product),
                None => missing.push(*id),
            }
        }

        if !missing.is_empty() {
            let loaded = query_as::<Postgres, Product>(
                "SELECT id, name, price FROM shop.product WHERE id = ANY($1)",
            )
            .bind(&missing)
            .fetch_all(&self.pool)
            .await?;

            for product in loaded {
                self.cache.insert(product.id, product.clone()).await;
                found.push(product);
            }
        }

        Ok(found)
    }
}
