//! Customer directory used to expand order owners.

use async_trait::async_trait;
use mockall::automock;
use pickup_core::UserId;
use sqlx::{PgPool, Postgres, query_as};
use tracing::instrument;

use super::RepositoryError;
use crate::models::Customer;

#[automock]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Load the customers with the given ids. Unknown ids are omitted.
    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<Customer>, RepositoryError>;
}

/// Directory over `shop.customer`.
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_many(&self, ids: &[UserId]) -> Result<Vec<Customer>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let customers = query_as::<Postgres, Customer>(
            "SELECT id, name, email FROM shop.customer WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }
}
