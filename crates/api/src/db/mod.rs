//! Persistence for the pickup order service.
//!
//! # Schema: `shop`
//!
//! ## Tables
//!
//! - `customer` - Registered customers (owners of non-guest orders)
//! - `product` - Catalog products (read-only here)
//! - `orders` - Pickup orders
//! - `order_item` - Ordered line items with snapshotted unit prices
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p pickup-cli -- migrate
//! ```
//!
//! Every store is reached through an `async_trait` seam so services can be
//! exercised against the in-memory implementations in [`memory`].

pub mod memory;
pub mod orders;
pub mod products;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use memory::{InMemoryCatalog, InMemoryOrderRepository, InMemoryUserDirectory};
pub use orders::{
    MockOrderRepository, OrderFilter, OrderRepository, PageRequest, PgOrderRepository,
    StatusCounts,
};
pub use products::{MockProductLookup, PgProductCatalog, ProductLookup};
pub use users::{MockUserDirectory, PgUserDirectory, UserDirectory};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., duplicate id).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
