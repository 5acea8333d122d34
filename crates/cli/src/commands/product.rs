//! Catalog management.
//!
//! ```bash
//! pickup-cli product add -n "Sourdough loaf" -p 7.50
//! ```

use pickup_core::{Price, ProductId};
use rust_decimal::Decimal;

use super::{CommandError, connect};

/// Add a product and return its id.
///
/// # Errors
///
/// Returns an error if the price is negative or the insert fails.
pub async fn add(name: &str, price: Decimal) -> Result<ProductId, CommandError> {
    let price = Price::new(price)
        .map_err(|e| CommandError::InvalidArgument(e.to_string()))?
        .rounded();
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::InvalidArgument("name cannot be empty".to_owned()));
    }

    let pool = connect().await?;

    let id = ProductId::generate();
    sqlx::query("INSERT INTO shop.product (id, name, price) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(price)
        .execute(&pool)
        .await?;

    tracing::info!(%id, name, %price, "Product added");
    Ok(id)
}
