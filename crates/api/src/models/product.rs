//! Catalog product as seen by the order pipeline.

use pickup_core::{Price, ProductId};
use serde::Serialize;

/// A product resolved from the catalog.
///
/// Only the attributes orders need are loaded; catalog management lives
/// elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
}

impl Product {
    /// Display name with a fallback for products that no longer exist.
    #[must_use]
    pub fn display_name(product: Option<&Self>, id: ProductId) -> String {
        product.map_or_else(|| format!("Product {id}"), |p| p.name.clone())
    }
}
