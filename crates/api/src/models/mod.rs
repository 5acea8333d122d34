//! Domain models for the pickup order service.

pub mod order;
pub mod product;
pub mod user;

pub use order::{
    CreateOrderRequest, LineItem, LineItemDetail, Order, OrderDetail, RequestedItem,
};
pub use product::Product;
pub use user::{Customer, OwnerSummary, Principal};
