//! Core types for the pickup order service.
//!
//! This module provides type-safe wrappers for the order domain.

pub mod email;
pub mod id;
pub mod pickup;
pub mod price;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use pickup::{DateBound, PickupDate, PickupError, PickupTime};
pub use price::{Price, PriceError};
pub use status::*;
