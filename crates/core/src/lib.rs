//! Pickup Core - domain types for the pickup order service.
//!
//! This crate provides the types shared by every component:
//! - `api` - HTTP service for ordering, admin queries and payment reconciliation
//! - `cli` - Command-line tools for migrations, seeding and tokens
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP clients. Database encoding is available behind the
//! `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, money, statuses, emails and pickup scheduling

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
