//! Stripe integration.
//!
//! - [`StripeClient`] creates hosted checkout sessions over the REST API
//! - [`WebhookVerifier`] authenticates `Stripe-Signature` headers
//!
//! # API Reference
//!
//! - Base URL: `https://api.stripe.com` (overridable via `STRIPE_API_BASE`)
//! - Authentication: secret key as bearer token
//! - Request bodies: `application/x-www-form-urlencoded` with bracketed keys

mod client;
mod webhook;

pub use client::StripeClient;
pub use webhook::{
    CheckoutSessionObject, SIGNATURE_HEADER, SignatureError, StripeEvent, StripeEventData,
    WebhookVerifier,
};
