//! Reckon
//!
//! Reckon is a cart pricing and discount-resolution engine: it converts a
//! validated cart into a receipt, applying exchange rates, a multi-stage
//! discount eligibility pipeline, and general and gateway-scoped taxes, with
//! reference data served through a bounded TTL cache.

pub mod cart;
pub mod discounts;
pub mod engine;
pub mod fixtures;
pub mod gate;
pub mod inputs;
pub mod metrics;
pub mod pricing;
pub mod provider;
pub mod receipt;
pub mod resolver;
pub mod tax;

mod cache;

pub use cache::CacheStats;
