//! Klaviyo REST adapter.
//!
//! Implements the [`nexus_core::marketing::MarketingApi`] seam against the
//! Klaviyo JSON:API surface: one authenticated HTTP call per trait method,
//! short human-readable summaries for reads, and a uniform error mapping
//! (401 -> re-authenticate, other non-2xx -> API error with body context,
//! hung connections -> bounded timeout).
//!
//! Summary formatting is tied to Klaviyo's resource/attribute envelope for
//! the pinned `revision`; bump the revision and revisit `format` together.

mod api;
mod client;
mod format;
mod payloads;

pub use client::KlaviyoClient;
