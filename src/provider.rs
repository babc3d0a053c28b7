//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata (`ProviderDescriptor`) covering HTTPS-only
//! endpoints, client authentication, environment and per-product headers, and provider quirks
//! (signature header, reference header, default token lifetime). `strategy` defines
//! [`ProviderStrategy`], an HTTP-client-agnostic hook used to augment token requests and
//! decode provider-specific token and error bodies.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
