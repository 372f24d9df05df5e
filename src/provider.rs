//! Provider-facing discovery (data) and strategies (behavior).
//!
//! `discovery` resolves the OIDC provider metadata once per broker and exposes the token
//! endpoint. `strategy` defines [`ProviderStrategy`], an HTTP-client-agnostic hook used by
//! the refresh exchange to augment outgoing requests and map error responses into the
//! broker error taxonomy.

pub mod discovery;
pub mod strategy;

pub use discovery::*;
pub use strategy::*;
