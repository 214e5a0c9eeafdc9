//! HTTP backend proxy.
//!
//! Hosts the chat, speech and portrait routes that keep provider credentials
//! server-side, the persona roster, a health check, and the built front-end.

pub mod api;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod state;

pub use server::{build_router, serve, start_gateway};
pub use state::GatewayState;
