//! nagme-remote: the hosted-backend side of [`nagme_core::source::Gateway`].
//!
//! - [`client`]: blocking HTTP client for the auth and REST endpoints.
//! - [`wire`]: translation between backend rows and typed events.
//! - [`session`]: the signed-in session persisted between runs.

pub mod client;
pub mod session;
pub mod wire;

pub use client::SupabaseGateway;
pub use session::SessionStore;
