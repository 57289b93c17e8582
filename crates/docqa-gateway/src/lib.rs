//! HTTP surface for the docqa service.
//!
//! Exposes document preprocessing, chat and direct RAG queries as JSON
//! endpoints over axum, with optional API-key auth and input sanitizing.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod sanitize;
pub mod server;

pub use error::ApiError;
pub use middleware::AuthConfig;
pub use sanitize::Sanitizer;
pub use server::GatewayServer;
