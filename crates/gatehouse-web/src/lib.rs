//! axum bindings for Gatehouse.
//!
//! This crate mounts the login flow of `gatehouse-auth-engine` onto an axum
//! router:
//!
//! - `GET /api/auth/login` redirects to the identity provider.
//! - `GET|POST /api/auth/callback` completes the login (query or
//!   `form_post`).
//! - `GET /api/auth/logout` ends the session.
//! - `GET /api/auth/me` returns the signed-in user.
//!
//! Application routes are protected with [`middleware::require_session`] or
//! [`middleware::optional_session`] and read the session through the
//! [`CurrentSession`] and [`MaybeSession`] extractors.

pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use extract::{CurrentSession, MaybeSession};
pub use server::WebServer;
pub use state::AppState;

/// Web server configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// The address to bind the HTTP server to.
    pub bind_addr: String,
    /// The port to listen on.
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 3000,
        }
    }
}
