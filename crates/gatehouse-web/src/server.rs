//! Web server setup and startup.
//!
//! [`WebServer`] composes the axum router around the auth routes and starts
//! the HTTP listener.

use std::sync::Arc;

use axum::Router;
use gatehouse_auth_engine::AuthManager;
use tower_http::trace::TraceLayer;

use crate::WebConfig;
use crate::routes;
use crate::state::AppState;

/// The Gatehouse web server.
pub struct WebServer {
    config: WebConfig,
    state: AppState,
}

impl WebServer {
    /// Create a new web server around a ready auth manager.
    pub fn new(config: WebConfig, auth: Arc<AuthManager>) -> Self {
        Self {
            config,
            state: AppState::new(auth),
        }
    }

    /// Return the `host:port` string this server will bind to.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.bind_addr, self.config.port)
    }

    /// Build the axum router with all routes registered.
    pub fn router(&self) -> Router {
        routes::auth_routes(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the server and block until it is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(
            addr = %addr,
            base_url = %self.state.auth.config().base_url,
            callback = %self.state.auth.config().callback_path,
            "starting web server"
        );

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
