//! Shared application state for the web server.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use gatehouse_auth_engine::cookies::RequestCookies;
use gatehouse_auth_engine::{AuthManager, SessionCache};

/// State handed to every handler and middleware.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The auth manager, built once at startup.
    pub auth: Arc<AuthManager>,
}

impl AppState {
    pub fn new(auth: Arc<AuthManager>) -> Self {
        Self { auth }
    }

    /// A session cache over the request's `Cookie` headers.
    pub fn session_cache(&self, headers: &HeaderMap) -> SessionCache {
        self.auth.session_cache(request_cookies(headers))
    }
}

/// Parse every `Cookie` header on a request.
pub fn request_cookies(headers: &HeaderMap) -> RequestCookies {
    RequestCookies::from_headers(
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok()),
    )
}
