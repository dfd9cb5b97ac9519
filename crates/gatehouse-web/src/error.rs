//! Mapping engine errors to HTTP responses.
//!
//! A failed callback still carries `Set-Cookie` directives (the consumed
//! transient cookies must be expired), so an [`ApiError`] owns the cookies
//! gathered before the failure and emits them with the error body.

use axum::Json;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use gatehouse_auth_engine::AuthError;
use gatehouse_auth_engine::cookies::ResponseCookies;
use serde::Serialize;

/// JSON body of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// An [`AuthError`] plus the cookies to emit with it.
#[derive(Debug)]
pub struct ApiError {
    pub error: AuthError,
    pub cookies: ResponseCookies,
}

impl ApiError {
    pub fn new(error: AuthError) -> Self {
        Self {
            error,
            cookies: ResponseCookies::new(),
        }
    }

    /// Attach cookies gathered before the failure.
    pub fn with_cookies(mut self, cookies: ResponseCookies) -> Self {
        self.cookies = cookies;
        self
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.error, code = self.error.error_code(), "request failed");
        } else {
            tracing::debug!(error = %self.error, code = self.error.error_code(), "request rejected");
        }

        let body = ErrorBody {
            error: self.error.error_code(),
            message: self.error.public_message(),
        };
        let mut response = (status, Json(body)).into_response();
        append_cookies(&mut response, &self.cookies);
        response
    }
}

/// Append one `Set-Cookie` header per directive. Existing headers are kept.
pub fn append_cookies(response: &mut Response, cookies: &ResponseCookies) {
    let headers = response.headers_mut();
    for value in cookies.header_values() {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "dropping unrepresentable Set-Cookie header"),
        }
    }
}

/// Respond with `inner` plus the given cookies.
pub fn with_cookies(inner: impl IntoResponse, cookies: &ResponseCookies) -> Response {
    let mut response = inner.into_response();
    append_cookies(&mut response, cookies);
    response
}
