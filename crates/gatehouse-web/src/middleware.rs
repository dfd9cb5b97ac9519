//! Session middleware.
//!
//! Both layers decode the session cookie once, extend a rolling session and
//! hand the session to the handler through the request extensions. Install
//! them with `axum::middleware::from_fn_with_state`.

use std::collections::HashSet;

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use gatehouse_auth_engine::cookies::ResponseCookies;
use gatehouse_auth_engine::{AuthError, Session};

use crate::error::{ApiError, append_cookies};
use crate::extract::{CurrentSession, MaybeSession};
use crate::state::AppState;

/// Reject requests without a valid session with
/// `401 {"error":"not_authenticated",…}`.
pub async fn require_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let (session, touched) = resolve(&state, &request);
    let Some(session) = session else {
        tracing::debug!(path = %request.uri().path(), "rejecting anonymous request");
        return ApiError::new(AuthError::Unauthorized).into_response();
    };
    request.extensions_mut().insert(CurrentSession(session));
    finish(next.run(request).await, &touched)
}

/// Pass the session, if any, to the handler. Never rejects.
pub async fn optional_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let (session, touched) = resolve(&state, &request);
    request.extensions_mut().insert(MaybeSession(session));
    finish(next.run(request).await, &touched)
}

fn resolve(state: &AppState, request: &Request) -> (Option<Session>, ResponseCookies) {
    let mut cache = state.session_cache(request.headers());
    let mut touched = ResponseCookies::new();
    let session = cache.get().cloned();
    if session.is_some() {
        if let Err(e) = cache.touch(&mut touched) {
            tracing::warn!(error = %e, "failed to extend session");
            touched = ResponseCookies::new();
        }
    }
    (session, touched)
}

/// Append the middleware's cookies unless the handler already set a cookie
/// of the same name.
fn finish(mut response: Response, touched: &ResponseCookies) -> Response {
    if touched.is_empty() {
        return response;
    }
    let written: HashSet<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split_once('=').map(|(name, _)| name.trim().to_string()))
        .collect();

    let mut pending = ResponseCookies::new();
    for cookie in touched.iter().filter(|c| !written.contains(c.name())) {
        pending.set(cookie.clone());
    }
    append_cookies(&mut response, &pending);
    response
}
