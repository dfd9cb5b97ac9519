//! Auth route handlers.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::middleware::from_fn_with_state;
use axum::response::{Html, Redirect, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use gatehouse_auth_engine::cookies::ResponseCookies;
use gatehouse_auth_engine::{CallbackParams, LoginOptions, LogoutOptions};
use serde_json::{Value, json};

use crate::error::{ApiError, with_cookies};
use crate::extract::{CurrentSession, MaybeSession};
use crate::middleware::{optional_session, require_session};
use crate::state::AppState;

/// Router with every auth route. The callback path comes from the
/// configuration.
pub fn auth_routes(state: AppState) -> Router<AppState> {
    let callback_path = state.auth.config().callback_path.clone();
    Router::new()
        .route("/api/auth/login", get(login))
        .route(&callback_path, get(callback_query).post(callback_form))
        .route("/api/auth/logout", get(logout))
        .route(
            "/api/auth/me",
            get(me).route_layer(from_fn_with_state(state.clone(), require_session)),
        )
        .route(
            "/",
            get(home).route_layer(from_fn_with_state(state, optional_session)),
        )
}

// ---------------------------------------------------------------------------
// GET /api/auth/login
// ---------------------------------------------------------------------------

/// Redirect to the identity provider.
pub async fn login(
    State(state): State<AppState>,
    Query(options): Query<LoginOptions>,
) -> Result<Response, ApiError> {
    let mut cookies = ResponseCookies::new();
    match state.auth.login(options, &mut cookies).await {
        Ok(url) => Ok(with_cookies(Redirect::to(url.as_str()), &cookies)),
        Err(e) => Err(ApiError::new(e).with_cookies(cookies)),
    }
}

// ---------------------------------------------------------------------------
// GET|POST /api/auth/callback
// ---------------------------------------------------------------------------

/// Callback with `response_mode=query`.
pub async fn callback_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    complete_callback(&state, &headers, params).await
}

/// Callback with `response_mode=form_post`.
pub async fn callback_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<CallbackParams>,
) -> Result<Response, ApiError> {
    complete_callback(&state, &headers, params).await
}

async fn complete_callback(
    state: &AppState,
    headers: &HeaderMap,
    params: CallbackParams,
) -> Result<Response, ApiError> {
    let mut cache = state.session_cache(headers);
    let mut cookies = ResponseCookies::new();
    match state.auth.callback(&mut cache, params, &mut cookies).await {
        Ok(outcome) => Ok(with_cookies(Redirect::to(&outcome.return_to), &cookies)),
        // The consumed transient cookies are expired even on failure.
        Err(e) => Err(ApiError::new(e).with_cookies(cookies)),
    }
}

// ---------------------------------------------------------------------------
// GET /api/auth/logout
// ---------------------------------------------------------------------------

/// Clear the session and redirect to the provider's logout or the
/// post-logout URL.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(options): Query<LogoutOptions>,
) -> Result<Response, ApiError> {
    let mut cache = state.session_cache(&headers);
    let mut cookies = ResponseCookies::new();
    match state.auth.logout(&mut cache, options, &mut cookies).await {
        Ok(url) => Ok(with_cookies(Redirect::to(url.as_str()), &cookies)),
        Err(e) => Err(ApiError::new(e).with_cookies(cookies)),
    }
}

// ---------------------------------------------------------------------------
// GET /api/auth/me
// ---------------------------------------------------------------------------

/// The signed-in user's claims. Tokens are never returned.
pub async fn me(CurrentSession(session): CurrentSession) -> Json<Value> {
    Json(json!({
        "user": session.claims,
        "created_at": session.created_at,
    }))
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

pub async fn home(MaybeSession(session): MaybeSession) -> Html<String> {
    let greeting = match session.as_ref() {
        Some(session) => {
            let who = session
                .claims
                .name()
                .or_else(|| session.claims.email())
                .or_else(|| session.claims.subject())
                .unwrap_or("unknown user");
            format!(
                "<p>Signed in as <strong>{}</strong>.</p><p><a href=\"/api/auth/logout\">Log out</a></p>",
                escape_html(who)
            )
        }
        None => "<p>Not signed in.</p><p><a href=\"/api/auth/login\">Log in</a></p>".to_string(),
    };
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Gatehouse</title></head><body>{greeting}</body></html>"
    ))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
