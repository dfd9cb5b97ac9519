//! Session extractors.
//!
//! [`middleware::require_session`](crate::middleware::require_session) and
//! [`middleware::optional_session`](crate::middleware::optional_session)
//! resolve the session once per request and store it in the request
//! extensions; these extractors read it back.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use gatehouse_auth_engine::{AuthError, Session};

use crate::error::ApiError;

/// The signed-in user's session. Rejects with 401 when absent.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

/// The session, if the user is signed in.
#[derive(Debug, Clone, Default)]
pub struct MaybeSession(pub Option<Session>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<CurrentSession>() {
            return Ok(session.clone());
        }
        match parts.extensions.get::<MaybeSession>() {
            Some(MaybeSession(Some(session))) => Ok(Self(session.clone())),
            _ => Err(ApiError::new(AuthError::Unauthorized)),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(CurrentSession(session)) = parts.extensions.get::<CurrentSession>() {
            return Ok(Self(Some(session.clone())));
        }
        Ok(parts
            .extensions
            .get::<MaybeSession>()
            .cloned()
            .unwrap_or_default())
    }
}
