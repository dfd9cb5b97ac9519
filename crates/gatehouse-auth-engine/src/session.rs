//! Sessions and the request-scoped session cache.
//!
//! A [`SessionCache`] is built fresh for every request. It loads the session
//! cookie at most once, applies the expiry policy, and writes changes back
//! through the [`CookieCodec`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::claims::Claims;
use crate::clock::Clock;
use crate::codec::CookieCodec;
use crate::cookies::{RequestCookies, ResponseCookies};
use crate::error::{AuthError, Result};

/// The authenticated user's identity and tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Identity claims with the configured filter applied.
    pub claims: Claims,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Space-separated scopes the access token was issued for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Access-token expiry, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Session creation time, epoch seconds. Never changes once set.
    pub created_at: i64,
}

impl Session {
    /// A session with claims only.
    pub fn new(claims: Claims, created_at: i64) -> Self {
        Self {
            claims,
            access_token: None,
            access_token_scope: None,
            refresh_token: None,
            id_token: None,
            token_type: None,
            expires_at: None,
            created_at,
        }
    }

    /// The user's claims.
    pub fn user(&self) -> &Claims {
        &self.claims
    }
}

/// A session plus its cookie timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session: Session,
    /// `iat`: when the session was created.
    pub created_at: i64,
    /// `uat`: when the cookie was last rewritten with a new window.
    pub updated_at: i64,
    /// `exp`: when the cookie stops being accepted.
    pub expires_at: i64,
}

/// How long a session cookie stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Sliding window of `duration` seconds from the last update, optionally
    /// capped at `absolute` seconds from creation.
    Rolling { duration: i64, absolute: Option<i64> },
    /// Fixed lifetime of `duration` seconds from creation.
    Absolute { duration: i64 },
}

impl ExpiryPolicy {
    /// Cookie expiry for a session created at `created_at` and last updated
    /// at `updated_at`.
    pub fn expires_at(&self, created_at: i64, updated_at: i64) -> i64 {
        match *self {
            Self::Rolling { duration, absolute } => {
                let rolling = updated_at.saturating_add(duration);
                match absolute {
                    Some(absolute) => rolling.min(created_at.saturating_add(absolute)),
                    None => rolling,
                }
            }
            Self::Absolute { duration } => created_at.saturating_add(duration),
        }
    }

    pub fn is_rolling(&self) -> bool {
        matches!(self, Self::Rolling { .. })
    }
}

#[derive(Debug)]
enum CacheState {
    Unloaded,
    Loaded(Option<SessionRecord>),
}

/// Request-scoped read-through / write-through cache over the session
/// cookie.
#[derive(Debug)]
pub struct SessionCache {
    codec: Arc<CookieCodec>,
    clock: Arc<dyn Clock>,
    policy: ExpiryPolicy,
    request: RequestCookies,
    state: CacheState,
    loads: usize,
}

impl SessionCache {
    pub fn new(
        codec: Arc<CookieCodec>,
        clock: Arc<dyn Clock>,
        policy: ExpiryPolicy,
        request: RequestCookies,
    ) -> Self {
        Self {
            codec,
            clock,
            policy,
            request,
            state: CacheState::Unloaded,
            loads: 0,
        }
    }

    /// Cookies of the request this cache serves.
    pub fn request_cookies(&self) -> &RequestCookies {
        &self.request
    }

    /// The expiry policy in force.
    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// The current session, loading it on first use.
    ///
    /// Unreadable, tampered or expired cookies read as no session.
    pub fn get(&mut self) -> Option<&Session> {
        self.record().map(|record| &record.session)
    }

    /// The current session record, loading it on first use.
    pub fn record(&mut self) -> Option<&SessionRecord> {
        self.load();
        match &self.state {
            CacheState::Loaded(record) => record.as_ref(),
            CacheState::Unloaded => None,
        }
    }

    /// How many times the cookie has been decoded for this request.
    pub fn load_count(&self) -> usize {
        self.loads
    }

    fn load(&mut self) {
        if !matches!(self.state, CacheState::Unloaded) {
            return;
        }
        self.loads += 1;
        let now = self.clock.now();
        let record = match self.codec.read(&self.request, now) {
            Ok(Some(record)) if now > record.expires_at => {
                tracing::debug!(expired_at = record.expires_at, "session cookie expired");
                None
            }
            Ok(record) => record,
            Err(AuthError::SessionExpired { expired_at }) => {
                tracing::debug!(expired_at, "session cookie expired");
                None
            }
            Err(e) => {
                tracing::warn!(
                    cookie = %self.codec.name(),
                    error = %e,
                    "ignoring unusable session cookie"
                );
                None
            }
        };
        self.state = CacheState::Loaded(record);
    }

    /// Start a new session. The cookie window opens now.
    ///
    /// # Errors
    ///
    /// Propagates cookie encoding failures.
    pub fn establish(&mut self, session: Session, response: &mut ResponseCookies) -> Result<()> {
        let now = self.clock.now();
        let record = SessionRecord {
            created_at: session.created_at,
            updated_at: now,
            expires_at: self.policy.expires_at(session.created_at, now),
            session,
        };
        self.codec.write(&record, &self.request, response, now)?;
        tracing::info!(
            sub = record.session.claims.subject().unwrap_or_default(),
            expires_at = record.expires_at,
            "session established"
        );
        self.state = CacheState::Loaded(Some(record));
        Ok(())
    }

    /// Replace the session contents, keeping its creation time. Rolling
    /// sessions also get a fresh window, still subject to the absolute cap.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] when there is no current session.
    pub fn update(&mut self, mut session: Session, response: &mut ResponseCookies) -> Result<()> {
        self.load();
        let CacheState::Loaded(Some(existing)) = &self.state else {
            return Err(AuthError::Unauthorized);
        };

        let now = self.clock.now();
        let created_at = existing.created_at;
        let updated_at = if self.policy.is_rolling() {
            now
        } else {
            existing.updated_at
        };
        session.created_at = created_at;

        let record = SessionRecord {
            session,
            created_at,
            updated_at,
            expires_at: self.policy.expires_at(created_at, updated_at),
        };
        self.codec.write(&record, &self.request, response, now)?;
        tracing::debug!(expires_at = record.expires_at, "session updated");
        self.state = CacheState::Loaded(Some(record));
        Ok(())
    }

    /// Extend a rolling session's window without changing its contents.
    ///
    /// Returns whether a cookie was written.
    ///
    /// # Errors
    ///
    /// Propagates cookie encoding failures.
    pub fn touch(&mut self, response: &mut ResponseCookies) -> Result<bool> {
        if !self.policy.is_rolling() {
            return Ok(false);
        }
        let Some(session) = self.get().cloned() else {
            return Ok(false);
        };
        self.update(session, response)?;
        Ok(true)
    }

    /// Remove the session and every cookie chunk carrying it.
    pub fn destroy(&mut self, response: &mut ResponseCookies) {
        let had_session = self.get().is_some();
        self.codec.clear(&self.request, response);
        self.state = CacheState::Loaded(None);
        if had_session {
            tracing::info!("session destroyed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
