//! Encrypted, chunked session cookies.
//!
//! A session cookie value is
//!
//! ```text
//! base64url(header_json) "." base64url(nonce || ciphertext || tag)
//! ```
//!
//! The header `{v, iat, uat, exp}` travels in clear so that expiry can be
//! checked before any decryption work, and its encoded form is the AEAD
//! additional data, so it cannot be altered without failing authentication.
//!
//! Values larger than one cookie are split into `<name>.0`, `<name>.1`, …
//! and reassembled by concatenation in index order.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatehouse_vault::Keyring;
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::cookies::{CookieAttributes, RequestCookies, ResponseCookies};
use crate::error::{AuthError, Result};
use crate::session::{Session, SessionRecord};

/// Practical size cap for one rendered `Set-Cookie` value.
pub const COOKIE_SIZE_LIMIT: usize = 4000;

/// Envelope format version.
const ENVELOPE_VERSION: u8 = 1;

/// Total session payload above which proxies commonly start rejecting the
/// request headers.
const LARGE_PAYLOAD_BYTES: usize = 8 * 1024;

/// Clear-text envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub v: u8,
    /// Session creation time.
    pub iat: i64,
    /// Last update time.
    pub uat: i64,
    /// Cookie expiry.
    pub exp: i64,
}

/// Reads and writes one named session cookie family.
pub struct CookieCodec {
    keyring: Arc<Keyring>,
    name: String,
    attributes: CookieAttributes,
    transient: bool,
}

impl CookieCodec {
    pub fn new(keyring: Arc<Keyring>, session: &SessionConfig) -> Self {
        Self {
            keyring,
            name: session.name.clone(),
            attributes: CookieAttributes::from_session(&session.cookie),
            transient: session.cookie.transient,
        }
    }

    /// Base cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Seal `record` into one envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Serialization`] or [`AuthError::Vault`].
    pub fn encode(&self, record: &SessionRecord) -> Result<String> {
        let header = EnvelopeHeader {
            v: ENVELOPE_VERSION,
            iat: record.created_at,
            uat: record.updated_at,
            exp: record.expires_at,
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload = serde_json::to_vec(&record.session)?;
        let blob = self.keyring.seal(&payload, header_b64.as_bytes())?;
        tracing::trace!(
            payload_bytes = payload.len(),
            sealed_bytes = blob.len(),
            "session sealed"
        );
        Ok(format!("{header_b64}.{}", URL_SAFE_NO_PAD.encode(blob)))
    }

    /// Open an envelope string, rejecting it if expired at `now`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCookie`] for a malformed envelope or payload.
    /// - [`AuthError::SessionExpired`] when the header's `exp` has passed.
    /// - [`AuthError::DecryptionFailure`] when no secret authenticates it.
    pub fn decode(&self, value: &str, now: i64) -> Result<SessionRecord> {
        let (header_b64, blob_b64) = value
            .split_once('.')
            .ok_or_else(|| invalid("envelope has no header separator"))?;

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| invalid("header is not base64url"))?;
        let header: EnvelopeHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| invalid("header is not valid JSON"))?;
        if header.v != ENVELOPE_VERSION {
            return Err(invalid(format!("unsupported envelope version {}", header.v)));
        }
        if now > header.exp {
            return Err(AuthError::SessionExpired {
                expired_at: header.exp,
            });
        }

        let blob = URL_SAFE_NO_PAD
            .decode(blob_b64)
            .map_err(|_| invalid("ciphertext is not base64url"))?;
        let plaintext = self
            .keyring
            .open(&blob, header_b64.as_bytes())
            .map_err(|e| AuthError::DecryptionFailure {
                reason: e.to_string(),
            })?;
        let session: Session = serde_json::from_slice(&plaintext)
            .map_err(|e| invalid(format!("payload is not a session: {e}")))?;

        Ok(SessionRecord {
            session,
            created_at: header.iat,
            updated_at: header.uat,
            expires_at: header.exp,
        })
    }

    /// Write `record`, chunking as needed and expiring stale cookies from a
    /// previous write that are still present on the request.
    ///
    /// # Errors
    ///
    /// Propagates [`CookieCodec::encode`] failures.
    pub fn write(
        &self,
        record: &SessionRecord,
        request: &RequestCookies,
        response: &mut ResponseCookies,
        now: i64,
    ) -> Result<()> {
        let value = self.encode(record)?;
        let max_age = (!self.transient).then(|| record.expires_at - now);

        if value.len() > LARGE_PAYLOAD_BYTES {
            tracing::warn!(
                cookie = %self.name,
                bytes = value.len(),
                "session cookie is very large and may exceed proxy header limits"
            );
        }

        let single = self.attributes.build(&self.name, &value, max_age);
        if single.to_string().len() <= COOKIE_SIZE_LIMIT {
            response.set(single);
            for index in self.chunk_indices(request) {
                response.set(self.attributes.removal(&self.chunk_name(index)));
            }
            return Ok(());
        }

        // Size chunks for the longest name they will carry: `name.10` is a
        // byte wider than `name.9`.
        let overhead_for = |index: usize| {
            self.attributes
                .build(&self.chunk_name(index), "", max_age)
                .to_string()
                .len()
        };
        let estimate = value
            .len()
            .div_ceil(COOKIE_SIZE_LIMIT.saturating_sub(overhead_for(0)).max(1));
        let chunk_size = COOKIE_SIZE_LIMIT
            .saturating_sub(overhead_for(estimate))
            .max(1);

        // The envelope is ASCII, so byte offsets are char boundaries.
        let mut count = 0;
        let mut start = 0;
        while start < value.len() {
            let end = (start + chunk_size).min(value.len());
            let chunk = &value[start..end];
            response.set(self.attributes.build(&self.chunk_name(count), chunk, max_age));
            count += 1;
            start = end;
        }

        if request.contains(&self.name) {
            response.set(self.attributes.removal(&self.name));
        }
        for index in self.chunk_indices(request).into_iter().filter(|i| *i >= count) {
            response.set(self.attributes.removal(&self.chunk_name(index)));
        }

        tracing::debug!(cookie = %self.name, chunks = count, "session cookie chunked");
        Ok(())
    }

    /// Read the session from the request.
    ///
    /// Returns `Ok(None)` when no session cookie is present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCookie`] for missing chunks plus any
    /// error from [`CookieCodec::decode`].
    pub fn read(&self, request: &RequestCookies, now: i64) -> Result<Option<SessionRecord>> {
        if let Some(value) = request.get(&self.name) {
            return self.decode(value, now).map(Some);
        }

        let indices = self.chunk_indices(request);
        if indices.is_empty() {
            return Ok(None);
        }

        let mut value = String::new();
        for (expected, index) in indices.iter().enumerate() {
            if *index != expected {
                return Err(invalid(format!(
                    "session cookie chunk {expected} is missing"
                )));
            }
            if let Some(chunk) = request.get(&self.chunk_name(*index)) {
                value.push_str(chunk);
            }
        }

        self.decode(&value, now).map(Some)
    }

    /// Expire the unchunked cookie and every chunk present on the request.
    pub fn clear(&self, request: &RequestCookies, response: &mut ResponseCookies) {
        response.set(self.attributes.removal(&self.name));
        for index in self.chunk_indices(request) {
            response.set(self.attributes.removal(&self.chunk_name(index)));
        }
    }

    fn chunk_name(&self, index: usize) -> String {
        format!("{}.{index}", self.name)
    }

    /// Sorted chunk indices present on the request.
    fn chunk_indices(&self, request: &RequestCookies) -> Vec<usize> {
        let prefix = format!("{}.", self.name);
        let mut indices: Vec<usize> = request
            .iter()
            .filter_map(|(name, _)| name.strip_prefix(&prefix))
            .filter_map(|suffix| suffix.parse().ok())
            .collect();
        indices.sort_unstable();
        indices
    }
}

impl std::fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCodec")
            .field("name", &self.name)
            .field("attributes", &self.attributes)
            .field("transient", &self.transient)
            .finish_non_exhaustive()
    }
}

fn invalid(reason: impl Into<String>) -> AuthError {
    AuthError::InvalidCookie {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
