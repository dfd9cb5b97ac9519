//! Short-lived login state.
//!
//! Values that must survive the redirect to the identity provider and back
//! (state, nonce, PKCE verifier, max age) are kept in individually named,
//! HMAC-signed cookies. Each cookie is read once at the callback and then
//! expired, so a replayed callback finds nothing.
//!
//! Cookie layout: name `auth_<key>`, value `<value>.<expires_at>.<tag>` where
//! `tag` is the base64url HMAC of `<name>=<value>.<expires_at>`.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatehouse_vault::{Keyring, crypto};
use ring::digest;
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::config::{AuthConfig, SameSitePolicy};
use crate::cookies::{CookieAttributes, RequestCookies, ResponseCookies};
use crate::error::{AuthError, Result};

/// Prefix of every transient cookie name.
pub const TRANSIENT_PREFIX: &str = "auth_";

/// Marker prepended to the `SameSite`-less legacy twin.
const LEGACY_MARKER: &str = "_";

/// Random bytes behind every generated token and PKCE verifier.
const TOKEN_BYTES: usize = 32;

/// Well-known transient keys.
pub mod keys {
    pub const STATE: &str = "state";
    pub const NONCE: &str = "nonce";
    pub const CODE_VERIFIER: &str = "code_verifier";
    pub const MAX_AGE: &str = "max_age";
}

/// Signed cookie store for login-flow values.
pub struct TransientStore {
    keyring: Arc<Keyring>,
    clock: Arc<dyn Clock>,
    attributes: CookieAttributes,
    legacy: Option<CookieAttributes>,
}

impl TransientStore {
    /// Build from the configured cookie settings and response mode.
    pub fn new(keyring: Arc<Keyring>, clock: Arc<dyn Clock>, config: &AuthConfig) -> Self {
        let same_site = config.transient_same_site();
        let attributes = CookieAttributes {
            domain: config.session.cookie.domain.clone(),
            path: "/".to_string(),
            http_only: true,
            secure: same_site == SameSitePolicy::None || config.session.cookie.secure,
            same_site: Some(same_site),
        };
        let legacy = (config.legacy_same_site_cookie && same_site == SameSitePolicy::None).then(
            || CookieAttributes {
                same_site: None,
                ..attributes.clone()
            },
        );
        Self {
            keyring,
            clock,
            attributes,
            legacy,
        }
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    /// Whether a `SameSite`-less twin is written next to each cookie.
    pub fn writes_legacy(&self) -> bool {
        self.legacy.is_some()
    }

    /// Store `value` under `key` for `max_age_secs` seconds.
    pub fn save(&self, response: &mut ResponseCookies, key: &str, value: &str, max_age_secs: i64) {
        let expires_at = self.clock.now() + max_age_secs;
        let name = cookie_name(key);
        response.set(self.attributes.build(
            &name,
            &self.signed_value(&name, value, expires_at),
            Some(max_age_secs),
        ));
        if let Some(legacy) = &self.legacy {
            let legacy_name = format!("{LEGACY_MARKER}{name}");
            response.set(legacy.build(
                &legacy_name,
                &self.signed_value(&legacy_name, value, expires_at),
                Some(max_age_secs),
            ));
        }
        tracing::debug!(key, max_age_secs, "transient value saved");
    }

    /// Every valid transient value on the request, keyed without prefix.
    ///
    /// Entries with a bad signature or past expiry are skipped. A legacy
    /// value is used only when its modern cookie is absent or invalid.
    pub fn read(&self, request: &RequestCookies) -> HashMap<String, String> {
        let now = self.clock.now();
        let mut modern = HashMap::new();
        let mut legacy = HashMap::new();

        for (name, raw) in request.iter() {
            let (key, target) = match parse_name(name) {
                Some((key, false)) => (key, &mut modern),
                Some((key, true)) => (key, &mut legacy),
                None => continue,
            };
            if let Some(value) = self.verify(name, raw, now) {
                target.insert(key.to_string(), value);
            }
        }

        for (key, value) in legacy {
            modern.entry(key).or_insert(value);
        }
        modern
    }

    /// Expire the modern cookie and its legacy twin.
    pub fn consume(&self, response: &mut ResponseCookies, key: &str) {
        let name = cookie_name(key);
        response.set(self.attributes.removal(&name));
        if let Some(legacy) = &self.legacy {
            response.set(legacy.removal(&format!("{LEGACY_MARKER}{name}")));
        }
    }

    /// Read one value and expire it.
    pub fn take(
        &self,
        request: &RequestCookies,
        response: &mut ResponseCookies,
        key: &str,
    ) -> Option<String> {
        let value = self.read(request).remove(key);
        self.consume(response, key);
        value
    }

    /// Read every value and expire every transient cookie on the request,
    /// valid or not.
    pub fn take_all(
        &self,
        request: &RequestCookies,
        response: &mut ResponseCookies,
    ) -> HashMap<String, String> {
        let values = self.read(request);
        for (name, _) in request.iter() {
            match parse_name(name) {
                Some((key, false)) => response.set(self.attributes.removal(&cookie_name(key))),
                Some((_, true)) => {
                    let attributes = self.legacy.as_ref().unwrap_or(&self.attributes);
                    response.set(attributes.removal(name));
                }
                None => {}
            }
        }
        values
    }

    fn signed_value(&self, name: &str, value: &str, expires_at: i64) -> String {
        let payload = format!("{value}.{expires_at}");
        let tag = self.keyring.sign(format!("{name}={payload}").as_bytes());
        format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag))
    }

    fn verify(&self, name: &str, raw: &str, now: i64) -> Option<String> {
        let mut parts = raw.rsplitn(3, '.');
        let (Some(tag), Some(expires_at), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            tracing::warn!(cookie = name, "malformed transient cookie");
            return None;
        };

        let signed = format!("{name}={value}.{expires_at}");
        let valid = URL_SAFE_NO_PAD
            .decode(tag)
            .is_ok_and(|tag| self.keyring.verify(signed.as_bytes(), &tag));
        if !valid {
            tracing::warn!(cookie = name, "transient cookie signature rejected");
            return None;
        }

        match expires_at.parse::<i64>() {
            Ok(expires_at) if now <= expires_at => Some(value.to_string()),
            Ok(expires_at) => {
                tracing::debug!(cookie = name, expires_at, "transient cookie expired");
                None
            }
            Err(_) => {
                tracing::warn!(cookie = name, "transient cookie has a bad expiry");
                None
            }
        }
    }
}

impl std::fmt::Debug for TransientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientStore")
            .field("attributes", &self.attributes)
            .field("legacy", &self.legacy.is_some())
            .finish_non_exhaustive()
    }
}

fn cookie_name(key: &str) -> String {
    format!("{TRANSIENT_PREFIX}{key}")
}

/// Split a cookie name into its transient key and whether it is the legacy
/// twin.
fn parse_name(name: &str) -> Option<(&str, bool)> {
    if let Some(key) = name
        .strip_prefix(LEGACY_MARKER)
        .and_then(|rest| rest.strip_prefix(TRANSIENT_PREFIX))
    {
        return Some((key, true));
    }
    name.strip_prefix(TRANSIENT_PREFIX).map(|key| (key, false))
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// A random URL-safe token with 256 bits of entropy.
///
/// # Errors
///
/// Returns [`AuthError::Vault`] if the system CSPRNG fails.
pub fn random_token() -> Result<String> {
    let bytes = crypto::random_bytes(TOKEN_BYTES)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a PKCE code verifier (random 32 bytes, base64url encoded).
///
/// # Errors
///
/// Returns [`AuthError::Vault`] if the system CSPRNG fails.
pub fn generate_pkce_verifier() -> Result<String> {
    random_token()
}

/// `BASE64URL(SHA256(verifier))`, the S256 PKCE challenge.
pub fn pkce_challenge(verifier: &str) -> String {
    let hash = digest::digest(&digest::SHA256, verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}

// ---------------------------------------------------------------------------
// Login state
// ---------------------------------------------------------------------------

/// Encode login state as the opaque `state` parameter.
///
/// A random `nonce` field is added so two logins with the same state never
/// produce the same parameter.
///
/// # Errors
///
/// Returns an error if the CSPRNG fails or the state cannot be serialized.
pub fn encode_state(state: &Map<String, Value>) -> Result<String> {
    let mut state = state.clone();
    state.insert("nonce".to_string(), Value::String(random_token()?));
    let json = serde_json::to_vec(&state)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a `state` parameter produced by [`encode_state`].
///
/// # Errors
///
/// Returns [`AuthError::InvalidCallback`] if the value is not base64url JSON
/// object.
pub fn decode_state(encoded: &str) -> Result<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| AuthError::InvalidCallback {
            reason: "state is not base64url".into(),
        })?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidCallback {
        reason: "state is not a JSON object".into(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
