//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gatehouse_auth_engine::cookies::{RequestCookies, ResponseCookies};
use gatehouse_auth_engine::error::{AuthError, Result};
use gatehouse_auth_engine::oidc::{CodeExchange, IdTokenChecks};
use gatehouse_auth_engine::transient::pkce_challenge;
use gatehouse_auth_engine::{AuthConfig, Claims, ConfigLayer, OidcClient, ProviderMetadata, TokenSet};
use serde_json::json;
use url::Url;

pub const T0: i64 = 1_700_000_000;
pub const SECRET_1: &str = "first-rotation-secret-0123456789abcdef";
pub const SECRET_2: &str = "second-rotation-secret-0123456789abcdef";
pub const ISSUER: &str = "https://idp.example.com";
pub const BASE_URL: &str = "https://app.example.com";
pub const CLIENT_ID: &str = "client-123";

/// Minimal valid configuration with `overrides` on top.
pub fn test_config(overrides: ConfigLayer) -> AuthConfig {
    let base = ConfigLayer {
        secrets: Some(vec![SECRET_1.into()]),
        issuer_base_url: Some(ISSUER.into()),
        base_url: Some(BASE_URL.into()),
        client_id: Some(CLIENT_ID.into()),
        client_secret: Some("client-secret".into()),
        ..Default::default()
    };
    AuthConfig::from_layer(base.merge(overrides)).expect("test config is valid")
}

// ---------------------------------------------------------------------------
// Browser cookie jar
// ---------------------------------------------------------------------------

/// Applies `Set-Cookie` directives the way a browser would.
#[derive(Debug, Default, Clone)]
pub struct BrowserJar {
    cookies: BTreeMap<String, String>,
}

impl BrowserJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, response: &ResponseCookies) {
        for cookie in response.iter() {
            let removed = cookie.value().is_empty()
                || cookie.max_age().is_some_and(|age| age.is_zero() || age.is_negative());
            if removed {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
    }

    pub fn request(&self) -> RequestCookies {
        RequestCookies::from_pairs(self.cookies.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.cookies.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn remove(&mut self, name: &str) {
        self.cookies.remove(name);
    }
}

// ---------------------------------------------------------------------------
// Mock provider
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Authorization {
    code: String,
    nonce: String,
    code_challenge: Option<String>,
}

/// In-memory identity provider. Tests call [`MockOidc::authorize`] with the
/// login URL to play the user consenting at the provider.
#[derive(Debug)]
pub struct MockOidc {
    pub metadata: ProviderMetadata,
    pub user: Mutex<Claims>,
    pub exchange_tokens: Mutex<TokenSet>,
    pub refresh_tokens: Mutex<TokenSet>,
    pub refresh_error: Mutex<Option<(u16, String)>>,
    pub discover_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub last_refresh_scope: Mutex<Option<String>>,
    pub last_checks: Mutex<Option<IdTokenChecks>>,
    pending: Mutex<Option<Authorization>>,
}

impl MockOidc {
    pub fn new() -> Self {
        let mut user = Claims::new();
        user.insert("sub", "auth0|user-1");
        user.insert("email", "ada@example.com");
        user.insert("name", "Ada");

        Self {
            metadata: ProviderMetadata {
                issuer: format!("{ISSUER}/"),
                authorization_endpoint: format!("{ISSUER}/authorize"),
                token_endpoint: format!("{ISSUER}/oauth/token"),
                end_session_endpoint: Some(format!("{ISSUER}/oidc/logout")),
                jwks_uri: Some(format!("{ISSUER}/.well-known/jwks.json")),
                id_token_signing_alg_values_supported: vec!["RS256".into()],
            },
            user: Mutex::new(user),
            exchange_tokens: Mutex::new(TokenSet {
                access_token: Some("access-1".into()),
                refresh_token: Some("refresh-1".into()),
                token_type: Some("Bearer".into()),
                expires_in: Some(3600),
                scope: Some("openid profile email".into()),
                ..Default::default()
            }),
            refresh_tokens: Mutex::new(TokenSet {
                access_token: Some("access-2".into()),
                token_type: Some("Bearer".into()),
                expires_in: Some(3600),
                ..Default::default()
            }),
            refresh_error: Mutex::new(None),
            discover_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            last_refresh_scope: Mutex::new(None),
            last_checks: Mutex::new(None),
            pending: Mutex::new(None),
        }
    }

    /// Accept the login at `url` and return the callback `(code, state)`.
    pub fn authorize(&self, url: &Url) -> (String, String) {
        let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        let code = format!("code-{}", self.exchange_calls.load(Ordering::SeqCst));
        *self.pending.lock().unwrap() = Some(Authorization {
            code: code.clone(),
            nonce: query.get("nonce").cloned().unwrap_or_default(),
            code_challenge: query.get("code_challenge").cloned(),
        });
        (code, query.get("state").cloned().unwrap_or_default())
    }

    pub fn network_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
            + self.exchange_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OidcClient for MockOidc {
    async fn discover(&self) -> Result<ProviderMetadata> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }

    async fn exchange_code(
        &self,
        _metadata: &ProviderMetadata,
        exchange: &CodeExchange,
    ) -> Result<TokenSet> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.pending.lock().unwrap().take();
        let invalid_grant = |description: &str| AuthError::TokenExchangeFailure {
            status: Some(400),
            error: "invalid_grant".into(),
            description: Some(description.into()),
        };

        let Some(pending) = pending else {
            return Err(invalid_grant("unknown authorization code"));
        };
        if pending.code != exchange.code {
            return Err(invalid_grant("authorization code mismatch"));
        }
        if let Some(challenge) = &pending.code_challenge {
            let verifier = exchange.code_verifier.as_deref().unwrap_or_default();
            if &pkce_challenge(verifier) != challenge {
                return Err(invalid_grant("PKCE verification failed"));
            }
        }

        let mut tokens = self.exchange_tokens.lock().unwrap().clone();
        tokens.id_token = Some(format!("id.{}", pending.nonce));
        Ok(tokens)
    }

    async fn refresh(
        &self,
        _metadata: &ProviderMetadata,
        _refresh_token: &str,
        scope: Option<&str>,
    ) -> Result<TokenSet> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_scope.lock().unwrap() = scope.map(String::from);
        if let Some((status, error)) = self.refresh_error.lock().unwrap().clone() {
            return Err(AuthError::TokenRefreshFailure {
                status: Some(status),
                error,
                description: None,
            });
        }
        Ok(self.refresh_tokens.lock().unwrap().clone())
    }

    async fn verify_id_token(
        &self,
        metadata: &ProviderMetadata,
        id_token: &str,
        checks: &IdTokenChecks,
    ) -> Result<Claims> {
        *self.last_checks.lock().unwrap() = Some(checks.clone());
        let nonce = id_token.strip_prefix("id.").unwrap_or_default();
        if checks.nonce.as_deref() != Some(nonce) {
            return Err(AuthError::ClaimValidationFailure {
                reason: "nonce mismatch".into(),
            });
        }
        let mut claims = self.user.lock().unwrap().clone();
        for (name, value) in [
            ("aud", json!(CLIENT_ID)),
            ("iss", json!(metadata.issuer)),
            ("iat", json!(T0)),
            ("exp", json!(T0 + 3600)),
            ("nonce", json!(nonce)),
            ("azp", json!(CLIENT_ID)),
        ] {
            claims.insert(name, value);
        }
        Ok(claims)
    }
}
