//! OpenID Connect provider capability.
//!
//! The flow controller talks to the identity provider only through the
//! [`OidcClient`] trait. [`HttpOidcClient`] is the production
//! implementation: discovery, form-encoded token requests and ID-token
//! verification with `jsonwebtoken`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{OnceCell, RwLock};
use url::Url;

use crate::claims::Claims;
use crate::config::{AuthConfig, Secret};
use crate::error::{AuthError, Result};

const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Discovered provider metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

/// Query parameters for the authorization endpoint, in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationParams {
    params: BTreeMap<String, String>,
}

impl AuthorizationParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any earlier value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// An authorization code ready to be exchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExchange {
    pub code: String,
    pub redirect_uri: String,
    pub code_verifier: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Absolute access-token expiry given the time the response arrived.
    pub fn expires_at(&self, now: i64) -> Option<i64> {
        self.expires_in.map(|secs| now.saturating_add(secs))
    }
}

/// Checks applied to an ID token beyond signature, issuer, audience and
/// expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdTokenChecks {
    /// Expected `nonce` claim.
    pub nonce: Option<String>,
    /// Maximum seconds since `auth_time`.
    pub max_age: Option<i64>,
    /// Allowed clock skew in seconds.
    pub clock_tolerance: i64,
    /// Current time in unix seconds, used for the `max_age` check.
    pub now: i64,
}

/// OAuth error body returned by a token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// What the engine needs from an OpenID Connect provider.
#[async_trait]
pub trait OidcClient: Send + Sync {
    /// Provider metadata.
    async fn discover(&self) -> Result<ProviderMetadata>;

    /// Authorization endpoint URL with `params` appended to its query.
    fn authorization_url(
        &self,
        metadata: &ProviderMetadata,
        params: &AuthorizationParams,
    ) -> Result<Url> {
        let mut url = Url::parse(&metadata.authorization_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params.iter() {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    async fn exchange_code(
        &self,
        metadata: &ProviderMetadata,
        exchange: &CodeExchange,
    ) -> Result<TokenSet>;

    /// Redeem a refresh token, optionally asking for `scope`.
    async fn refresh(
        &self,
        metadata: &ProviderMetadata,
        refresh_token: &str,
        scope: Option<&str>,
    ) -> Result<TokenSet>;

    /// Verify an ID token and return its claims.
    async fn verify_id_token(
        &self,
        metadata: &ProviderMetadata,
        id_token: &str,
        checks: &IdTokenChecks,
    ) -> Result<Claims>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn operation(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "token exchange",
            Self::RefreshToken => "token refresh",
        }
    }

    fn failure(self, status: Option<u16>, error: String, description: Option<String>) -> AuthError {
        match self {
            Self::AuthorizationCode => AuthError::TokenExchangeFailure {
                status,
                error,
                description,
            },
            Self::RefreshToken => AuthError::TokenRefreshFailure {
                status,
                error,
                description,
            },
        }
    }
}

/// How long a fetched JWKS is trusted before it is fetched again.
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Minimum spacing between refetches caused by an unknown `kid`.
const JWKS_MISS_COOLDOWN: Duration = Duration::from_secs(30);

struct CachedJwks {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
    refetched_on_miss: Option<Instant>,
}

/// reqwest-backed [`OidcClient`].
///
/// Discovery metadata is fetched once per client. The JWKS is cached for
/// an hour and refetched early when a token names a `kid` it lacks.
pub struct HttpOidcClient {
    issuer: Url,
    client_id: String,
    client_secret: Option<Secret>,
    algorithm: Algorithm,
    timeout: Duration,
    http: reqwest::Client,
    metadata: OnceCell<ProviderMetadata>,
    jwks: RwLock<Option<CachedJwks>>,
}

impl HttpOidcClient {
    /// Build a client for the configured issuer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("gatehouse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Configuration {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            issuer: config.issuer_base_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            algorithm: config.id_token_signing_alg,
            timeout: config.http_timeout,
            http,
            metadata: OnceCell::new(),
            jwks: RwLock::new(None),
        })
    }

    fn transport_error(&self, operation: &'static str, e: reqwest::Error) -> AuthError {
        if e.is_timeout() {
            AuthError::Timeout {
                operation,
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            AuthError::Network(e)
        }
    }

    fn discovery_url(&self) -> Result<Url> {
        let issuer = self.issuer.as_str().trim_end_matches('/');
        if issuer.ends_with(DISCOVERY_PATH) {
            return Ok(self.issuer.clone());
        }
        Ok(Url::parse(&format!("{issuer}/{DISCOVERY_PATH}"))?)
    }

    async fn fetch_metadata(&self) -> Result<ProviderMetadata> {
        let url = self.discovery_url()?;
        tracing::debug!(url = %url, "discovering provider metadata");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error("discovery", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Discovery {
                reason: format!("discovery document returned HTTP {status}"),
            });
        }
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| AuthError::Discovery {
                reason: format!("invalid discovery document: {e}"),
            })?;

        let expected = self.issuer.as_str().trim_end_matches('/');
        if metadata.issuer.trim_end_matches('/') != expected {
            return Err(AuthError::Discovery {
                reason: format!(
                    "issuer mismatch: configured {expected}, discovered {}",
                    metadata.issuer
                ),
            });
        }

        tracing::info!(issuer = %metadata.issuer, "provider metadata discovered");
        Ok(metadata)
    }

    async fn fetch_jwks(&self, metadata: &ProviderMetadata) -> Result<JwkSet> {
        let uri = metadata
            .jwks_uri
            .as_deref()
            .ok_or_else(|| AuthError::Discovery {
                reason: "provider metadata has no jwks_uri".into(),
            })?;
        let response = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(|e| self.transport_error("jwks fetch", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Discovery {
                reason: format!("jwks endpoint returned HTTP {status}"),
            });
        }
        let jwks: JwkSet = response.json().await.map_err(|e| AuthError::Discovery {
            reason: format!("invalid jwks document: {e}"),
        })?;
        tracing::debug!(keys = jwks.keys.len(), "jwks loaded");
        Ok(jwks)
    }

    async fn decoding_key(&self, metadata: &ProviderMetadata, kid: Option<&str>) -> Result<DecodingKey> {
        if matches!(
            self.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            let secret = self.client_secret.as_ref().ok_or_else(|| AuthError::Configuration {
                reason: "symmetric ID token algorithm without a client secret".into(),
            })?;
            return Ok(DecodingKey::from_secret(secret.expose().as_bytes()));
        }

        let keys = self.jwks_for(metadata, false).await?;
        let jwk = match find_jwk(&keys, kid) {
            Some(jwk) => jwk.clone(),
            None => {
                tracing::info!(kid, "signing key not in cached jwks");
                let keys = self.jwks_for(metadata, true).await?;
                find_jwk(&keys, kid)
                    .cloned()
                    .ok_or_else(|| claim_failure(format!("no signing key matches kid {kid:?}")))?
            }
        };
        DecodingKey::from_jwk(&jwk).map_err(|e| claim_failure(format!("unusable signing key: {e}")))
    }

    /// The cached JWKS, fetched when missing or older than [`JWKS_TTL`].
    /// `key_missing` forces a refetch unless one already happened within
    /// [`JWKS_MISS_COOLDOWN`].
    async fn jwks_for(&self, metadata: &ProviderMetadata, key_missing: bool) -> Result<Arc<JwkSet>> {
        let mut cache = self.jwks.write().await;
        let mut refetched_on_miss = None;
        if let Some(cached) = cache.as_ref() {
            let stale = cached.fetched_at.elapsed() >= JWKS_TTL;
            let cooling = cached
                .refetched_on_miss
                .is_some_and(|at| at.elapsed() < JWKS_MISS_COOLDOWN);
            if !stale && (!key_missing || cooling) {
                return Ok(cached.keys.clone());
            }
            refetched_on_miss = cached.refetched_on_miss;
        }

        let keys = Arc::new(self.fetch_jwks(metadata).await?);
        let now = Instant::now();
        *cache = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: now,
            refetched_on_miss: if key_missing { Some(now) } else { refetched_on_miss },
        });
        Ok(keys)
    }

    async fn token_request(
        &self,
        metadata: &ProviderMetadata,
        grant: Grant,
        mut form: Vec<(&str, &str)>,
    ) -> Result<TokenSet> {
        form.push(("client_id", self.client_id.as_str()));
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose()));
        }

        tracing::debug!(
            token_endpoint = %metadata.token_endpoint,
            operation = grant.operation(),
            "calling token endpoint"
        );

        let response = self
            .http
            .post(&metadata.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| self.transport_error(grant.operation(), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(grant.operation(), e))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                grant.failure(
                    Some(status.as_u16()),
                    "invalid_token_response".into(),
                    Some(e.to_string()),
                )
            });
        }

        let failure = match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(err) => grant.failure(Some(status.as_u16()), err.error, err.error_description),
            Err(_) => grant.failure(
                Some(status.as_u16()),
                format!("HTTP {status}"),
                (!body.is_empty()).then_some(body),
            ),
        };
        tracing::warn!(
            status = status.as_u16(),
            operation = grant.operation(),
            "token endpoint rejected the request"
        );
        Err(failure)
    }
}

impl std::fmt::Debug for HttpOidcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOidcClient")
            .field("issuer", &self.issuer.as_str())
            .field("client_id", &self.client_id)
            .field("algorithm", &self.algorithm)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl OidcClient for HttpOidcClient {
    async fn discover(&self) -> Result<ProviderMetadata> {
        self.metadata
            .get_or_try_init(|| self.fetch_metadata())
            .await
            .cloned()
    }

    async fn exchange_code(
        &self,
        metadata: &ProviderMetadata,
        exchange: &CodeExchange,
    ) -> Result<TokenSet> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", exchange.code.as_str()),
            ("redirect_uri", exchange.redirect_uri.as_str()),
        ];
        if let Some(verifier) = &exchange.code_verifier {
            form.push(("code_verifier", verifier.as_str()));
        }
        self.token_request(metadata, Grant::AuthorizationCode, form)
            .await
    }

    async fn refresh(
        &self,
        metadata: &ProviderMetadata,
        refresh_token: &str,
        scope: Option<&str>,
    ) -> Result<TokenSet> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(scope) = scope {
            form.push(("scope", scope));
        }
        self.token_request(metadata, Grant::RefreshToken, form).await
    }

    async fn verify_id_token(
        &self,
        metadata: &ProviderMetadata,
        id_token: &str,
        checks: &IdTokenChecks,
    ) -> Result<Claims> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| claim_failure(format!("malformed ID token: {e}")))?;
        if header.alg != self.algorithm {
            return Err(claim_failure(format!(
                "ID token signed with {:?}, expected {:?}",
                header.alg, self.algorithm
            )));
        }

        let key = self.decoding_key(metadata, header.kid.as_deref()).await?;

        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[metadata.issuer.as_str()]);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "aud", "sub"]);
        validation.leeway = u64::try_from(checks.clock_tolerance).unwrap_or(0);
        validation.validate_nbf = true;

        let data = jsonwebtoken::decode::<Map<String, Value>>(id_token, &key, &validation)
            .map_err(|e| claim_failure(format!("ID token rejected: {e}")))?;
        let claims = Claims::from_map(data.claims);

        if let Some(expected) = &checks.nonce {
            if claims.get_str("nonce") != Some(expected.as_str()) {
                return Err(claim_failure("nonce mismatch"));
            }
        }

        if let Some(max_age) = checks.max_age {
            let auth_time = claims
                .get_i64("auth_time")
                .ok_or_else(|| claim_failure("auth_time missing while max_age was requested"))?;
            let deadline = auth_time
                .saturating_add(max_age)
                .saturating_add(checks.clock_tolerance);
            if checks.now > deadline {
                return Err(claim_failure("too much time has elapsed since authentication"));
            }
        }

        Ok(claims)
    }
}

fn find_jwk<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a jsonwebtoken::jwk::Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None => keys.keys.first(),
    }
}

fn claim_failure(reason: impl Into<String>) -> AuthError {
    AuthError::ClaimValidationFailure {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
