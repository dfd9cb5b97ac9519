//! Login, callback, logout and access-token retrieval.
//!
//! ```text
//! LoggedOut --login--> AwaitingCallback --callback ok--> LoggedIn --logout--> LoggedOut
//!                      AwaitingCallback --callback err--> LoggedOut
//! ```
//!
//! The controller holds no per-request state. Every operation takes the
//! request's [`SessionCache`] and the [`ResponseCookies`] being built for
//! the response.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::claims::Claims;
use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::cookies::ResponseCookies;
use crate::error::{AuthError, Result};
use crate::oidc::{AuthorizationParams, CodeExchange, IdTokenChecks, OidcClient};
use crate::session::{Session, SessionCache};
use crate::transient::{self, TransientStore, keys};

/// Produces the application state carried through the login round trip.
pub type LoginStateFn = Arc<dyn Fn(&LoginOptions) -> Map<String, Value> + Send + Sync>;

/// Hook run after a successful callback, before the session is stored.
#[async_trait]
pub trait AfterCallback: Send + Sync {
    /// Return the session to store. `state` is the decoded login state.
    async fn after_callback(&self, session: Session, state: &Map<String, Value>) -> Result<Session>;
}

/// Hook run after a token refresh, before the session is rewritten.
#[async_trait]
pub trait AfterRefresh: Send + Sync {
    async fn after_refresh(&self, session: Session) -> Result<Session>;
}

/// Login request options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoginOptions {
    /// Where to send the user after the callback.
    #[serde(default, rename = "returnTo")]
    pub return_to: Option<String>,
    /// Authorization parameters that override the configured ones.
    #[serde(default)]
    pub authorization_params: BTreeMap<String, String>,
}

/// Parameters the identity provider sends to the callback route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of a successful callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackOutcome {
    /// Where to redirect the browser.
    pub return_to: String,
    pub session: Session,
}

/// Logout request options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LogoutOptions {
    /// Overrides the configured post-logout redirect.
    #[serde(default, rename = "returnTo")]
    pub return_to: Option<String>,
}

/// Access-token request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessTokenOptions {
    /// Refresh even if the token is still valid.
    pub refresh: bool,
    /// Scopes the token must cover.
    pub scopes: Vec<String>,
}

/// A usable access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Default login state: just the requested `returnTo`.
pub fn default_login_state(options: &LoginOptions) -> Map<String, Value> {
    let mut state = Map::new();
    if let Some(return_to) = &options.return_to {
        state.insert("returnTo".into(), Value::String(return_to.clone()));
    }
    state
}

/// Orchestrates the OpenID Connect authorization-code flow.
pub struct FlowController {
    config: Arc<AuthConfig>,
    client: Arc<dyn OidcClient>,
    transient: TransientStore,
    clock: Arc<dyn Clock>,
    login_state: LoginStateFn,
    after_callback: Option<Arc<dyn AfterCallback>>,
    after_refresh: Option<Arc<dyn AfterRefresh>>,
}

impl FlowController {
    pub fn new(
        config: Arc<AuthConfig>,
        client: Arc<dyn OidcClient>,
        transient: TransientStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            client,
            transient,
            clock,
            login_state: Arc::new(default_login_state),
            after_callback: None,
            after_refresh: None,
        }
    }

    /// Replace the time source here and in the transient store.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.transient.set_clock(clock.clone());
        self.clock = clock;
    }

    pub fn set_login_state(&mut self, login_state: LoginStateFn) {
        self.login_state = login_state;
    }

    pub fn set_after_callback(&mut self, hook: Arc<dyn AfterCallback>) {
        self.after_callback = Some(hook);
    }

    pub fn set_after_refresh(&mut self, hook: Arc<dyn AfterRefresh>) {
        self.after_refresh = Some(hook);
    }

    pub fn transient_store(&self) -> &TransientStore {
        &self.transient
    }

    // -- Login --------------------------------------------------------------

    /// Start a login: stash state, nonce and PKCE verifier in transient
    /// cookies and return the authorization URL to redirect to.
    ///
    /// # Errors
    ///
    /// Fails if discovery fails, randomness is unavailable, or a
    /// `max_age` override is not an integer.
    pub async fn login(&self, options: LoginOptions, response: &mut ResponseCookies) -> Result<Url> {
        let metadata = self.client.discover().await?;
        let config = &self.config;

        let mut state = (self.login_state)(&options);
        let requested = state.get("returnTo").and_then(Value::as_str);
        let return_to = self.safe_return_to(requested);
        state.insert("returnTo".into(), Value::String(return_to.clone()));
        let state = transient::encode_state(&state)?;
        let nonce = transient::random_token()?;

        let mut params = AuthorizationParams::new();
        params
            .set("client_id", config.client_id.as_str())
            .set("response_type", config.authorization.response_type.as_str())
            .set("scope", config.authorization.scope.as_str())
            .set("redirect_uri", config.redirect_uri()?.as_str());
        if let Some(mode) = config.authorization.response_mode {
            params.set("response_mode", mode.as_str());
        }
        if let Some(audience) = &config.authorization.audience {
            params.set("audience", audience.as_str());
        }
        if let Some(organization) = &config.organization {
            params.set("organization", organization.as_str());
        }
        for (name, value) in config
            .authorization
            .extra
            .iter()
            .chain(options.authorization_params.iter())
        {
            params.set(name.as_str(), value.as_str());
        }
        params.set("state", state.as_str()).set("nonce", nonce.as_str());

        let ttl = config.transaction_max_age;
        self.transient.save(response, keys::STATE, &state, ttl);
        self.transient.save(response, keys::NONCE, &nonce, ttl);

        if config.use_pkce {
            let verifier = transient::generate_pkce_verifier()?;
            params
                .set("code_challenge", transient::pkce_challenge(&verifier))
                .set("code_challenge_method", "S256");
            self.transient.save(response, keys::CODE_VERIFIER, &verifier, ttl);
        }

        if let Some(max_age) = params.get("max_age") {
            let max_age: i64 = max_age.parse().map_err(|_| AuthError::Configuration {
                reason: format!("max_age must be an integer number of seconds, got {max_age}"),
            })?;
            self.transient
                .save(response, keys::MAX_AGE, &max_age.to_string(), ttl);
        }

        let url = self.client.authorization_url(&metadata, &params)?;
        tracing::debug!(return_to = %return_to, pkce = config.use_pkce, "login started");
        Ok(url)
    }

    // -- Callback -----------------------------------------------------------

    /// Complete a login. Every transient value is consumed up front, so
    /// a second callback with the same state fails as missing state.
    ///
    /// # Errors
    ///
    /// - [`AuthError::TransientStateMissing`] when login state is absent.
    /// - [`AuthError::CsrfStateMismatch`] when `state` does not match.
    /// - [`AuthError::IdentityProvider`] when the provider returned an error
    ///   for this login.
    /// - [`AuthError::TokenExchangeFailure`] from the token endpoint.
    /// - [`AuthError::ClaimValidationFailure`] for ID-token or organization
    ///   failures.
    pub async fn callback(
        &self,
        cache: &mut SessionCache,
        params: CallbackParams,
        response: &mut ResponseCookies,
    ) -> Result<CallbackOutcome> {
        let config = &self.config;
        let stored = self.transient.take_all(cache.request_cookies(), response);

        let expected_state = stored.get(keys::STATE).ok_or_else(|| {
            tracing::warn!(check = "state", "callback without stored login state");
            AuthError::TransientStateMissing {
                key: keys::STATE.into(),
            }
        })?;
        let returned_state = params.state.as_deref().unwrap_or_default();
        if !gatehouse_vault::crypto::constant_time_eq(
            expected_state.as_bytes(),
            returned_state.as_bytes(),
        ) {
            tracing::warn!(check = "state", "callback state does not match stored state");
            return Err(AuthError::CsrfStateMismatch);
        }

        if let Some(error) = params.error {
            tracing::warn!(error = %error, "identity provider returned an error");
            return Err(AuthError::IdentityProvider {
                error,
                description: params.error_description,
            });
        }

        let login_state = transient::decode_state(expected_state)?;

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::InvalidCallback {
                reason: "missing authorization code".into(),
            })?;
        let nonce = stored.get(keys::NONCE).ok_or_else(|| {
            tracing::warn!(check = "nonce", "callback without stored nonce");
            AuthError::TransientStateMissing {
                key: keys::NONCE.into(),
            }
        })?;
        let code_verifier = stored.get(keys::CODE_VERIFIER).cloned();
        if config.use_pkce && code_verifier.is_none() {
            tracing::warn!(check = "code_verifier", "callback without stored PKCE verifier");
            return Err(AuthError::TransientStateMissing {
                key: keys::CODE_VERIFIER.into(),
            });
        }
        let max_age = stored.get(keys::MAX_AGE).and_then(|v| v.parse().ok());

        let metadata = self.client.discover().await?;
        let tokens = self
            .client
            .exchange_code(
                &metadata,
                &CodeExchange {
                    code,
                    redirect_uri: config.redirect_uri()?.to_string(),
                    code_verifier,
                },
            )
            .await?;
        let now = self.clock.now();

        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::ClaimValidationFailure {
                reason: "token response contains no ID token".into(),
            })?;
        let claims = self
            .client
            .verify_id_token(
                &metadata,
                id_token,
                &IdTokenChecks {
                    nonce: Some(nonce.clone()),
                    max_age,
                    clock_tolerance: config.clock_tolerance,
                    now,
                },
            )
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "ID token rejected"))?;

        self.check_organization(&claims)?;

        let mut session = Session::new(claims.without(config.identity_claim_filter.as_slice()), now);
        session.access_token_scope = tokens
            .scope
            .clone()
            .or_else(|| Some(config.authorization.scope.clone()));
        session.expires_at = tokens.expires_at(now);
        session.access_token = tokens.access_token;
        session.refresh_token = tokens.refresh_token;
        session.id_token = tokens.id_token;
        session.token_type = tokens.token_type;

        if let Some(hook) = &self.after_callback {
            session = hook.after_callback(session, &login_state).await?;
        }

        cache.establish(session.clone(), response)?;

        let return_to =
            self.safe_return_to(login_state.get("returnTo").and_then(Value::as_str));
        tracing::debug!(return_to = %return_to, "callback complete");
        Ok(CallbackOutcome { return_to, session })
    }

    fn check_organization(&self, claims: &Claims) -> Result<()> {
        let Some(expected) = &self.config.organization else {
            return Ok(());
        };
        match claims.organization_id() {
            Some(actual) if actual == expected => Ok(()),
            Some(_) => {
                tracing::warn!(check = "org_id", "organization claim mismatch");
                Err(AuthError::ClaimValidationFailure {
                    reason: "org_id claim does not match the configured organization".into(),
                })
            }
            None => {
                tracing::warn!(check = "org_id", "organization claim missing");
                Err(AuthError::ClaimValidationFailure {
                    reason: "org_id claim is missing".into(),
                })
            }
        }
    }

    // -- Logout -------------------------------------------------------------

    /// End the session and return where to send the browser.
    ///
    /// # Errors
    ///
    /// Fails only if discovery fails while building an IdP logout URL.
    pub async fn logout(
        &self,
        cache: &mut SessionCache,
        options: LogoutOptions,
        response: &mut ResponseCookies,
    ) -> Result<Url> {
        let config = &self.config;
        let post_logout = match options.return_to.as_deref() {
            Some(target) => self.resolve_against_base(&self.safe_return_to(Some(target)))?,
            None => config.post_logout_redirect.clone(),
        };

        let id_token = match cache.get() {
            Some(session) => session.id_token.clone(),
            None => {
                tracing::debug!("logout without a session");
                return Ok(post_logout);
            }
        };
        cache.destroy(response);

        if !config.idp_logout {
            return Ok(post_logout);
        }

        if config.v2_logout {
            let mut url = Url::parse(&format!(
                "{}/v2/logout",
                config.issuer_base_url.as_str().trim_end_matches('/')
            ))?;
            url.query_pairs_mut()
                .append_pair("returnTo", post_logout.as_str())
                .append_pair("client_id", &config.client_id);
            return Ok(url);
        }

        let metadata = self.client.discover().await?;
        let Some(endpoint) = metadata.end_session_endpoint.as_deref() else {
            tracing::warn!("provider has no end_session_endpoint, skipping IdP logout");
            return Ok(post_logout);
        };
        let mut url = Url::parse(endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(hint) = &id_token {
                query.append_pair("id_token_hint", hint);
            }
            query.append_pair("post_logout_redirect_uri", post_logout.as_str());
        }
        Ok(url)
    }

    // -- Access token -------------------------------------------------------

    /// The session's access token, refreshed when expired, when more scopes
    /// are requested, or when a refresh is forced.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthorized`] without a session.
    /// - [`AuthError::MissingAccessToken`] when the session has none.
    /// - [`AuthError::TokenExpired`], [`AuthError::InsufficientScope`] or
    ///   [`AuthError::MissingRefreshToken`] when a refresh is needed but
    ///   impossible. No network call is made in these cases.
    /// - [`AuthError::TokenRefreshFailure`] from the token endpoint.
    pub async fn get_access_token(
        &self,
        cache: &mut SessionCache,
        options: AccessTokenOptions,
        response: &mut ResponseCookies,
    ) -> Result<AccessToken> {
        let session = cache.get().cloned().ok_or(AuthError::Unauthorized)?;
        let access_token = session
            .access_token
            .clone()
            .ok_or(AuthError::MissingAccessToken)?;

        let now = self.clock.now();
        let expired = session
            .expires_at
            .is_some_and(|exp| exp <= now + self.config.clock_tolerance);

        let granted: Vec<&str> = session
            .access_token_scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        let missing: Vec<&str> = options
            .scopes
            .iter()
            .flat_map(|s| s.split_whitespace())
            .filter(|s| !granted.contains(s))
            .collect();
        let scope_gap = !missing.is_empty();

        if !expired && !scope_gap && !options.refresh {
            return Ok(AccessToken {
                access_token,
                token_type: session.token_type,
                expires_at: session.expires_at,
                scope: session.access_token_scope,
            });
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            return Err(if expired {
                AuthError::TokenExpired
            } else if scope_gap {
                AuthError::InsufficientScope {
                    required: missing.join(" "),
                }
            } else {
                AuthError::MissingRefreshToken
            });
        };

        let scope = scope_gap.then(|| {
            let mut union = granted.clone();
            for s in &missing {
                if !union.contains(s) {
                    union.push(*s);
                }
            }
            union.join(" ")
        });

        tracing::info!(expired, scope_gap, forced = options.refresh, "refreshing access token");
        let metadata = self.client.discover().await?;
        let tokens = self
            .client
            .refresh(&metadata, &refresh_token, scope.as_deref())
            .await?;
        let now = self.clock.now();

        let mut updated = session.clone();
        updated.access_token = Some(tokens.access_token.clone().ok_or_else(|| {
            AuthError::TokenRefreshFailure {
                status: None,
                error: "invalid_token_response".into(),
                description: Some("refresh response contains no access token".into()),
            }
        })?);
        updated.access_token_scope = tokens.scope.clone().or(scope).or(session.access_token_scope);
        updated.expires_at = tokens.expires_at(now);
        if let Some(rotated) = tokens.refresh_token {
            updated.refresh_token = Some(rotated);
        }
        if let Some(id_token) = tokens.id_token {
            updated.id_token = Some(id_token);
        }
        if let Some(token_type) = tokens.token_type {
            updated.token_type = Some(token_type);
        }

        if let Some(hook) = &self.after_refresh {
            updated = hook.after_refresh(updated).await?;
        }

        cache.update(updated.clone(), response)?;

        Ok(AccessToken {
            access_token: updated.access_token.unwrap_or_default(),
            token_type: updated.token_type,
            expires_at: updated.expires_at,
            scope: updated.access_token_scope,
        })
    }

    // -- Redirect targets ---------------------------------------------------

    /// Accept relative paths and same-origin URLs; anything else falls back
    /// to the base URL. Browsers drop tab and newline characters and read
    /// `\` as `/`, so targets containing control characters or a
    /// backslash are rejected outright.
    pub fn safe_return_to(&self, target: Option<&str>) -> String {
        let base = &self.config.base_url;
        let Some(target) = target.filter(|t| !t.is_empty()) else {
            return base.to_string();
        };
        if target.chars().any(|c| c.is_control() || c == '\\') {
            tracing::warn!(return_to = ?target, "rejected returnTo with control characters");
            return base.to_string();
        }
        if target.starts_with('/') && !target.starts_with("//") {
            return target.to_string();
        }
        match Url::parse(target) {
            Ok(url) if url.origin() == base.origin() => url.to_string(),
            _ => {
                tracing::warn!(return_to = %target, "rejected off-site returnTo");
                base.to_string()
            }
        }
    }

    fn resolve_against_base(&self, target: &str) -> Result<Url> {
        if target.starts_with('/') {
            let base = self.config.base_url.as_str().trim_end_matches('/');
            Ok(Url::parse(&format!("{base}{target}"))?)
        } else {
            Ok(Url::parse(target)?)
        }
    }
}

impl std::fmt::Debug for FlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowController")
            .field("transient", &self.transient)
            .field("after_callback", &self.after_callback.is_some())
            .field("after_refresh", &self.after_refresh.is_some())
            .finish_non_exhaustive()
    }
}
