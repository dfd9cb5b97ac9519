//! High-level authentication manager.
//!
//! The [`AuthManager`] is built once at startup from a validated
//! [`AuthConfig`] and an [`OidcClient`], then shared (behind an `Arc`) by
//! every request handler. It owns the keyring, the cookie codec and the flow
//! controller; request handlers only ever create a [`SessionCache`] per
//! request and pass it in.

use std::future::Future;
use std::sync::Arc;

use gatehouse_vault::Keyring;
use serde_json::{Map, Value};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::codec::CookieCodec;
use crate::config::AuthConfig;
use crate::cookies::{RequestCookies, ResponseCookies};
use crate::error::{AuthError, Result};
use crate::flow::{
    AccessToken, AccessTokenOptions, AfterCallback, AfterRefresh, CallbackOutcome, CallbackParams,
    FlowController, LoginOptions, LogoutOptions,
};
use crate::oidc::{HttpOidcClient, OidcClient};
use crate::session::{Session, SessionCache};
use crate::transient::TransientStore;

// ---------------------------------------------------------------------------
// AuthManager
// ---------------------------------------------------------------------------

/// Entry point for hosts: builds per-request session caches and runs the
/// login flow.
pub struct AuthManager {
    config: Arc<AuthConfig>,
    codec: Arc<CookieCodec>,
    clock: Arc<dyn Clock>,
    flow: FlowController,
}

impl AuthManager {
    /// Assemble a manager around an existing provider client.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the secrets cannot key the
    /// keyring.
    pub fn new(config: AuthConfig, client: Arc<dyn OidcClient>) -> Result<Self> {
        let keyring = Keyring::new(config.secrets.iter().map(|s| s.expose())).map_err(|e| {
            AuthError::Configuration {
                reason: e.to_string(),
            }
        })?;
        let keyring = Arc::new(keyring);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let config = Arc::new(config);

        let codec = Arc::new(CookieCodec::new(keyring.clone(), &config.session));
        let transient = TransientStore::new(keyring, clock.clone(), &config);
        let flow = FlowController::new(config.clone(), client, transient, clock.clone());

        tracing::info!(
            issuer = %config.issuer_base_url,
            session_cookie = %config.session.name,
            idp_logout = config.idp_logout,
            "auth manager ready"
        );

        Ok(Self {
            config,
            codec,
            clock,
            flow,
        })
    }

    /// Assemble a manager that talks to the configured issuer over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HTTP client or keyring
    /// cannot be built.
    pub fn from_config(config: AuthConfig) -> Result<Self> {
        let client = HttpOidcClient::new(&config)?;
        Self::new(config, Arc::new(client))
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.flow.set_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Replace the function producing login state.
    pub fn with_login_state<F>(mut self, login_state: F) -> Self
    where
        F: Fn(&LoginOptions) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.flow.set_login_state(Arc::new(login_state));
        self
    }

    /// Install a hook that may rewrite the session after a callback.
    pub fn with_after_callback(mut self, hook: Arc<dyn AfterCallback>) -> Self {
        self.flow.set_after_callback(hook);
        self
    }

    /// Install a hook that may rewrite the session after a refresh.
    pub fn with_after_refresh(mut self, hook: Arc<dyn AfterRefresh>) -> Self {
        self.flow.set_after_refresh(hook);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// A fresh session cache for one request.
    pub fn session_cache(&self, cookies: RequestCookies) -> SessionCache {
        SessionCache::new(
            self.codec.clone(),
            self.clock.clone(),
            self.config.session.expiry_policy(),
            cookies,
        )
    }

    /// Start a login and return the provider URL to redirect to.
    ///
    /// # Errors
    ///
    /// See [`FlowController::login`].
    pub async fn login(&self, options: LoginOptions, response: &mut ResponseCookies) -> Result<Url> {
        self.flow.login(options, response).await
    }

    /// Complete a login.
    ///
    /// # Errors
    ///
    /// See [`FlowController::callback`].
    pub async fn callback(
        &self,
        cache: &mut SessionCache,
        params: CallbackParams,
        response: &mut ResponseCookies,
    ) -> Result<CallbackOutcome> {
        self.flow
            .callback(cache, params, response)
            .await
            .inspect_err(|e| {
                if e.is_security_relevant() {
                    tracing::warn!(error = %e, code = e.error_code(), "callback rejected");
                } else {
                    tracing::info!(error = %e, code = e.error_code(), "callback failed");
                }
            })
    }

    /// End the session and return where to redirect.
    ///
    /// # Errors
    ///
    /// See [`FlowController::logout`].
    pub async fn logout(
        &self,
        cache: &mut SessionCache,
        options: LogoutOptions,
        response: &mut ResponseCookies,
    ) -> Result<Url> {
        self.flow.logout(cache, options, response).await
    }

    /// The current session, if any.
    pub fn get_session(&self, cache: &mut SessionCache) -> Option<Session> {
        cache.get().cloned()
    }

    /// The current access token, refreshed as needed.
    ///
    /// # Errors
    ///
    /// See [`FlowController::get_access_token`].
    pub async fn get_access_token(
        &self,
        cache: &mut SessionCache,
        options: AccessTokenOptions,
        response: &mut ResponseCookies,
    ) -> Result<AccessToken> {
        self.flow.get_access_token(cache, options, response).await
    }

    /// The current session or [`AuthError::Unauthorized`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] without a valid session.
    pub fn require_session(&self, cache: &mut SessionCache) -> Result<Session> {
        cache.get().cloned().ok_or(AuthError::Unauthorized)
    }

    /// Run `handler` only when a valid session is present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] without a valid session, otherwise
    /// whatever `handler` returns.
    pub async fn with_auth_required<F, Fut, T>(&self, cache: &mut SessionCache, handler: F) -> Result<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.require_session(cache)?;
        handler(session).await
    }

    /// Run `handler` with the session if there is one.
    pub async fn with_auth_optional<F, Fut, T>(&self, cache: &mut SessionCache, handler: F) -> T
    where
        F: FnOnce(Option<Session>) -> Fut,
        Fut: Future<Output = T>,
    {
        handler(cache.get().cloned()).await
    }
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("issuer", &self.config.issuer_base_url.as_str())
            .field("codec", &self.codec)
            .field("flow", &self.flow)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
