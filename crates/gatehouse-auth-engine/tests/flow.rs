//! Login, callback, logout and access-token scenarios against a mock
//! provider.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{BrowserJar, CLIENT_ID, MockOidc, T0, test_config};
use gatehouse_auth_engine::config::{ConfigLayer, ResponseMode};
use gatehouse_auth_engine::cookies::ResponseCookies;
use gatehouse_auth_engine::{
    AccessTokenOptions, AfterCallback, AfterRefresh, AuthError, AuthManager, CallbackParams,
    LoginOptions, LogoutOptions, ManualClock, Session,
};
use serde_json::{Map, Value};
use url::Url;

struct Harness {
    manager: AuthManager,
    provider: Arc<MockOidc>,
    clock: Arc<ManualClock>,
    jar: BrowserJar,
}

impl Harness {
    fn new(overrides: ConfigLayer) -> Self {
        let provider = Arc::new(MockOidc::new());
        let clock = Arc::new(ManualClock::new(T0));
        let manager = AuthManager::new(test_config(overrides), provider.clone())
            .unwrap()
            .with_clock(clock.clone());
        Self {
            manager,
            provider,
            clock,
            jar: BrowserJar::new(),
        }
    }

    async fn login(&mut self, return_to: Option<&str>) -> Url {
        let mut response = ResponseCookies::new();
        let url = self
            .manager
            .login(
                LoginOptions {
                    return_to: return_to.map(String::from),
                    ..Default::default()
                },
                &mut response,
            )
            .await
            .unwrap();
        self.jar.apply(&response);
        url
    }

    async fn callback(&mut self, params: CallbackParams) -> Result<String, AuthError> {
        let mut cache = self.manager.session_cache(self.jar.request());
        let mut response = ResponseCookies::new();
        let result = self.manager.callback(&mut cache, params, &mut response).await;
        self.jar.apply(&response);
        result.map(|outcome| outcome.return_to)
    }

    async fn sign_in(&mut self) {
        let url = self.login(Some("/dashboard")).await;
        let (code, state) = self.provider.authorize(&url);
        self.callback(CallbackParams {
            code: Some(code),
            state: Some(state),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    fn session(&self) -> Option<Session> {
        let mut cache = self.manager.session_cache(self.jar.request());
        self.manager.get_session(&mut cache)
    }

    async fn access_token(
        &mut self,
        options: AccessTokenOptions,
    ) -> Result<gatehouse_auth_engine::AccessToken, AuthError> {
        let mut cache = self.manager.session_cache(self.jar.request());
        let mut response = ResponseCookies::new();
        let result = self
            .manager
            .get_access_token(&mut cache, options, &mut response)
            .await;
        self.jar.apply(&response);
        result
    }

    async fn logout(&mut self, options: LogoutOptions) -> Url {
        let mut cache = self.manager.session_cache(self.jar.request());
        let mut response = ResponseCookies::new();
        let url = self
            .manager
            .logout(&mut cache, options, &mut response)
            .await
            .unwrap();
        self.jar.apply(&response);
        url
    }
}

fn query(url: &Url) -> std::collections::HashMap<String, String> {
    url.query_pairs().into_owned().collect()
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_builds_authorization_url_and_stashes_state() {
    let mut h = Harness::new(ConfigLayer {
        audience: Some("https://api.example.com".into()),
        ..Default::default()
    });
    let url = h.login(Some("/dashboard")).await;

    assert!(url.as_str().starts_with("https://idp.example.com/authorize?"));
    let q = query(&url);
    assert_eq!(q["client_id"], CLIENT_ID);
    assert_eq!(q["response_type"], "code");
    assert_eq!(q["scope"], "openid profile email");
    assert_eq!(q["redirect_uri"], "https://app.example.com/api/auth/callback");
    assert_eq!(q["audience"], "https://api.example.com");
    assert_eq!(q["code_challenge_method"], "S256");
    assert!(q.contains_key("code_challenge"));
    assert!(q.contains_key("nonce"));

    let names = h.jar.names();
    for expected in ["auth_state", "auth_nonce", "auth_code_verifier"] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}

#[tokio::test]
async fn caller_authorization_params_override_config() {
    let mut h = Harness::new(ConfigLayer {
        authorization_params: Some([("prompt".to_string(), "login".to_string())].into()),
        ..Default::default()
    });
    let mut response = ResponseCookies::new();
    let url = h
        .manager
        .login(
            LoginOptions {
                return_to: None,
                authorization_params: [
                    ("prompt".to_string(), "consent".to_string()),
                    ("scope".to_string(), "openid offline_access".to_string()),
                    ("max_age".to_string(), "600".to_string()),
                ]
                .into(),
            },
            &mut response,
        )
        .await
        .unwrap();
    h.jar.apply(&response);

    let q = query(&url);
    assert_eq!(q["prompt"], "consent");
    assert_eq!(q["scope"], "openid offline_access");
    assert_eq!(q["max_age"], "600");
    assert!(h.jar.get("auth_max_age").is_some());
}

#[tokio::test]
async fn form_post_login_writes_legacy_transient_cookies() {
    let mut h = Harness::new(ConfigLayer {
        response_mode: Some(ResponseMode::FormPost),
        ..Default::default()
    });
    let url = h.login(None).await;
    assert_eq!(query(&url)["response_mode"], "form_post");
    assert!(h.jar.get("_auth_state").is_some());

    // Browsers that drop the SameSite=None cookie still carry the twin.
    h.jar.remove("auth_state");
    h.jar.remove("auth_nonce");
    h.jar.remove("auth_code_verifier");
    let (code, state) = h.provider.authorize(&url);
    let result = h
        .callback(CallbackParams {
            code: Some(code),
            state: Some(state),
            ..Default::default()
        })
        .await;
    assert!(result.is_ok(), "{result:?}");
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_callback_establishes_filtered_session() {
    let mut h = Harness::new(ConfigLayer::default());
    let url = h.login(Some("/dashboard")).await;
    let (code, state) = h.provider.authorize(&url);

    let return_to = h
        .callback(CallbackParams {
            code: Some(code),
            state: Some(state),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(return_to, "/dashboard");

    // Transient cookies are gone, the session cookie is set.
    assert!(h.jar.names().iter().all(|n| !n.starts_with("auth_")));
    assert!(h.jar.get("appSession").is_some());

    let session = h.session().expect("session established");
    assert_eq!(session.claims.subject(), Some("auth0|user-1"));
    assert_eq!(session.claims.email(), Some("ada@example.com"));
    for filtered in ["aud", "iss", "iat", "exp", "nonce", "azp"] {
        assert!(!session.claims.contains(filtered), "{filtered} kept");
    }
    assert_eq!(session.access_token.as_deref(), Some("access-1"));
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(session.expires_at, Some(T0 + 3600));
    assert_eq!(session.created_at, T0);
}

#[tokio::test]
async fn state_mismatch_fails_closed() {
    let mut h = Harness::new(ConfigLayer::default());
    let url = h.login(None).await;
    let (code, _) = h.provider.authorize(&url);

    let err = h
        .callback(CallbackParams {
            code: Some(code),
            state: Some("forged".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::CsrfStateMismatch));
    assert_eq!(err.public_message(), "authentication failed, please sign in again");
    assert!(h.session().is_none());
    assert_eq!(h.provider.exchange_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn replayed_callback_fails_as_missing_state() {
    let mut h = Harness::new(ConfigLayer::default());
    let url = h.login(None).await;
    let (code, state) = h.provider.authorize(&url);
    let params = CallbackParams {
        code: Some(code),
        state: Some(state),
        ..Default::default()
    };

    h.callback(params.clone()).await.unwrap();
    let err = h.callback(params).await.unwrap_err();
    assert!(matches!(err, AuthError::TransientStateMissing { ref key } if key == "state"));
}

#[tokio::test]
async fn expired_transient_state_fails_closed() {
    let mut h = Harness::new(ConfigLayer::default());
    let url = h.login(None).await;
    let (code, state) = h.provider.authorize(&url);

    h.clock.advance(3601);
    let err = h
        .callback(CallbackParams {
            code: Some(code),
            state: Some(state),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TransientStateMissing { .. }));
}

#[tokio::test]
async fn provider_error_is_surfaced() {
    let mut h = Harness::new(ConfigLayer::default());
    let url = h.login(None).await;
    let (_, state) = h.provider.authorize(&url);
    let err = h
        .callback(CallbackParams {
            state: Some(state),
            error: Some("access_denied".into()),
            error_description: Some("user cancelled".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::IdentityProvider { .. }));
    assert_eq!(err.public_message(), "access_denied: user cancelled");
    // Transient cookies are consumed even on failure.
    assert!(h.jar.names().is_empty());
}

#[tokio::test]
async fn provider_error_without_matching_state_is_a_state_mismatch() {
    let mut h = Harness::new(ConfigLayer::default());
    h.login(None).await;
    let err = h
        .callback(CallbackParams {
            state: Some("cross-site".into()),
            error: Some("access_denied".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::CsrfStateMismatch), "{err:?}");
}

#[tokio::test]
async fn id_token_max_age_uses_the_manager_clock() {
    let mut h = Harness::new(ConfigLayer::default());
    h.clock.advance(42);
    h.sign_in().await;
    let checks = h.provider.last_checks.lock().unwrap().clone().unwrap();
    assert_eq!(checks.now, T0 + 42);
}

#[tokio::test]
async fn missing_code_is_invalid_callback() {
    let mut h = Harness::new(ConfigLayer::default());
    let url = h.login(None).await;
    let (_, state) = h.provider.authorize(&url);
    let err = h
        .callback(CallbackParams {
            state: Some(state),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCallback { .. }));
}

#[tokio::test]
async fn organization_mismatch_fails_closed() {
    let mut h = Harness::new(ConfigLayer {
        organization: Some("org_expected".into()),
        ..Default::default()
    });
    h.provider.user.lock().unwrap().insert("org_id", "org_other");

    let url = h.login(None).await;
    assert_eq!(query(&url)["organization"], "org_expected");
    let (code, state) = h.provider.authorize(&url);
    let err = h
        .callback(CallbackParams {
            code: Some(code),
            state: Some(state),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ClaimValidationFailure { .. }));
    assert!(h.session().is_none());
}

#[tokio::test]
async fn matching_organization_is_accepted() {
    let mut h = Harness::new(ConfigLayer {
        organization: Some("org_expected".into()),
        ..Default::default()
    });
    h.provider.user.lock().unwrap().insert("org_id", "org_expected");
    h.sign_in().await;
    assert_eq!(
        h.session().unwrap().claims.organization_id(),
        Some("org_expected")
    );
}

#[tokio::test]
async fn off_site_return_to_falls_back_to_base_url() {
    let mut h = Harness::new(ConfigLayer::default());
    let url = h.login(Some("https://evil.example.net/phish")).await;
    let (code, state) = h.provider.authorize(&url);
    let return_to = h
        .callback(CallbackParams {
            code: Some(code),
            state: Some(state),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(return_to, "https://app.example.com/");
}

#[tokio::test]
async fn protocol_relative_return_to_is_rejected() {
    let mut h = Harness::new(ConfigLayer::default());
    let base = h.manager.config().base_url.to_string();
    let url = h.login(Some("//evil.example.net")).await;
    let (code, state) = h.provider.authorize(&url);
    let return_to = h
        .callback(CallbackParams {
            code: Some(code),
            state: Some(state),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(return_to, base);
}

#[tokio::test]
async fn return_to_with_control_characters_or_backslash_is_rejected() {
    let base = "https://app.example.com/";
    for target in [
        "/\t/evil.example.net",
        "/\n/evil.example.net",
        "/\r/evil.example.net",
        "/\\evil.example.net",
        "/\t\\evil.example.net",
        "/dash\u{0}board",
    ] {
        let mut h = Harness::new(ConfigLayer::default());
        let url = h.login(Some(target)).await;
        let (code, state) = h.provider.authorize(&url);
        let return_to = h
            .callback(CallbackParams {
                code: Some(code),
                state: Some(state),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(return_to, base, "{target:?}");
    }
}

#[tokio::test]
async fn relative_and_same_origin_return_to_are_kept() {
    for target in ["/reports?tab=2#top", "https://app.example.com/settings"] {
        let mut h = Harness::new(ConfigLayer::default());
        let url = h.login(Some(target)).await;
        let (code, state) = h.provider.authorize(&url);
        let return_to = h
            .callback(CallbackParams {
                code: Some(code),
                state: Some(state),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(return_to, target);
    }
}

struct TagRoles;

#[async_trait]
impl AfterCallback for TagRoles {
    async fn after_callback(
        &self,
        mut session: Session,
        state: &Map<String, Value>,
    ) -> gatehouse_auth_engine::Result<Session> {
        session.claims.insert("roles", vec!["admin"]);
        if let Some(plan) = state.get("plan") {
            session.claims.insert("plan", plan.clone());
        }
        Ok(session)
    }
}

#[tokio::test]
async fn custom_login_state_and_after_callback_hook() {
    let provider = Arc::new(MockOidc::new());
    let clock = Arc::new(ManualClock::new(T0));
    let manager = AuthManager::new(test_config(ConfigLayer::default()), provider.clone())
        .unwrap()
        .with_clock(clock.clone())
        .with_login_state(|options| {
            let mut state = Map::new();
            state.insert("plan".into(), Value::String("pro".into()));
            if let Some(target) = &options.return_to {
                state.insert("returnTo".into(), Value::String(target.clone()));
            }
            state
        })
        .with_after_callback(Arc::new(TagRoles));
    let mut h = Harness {
        manager,
        provider,
        clock,
        jar: BrowserJar::new(),
    };

    h.sign_in().await;
    let session = h.session().unwrap();
    assert_eq!(session.claims.get("plan"), Some(&Value::String("pro".into())));
    assert!(session.claims.contains("roles"));
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_without_idp_logout_returns_post_logout_url() {
    let mut h = Harness::new(ConfigLayer::default());
    h.sign_in().await;
    let url = h.logout(LogoutOptions::default()).await;
    assert_eq!(url.as_str(), "https://app.example.com/");
    assert!(h.session().is_none());
    assert!(h.jar.get("appSession").is_none());
}

#[tokio::test]
async fn v2_logout_url_shape() {
    let mut h = Harness::new(ConfigLayer {
        idp_logout: Some(true),
        v2_logout: Some(true),
        ..Default::default()
    });
    h.sign_in().await;
    let url = h.logout(LogoutOptions::default()).await;

    assert_eq!(url.scheme(), "https");
    assert_eq!(url.host_str(), Some("idp.example.com"));
    assert_eq!(url.path(), "/v2/logout");
    let q = query(&url);
    assert_eq!(q["returnTo"], "https://app.example.com/");
    assert_eq!(q["client_id"], CLIENT_ID);
    assert!(h.session().is_none());
}

#[tokio::test]
async fn end_session_logout_carries_id_token_hint() {
    let mut h = Harness::new(ConfigLayer {
        idp_logout: Some(true),
        post_logout_redirect: Some("/goodbye".into()),
        ..Default::default()
    });
    h.sign_in().await;
    let id_token = h.session().unwrap().id_token.unwrap();
    let url = h.logout(LogoutOptions::default()).await;

    assert!(url.as_str().starts_with("https://idp.example.com/oidc/logout?"));
    let q = query(&url);
    assert_eq!(q["id_token_hint"], id_token);
    assert_eq!(q["post_logout_redirect_uri"], "https://app.example.com/goodbye");
}

#[tokio::test]
async fn idp_without_end_session_falls_back() {
    let mut provider = MockOidc::new();
    provider.metadata.end_session_endpoint = None;
    let provider = Arc::new(provider);
    let clock = Arc::new(ManualClock::new(T0));
    let manager = AuthManager::new(
        test_config(ConfigLayer {
            idp_logout: Some(true),
            ..Default::default()
        }),
        provider.clone(),
    )
    .unwrap()
    .with_clock(clock.clone());
    let mut h = Harness {
        manager,
        provider,
        clock,
        jar: BrowserJar::new(),
    };
    h.sign_in().await;
    let url = h.logout(LogoutOptions::default()).await;
    assert_eq!(url.as_str(), "https://app.example.com/");
}

#[tokio::test]
async fn logout_return_to_override_is_guarded() {
    let mut h = Harness::new(ConfigLayer::default());
    h.sign_in().await;
    let url = h
        .logout(LogoutOptions {
            return_to: Some("/see-you".into()),
        })
        .await;
    assert_eq!(url.as_str(), "https://app.example.com/see-you");

    h.sign_in().await;
    let url = h
        .logout(LogoutOptions {
            return_to: Some("https://evil.example.net".into()),
        })
        .await;
    assert_eq!(url.as_str(), "https://app.example.com/");
}

// ---------------------------------------------------------------------------
// Access tokens
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_token_is_returned_without_refresh() {
    let mut h = Harness::new(ConfigLayer::default());
    h.sign_in().await;
    let token = h.access_token(AccessTokenOptions::default()).await.unwrap();
    assert_eq!(token.access_token, "access-1");
    assert_eq!(h.provider.refreshes(), 0);
}

#[tokio::test]
async fn expired_token_refreshes_exactly_once() {
    let mut h = Harness::new(ConfigLayer::default());
    h.sign_in().await;

    // expires_at = now - 1
    h.clock.set(T0 + 3601);
    let token = h.access_token(AccessTokenOptions::default()).await.unwrap();
    assert_eq!(token.access_token, "access-2");
    assert_eq!(token.expires_at, Some(T0 + 3601 + 3600));
    assert_eq!(h.provider.refreshes(), 1);

    // The refreshed token is persisted in the cookie.
    let session = h.session().unwrap();
    assert_eq!(session.access_token.as_deref(), Some("access-2"));
    assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(session.created_at, T0);

    h.access_token(AccessTokenOptions::default()).await.unwrap();
    assert_eq!(h.provider.refreshes(), 1);
}

#[tokio::test]
async fn token_within_clock_tolerance_counts_as_expired() {
    let mut h = Harness::new(ConfigLayer::default());
    h.sign_in().await;
    h.clock.set(T0 + 3600 - 30);
    h.access_token(AccessTokenOptions::default()).await.unwrap();
    assert_eq!(h.provider.refreshes(), 1);
}

#[tokio::test]
async fn expired_token_without_refresh_token_makes_no_network_call() {
    let mut h = Harness::new(ConfigLayer::default());
    h.provider.exchange_tokens.lock().unwrap().refresh_token = None;
    h.sign_in().await;

    let calls_before = h.provider.network_calls();
    h.clock.set(T0 + 3601);
    let err = h
        .access_token(AccessTokenOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired));
    assert_eq!(h.provider.network_calls(), calls_before);
}

#[tokio::test]
async fn refresh_rotates_refresh_token() {
    let mut h = Harness::new(ConfigLayer::default());
    h.provider.refresh_tokens.lock().unwrap().refresh_token = Some("refresh-2".into());
    h.sign_in().await;

    h.access_token(AccessTokenOptions {
        refresh: true,
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(h.session().unwrap().refresh_token.as_deref(), Some("refresh-2"));
}

#[tokio::test]
async fn missing_scope_forces_refresh_with_union() {
    let mut h = Harness::new(ConfigLayer::default());
    h.sign_in().await;

    let token = h
        .access_token(AccessTokenOptions {
            scopes: vec!["read:reports".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(h.provider.refreshes(), 1);
    assert_eq!(
        h.provider.last_refresh_scope.lock().unwrap().as_deref(),
        Some("openid profile email read:reports")
    );
    assert_eq!(
        token.scope.as_deref(),
        Some("openid profile email read:reports")
    );
}

#[tokio::test]
async fn missing_scope_without_refresh_token_is_insufficient_scope() {
    let mut h = Harness::new(ConfigLayer::default());
    h.provider.exchange_tokens.lock().unwrap().refresh_token = None;
    h.sign_in().await;

    let err = h
        .access_token(AccessTokenOptions {
            scopes: vec!["read:reports".into()],
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InsufficientScope { ref required } if required == "read:reports"));
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn forced_refresh_without_refresh_token() {
    let mut h = Harness::new(ConfigLayer::default());
    h.provider.exchange_tokens.lock().unwrap().refresh_token = None;
    h.sign_in().await;
    let err = h
        .access_token(AccessTokenOptions {
            refresh: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingRefreshToken));
}

#[tokio::test]
async fn no_session_is_unauthorized() {
    let mut h = Harness::new(ConfigLayer::default());
    let err = h
        .access_token(AccessTokenOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Unauthorized));
}

#[tokio::test]
async fn refresh_failure_surfaces_provider_status() {
    let mut h = Harness::new(ConfigLayer::default());
    h.sign_in().await;
    *h.provider.refresh_error.lock().unwrap() = Some((400, "invalid_grant".into()));
    h.clock.set(T0 + 3601);

    let err = h
        .access_token(AccessTokenOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), "provider returned 400: invalid_grant");
    assert!(!err.is_retryable());
    // The old session is left untouched.
    assert_eq!(h.session().unwrap().access_token.as_deref(), Some("access-1"));
}

struct StampRefresh;

#[async_trait]
impl AfterRefresh for StampRefresh {
    async fn after_refresh(&self, mut session: Session) -> gatehouse_auth_engine::Result<Session> {
        session.claims.insert("refreshed", true);
        Ok(session)
    }
}

#[tokio::test]
async fn after_refresh_hook_runs_before_persisting() {
    let provider = Arc::new(MockOidc::new());
    let clock = Arc::new(ManualClock::new(T0));
    let manager = AuthManager::new(test_config(ConfigLayer::default()), provider.clone())
        .unwrap()
        .with_clock(clock.clone())
        .with_after_refresh(Arc::new(StampRefresh));
    let mut h = Harness {
        manager,
        provider,
        clock,
        jar: BrowserJar::new(),
    };
    h.sign_in().await;
    h.clock.set(T0 + 3601);
    h.access_token(AccessTokenOptions::default()).await.unwrap();
    assert_eq!(h.session().unwrap().claims.get("refreshed"), Some(&Value::Bool(true)));
}
