//! Layered configuration.
//!
//! Configuration is resolved once at startup into an immutable
//! [`AuthConfig`]. Sources are applied field by field in this order, later
//! layers winning:
//!
//! 1. built-in defaults,
//! 2. environment variables (`GATEHOUSE_*`, see [`ConfigLayer::from_env`]),
//! 3. explicit overrides (a TOML file or a programmatic [`ConfigLayer`]).
//!
//! Validation happens in [`AuthConfig::from_layer`]; a missing secret,
//! issuer, base URL or client id is a fatal [`AuthError::Configuration`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::claims::DEFAULT_IDENTITY_CLAIM_FILTER;
use crate::error::{AuthError, Result};
use crate::session::ExpiryPolicy;

/// Prefix shared by every environment variable the engine reads.
pub const ENV_PREFIX: &str = "GATEHOUSE_";

const DEFAULT_SCOPE: &str = "openid profile email";
const DEFAULT_RESPONSE_TYPE: &str = "code";
const DEFAULT_CALLBACK: &str = "/api/auth/callback";
const DEFAULT_SESSION_NAME: &str = "appSession";
const DEFAULT_ROLLING_DURATION: i64 = 24 * 60 * 60;
const DEFAULT_ABSOLUTE_DURATION: i64 = 7 * 24 * 60 * 60;
const DEFAULT_CLOCK_TOLERANCE: i64 = 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_TRANSACTION_MAX_AGE: i64 = 60 * 60;

// ---------------------------------------------------------------------------
// Small value types
// ---------------------------------------------------------------------------

/// A secret string whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    Strict,
    Lax,
    None,
}

impl FromStr for SameSitePolicy {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            other => Err(AuthError::Configuration {
                reason: format!("unknown SameSite value: {other}"),
            }),
        }
    }
}

impl From<SameSitePolicy> for cookie::SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Strict => cookie::SameSite::Strict,
            SameSitePolicy::Lax => cookie::SameSite::Lax,
            SameSitePolicy::None => cookie::SameSite::None,
        }
    }
}

/// How the identity provider returns the authorization response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Query,
    FormPost,
}

impl ResponseMode {
    /// Wire value of the `response_mode` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::FormPost => "form_post",
        }
    }
}

impl FromStr for ResponseMode {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "query" => Ok(Self::Query),
            "form_post" => Ok(Self::FormPost),
            other => Err(AuthError::Configuration {
                reason: format!("unsupported response_mode: {other}"),
            }),
        }
    }
}

/// Absolute session duration as it appears in a layer: a number of
/// seconds, or `false` to disable the cap (`true` keeps the default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AbsoluteDurationSetting {
    Seconds(i64),
    Enabled(bool),
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Session cookie attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    pub domain: Option<String>,
    pub path: String,
    /// Browser-session cookie: no `Max-Age`, dropped when the browser closes.
    pub transient: bool,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSitePolicy,
}

/// Session lifetime and cookie settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Cookie name; chunks are named `<name>.<index>`.
    pub name: String,
    pub rolling: bool,
    /// Seconds of inactivity after which a rolling session expires.
    pub rolling_duration: i64,
    /// Seconds from creation after which the session always expires.
    /// `None` disables the cap.
    pub absolute_duration: Option<i64>,
    pub cookie: CookieConfig,
}

impl SessionConfig {
    /// The expiry policy these settings describe.
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        if self.rolling {
            ExpiryPolicy::Rolling {
                duration: self.rolling_duration,
                absolute: self.absolute_duration,
            }
        } else {
            // Validation guarantees an absolute duration when not rolling.
            ExpiryPolicy::Absolute {
                duration: self.absolute_duration.unwrap_or(DEFAULT_ABSOLUTE_DURATION),
            }
        }
    }
}

/// Parameters sent to the authorization endpoint on every login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationConfig {
    pub response_type: String,
    pub response_mode: Option<ResponseMode>,
    pub scope: String,
    pub audience: Option<String>,
    /// Additional custom parameters.
    pub extra: BTreeMap<String, String>,
}

/// Validated, immutable engine configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Operator secrets, newest first.
    pub secrets: Vec<Secret>,
    pub issuer_base_url: Url,
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: Option<Secret>,
    /// Allowed clock skew in seconds for token and ID-token checks.
    pub clock_tolerance: i64,
    pub http_timeout: Duration,
    /// Redirect to the identity provider's logout endpoint on logout.
    pub idp_logout: bool,
    /// Use the `<issuer>/v2/logout?returnTo=…&client_id=…` logout shape
    /// instead of the discovered `end_session_endpoint`.
    pub v2_logout: bool,
    pub id_token_signing_alg: Algorithm,
    /// Write a `SameSite`-less twin of `SameSite=None` transient cookies.
    pub legacy_same_site_cookie: bool,
    pub identity_claim_filter: Vec<String>,
    /// Required `org_id` claim, when set.
    pub organization: Option<String>,
    pub use_pkce: bool,
    pub authorization: AuthorizationConfig,
    /// Path of the callback route, joined onto `base_url`.
    pub callback_path: String,
    pub post_logout_redirect: Url,
    pub session: SessionConfig,
    /// Lifetime of transient login cookies, in seconds.
    pub transaction_max_age: i64,
}

impl AuthConfig {
    /// Resolve defaults → environment → `overrides` and validate.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] for unparsable environment values
    /// or a configuration that fails validation.
    pub fn load(overrides: ConfigLayer) -> Result<Self> {
        let layer = ConfigLayer::from_env()?.merge(overrides);
        Self::from_layer(layer)
    }

    /// Apply defaults to `layer` and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] describing the first problem
    /// found.
    pub fn from_layer(layer: ConfigLayer) -> Result<Self> {
        let secrets: Vec<Secret> = layer
            .secrets
            .unwrap_or_default()
            .into_iter()
            .filter(|s| !s.expose().trim().is_empty())
            .collect();
        if secrets.is_empty() {
            return Err(config_error("a secret is required (GATEHOUSE_SECRET)"));
        }
        for (index, secret) in secrets.iter().enumerate() {
            if secret.expose().len() < gatehouse_vault::MIN_SECRET_LEN {
                return Err(config_error(format!(
                    "secret #{index} must be at least {} characters",
                    gatehouse_vault::MIN_SECRET_LEN
                )));
            }
        }

        let issuer_base_url = required_url(layer.issuer_base_url, "issuer_base_url")?;
        let base_url = required_url(layer.base_url, "base_url")?;

        let client_id = layer
            .client_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| config_error("client_id is required (GATEHOUSE_CLIENT_ID)"))?;
        let client_secret = layer.client_secret.filter(|s| !s.expose().is_empty());

        let clock_tolerance = layer.clock_tolerance.unwrap_or(DEFAULT_CLOCK_TOLERANCE);
        if clock_tolerance < 0 {
            return Err(config_error("clock_tolerance must not be negative"));
        }

        let http_timeout_secs = layer.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        if http_timeout_secs == 0 {
            return Err(config_error("http_timeout must be greater than zero"));
        }

        let id_token_signing_alg = match layer.id_token_signing_alg.as_deref() {
            None => Algorithm::RS256,
            Some(alg) if alg.eq_ignore_ascii_case("none") => {
                return Err(config_error("id_token_signing_alg must not be \"none\""));
            }
            Some(alg) => Algorithm::from_str(alg)
                .map_err(|_| config_error(format!("unsupported id_token_signing_alg: {alg}")))?,
        };
        if matches!(
            id_token_signing_alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) && client_secret.is_none()
        {
            return Err(config_error(
                "symmetric id_token_signing_alg requires a client_secret",
            ));
        }

        let response_type = layer
            .response_type
            .unwrap_or_else(|| DEFAULT_RESPONSE_TYPE.to_string());
        if !response_type.split_whitespace().any(|part| part == "code") {
            return Err(config_error(format!(
                "response_type must include \"code\", got \"{response_type}\""
            )));
        }

        let authorization = AuthorizationConfig {
            response_type,
            response_mode: layer.response_mode,
            scope: layer.scope.unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            audience: layer.audience.filter(|a| !a.is_empty()),
            extra: layer.authorization_params.unwrap_or_default(),
        };

        let rolling = layer.session_rolling.unwrap_or(true);
        let rolling_duration = layer
            .session_rolling_duration
            .unwrap_or(DEFAULT_ROLLING_DURATION);
        let absolute_duration = match layer.session_absolute_duration {
            None | Some(AbsoluteDurationSetting::Enabled(true)) => Some(DEFAULT_ABSOLUTE_DURATION),
            Some(AbsoluteDurationSetting::Enabled(false)) => None,
            Some(AbsoluteDurationSetting::Seconds(secs)) => Some(secs),
        };
        if rolling && rolling_duration <= 0 {
            return Err(config_error("session rolling_duration must be positive"));
        }
        match absolute_duration {
            Some(secs) if secs <= 0 => {
                return Err(config_error("session absolute_duration must be positive"));
            }
            None if !rolling => {
                return Err(config_error(
                    "session absolute_duration must be set when rolling is disabled",
                ));
            }
            _ => {}
        }

        let secure_default = base_url.scheme() == "https";
        let cookie = CookieConfig {
            domain: layer.cookie_domain.filter(|d| !d.is_empty()),
            path: layer.cookie_path.unwrap_or_else(|| "/".to_string()),
            transient: layer.cookie_transient.unwrap_or(false),
            http_only: layer.cookie_http_only.unwrap_or(true),
            secure: layer.cookie_secure.unwrap_or(secure_default),
            same_site: layer.cookie_same_site.unwrap_or(SameSitePolicy::Lax),
        };
        if cookie.same_site == SameSitePolicy::None && !cookie.secure {
            return Err(config_error("SameSite=None cookies must be secure"));
        }
        if authorization.response_mode == Some(ResponseMode::FormPost) && !cookie.secure {
            return Err(config_error(
                "response_mode form_post requires secure cookies (SameSite=None)",
            ));
        }

        let session = SessionConfig {
            name: layer
                .session_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string()),
            rolling,
            rolling_duration,
            absolute_duration,
            cookie,
        };

        let callback_path = layer
            .callback
            .unwrap_or_else(|| DEFAULT_CALLBACK.to_string());
        let post_logout_redirect = match layer.post_logout_redirect.as_deref() {
            None | Some("") => base_url.clone(),
            Some(target) => match Url::parse(target) {
                Ok(url) => url,
                Err(url::ParseError::RelativeUrlWithoutBase) => join_path(&base_url, target)?,
                Err(e) => {
                    return Err(config_error(format!("invalid post_logout_redirect: {e}")));
                }
            },
        };

        let transaction_max_age = layer
            .transaction_max_age
            .unwrap_or(DEFAULT_TRANSACTION_MAX_AGE);
        if transaction_max_age <= 0 {
            return Err(config_error("transaction_max_age must be positive"));
        }

        let identity_claim_filter = layer.identity_claim_filter.unwrap_or_else(|| {
            DEFAULT_IDENTITY_CLAIM_FILTER
                .iter()
                .map(|s| s.to_string())
                .collect()
        });

        let config = Self {
            secrets,
            issuer_base_url,
            base_url,
            client_id,
            client_secret,
            clock_tolerance,
            http_timeout: Duration::from_secs(http_timeout_secs),
            idp_logout: layer.idp_logout.unwrap_or(false),
            v2_logout: layer.v2_logout.unwrap_or(false),
            id_token_signing_alg,
            legacy_same_site_cookie: layer.legacy_same_site_cookie.unwrap_or(true),
            identity_claim_filter,
            organization: layer.organization.filter(|o| !o.is_empty()),
            use_pkce: layer.use_pkce.unwrap_or(true),
            authorization,
            callback_path,
            post_logout_redirect,
            session,
            transaction_max_age,
        };

        tracing::debug!(
            issuer = %config.issuer_base_url,
            base_url = %config.base_url,
            secrets = config.secrets.len(),
            rolling = config.session.rolling,
            "auth configuration resolved"
        );

        Ok(config)
    }

    /// Absolute callback URL sent as `redirect_uri`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UrlParse`] if the joined URL is invalid.
    pub fn redirect_uri(&self) -> Result<Url> {
        join_path(&self.base_url, &self.callback_path)
    }

    /// Transient cookies use `SameSite=None` only for `form_post` responses.
    pub fn transient_same_site(&self) -> SameSitePolicy {
        match self.authorization.response_mode {
            Some(ResponseMode::FormPost) => SameSitePolicy::None,
            _ => SameSitePolicy::Lax,
        }
    }
}

/// Join `path` onto `base`, keeping any path prefix of `base`.
fn join_path(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}

fn config_error(reason: impl Into<String>) -> AuthError {
    AuthError::Configuration {
        reason: reason.into(),
    }
}

fn required_url(value: Option<String>, field: &str) -> Result<Url> {
    let raw = value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| config_error(format!("{field} is required")))?;
    let url = Url::parse(&raw).map_err(|e| config_error(format!("invalid {field}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(config_error(format!("{field} must be an http(s) URL")));
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

/// One configuration source. Every field is optional; unset fields fall
/// through to the layer below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub secrets: Option<Vec<Secret>>,
    pub issuer_base_url: Option<String>,
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
    pub clock_tolerance: Option<i64>,
    /// Seconds.
    pub http_timeout: Option<u64>,
    pub idp_logout: Option<bool>,
    pub v2_logout: Option<bool>,
    pub id_token_signing_alg: Option<String>,
    pub legacy_same_site_cookie: Option<bool>,
    pub identity_claim_filter: Option<Vec<String>>,
    pub organization: Option<String>,
    pub scope: Option<String>,
    pub audience: Option<String>,
    pub response_type: Option<String>,
    pub response_mode: Option<ResponseMode>,
    pub use_pkce: Option<bool>,
    pub authorization_params: Option<BTreeMap<String, String>>,
    pub callback: Option<String>,
    pub post_logout_redirect: Option<String>,
    pub session_name: Option<String>,
    pub session_rolling: Option<bool>,
    pub session_rolling_duration: Option<i64>,
    pub session_absolute_duration: Option<AbsoluteDurationSetting>,
    pub cookie_domain: Option<String>,
    pub cookie_path: Option<String>,
    pub cookie_transient: Option<bool>,
    pub cookie_http_only: Option<bool>,
    pub cookie_secure: Option<bool>,
    pub cookie_same_site: Option<SameSitePolicy>,
    pub transaction_max_age: Option<i64>,
}

macro_rules! overlay {
    ($base:ident, $top:ident; $($field:ident),+ $(,)?) => {
        $( $base.$field = $top.$field.or($base.$field); )+
    };
}

impl ConfigLayer {
    /// Read the `GATEHOUSE_*` variables of the current process.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] naming the variable that could
    /// not be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Build a layer from `(name, value)` pairs. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] naming the variable that could
    /// not be parsed.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, v)| k.starts_with(ENV_PREFIX) && !v.trim().is_empty())
            .collect();
        let env = EnvReader { vars: &vars };

        Ok(Self {
            secrets: env.string("SECRET").map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Secret::from)
                    .collect()
            }),
            issuer_base_url: env.string("ISSUER_BASE_URL"),
            base_url: env.string("BASE_URL"),
            client_id: env.string("CLIENT_ID"),
            client_secret: env.string("CLIENT_SECRET").map(Secret::from),
            clock_tolerance: env.parsed("CLOCK_TOLERANCE")?,
            http_timeout: env.parsed("HTTP_TIMEOUT")?,
            idp_logout: env.boolean("IDP_LOGOUT")?,
            v2_logout: env.boolean("V2_LOGOUT")?,
            id_token_signing_alg: env.string("ID_TOKEN_SIGNING_ALG"),
            legacy_same_site_cookie: env.boolean("LEGACY_SAME_SITE_COOKIE")?,
            identity_claim_filter: env.list("IDENTITY_CLAIM_FILTER"),
            organization: env.string("ORGANIZATION"),
            scope: env.string("SCOPE"),
            audience: env.string("AUDIENCE"),
            response_type: env.string("RESPONSE_TYPE"),
            response_mode: env.parsed("RESPONSE_MODE")?,
            use_pkce: env.boolean("USE_PKCE")?,
            authorization_params: None,
            callback: env.string("CALLBACK"),
            post_logout_redirect: env.string("POST_LOGOUT_REDIRECT"),
            session_name: env.string("SESSION_NAME"),
            session_rolling: env.boolean("SESSION_ROLLING")?,
            session_rolling_duration: env.parsed("SESSION_ROLLING_DURATION")?,
            session_absolute_duration: env.absolute_duration("SESSION_ABSOLUTE_DURATION")?,
            cookie_domain: env.string("COOKIE_DOMAIN"),
            cookie_path: env.string("COOKIE_PATH"),
            cookie_transient: env.boolean("COOKIE_TRANSIENT")?,
            cookie_http_only: env.boolean("COOKIE_HTTP_ONLY")?,
            cookie_secure: env.boolean("COOKIE_SECURE")?,
            cookie_same_site: env.parsed("COOKIE_SAME_SITE")?,
            transaction_max_age: env.parsed("TRANSACTION_MAX_AGE")?,
        })
    }

    /// Parse a TOML document into a layer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the document is not valid
    /// TOML or contains unknown keys.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("failed to parse TOML config: {e}")))
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the file cannot be read or
    /// parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Overlay `top` onto `self`; fields set in `top` win.
    pub fn merge(mut self, top: ConfigLayer) -> Self {
        overlay!(self, top;
            secrets, issuer_base_url, base_url, client_id, client_secret,
            clock_tolerance, http_timeout, idp_logout, v2_logout,
            id_token_signing_alg, legacy_same_site_cookie, identity_claim_filter,
            organization, scope, audience, response_type, response_mode, use_pkce,
            authorization_params, callback, post_logout_redirect, session_name,
            session_rolling, session_rolling_duration, session_absolute_duration,
            cookie_domain, cookie_path, cookie_transient, cookie_http_only,
            cookie_secure, cookie_same_site, transaction_max_age,
        );
        self
    }
}

/// Typed lookups over a snapshot of environment variables.
struct EnvReader<'a> {
    vars: &'a HashMap<String, String>,
}

impl EnvReader<'_> {
    fn raw(&self, suffix: &str) -> Option<(String, &str)> {
        let name = format!("{ENV_PREFIX}{suffix}");
        self.vars
            .get(&name)
            .map(|value| value.trim())
            .map(|value| (name, value))
    }

    fn string(&self, suffix: &str) -> Option<String> {
        self.raw(suffix).map(|(_, value)| value.to_string())
    }

    fn list(&self, suffix: &str) -> Option<Vec<String>> {
        self.raw(suffix).map(|(_, value)| {
            value
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
    }

    fn parsed<T: FromStr>(&self, suffix: &str) -> Result<Option<T>> {
        match self.raw(suffix) {
            None => Ok(None),
            Some((name, value)) => value
                .parse()
                .map(Some)
                .map_err(|_| config_error(format!("{name} has an invalid value: {value}"))),
        }
    }

    fn boolean(&self, suffix: &str) -> Result<Option<bool>> {
        match self.raw(suffix) {
            None => Ok(None),
            Some((name, value)) => parse_bool(value)
                .map(Some)
                .ok_or_else(|| config_error(format!("{name} must be a boolean, got {value}"))),
        }
    }

    fn absolute_duration(&self, suffix: &str) -> Result<Option<AbsoluteDurationSetting>> {
        match self.raw(suffix) {
            None => Ok(None),
            Some((name, value)) => {
                if let Some(flag) = parse_bool(value) {
                    return Ok(Some(AbsoluteDurationSetting::Enabled(flag)));
                }
                value
                    .parse()
                    .map(|secs| Some(AbsoluteDurationSetting::Seconds(secs)))
                    .map_err(|_| {
                        config_error(format!("{name} must be seconds or false, got {value}"))
                    })
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
