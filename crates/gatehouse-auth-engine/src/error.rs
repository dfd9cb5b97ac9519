//! Error types for the auth engine crate.
//!
//! All engine operations surface errors through [`AuthError`]. Each variant
//! carries enough context for operators to tell which check failed, while
//! [`AuthError::public_message`] gives the text that is safe to show a
//! browser: cryptographic and CSRF failures collapse into a generic message,
//! provider failures keep the provider's status and error code.

/// Unified error type for the Gatehouse auth engine.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // -- Initialisation -----------------------------------------------------
    /// Configuration is missing or malformed. Fatal at startup.
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// What is wrong with the configuration.
        reason: String,
    },

    // -- Session cookie -----------------------------------------------------
    /// No configured secret authenticated the session cookie.
    #[error("session cookie could not be decrypted: {reason}")]
    DecryptionFailure {
        /// Which step rejected the cookie.
        reason: String,
    },

    /// The session cookie is malformed (bad header, missing chunk, bad JSON).
    #[error("invalid session cookie: {reason}")]
    InvalidCookie {
        /// What was wrong with the cookie.
        reason: String,
    },

    /// The session cookie's lifetime has passed.
    #[error("session expired at {expired_at}")]
    SessionExpired {
        /// Epoch seconds at which the session stopped being valid.
        expired_at: i64,
    },

    // -- Login flow ---------------------------------------------------------
    /// The `state` returned by the identity provider does not match the
    /// stored value.
    #[error("state mismatch between callback and stored transaction")]
    CsrfStateMismatch,

    /// A transient login value is missing, expired or already consumed.
    #[error("transient state missing: {key}")]
    TransientStateMissing {
        /// The transient key that was expected.
        key: String,
    },

    /// The callback request itself is unusable (e.g. no authorization code).
    #[error("invalid callback: {reason}")]
    InvalidCallback {
        /// What was wrong with the callback.
        reason: String,
    },

    /// The identity provider redirected back with an `error` parameter.
    #[error("identity provider error: {error}")]
    IdentityProvider {
        /// OAuth error code (e.g. `access_denied`).
        error: String,
        /// Optional human-readable description.
        description: Option<String>,
    },

    /// The token endpoint rejected the authorization code exchange.
    #[error("token exchange failed: {error}")]
    TokenExchangeFailure {
        /// HTTP status reported by the provider, when known.
        status: Option<u16>,
        /// OAuth error code or summary.
        error: String,
        /// Optional provider description.
        description: Option<String>,
    },

    /// The token endpoint rejected a refresh grant.
    #[error("token refresh failed: {error}")]
    TokenRefreshFailure {
        /// HTTP status reported by the provider, when known.
        status: Option<u16>,
        /// OAuth error code or summary.
        error: String,
        /// Optional provider description.
        description: Option<String>,
    },

    /// The ID token or one of its claims failed validation (nonce,
    /// organization, signature, issuer, audience, max age).
    #[error("claim validation failed: {reason}")]
    ClaimValidationFailure {
        /// Which check failed.
        reason: String,
    },

    /// Provider metadata could not be discovered.
    #[error("discovery failed: {reason}")]
    Discovery {
        /// Why discovery failed.
        reason: String,
    },

    /// A call to the identity provider exceeded the configured timeout.
    #[error("{operation} timed out after {timeout_secs} seconds")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The configured timeout.
        timeout_secs: u64,
    },

    /// An HTTP request to the identity provider failed.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    // -- Access ------------------------------------------------------------
    /// No valid session is present.
    #[error("the user does not have a valid session")]
    Unauthorized,

    /// The session carries no access token.
    #[error("the session does not contain an access token")]
    MissingAccessToken,

    /// A refresh was requested but the session carries no refresh token.
    #[error("a refresh token is required but none is present")]
    MissingRefreshToken,

    /// The access token expired and no refresh token is available.
    #[error("the access token expired and a refresh token is not available")]
    TokenExpired,

    /// The access token was not issued for the requested scopes and cannot
    /// be refreshed.
    #[error("the access token does not cover scopes: {required}")]
    InsufficientScope {
        /// Space-separated scopes that were requested.
        required: String,
    },

    // -- Underlying errors --------------------------------------------------
    /// An error propagated from the vault crate.
    #[error("vault error: {0}")]
    Vault(#[from] gatehouse_vault::VaultError),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// HTTP status code a host should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized
            | Self::MissingAccessToken
            | Self::MissingRefreshToken
            | Self::TokenExpired
            | Self::SessionExpired { .. }
            | Self::DecryptionFailure { .. }
            | Self::InvalidCookie { .. } => 401,
            Self::InsufficientScope { .. } => 403,
            Self::CsrfStateMismatch
            | Self::TransientStateMissing { .. }
            | Self::InvalidCallback { .. }
            | Self::IdentityProvider { .. }
            | Self::ClaimValidationFailure { .. } => 400,
            Self::TokenExchangeFailure { .. }
            | Self::TokenRefreshFailure { .. }
            | Self::Discovery { .. }
            | Self::Network(_) => 502,
            Self::Timeout { .. } => 504,
            Self::Configuration { .. }
            | Self::Vault(_)
            | Self::Serialization(_)
            | Self::UrlParse(_) => 500,
        }
    }

    /// Stable machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::DecryptionFailure { .. } | Self::InvalidCookie { .. } => "invalid_session",
            Self::SessionExpired { .. } => "session_expired",
            Self::CsrfStateMismatch
            | Self::TransientStateMissing { .. }
            | Self::InvalidCallback { .. }
            | Self::ClaimValidationFailure { .. } => "callback_failed",
            Self::IdentityProvider { .. } => "identity_provider_error",
            Self::TokenExchangeFailure { .. } => "token_exchange_failed",
            Self::TokenRefreshFailure { .. } => "token_refresh_failed",
            Self::Discovery { .. } => "discovery_failed",
            Self::Timeout { .. } => "timeout",
            Self::Network(_) => "network_error",
            Self::Unauthorized => "not_authenticated",
            Self::MissingAccessToken => "missing_access_token",
            Self::MissingRefreshToken => "missing_refresh_token",
            Self::TokenExpired => "token_expired",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::Vault(_) | Self::Serialization(_) | Self::UrlParse(_) => "internal_error",
        }
    }

    /// Message that is safe to render to the end user.
    ///
    /// Cryptographic, cookie and CSRF failures never reveal which check
    /// failed; provider failures carry the provider's status and code.
    pub fn public_message(&self) -> String {
        match self {
            Self::CsrfStateMismatch
            | Self::TransientStateMissing { .. }
            | Self::InvalidCallback { .. }
            | Self::ClaimValidationFailure { .. }
            | Self::DecryptionFailure { .. }
            | Self::InvalidCookie { .. } => "authentication failed, please sign in again".into(),
            Self::IdentityProvider { error, description } => match description {
                Some(description) => format!("{error}: {description}"),
                None => error.clone(),
            },
            Self::TokenExchangeFailure {
                status,
                error,
                description,
            }
            | Self::TokenRefreshFailure {
                status,
                error,
                description,
            } => {
                let mut message = match status {
                    Some(status) => format!("provider returned {status}: {error}"),
                    None => format!("provider error: {error}"),
                };
                if let Some(description) = description {
                    message.push_str(" (");
                    message.push_str(description);
                    message.push(')');
                }
                message
            }
            Self::Configuration { .. }
            | Self::Vault(_)
            | Self::Serialization(_)
            | Self::UrlParse(_) => "internal server error".into(),
            other => other.to_string(),
        }
    }

    /// Whether the caller may reasonably retry the same operation.
    ///
    /// The engine itself never retries: authorization codes are single-use.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network(_))
    }

    /// Whether this failure should be logged as security relevant.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::CsrfStateMismatch
                | Self::TransientStateMissing { .. }
                | Self::ClaimValidationFailure { .. }
                | Self::DecryptionFailure { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
