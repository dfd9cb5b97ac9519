//! Session and login-flow engine for Gatehouse.
//!
//! This crate turns an OpenID Connect provider into cookie-based sessions
//! for a web application, with no server-side session store:
//!
//! - **Encrypted session cookies**: AES-256-GCM with a rotating secret set,
//!   chunked across several cookies when large.
//! - **Login flow protection**: signed single-use state, nonce and PKCE
//!   cookies carried across the provider redirect.
//! - **Authorization code flow** with ID-token verification and silent
//!   access-token refresh.
//!
//! # Architecture
//!
//! ```text
//! AuthManager
//! ├── FlowController   (login / callback / logout / access token)
//! │   ├── TransientStore  (signed state, nonce, PKCE cookies)
//! │   └── OidcClient      (discovery, token endpoint, ID tokens)
//! └── CookieCodec      (encrypted, chunked session cookie)
//!     └── Keyring         (gatehouse-vault)
//!
//! SessionCache         (one per request, lazily loads the cookie)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gatehouse_auth_engine::{AuthConfig, AuthManager, ConfigLayer, LoginOptions};
//! use gatehouse_auth_engine::cookies::{RequestCookies, ResponseCookies};
//!
//! # async fn example() -> gatehouse_auth_engine::error::Result<()> {
//! let config = AuthConfig::load(ConfigLayer::default())?;
//! let manager = AuthManager::from_config(config)?;
//!
//! // Per request:
//! let mut response = ResponseCookies::new();
//! let redirect = manager
//!     .login(
//!         LoginOptions {
//!             return_to: Some("/dashboard".into()),
//!             ..Default::default()
//!         },
//!         &mut response,
//!     )
//!     .await?;
//! println!("redirect to {redirect}");
//!
//! let mut cache = manager.session_cache(RequestCookies::from_header("appSession=…"));
//! if let Some(session) = manager.get_session(&mut cache) {
//!     println!("signed in as {:?}", session.claims.subject());
//! }
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod clock;
pub mod codec;
pub mod config;
pub mod cookies;
pub mod error;
pub mod flow;
pub mod manager;
pub mod oidc;
pub mod session;
pub mod transient;

// Re-export key types at the crate root for convenience.
pub use claims::Claims;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, ConfigLayer};
pub use error::{AuthError, Result};
pub use flow::{
    AccessToken, AccessTokenOptions, AfterCallback, AfterRefresh, CallbackOutcome, CallbackParams,
    LoginOptions, LogoutOptions,
};
pub use manager::AuthManager;
pub use oidc::{HttpOidcClient, OidcClient, ProviderMetadata, TokenSet};
pub use session::{ExpiryPolicy, Session, SessionCache};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
