//! Shared helper functions used across CLI subcommands.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatehouse_auth_engine::{AuthConfig, ConfigLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Resolve the configuration: `.env`, then `GATEHOUSE_*` variables, then
/// the optional TOML file on top.
pub fn load_config(file: Option<&Path>) -> Result<AuthConfig> {
    if let Ok(path) = dotenvy::dotenv() {
        info!(path = %path.display(), "loaded .env");
    }
    let env = ConfigLayer::from_env().context("invalid GATEHOUSE_* environment")?;
    resolve_config(env, file)
}

/// Layer `file` over `env` and validate.
pub fn resolve_config(env: ConfigLayer, file: Option<&Path>) -> Result<AuthConfig> {
    let layer = match file {
        Some(path) => {
            let file_layer = ConfigLayer::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            env.merge(file_layer)
        }
        None => env,
    };
    AuthConfig::from_layer(layer).context("configuration rejected")
}

/// Human-readable summary of a configuration. Secrets are never printed.
pub fn describe(config: &AuthConfig) -> Vec<(&'static str, String)> {
    let on_off = |flag: bool| if flag { "on" } else { "off" }.to_string();
    vec![
        ("issuer", config.issuer_base_url.to_string()),
        ("base url", config.base_url.to_string()),
        ("client id", config.client_id.clone()),
        (
            "client secret",
            if config.client_secret.is_some() { "set" } else { "none" }.to_string(),
        ),
        ("secrets", config.secrets.len().to_string()),
        ("scope", config.authorization.scope.clone()),
        (
            "response mode",
            config
                .authorization
                .response_mode
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "query".to_string()),
        ),
        ("pkce", on_off(config.use_pkce)),
        ("callback", config.callback_path.clone()),
        ("post logout", config.post_logout_redirect.to_string()),
        ("idp logout", on_off(config.idp_logout)),
        ("session cookie", config.session.name.clone()),
        ("rolling", on_off(config.session.rolling)),
        (
            "absolute duration",
            config
                .session
                .absolute_duration
                .map(|secs| format!("{secs}s"))
                .unwrap_or_else(|| "disabled".to_string()),
        ),
        ("signing alg", format!("{:?}", config.id_token_signing_alg)),
    ]
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// A random base64url secret built from `bytes` random bytes.
pub fn generate_secret(bytes: usize) -> Result<String> {
    ensure!(
        bytes >= gatehouse_vault::MIN_SECRET_LEN,
        "a secret needs at least {} random bytes",
        gatehouse_vault::MIN_SECRET_LEN
    );
    let raw = gatehouse_vault::crypto::random_bytes(bytes).context("system randomness unavailable")?;
    Ok(URL_SAFE_NO_PAD.encode(raw))
}
