//! CLI entry point for Gatehouse.
//!
//! This binary provides the `gatehouse` command with subcommands for running
//! the auth server, validating configuration and generating secrets.

mod cli;
mod helpers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gatehouse_auth_engine::{AuthManager, HttpOidcClient, OidcClient};
use gatehouse_web::{WebConfig, WebServer};
use tracing::{error, info};

use crate::cli::{Cli, Commands};
use crate::helpers::{describe, generate_secret, init_tracing, load_config};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port, config } => cmd_serve(bind, port, config).await,
        Commands::Check { config, discover } => cmd_check(config, discover).await,
        Commands::Secret { bytes } => cmd_secret(bytes),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(bind: String, port: u16, config_path: Option<PathBuf>) -> Result<()> {
    init_tracing("info");

    let config = load_config(config_path.as_deref())?;
    info!(
        issuer = %config.issuer_base_url,
        base_url = %config.base_url,
        "configuration loaded"
    );

    let auth = AuthManager::from_config(config).context("failed to build auth manager")?;
    let server = WebServer::new(
        WebConfig {
            bind_addr: bind,
            port,
        },
        Arc::new(auth),
    );

    if let Err(e) = server.start().await {
        error!(error = %e, "web server stopped");
        anyhow::bail!("web server failed: {e}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

async fn cmd_check(config_path: Option<PathBuf>, discover: bool) -> Result<()> {
    init_tracing("warn");

    let config = load_config(config_path.as_deref())?;

    println!();
    println!("  Gatehouse v{}", env!("CARGO_PKG_VERSION"));
    println!("  ----------------------");
    for (label, value) in describe(&config) {
        println!("  {label:<18} {value}");
    }

    if discover {
        let client = HttpOidcClient::new(&config).context("failed to build HTTP client")?;
        let metadata = client
            .discover()
            .await
            .context("provider discovery failed")?;
        println!();
        println!("  {:<18} {}", "discovered", metadata.issuer);
        println!("  {:<18} {}", "token endpoint", metadata.token_endpoint);
        println!(
            "  {:<18} {}",
            "end session",
            metadata.end_session_endpoint.as_deref().unwrap_or("(none)")
        );
    }

    println!();
    println!("  Configuration OK.");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: secret
// ---------------------------------------------------------------------------

fn cmd_secret(bytes: usize) -> Result<()> {
    println!("{}", generate_secret(bytes)?);
    Ok(())
}
