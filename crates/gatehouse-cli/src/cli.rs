//! CLI argument definitions for Gatehouse.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Gatehouse -- OpenID Connect login and cookie sessions for web apps.
#[derive(Parser)]
#[command(
    name = "gatehouse",
    version,
    about = "Gatehouse -- OpenID Connect login with encrypted cookie sessions",
    long_about = "Runs an authentication front door for a web application: logs users in \
                  against an OpenID Connect provider and keeps their session in encrypted \
                  cookies, with no server-side session store."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server with the auth routes.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on.
        #[arg(long, short, default_value_t = 3000)]
        port: u16,

        /// TOML file layered over the GATEHOUSE_* environment.
        #[arg(long, short)]
        config: Option<PathBuf>,
    },

    /// Validate the configuration and print a summary.
    Check {
        /// TOML file layered over the GATEHOUSE_* environment.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Also fetch the provider's discovery document.
        #[arg(long)]
        discover: bool,
    },

    /// Print a freshly generated session secret.
    Secret {
        /// Number of random bytes before encoding.
        #[arg(long, short, default_value_t = 48)]
        bytes: usize,
    },
}
