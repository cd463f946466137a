//! Command-line interface for the authentication gateway.

use clap::{Parser, Subcommand};

/// Guardia - account security gateway
/// Session-based authentication with lockout, roles and idle expiry
#[derive(Parser)]
#[command(name = "guardia")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    #[command(alias = "server", alias = "-s")]
    Serve,

    /// Release temporary lockouts without waiting for expiry
    Unlock {
        /// Username or email of the account to unlock
        identifier: Option<String>,

        /// Release every lock instead of a single account's
        #[arg(long)]
        all: bool,
    },
}
