//! Command-line interface for reviewer_hub.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reviewer Hub - study reviewers, flashcards, chat and moderation
#[derive(Parser, Debug)]
#[command(name = "reviewer_hub")]
#[command(about = "Study reviewer sharing server with chat and moderation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "REVIEWER_HUB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to the database file
        #[arg(long)]
        database: Option<String>,
    },

    /// Apply pending database migrations and exit
    Migrate {
        /// Path to the database file
        #[arg(long)]
        database: Option<String>,
    },

    /// Create an admin account, or promote an existing user
    CreateAdmin {
        /// Login name
        #[arg(long)]
        username: String,

        /// Password (ignored when promoting an existing user)
        #[arg(long, env = "REVIEWER_HUB_ADMIN_PASSWORD")]
        password: String,

        /// Path to the database file
        #[arg(long)]
        database: Option<String>,
    },

    /// Join the chat room from the terminal
    Chat {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server_url: String,

        /// Login name
        #[arg(long)]
        username: String,

        /// Password
        #[arg(long, env = "REVIEWER_HUB_PASSWORD")]
        password: String,

        /// Seconds between polls
        #[arg(long, default_value = "3")]
        interval_secs: u64,

        /// Talk directly to this user id instead of the room
        #[arg(long)]
        with: Option<i32>,
    },
}
