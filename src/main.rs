//! Reviewer Hub - Unified CLI
//!
//! Runs the server, manages the database and provides a terminal chat client.

#![warn(missing_docs)]

mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use reviewer_hub::client::{ApiClient, ChatPoller};
use reviewer_hub::config::AppConfig;
use reviewer_hub::server;
use reviewer_hub::views::MessageView;
use reviewer_hub::{AccountService, run_blocking};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, instrument, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const CHAT_PAGE: i64 = 50;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    initialize_tracing();

    match cli.command {
        Command::Serve {
            host,
            port,
            database,
        } => {
            let mut config = load_config(cli.config.as_deref(), database)?;
            config.override_listener(host, port);
            config.validate()?;
            server::serve(config).await
        }
        Command::Migrate { database } => {
            let config = load_config(cli.config.as_deref(), database)?;
            run_migrate(config).await
        }
        Command::CreateAdmin {
            username,
            password,
            database,
        } => {
            let config = load_config(cli.config.as_deref(), database)?;
            run_create_admin(config, username, password).await
        }
        Command::Chat {
            server_url,
            username,
            password,
            interval_secs,
            with,
        } => run_chat(server_url, username, password, interval_secs, with).await,
    }
}

fn initialize_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reviewer_hub=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Loads the config file (or defaults), environment overrides and the
/// `--database` flag.
fn load_config(path: Option<&Path>, database: Option<String>) -> Result<AppConfig> {
    let mut config = AppConfig::load(path)?;
    if let Some(database) = database {
        config.override_database(database);
        config.validate()?;
    }
    Ok(config)
}

#[instrument(skip(config))]
async fn run_migrate(config: AppConfig) -> Result<()> {
    tokio::task::spawn_blocking(move || server::prepare_database(&config))
        .await
        .context("Migration task failed")??;
    info!("Database is up to date");
    Ok(())
}

#[instrument(skip(config, password))]
async fn run_create_admin(config: AppConfig, username: String, password: String) -> Result<()> {
    let prepared = config.clone();
    let repository = tokio::task::spawn_blocking(move || server::prepare_database(&prepared))
        .await
        .context("Database preparation task failed")??;
    let accounts = AccountService::new(repository, &config)?;
    let admin = run_blocking(move || accounts.create_admin(&username, &password)).await?;
    info!(user_id = admin.id(), username = %admin.username(), "Admin account ready");
    Ok(())
}

/// Terminal chat: prints new messages every `interval_secs` and sends each
/// line typed on stdin, to the room or to the user given by `with`.
#[instrument(skip(password))]
async fn run_chat(
    server_url: String,
    username: String,
    password: String,
    interval_secs: u64,
    with: Option<i32>,
) -> Result<()> {
    let mut client = ApiClient::new(&server_url)?;
    let auth = client.login(&username, &password).await?;
    info!(user = %auth.user.profile.username, "Logged in");

    let mut poller = match with {
        Some(user_id) => ChatPoller::conversation(user_id, CHAT_PAGE),
        None => ChatPoller::room(CHAT_PAGE),
    };
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match poller.poll(&client).await {
                    Ok(messages) => messages.iter().for_each(print_message),
                    Err(e) => warn!(error = %e, "Poll failed"),
                }
                if let Err(e) = client.heartbeat().await {
                    warn!(error = %e, "Heartbeat failed");
                }
            }
            line = lines.next_line() => {
                match line? {
                    Some(text) if text.trim() == "/quit" => break,
                    Some(text) if text.trim().is_empty() => {}
                    Some(text) => {
                        if let Err(e) = client.send_message(text.trim(), with).await {
                            warn!(error = %e, "Send failed");
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if let Err(e) = client.logout().await {
        warn!(error = %e, "Logout failed");
    }
    info!("Chat closed");
    Ok(())
}

fn print_message(message: &MessageView) {
    println!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M"),
        message.sender_username,
        message.body
    );
}
