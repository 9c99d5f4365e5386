//! Server startup: database preparation, state wiring and the HTTP listener.

use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, instrument};

use crate::api;
use crate::config::AppConfig;
use crate::state::AppState;
use crate::storage::LocalFileStore;
use crate::{StudyRepository, utc_now};

/// Opens the database, applies migrations and runs startup housekeeping:
/// expired sessions are purged and room messages older than the configured
/// retention are pruned.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
#[instrument(skip(config), fields(db_path = %config.database().path()))]
pub fn prepare_database(config: &AppConfig) -> anyhow::Result<StudyRepository> {
    let repository = StudyRepository::new(config.database().path().clone())?;
    let applied = repository.run_migrations()?;
    info!(applied, "Migrations applied");

    let now = utc_now();
    let purged = repository.purge_expired_sessions(now)?;
    info!(purged, "Expired sessions purged");

    let retention_days = *config.chat().retention_days();
    if retention_days > 0 {
        let pruned = repository.prune_room_messages(now - Duration::days(retention_days))?;
        info!(pruned, retention_days, "Room history pruned");
    }
    Ok(repository)
}

/// Builds the application state on top of a prepared repository.
///
/// # Errors
///
/// Returns an error if the upload directory cannot be created or a service
/// rejects the configuration.
pub fn build_state(config: AppConfig, repository: StudyRepository) -> anyhow::Result<AppState> {
    let files = LocalFileStore::new(config.storage().upload_dir())?;
    let state = AppState::new(config, repository, Arc::new(files))?;
    Ok(state)
}

/// Runs the HTTP server until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns an error if startup fails or the listener cannot be bound.
#[instrument(skip(config))]
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let address = config.bind_address();
    let prepared = config.clone();
    let repository = tokio::task::spawn_blocking(move || prepare_database(&prepared))
        .await
        .context("Database preparation task failed")??;
    let state = build_state(config, repository)?;
    let app = api::router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
