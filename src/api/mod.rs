//! HTTP surface: REST/JSON routes, uploads and the static front end.

mod accounts;
pub mod auth;
mod chat;
mod extract;
mod moderation;
mod reviewers;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(accounts::register))
        .route("/auth/login", post(accounts::login))
        .route("/auth/logout", post(accounts::logout))
        .route("/me", get(accounts::me).patch(accounts::update_me))
        .route(
            "/me/avatar",
            put(accounts::upload_avatar).layer(DefaultBodyLimit::max(max_upload_bytes + 1)),
        )
        .route("/me/password", post(accounts::change_password))
        .route("/me/warnings", get(accounts::my_warnings))
        .route("/presence/heartbeat", post(accounts::heartbeat))
        .route("/presence/online", get(accounts::online))
        .route("/users/{id}", get(accounts::user_profile))
        .route(
            "/subjects",
            get(reviewers::list_subjects).post(reviewers::create_subject),
        )
        .route(
            "/subjects/{id}",
            get(reviewers::get_subject).delete(reviewers::delete_subject),
        )
        .route(
            "/reviewers",
            get(reviewers::list_reviewers).post(reviewers::create_reviewer),
        )
        .route(
            "/reviewers/{id}",
            get(reviewers::get_reviewer)
                .put(reviewers::update_reviewer)
                .delete(reviewers::delete_reviewer),
        )
        .route("/reviewers/{id}/flashcards", get(reviewers::list_flashcards))
        .route(
            "/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route("/messages/{id}", axum::routing::delete(chat::delete_message))
        .route("/reports", post(moderation::file_report))
        .nest("/admin", admin_routes())
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/moderation", get(moderation::list_reports))
        .route("/moderation/log", get(moderation::moderation_log))
        .route("/moderation/{id}", get(moderation::get_report))
        .route("/moderation/{id}/action", post(moderation::act_on_report))
        .route("/users", get(moderation::list_users))
        .route("/users/{id}/role", post(moderation::set_role))
        .route("/users/{id}/lift", post(moderation::lift_sanction))
        .route(
            "/content/{kind}/{id}/restore",
            post(moderation::restore_content),
        )
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if parsed.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
    )
}

/// Builds the complete application router.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();
    let max_body = *config.server().max_body_bytes();
    let max_upload = *config.storage().max_upload_bytes();

    let mut app = Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes(max_upload))
        .nest_service("/uploads", ServeDir::new(config.storage().upload_dir()));

    if let Some(dir) = config.server().static_dir() {
        info!(dir = %dir.display(), "Serving static front end");
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    let mut app = app
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(config.server().allowed_origins()) {
        info!(origins = config.server().allowed_origins().len(), "CORS enabled");
        app = app.layer(cors);
    }
    app.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_disabled_without_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["http://localhost:5173".to_string()]).is_some());
    }
}
