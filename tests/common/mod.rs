//! Shared setup for integration tests.

#![allow(dead_code)]

use reviewer_hub::config::AppConfig;
use reviewer_hub::server;
use reviewer_hub::{AppState, ReviewerDraft, User};
use reviewer_hub::FlashcardInput;
use tempfile::TempDir;

/// Config with cheap password hashing, no send throttle and paths inside `dir`.
pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::from_toml_str(
        r#"
[auth]
hash_memory_kib = 1024
hash_iterations = 1

[chat]
min_send_interval_millis = 0
"#,
    )
    .expect("Test config must parse");
    let db_path = dir.path().join("test.db");
    config.override_database(db_path.to_str().expect("Invalid path").to_string());
    config.override_upload_dir(dir.path().join("uploads"));
    config
}

/// Migrated database and wired services. Keep the `TempDir` alive.
pub fn setup_state() -> (TempDir, AppState) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = test_config(&dir);
    let repository = server::prepare_database(&config).expect("Database setup failed");
    let state = server::build_state(config, repository).expect("State setup failed");
    (dir, state)
}

/// Registers a regular user.
pub fn register(state: &AppState, username: &str) -> User {
    let (user, _) = state
        .accounts
        .register(username, "correct horse", None, None)
        .expect("Register failed");
    user
}

/// Creates an admin account.
pub fn admin(state: &AppState, username: &str) -> User {
    state
        .accounts
        .create_admin(username, "correct horse")
        .expect("Create admin failed")
}

/// Registers a user and promotes them to moderator.
pub fn moderator(state: &AppState, admin: &User, username: &str) -> User {
    let user = register(state, username);
    state
        .moderation
        .set_role(admin, *user.id(), reviewer_hub::Role::Moderator)
        .expect("Promotion failed")
}

/// Publishes a reviewer with two flashcards and returns its id.
pub fn publish(state: &AppState, author: &User, subject_id: i32, title: &str) -> i32 {
    let draft = ReviewerDraft {
        subject_id,
        title: title.to_string(),
        content: format!("<h1>{}</h1><p>Notes &amp; examples</p>", title),
        flashcards: vec![
            FlashcardInput::new("Q1".into(), "A1".into()),
            FlashcardInput::new("Q2".into(), "A2".into()),
        ],
    };
    state
        .reviewers
        .create_reviewer(author, draft)
        .expect("Publish failed")
        .summary
        .id
}
