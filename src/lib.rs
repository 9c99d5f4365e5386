//! Reviewer Hub library - study reviewers, flashcards, chat and moderation
//!
//! Students publish rich-text reviewers with flashcards grouped by subject,
//! talk in a global room or in direct messages, and report abuse to staff
//! who resolve it with warnings, mutes, suspensions or bans.
//!
//! # Architecture
//!
//! - **Database**: Diesel/SQLite repository ([`StudyRepository`])
//! - **Services**: account, reviewer, chat and moderation rules
//! - **API**: axum REST router ([`api::router`])
//! - **Client**: REST client with a page cache and chat poller ([`client`])
//!
//! # Example
//!
//! ```no_run
//! use reviewer_hub::config::AppConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = AppConfig::load(None)?;
//! reviewer_hub::server::serve(config).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod account_service;
mod chat_service;
mod content;
mod db;
mod error;
mod moderation_service;
mod pagination;
mod password;
mod reviewer_service;
mod state;
mod storage;

// Public modules
pub mod api;
pub mod client;
pub mod config;
pub mod server;
pub mod views;

// Crate-level exports - Database
pub use db::{
    DbError, DbErrorKind, Flashcard, FlashcardInput, Message, MessageCursor, MessageScope,
    ModerationAction, ModerationEffect, ModerationLogEntry, ModerationPlan, NewFlashcard,
    NewMessage, NewModerationLogEntry, NewReport, NewReviewer, NewSubject, NewUser, NewWarning,
    ProfileChanges, Report, ReportStatus, Reviewer, ReviewerChanges, ReviewerFilter, Role,
    Sanction, Session, StudyRepository, Subject, TargetKind, User, Warning,
};

// Crate-level exports - Services
pub use account_service::{AccountService, CurrentUser};
pub use chat_service::{ChatService, MessageQuery};
pub use moderation_service::{ActionRequest, MAX_DURATION_HOURS, ModerationService, plan_action};
pub use reviewer_service::{ReviewerDraft, ReviewerEdit, ReviewerService};

// Crate-level exports - Infrastructure
pub use config::{AppConfig, ConfigError};
pub use content::{EXCERPT_CHARS, ExcerptBuilder};
pub use error::{AppError, run_blocking};
pub use pagination::{Page, PageRequest};
pub use password::{CredentialHasher, PasswordError};
pub use state::AppState;
pub use storage::{FileStore, LocalFileStore, StorageError, image_extension};

/// Current UTC time as stored in the database.
pub fn utc_now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
