//! Database persistence layer for accounts, study content, chat and moderation.

mod error;
mod models;
mod repository;
mod schema; // Diesel generated schema - internal use only

pub use error::{DbError, DbErrorKind};
pub use models::{
    Flashcard, FlashcardInput, Message, ModerationAction, ModerationEffect, ModerationLogEntry,
    ModerationPlan, NewFlashcard, NewMessage, NewModerationLogEntry, NewReport, NewReviewer,
    NewSubject, NewUser, NewWarning, ProfileChanges, Report, ReportStatus, Reviewer,
    ReviewerChanges, Role, Sanction, Session, Subject, TargetKind, User, Warning,
};
pub use repository::{MessageCursor, MessageScope, ReviewerFilter, StudyRepository};
