//! Database models and domain types.

use std::str::FromStr;

use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use tracing::{instrument, warn};

use crate::db::{DbError, schema};

/// Account role. Ordering follows privilege: `User < Moderator < Admin`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    /// Regular student account.
    User,
    /// Can resolve reports and apply non-ban sanctions.
    Moderator,
    /// Full control, including bans and role changes.
    Admin,
}

impl Role {
    /// Whether this role can access moderation tools.
    pub fn is_staff(self) -> bool {
        self >= Role::Moderator
    }

    /// Converts the role to the string stored in the database.
    pub fn to_db_string(self) -> &'static str {
        self.into()
    }

    /// Parses a role from the string stored in the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the string is not a valid role.
    #[instrument(skip(s), fields(s = %s))]
    pub fn from_db_string(s: &str) -> Result<Self, DbError> {
        Self::from_str(s).map_err(|_| DbError::new(format!("Invalid role: '{}'", s)))
    }
}

/// Kind of content a report points at.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetKind {
    /// A study reviewer.
    Reviewer,
    /// A chat message.
    Message,
}

impl TargetKind {
    /// Converts the kind to the string stored in the database.
    pub fn to_db_string(self) -> &'static str {
        self.into()
    }

    /// Parses a target kind from the string stored in the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the string is not a valid target kind.
    pub fn from_db_string(s: &str) -> Result<Self, DbError> {
        Self::from_str(s).map_err(|_| DbError::new(format!("Invalid target type: '{}'", s)))
    }
}

/// Lifecycle state of a moderation report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportStatus {
    /// Waiting for a moderator.
    Pending,
    /// Closed with an action applied.
    Resolved,
    /// Closed without any action.
    Dismissed,
}

impl ReportStatus {
    /// Converts the status to the string stored in the database.
    pub fn to_db_string(self) -> &'static str {
        self.into()
    }

    /// Parses a status from the string stored in the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the string is not a valid status.
    pub fn from_db_string(s: &str) -> Result<Self, DbError> {
        Self::from_str(s).map_err(|_| DbError::new(format!("Invalid report status: '{}'", s)))
    }
}

/// Action a moderator can take on a report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModerationAction {
    /// Remove the reported content.
    Delete,
    /// Keep the content but hide it from regular users.
    Hide,
    /// Block the author from posting reviewers, chatting and reporting.
    Suspend,
    /// Block the author from chatting.
    Mute,
    /// Block the author from logging in.
    Ban,
    /// Record a warning against the author.
    Warn,
    /// Close the report without changes.
    Dismiss,
}

impl ModerationAction {
    /// Converts the action to the string stored in the database.
    pub fn to_db_string(self) -> &'static str {
        self.into()
    }

    /// Parses an action from the string stored in the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the string is not a valid action.
    pub fn from_db_string(s: &str) -> Result<Self, DbError> {
        Self::from_str(s).map_err(|_| DbError::new(format!("Invalid moderation action: '{}'", s)))
    }
}

/// User account database model.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters)]
#[diesel(table_name = schema::users)]
pub struct User {
    id: i32,
    username: String,
    email: Option<String>,
    display_name: String,
    bio: String,
    avatar_path: Option<String>,
    password_hash: String,
    #[getter(skip)]
    role: String,
    warning_count: i32,
    muted_until: Option<NaiveDateTime>,
    suspended_until: Option<NaiveDateTime>,
    banned: bool,
    banned_until: Option<NaiveDateTime>,
    last_seen_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl User {
    /// Parsed role; an unreadable value degrades to [`Role::User`].
    pub fn role(&self) -> Role {
        Role::from_db_string(&self.role).unwrap_or_else(|e| {
            warn!(user_id = self.id, error = %e, "Unreadable role, treating as user");
            Role::User
        })
    }

    /// Whether a ban is in force at `now`. A ban without an end date is permanent.
    pub fn is_banned_at(&self, now: NaiveDateTime) -> bool {
        self.banned && self.banned_until.is_none_or(|until| until > now)
    }

    /// Whether a suspension is in force at `now`.
    pub fn is_suspended_at(&self, now: NaiveDateTime) -> bool {
        self.suspended_until.is_some_and(|until| until > now)
    }

    /// Whether a chat mute is in force at `now`.
    pub fn is_muted_at(&self, now: NaiveDateTime) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }

    /// Whether the user's last heartbeat falls inside the online window.
    pub fn is_online_at(&self, now: NaiveDateTime, window: chrono::Duration) -> bool {
        self.last_seen_at.is_some_and(|seen| now - seen <= window)
    }
}

/// Insertable user model for creating new accounts.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    username: String,
    email: Option<String>,
    display_name: String,
    password_hash: String,
    role: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Optional profile fields to update.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::users)]
pub struct ProfileChanges {
    /// New display name.
    pub display_name: Option<String>,
    /// New biography.
    pub bio: Option<String>,
    /// Modification time.
    pub updated_at: Option<NaiveDateTime>,
}

/// Login session row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Getters, new)]
#[diesel(table_name = schema::sessions)]
pub struct Session {
    token: String,
    user_id: i32,
    created_at: NaiveDateTime,
    expires_at: NaiveDateTime,
}

/// Subject (course/topic) grouping reviewers.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters, Serialize, Deserialize)]
#[diesel(table_name = schema::subjects)]
pub struct Subject {
    id: i32,
    name: String,
    description: String,
    created_by: Option<i32>,
    created_at: NaiveDateTime,
}

/// Insertable subject model.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::subjects)]
pub struct NewSubject {
    name: String,
    description: String,
    created_by: Option<i32>,
    created_at: NaiveDateTime,
}

/// Reviewer database model.
#[derive(
    Debug, Clone, Queryable, Identifiable, Associations, Selectable, Getters, Serialize, Deserialize,
)]
#[diesel(table_name = schema::reviewers)]
#[diesel(belongs_to(Subject))]
pub struct Reviewer {
    id: i32,
    subject_id: i32,
    author_id: i32,
    title: String,
    content: String,
    excerpt: String,
    hidden: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Insertable reviewer model.
#[derive(Debug, Clone, Insertable, new, Getters)]
#[diesel(table_name = schema::reviewers)]
pub struct NewReviewer {
    subject_id: i32,
    author_id: i32,
    title: String,
    content: String,
    excerpt: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Optional reviewer fields to update.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = schema::reviewers)]
pub struct ReviewerChanges {
    /// New subject.
    pub subject_id: Option<i32>,
    /// New title.
    pub title: Option<String>,
    /// New rich-text content.
    pub content: Option<String>,
    /// Plain-text excerpt matching `content`.
    pub excerpt: Option<String>,
    /// Modification time.
    pub updated_at: Option<NaiveDateTime>,
}

/// Flashcard attached to a reviewer.
#[derive(
    Debug, Clone, Queryable, Identifiable, Associations, Selectable, Getters, Serialize, Deserialize,
)]
#[diesel(table_name = schema::flashcards)]
#[diesel(belongs_to(Reviewer))]
pub struct Flashcard {
    id: i32,
    reviewer_id: i32,
    position: i32,
    front: String,
    back: String,
}

/// Front/back pair supplied when creating or replacing flashcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct FlashcardInput {
    /// Prompt side.
    pub front: String,
    /// Answer side.
    pub back: String,
}

/// Insertable flashcard model.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::flashcards)]
pub struct NewFlashcard {
    reviewer_id: i32,
    position: i32,
    front: String,
    back: String,
}

/// Chat message. `recipient_id == None` means the global room.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters, Serialize, Deserialize)]
#[diesel(table_name = schema::messages)]
pub struct Message {
    id: i32,
    sender_id: i32,
    recipient_id: Option<i32>,
    body: String,
    hidden: bool,
    created_at: NaiveDateTime,
}

/// Insertable message model.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::messages)]
pub struct NewMessage {
    sender_id: i32,
    recipient_id: Option<i32>,
    body: String,
    created_at: NaiveDateTime,
}

/// Moderation report database model.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters, Serialize, Deserialize)]
#[diesel(table_name = schema::reports)]
pub struct Report {
    id: i32,
    reporter_id: i32,
    target_type: String,
    target_id: i32,
    reported_user_id: i32,
    reason: String,
    status: String,
    resolved_by: Option<i32>,
    resolution_action: Option<String>,
    resolution_note: Option<String>,
    created_at: NaiveDateTime,
    resolved_at: Option<NaiveDateTime>,
}

impl Report {
    /// Parses the stored target type.
    #[instrument(skip(self), fields(report_id = self.id))]
    pub fn target_kind(&self) -> Result<TargetKind, DbError> {
        TargetKind::from_db_string(&self.target_type)
    }

    /// Parses the stored status.
    #[instrument(skip(self), fields(report_id = self.id))]
    pub fn parse_status(&self) -> Result<ReportStatus, DbError> {
        ReportStatus::from_db_string(&self.status)
    }
}

/// Insertable report model.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::reports)]
pub struct NewReport {
    reporter_id: i32,
    target_type: String,
    target_id: i32,
    reported_user_id: i32,
    reason: String,
    status: String,
    created_at: NaiveDateTime,
}

/// Warning issued to a user by a moderator.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters, Serialize, Deserialize)]
#[diesel(table_name = schema::warnings)]
pub struct Warning {
    id: i32,
    user_id: i32,
    report_id: Option<i32>,
    note: String,
    issued_by: i32,
    created_at: NaiveDateTime,
}

/// Insertable warning model.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::warnings)]
pub struct NewWarning {
    user_id: i32,
    report_id: Option<i32>,
    note: String,
    issued_by: i32,
    created_at: NaiveDateTime,
}

/// Audit trail entry for a moderation action.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters, Serialize, Deserialize)]
#[diesel(table_name = schema::moderation_log)]
pub struct ModerationLogEntry {
    id: i32,
    report_id: Option<i32>,
    actor_id: i32,
    action: String,
    target_type: String,
    target_id: i32,
    target_user_id: Option<i32>,
    duration_hours: Option<i32>,
    note: Option<String>,
    created_at: NaiveDateTime,
}

/// Insertable audit entry.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::moderation_log)]
pub struct NewModerationLogEntry {
    report_id: Option<i32>,
    actor_id: i32,
    action: String,
    target_type: String,
    target_id: i32,
    target_user_id: Option<i32>,
    duration_hours: Option<i32>,
    note: Option<String>,
    created_at: NaiveDateTime,
}

/// Concrete state change produced by a moderation decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationEffect {
    /// Nothing changes besides the report itself.
    None,
    /// Delete the target content row.
    DeleteContent,
    /// Flag the target content as hidden.
    HideContent,
    /// Insert a warning for the reported user.
    Warn {
        /// Text shown to the user.
        note: String,
    },
    /// Mute the reported user until the given time.
    Mute {
        /// End of the mute.
        until: NaiveDateTime,
    },
    /// Suspend the reported user until the given time.
    Suspend {
        /// End of the suspension.
        until: NaiveDateTime,
    },
    /// Ban the reported user; `None` is permanent.
    Ban {
        /// End of the ban.
        until: Option<NaiveDateTime>,
    },
}

/// Fully validated moderation decision, ready to be applied atomically.
#[derive(Debug, Clone)]
pub struct ModerationPlan {
    /// Report being resolved.
    pub report_id: i32,
    /// Moderator or admin applying the action.
    pub actor_id: i32,
    /// Chosen action.
    pub action: ModerationAction,
    /// Kind of reported content.
    pub target: TargetKind,
    /// Id of the reported content.
    pub target_id: i32,
    /// Author of the reported content.
    pub target_user_id: i32,
    /// State change to apply.
    pub effect: ModerationEffect,
    /// Final status for the report.
    pub report_status: ReportStatus,
    /// Sanction length as entered by the moderator.
    pub duration_hours: Option<i32>,
    /// Free-form note recorded on the report and in the log.
    pub note: Option<String>,
    /// Also close other pending reports against the same content.
    pub resolve_siblings: bool,
    /// Decision time.
    pub decided_at: NaiveDateTime,
}

/// Which sanction to lift from a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sanction {
    /// Chat mute.
    Mute,
    /// Posting suspension.
    Suspend,
    /// Login ban.
    Ban,
    /// Every sanction at once.
    All,
}
