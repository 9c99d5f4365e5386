//! JSON shapes returned by the API and read back by the REST client.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::{Flashcard, Message, Report, Role, Sanction, Subject, TargetKind, User};

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    /// User id.
    pub id: i32,
    /// Login name.
    pub username: String,
    /// Name shown in the UI.
    pub display_name: String,
    /// Free-form biography.
    pub bio: String,
    /// URL of the avatar image, if any.
    pub avatar_url: Option<String>,
    /// Account role.
    pub role: Role,
    /// Whether the user sent a heartbeat recently.
    pub online: bool,
    /// Registration time.
    pub created_at: NaiveDateTime,
}

impl UserView {
    /// Builds the public view; `online` is computed by the caller.
    pub fn from_user(user: &User, online: bool) -> Self {
        Self {
            id: *user.id(),
            username: user.username().clone(),
            display_name: user.display_name().clone(),
            bio: user.bio().clone(),
            avatar_url: user.avatar_path().as_ref().map(|p| format!("/uploads/{}", p)),
            role: user.role(),
            online,
            created_at: *user.created_at(),
        }
    }
}

/// The caller's own account, including moderation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    /// Public part of the profile.
    #[serde(flatten)]
    pub profile: UserView,
    /// Contact email, if given.
    pub email: Option<String>,
    /// Warnings received so far.
    pub warning_count: i32,
    /// End of a chat mute in force.
    pub muted_until: Option<NaiveDateTime>,
    /// End of a suspension in force.
    pub suspended_until: Option<NaiveDateTime>,
}

impl AccountView {
    /// Builds the account view; sanctions that already ended are omitted.
    pub fn from_user(user: &User, now: NaiveDateTime) -> Self {
        Self {
            profile: UserView::from_user(user, true),
            email: user.email().clone(),
            warning_count: *user.warning_count(),
            muted_until: user.muted_until().filter(|until| *until > now),
            suspended_until: user.suspended_until().filter(|until| *until > now),
        }
    }
}

/// Response to register/login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// When the token stops working.
    pub expires_at: NaiveDateTime,
    /// The logged-in account.
    pub user: AccountView,
}

/// Entry in the online list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUser {
    /// User id.
    pub id: i32,
    /// Login name.
    pub username: String,
    /// Name shown in the UI.
    pub display_name: String,
    /// Time of the last heartbeat.
    pub last_seen_at: NaiveDateTime,
}

/// Subject with the number of visible reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectView {
    /// Subject id.
    pub id: i32,
    /// Unique name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Number of visible reviewers in the subject.
    pub reviewer_count: i64,
    /// Creation time.
    pub created_at: NaiveDateTime,
}

impl SubjectView {
    /// Builds the view from a subject row and its reviewer count.
    pub fn new(subject: &Subject, reviewer_count: i64) -> Self {
        Self {
            id: *subject.id(),
            name: subject.name().clone(),
            description: subject.description().clone(),
            reviewer_count,
            created_at: *subject.created_at(),
        }
    }
}

/// Reviewer as shown in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerSummary {
    /// Reviewer id.
    pub id: i32,
    /// Title.
    pub title: String,
    /// Plain-text preview of the content.
    pub excerpt: String,
    /// Subject id.
    pub subject_id: i32,
    /// Subject name.
    pub subject_name: String,
    /// Author id.
    pub author_id: i32,
    /// Author login name.
    pub author_username: String,
    /// Number of flashcards.
    pub flashcard_count: i64,
    /// Hidden by moderation (only ever true for the author or staff).
    pub hidden: bool,
    /// Creation time.
    pub created_at: NaiveDateTime,
    /// Last edit time.
    pub updated_at: NaiveDateTime,
}

/// Full reviewer with content and flashcards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerDetail {
    /// Listing fields.
    #[serde(flatten)]
    pub summary: ReviewerSummary,
    /// Rich-text (HTML) content.
    pub content: String,
    /// Flashcards in display order.
    pub flashcards: Vec<FlashcardView>,
}

/// Flashcard front/back pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardView {
    /// Flashcard id.
    pub id: i32,
    /// Position within the reviewer.
    pub position: i32,
    /// Prompt side.
    pub front: String,
    /// Answer side.
    pub back: String,
}

impl From<&Flashcard> for FlashcardView {
    fn from(card: &Flashcard) -> Self {
        Self {
            id: *card.id(),
            position: *card.position(),
            front: card.front().clone(),
            back: card.back().clone(),
        }
    }
}

/// Chat message with the sender's name resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    /// Message id (monotonic, used as polling cursor).
    pub id: i32,
    /// Sender id.
    pub sender_id: i32,
    /// Sender login name.
    pub sender_username: String,
    /// Recipient for direct messages; `None` for the room.
    pub recipient_id: Option<i32>,
    /// Text.
    pub body: String,
    /// Hidden by moderation (only visible to staff).
    pub hidden: bool,
    /// Send time.
    pub created_at: NaiveDateTime,
}

impl MessageView {
    /// Builds the view from a message and its sender's username.
    pub fn new(message: &Message, sender_username: String) -> Self {
        Self {
            id: *message.id(),
            sender_id: *message.sender_id(),
            sender_username,
            recipient_id: *message.recipient_id(),
            body: message.body().clone(),
            hidden: *message.hidden(),
            created_at: *message.created_at(),
        }
    }
}

/// What a report points at, as seen by a moderator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// Whether the content still exists.
    pub exists: bool,
    /// Reviewer title or message body (truncated).
    pub preview: Option<String>,
    /// Whether the content is currently hidden.
    pub hidden: bool,
    /// Username of the content author.
    pub author_username: Option<String>,
}

/// Report with its target snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportView {
    /// Report id.
    pub id: i32,
    /// Reporter id.
    pub reporter_id: i32,
    /// `reviewer` or `message`.
    pub target_type: String,
    /// Id of the reported content.
    pub target_id: i32,
    /// Author of the reported content.
    pub reported_user_id: i32,
    /// Reporter's explanation.
    pub reason: String,
    /// `pending`, `resolved` or `dismissed`.
    pub status: String,
    /// Moderator who closed the report.
    pub resolved_by: Option<i32>,
    /// Action taken.
    pub resolution_action: Option<String>,
    /// Moderator note.
    pub resolution_note: Option<String>,
    /// Filing time.
    pub created_at: NaiveDateTime,
    /// Closing time.
    pub resolved_at: Option<NaiveDateTime>,
    /// Current state of the reported content, when loaded.
    pub target: Option<TargetSnapshot>,
}

impl ReportView {
    /// Builds the view; pass `None` to skip the snapshot in listings.
    pub fn new(report: &Report, target: Option<TargetSnapshot>) -> Self {
        Self {
            id: *report.id(),
            reporter_id: *report.reporter_id(),
            target_type: report.target_type().clone(),
            target_id: *report.target_id(),
            reported_user_id: *report.reported_user_id(),
            reason: report.reason().clone(),
            status: report.status().clone(),
            resolved_by: *report.resolved_by(),
            resolution_action: report.resolution_action().clone(),
            resolution_note: report.resolution_note().clone(),
            created_at: *report.created_at(),
            resolved_at: *report.resolved_at(),
            target,
        }
    }
}

/// Admin listing entry with moderation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUserView {
    /// Public profile.
    #[serde(flatten)]
    pub profile: UserView,
    /// Warnings received.
    pub warning_count: i32,
    /// End of a chat mute in force.
    pub muted_until: Option<NaiveDateTime>,
    /// End of a suspension in force.
    pub suspended_until: Option<NaiveDateTime>,
    /// Whether a ban is in force.
    pub banned: bool,
    /// End of the ban; `None` with `banned` means permanent.
    pub banned_until: Option<NaiveDateTime>,
}

impl AdminUserView {
    /// Builds the admin view at `now`.
    pub fn from_user(user: &User, now: NaiveDateTime, online: bool) -> Self {
        let banned = user.is_banned_at(now);
        Self {
            profile: UserView::from_user(user, online),
            warning_count: *user.warning_count(),
            muted_until: user.muted_until().filter(|until| *until > now),
            suspended_until: user.suspended_until().filter(|until| *until > now),
            banned,
            banned_until: if banned { *user.banned_until() } else { None },
        }
    }
}

/// Body of `POST /api/auth/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Login name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
    /// Optional display name; defaults to the username.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Optional contact email.
    #[serde(default)]
    pub email: Option<String>,
}

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Login name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// Body of `PATCH /api/me`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// New biography.
    #[serde(default)]
    pub bio: Option<String>,
}

/// Body of `POST /api/me/password`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChange {
    /// Password in use now.
    pub current_password: String,
    /// Replacement password.
    pub new_password: String,
}

/// Body of `POST /api/subjects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubject {
    /// Unique name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST /api/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    /// Text.
    pub body: String,
    /// Direct-message recipient; absent for the room.
    #[serde(default)]
    pub recipient_id: Option<i32>,
}

/// Body of `POST /api/reports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Kind of content.
    pub target_type: TargetKind,
    /// Id of the content.
    pub target_id: i32,
    /// Why it is being reported.
    pub reason: String,
}

/// Body of `POST /api/admin/users/{id}/role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    /// New role.
    pub role: Role,
}

/// Body of `POST /api/admin/users/{id}/lift`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiftRequest {
    /// Sanction to clear.
    pub sanction: Sanction,
}
