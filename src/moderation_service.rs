//! Report filing and the moderation workflow.
//!
//! A moderator's decision is first turned into a [`ModerationPlan`] by the
//! pure [`plan_action`] function, which enforces every permission and
//! duration rule. The repository then applies the plan in one transaction.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::AppError;
use crate::pagination::{Page, PageRequest};
use crate::views::{AdminUserView, ReportView, TargetSnapshot};
use crate::{
    ModerationAction, ModerationEffect, ModerationLogEntry, ModerationPlan, NewModerationLogEntry,
    NewReport, Report, ReportStatus, Role, Sanction, StudyRepository, TargetKind, User, utc_now,
};

/// Longest sanction a moderator can set, in hours (one year).
pub const MAX_DURATION_HOURS: i32 = 8760;

const REASON_MAX: usize = 500;
const NOTE_MAX: usize = 1000;
const PREVIEW_CHARS: usize = 200;
const REPORTS_PER_PAGE: i64 = 20;
const USERS_PER_PAGE: i64 = 25;
const MAX_PER_PAGE: i64 = 100;
const DEFAULT_LOG_LIMIT: i64 = 50;
const MAX_LOG_LIMIT: i64 = 200;

/// A moderator's decision on a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// What to do.
    pub action: ModerationAction,
    /// Sanction length for mute, suspend and ban.
    #[serde(default)]
    pub duration_hours: Option<i32>,
    /// Note stored on the report, in the log, and shown with warnings.
    #[serde(default)]
    pub note: Option<String>,
}

/// Validates a moderation decision and turns it into an executable plan.
///
/// `target_role` is the current role of the user whose content was reported.
///
/// # Errors
///
/// Returns forbidden when the actor lacks the rank for the action, a conflict
/// when the report is already closed, and a validation error for bad
/// durations or notes.
pub fn plan_action(
    actor: &User,
    report: &Report,
    target_role: Role,
    request: ActionRequest,
    now: NaiveDateTime,
) -> Result<ModerationPlan, AppError> {
    let actor_role = actor.role();
    if !actor_role.is_staff() {
        return Err(AppError::forbidden("Only moderators and admins can act on reports"));
    }
    if report.parse_status()? != ReportStatus::Pending {
        return Err(AppError::conflict(format!(
            "Report {} is already {}",
            report.id(),
            report.status()
        )));
    }

    let action = request.action;
    if action == ModerationAction::Ban && actor_role != Role::Admin {
        return Err(AppError::forbidden("Only admins can ban users"));
    }
    if action != ModerationAction::Dismiss && target_role >= actor_role {
        return Err(AppError::forbidden(format!(
            "Cannot {} content of a user with role {}",
            action, target_role
        )));
    }

    let duration_hours = check_duration(action, request.duration_hours)?;
    let note = clean_note(request.note)?;
    let until = |hours: i32| now + Duration::hours(i64::from(hours));

    let effect = match action {
        ModerationAction::Delete => ModerationEffect::DeleteContent,
        ModerationAction::Hide => ModerationEffect::HideContent,
        ModerationAction::Warn => ModerationEffect::Warn {
            note: note
                .clone()
                .unwrap_or_else(|| format!("Your content was reported: {}", report.reason())),
        },
        ModerationAction::Mute => ModerationEffect::Mute {
            until: until(duration_hours.unwrap_or(0)),
        },
        ModerationAction::Suspend => ModerationEffect::Suspend {
            until: until(duration_hours.unwrap_or(0)),
        },
        ModerationAction::Ban => ModerationEffect::Ban {
            until: duration_hours.map(until),
        },
        ModerationAction::Dismiss => ModerationEffect::None,
    };

    Ok(ModerationPlan {
        report_id: *report.id(),
        actor_id: *actor.id(),
        action,
        target: report.target_kind()?,
        target_id: *report.target_id(),
        target_user_id: *report.reported_user_id(),
        effect,
        report_status: if action == ModerationAction::Dismiss {
            ReportStatus::Dismissed
        } else {
            ReportStatus::Resolved
        },
        duration_hours,
        note,
        resolve_siblings: matches!(action, ModerationAction::Delete | ModerationAction::Hide),
        decided_at: now,
    })
}

/// Mute and suspend need a duration; ban takes an optional one (absent means
/// permanent); everything else takes none.
fn check_duration(action: ModerationAction, hours: Option<i32>) -> Result<Option<i32>, AppError> {
    let in_range = |h: i32| (1..=MAX_DURATION_HOURS).contains(&h);
    match (action, hours) {
        (ModerationAction::Mute | ModerationAction::Suspend, None) => Err(AppError::validation(
            format!("'{}' requires duration_hours", action),
        )),
        (ModerationAction::Mute | ModerationAction::Suspend | ModerationAction::Ban, Some(h))
            if !in_range(h) =>
        {
            Err(AppError::validation(format!(
                "duration_hours must be between 1 and {}",
                MAX_DURATION_HOURS
            )))
        }
        (ModerationAction::Mute | ModerationAction::Suspend | ModerationAction::Ban, h) => Ok(h),
        (_, Some(_)) => Err(AppError::validation(format!(
            "'{}' does not take a duration",
            action
        ))),
        (_, None) => Ok(None),
    }
}

fn clean_note(note: Option<String>) -> Result<Option<String>, AppError> {
    let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if note.as_ref().is_some_and(|n| n.chars().count() > NOTE_MAX) {
        return Err(AppError::validation(format!(
            "Note must be at most {} characters",
            NOTE_MAX
        )));
    }
    Ok(note)
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS - 1).collect();
    format!("{}…", cut.trim_end())
}

fn ensure_staff(actor: &User) -> Result<(), AppError> {
    if !actor.role().is_staff() {
        return Err(AppError::forbidden("Moderator access required"));
    }
    Ok(())
}

fn ensure_admin(actor: &User, what: &str) -> Result<(), AppError> {
    if actor.role() != Role::Admin {
        return Err(AppError::forbidden(format!("Only admins can {}", what)));
    }
    Ok(())
}

/// Author, visibility and preview of a piece of reportable content.
#[derive(Debug, Clone)]
struct ContentInfo {
    author_id: i32,
    hidden: bool,
    preview: String,
    /// Direct-message participants; `None` for public content.
    participants: Option<(i32, i32)>,
}

/// Service layer for reports and staff tools.
#[derive(Debug, Clone)]
pub struct ModerationService {
    repository: StudyRepository,
}

impl ModerationService {
    /// Creates the service.
    #[instrument(skip_all)]
    pub fn new(repository: StudyRepository) -> Self {
        info!("Creating ModerationService");
        Self { repository }
    }

    fn content(&self, kind: TargetKind, target_id: i32) -> Result<Option<ContentInfo>, AppError> {
        let info = match kind {
            TargetKind::Reviewer => self.repository.get_reviewer(target_id)?.map(|r| ContentInfo {
                author_id: *r.author_id(),
                hidden: *r.hidden(),
                preview: preview(r.title()),
                participants: None,
            }),
            TargetKind::Message => self.repository.get_message(target_id)?.map(|m| ContentInfo {
                author_id: *m.sender_id(),
                hidden: *m.hidden(),
                preview: preview(m.body()),
                participants: m.recipient_id().map(|r| (*m.sender_id(), r)),
            }),
        };
        Ok(info)
    }

    /// Files a report against a reviewer or message.
    ///
    /// # Errors
    ///
    /// Returns not found for missing (or invisible) content, a validation
    /// error for self-reports or bad reasons, forbidden for suspended users,
    /// and a conflict for a duplicate pending report.
    #[instrument(skip(self, reporter, reason), fields(reporter_id = reporter.id()))]
    pub fn report(
        &self,
        reporter: &User,
        target: TargetKind,
        target_id: i32,
        reason: &str,
    ) -> Result<ReportView, AppError> {
        let now = utc_now();
        if reporter.is_suspended_at(now) {
            return Err(AppError::forbidden("Your account is suspended"));
        }
        let reason = reason.trim();
        let len = reason.chars().count();
        if len == 0 || len > REASON_MAX {
            return Err(AppError::validation(format!(
                "Reason must be 1-{} characters",
                REASON_MAX
            )));
        }

        let missing = || AppError::not_found(format!("{} {} not found", target, target_id));
        let content = self.content(target, target_id)?.ok_or_else(missing)?;
        let reporter_id = *reporter.id();
        let visible = match content.participants {
            Some((a, b)) => reporter_id == a || reporter_id == b,
            None => !content.hidden || reporter.role().is_staff(),
        };
        if !visible {
            return Err(missing());
        }
        if content.author_id == reporter_id {
            return Err(AppError::validation("You cannot report your own content"));
        }
        if self
            .repository
            .has_pending_report(reporter_id, target, target_id)?
        {
            return Err(AppError::conflict("You already reported this content"));
        }

        let report = self.repository.create_report(NewReport::new(
            reporter_id,
            target.to_db_string().to_string(),
            target_id,
            content.author_id,
            reason.to_string(),
            ReportStatus::Pending.to_db_string().to_string(),
            now,
        ))?;
        Ok(ReportView::new(&report, None))
    }

    /// Lists reports oldest first, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns forbidden for non-staff.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn list_reports(
        &self,
        actor: &User,
        status: Option<ReportStatus>,
        page: Option<i64>,
        per_page: Option<i64>,
    ) -> Result<Page<ReportView>, AppError> {
        ensure_staff(actor)?;
        let request = PageRequest::resolve(page, per_page, REPORTS_PER_PAGE, MAX_PER_PAGE);
        let (reports, total) =
            self.repository
                .list_reports(status, request.offset(), request.per_page)?;
        let items = reports.iter().map(|r| ReportView::new(r, None)).collect();
        Ok(Page::new(items, request, total))
    }

    /// One report with a snapshot of its target.
    ///
    /// # Errors
    ///
    /// Returns forbidden for non-staff and not found for unknown ids.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn get_report(&self, actor: &User, report_id: i32) -> Result<ReportView, AppError> {
        ensure_staff(actor)?;
        let report = self.load_report(report_id)?;
        let snapshot = self.snapshot(&report)?;
        Ok(ReportView::new(&report, Some(snapshot)))
    }

    fn load_report(&self, report_id: i32) -> Result<Report, AppError> {
        self.repository
            .get_report(report_id)?
            .ok_or_else(|| AppError::not_found(format!("Report {} not found", report_id)))
    }

    fn snapshot(&self, report: &Report) -> Result<TargetSnapshot, AppError> {
        let content = self.content(report.target_kind()?, *report.target_id())?;
        let author_username = self
            .repository
            .get_user(*report.reported_user_id())?
            .map(|u| u.username().clone());
        Ok(match content {
            Some(info) => TargetSnapshot {
                exists: true,
                preview: Some(info.preview),
                hidden: info.hidden,
                author_username,
            },
            None => TargetSnapshot {
                exists: false,
                preview: None,
                hidden: false,
                author_username,
            },
        })
    }

    /// Resolves a report with the chosen action.
    ///
    /// # Errors
    ///
    /// See [`plan_action`]; additionally not found when the content to delete
    /// or hide is already gone.
    #[instrument(skip(self, actor, request), fields(actor_id = actor.id(), action = %request.action))]
    pub fn act(
        &self,
        actor: &User,
        report_id: i32,
        request: ActionRequest,
    ) -> Result<ReportView, AppError> {
        ensure_staff(actor)?;
        let report = self.load_report(report_id)?;
        let target_role = self
            .repository
            .get_user(*report.reported_user_id())?
            .map(|u| u.role())
            .unwrap_or(Role::User);

        let plan = plan_action(actor, &report, target_role, request, utc_now())?;
        debug!(effect = ?plan.effect, "Moderation plan built");
        let resolved = self.repository.apply_moderation(&plan)?;
        let snapshot = self.snapshot(&resolved)?;
        Ok(ReportView::new(&resolved, Some(snapshot)))
    }

    /// Lists users for the admin panel, optionally searching by name.
    ///
    /// # Errors
    ///
    /// Returns forbidden for non-staff.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn list_users(
        &self,
        actor: &User,
        query: Option<&str>,
        page: Option<i64>,
        per_page: Option<i64>,
        online_window: Duration,
    ) -> Result<Page<AdminUserView>, AppError> {
        ensure_staff(actor)?;
        let request = PageRequest::resolve(page, per_page, USERS_PER_PAGE, MAX_PER_PAGE);
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let (users, total) = self
            .repository
            .list_users(query, request.offset(), request.per_page)?;
        let now = utc_now();
        let items = users
            .iter()
            .map(|u| AdminUserView::from_user(u, now, u.is_online_at(now, online_window)))
            .collect();
        Ok(Page::new(items, request, total))
    }

    /// Changes another user's role.
    ///
    /// # Errors
    ///
    /// Returns forbidden unless the actor is an admin changing someone else.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn set_role(&self, actor: &User, user_id: i32, role: Role) -> Result<User, AppError> {
        ensure_admin(actor, "change roles")?;
        if *actor.id() == user_id {
            return Err(AppError::forbidden("You cannot change your own role"));
        }
        let now = utc_now();
        let user = self.repository.set_role(user_id, role, now)?;
        self.audit(actor, "set_role", "user", user_id, Some(user_id), Some(role.to_string()), now);
        Ok(user)
    }

    /// Lifts one or all sanctions from a user.
    ///
    /// # Errors
    ///
    /// Returns forbidden for non-staff, and for moderators lifting a ban.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn lift(&self, actor: &User, user_id: i32, sanction: Sanction) -> Result<User, AppError> {
        ensure_staff(actor)?;
        if matches!(sanction, Sanction::Ban | Sanction::All) {
            ensure_admin(actor, "lift bans")?;
        }
        let now = utc_now();
        let user = self.repository.lift_sanction(user_id, sanction, now)?;
        self.audit(
            actor,
            &format!("lift_{}", sanction),
            "user",
            user_id,
            Some(user_id),
            None,
            now,
        );
        Ok(user)
    }

    /// Makes hidden content visible again.
    ///
    /// # Errors
    ///
    /// Returns forbidden for non-staff and not found for missing content.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn restore(
        &self,
        actor: &User,
        target: TargetKind,
        target_id: i32,
    ) -> Result<TargetSnapshot, AppError> {
        ensure_staff(actor)?;
        let now = utc_now();
        let author_id = match target {
            TargetKind::Reviewer => *self
                .repository
                .set_reviewer_hidden(target_id, false, now)?
                .author_id(),
            TargetKind::Message => *self
                .repository
                .set_message_hidden(target_id, false)?
                .sender_id(),
        };
        self.audit(
            actor,
            "restore",
            target.to_db_string(),
            target_id,
            Some(author_id),
            None,
            now,
        );
        let content = self.content(target, target_id)?;
        let author_username = self
            .repository
            .get_user(author_id)?
            .map(|u| u.username().clone());
        Ok(TargetSnapshot {
            exists: content.is_some(),
            preview: content.as_ref().map(|c| c.preview.clone()),
            hidden: content.is_some_and(|c| c.hidden),
            author_username,
        })
    }

    /// Most recent audit entries first.
    ///
    /// # Errors
    ///
    /// Returns forbidden for non-staff.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn log(&self, actor: &User, limit: Option<i64>) -> Result<Vec<ModerationLogEntry>, AppError> {
        ensure_staff(actor)?;
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        Ok(self.repository.moderation_log(limit)?)
    }

    /// Audit writes outside a report resolution are best effort.
    #[allow(clippy::too_many_arguments)]
    fn audit(
        &self,
        actor: &User,
        action: &str,
        target_type: &str,
        target_id: i32,
        target_user_id: Option<i32>,
        note: Option<String>,
        now: NaiveDateTime,
    ) {
        let entry = NewModerationLogEntry::new(
            None,
            *actor.id(),
            action.to_string(),
            target_type.to_string(),
            target_id,
            target_user_id,
            None,
            note,
            now,
        );
        if let Err(e) = self.repository.record_moderation(entry) {
            warn!(error = %e, action, "Failed to record audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_and_suspend_need_duration() {
        assert!(check_duration(ModerationAction::Mute, None).is_err());
        assert!(check_duration(ModerationAction::Suspend, Some(0)).is_err());
        assert_eq!(
            check_duration(ModerationAction::Suspend, Some(24)).expect("valid"),
            Some(24)
        );
        assert!(check_duration(ModerationAction::Mute, Some(MAX_DURATION_HOURS + 1)).is_err());
    }

    #[test]
    fn ban_duration_is_optional() {
        assert_eq!(check_duration(ModerationAction::Ban, None).expect("permanent"), None);
        assert_eq!(
            check_duration(ModerationAction::Ban, Some(MAX_DURATION_HOURS)).expect("valid"),
            Some(MAX_DURATION_HOURS)
        );
        assert!(check_duration(ModerationAction::Ban, Some(-5)).is_err());
    }

    #[test]
    fn content_actions_reject_duration() {
        for action in [
            ModerationAction::Delete,
            ModerationAction::Hide,
            ModerationAction::Warn,
            ModerationAction::Dismiss,
        ] {
            assert!(check_duration(action, Some(1)).is_err(), "{action}");
            assert_eq!(check_duration(action, None).expect("valid"), None);
        }
    }

    #[test]
    fn blank_notes_are_dropped() {
        assert_eq!(clean_note(Some("   ".into())).expect("ok"), None);
        assert_eq!(
            clean_note(Some(" spam ".into())).expect("ok"),
            Some("spam".to_string())
        );
        assert!(clean_note(Some("n".repeat(NOTE_MAX + 1))).is_err());
    }
}
