//! Tests for the report and moderation workflow at the service level.

mod common;

use common::{admin, moderator, publish, register, setup_state};
use reviewer_hub::{
    ActionRequest, AppError, AppState, MAX_DURATION_HOURS, ModerationAction, PageRequest,
    ReviewerFilter, TargetKind, User,
};

fn reload(state: &AppState, user: &User) -> User {
    state
        .accounts
        .repository()
        .get_user(*user.id())
        .expect("Query failed")
        .expect("User missing")
}

fn action(action: ModerationAction, duration_hours: Option<i32>) -> ActionRequest {
    ActionRequest {
        action,
        duration_hours,
        note: None,
    }
}

fn subject(state: &AppState, author: &User, name: &str) -> i32 {
    state
        .reviewers
        .create_subject(author, name, None)
        .expect("Create subject failed")
        .id
}

#[test]
fn test_reporting_own_content_rejected() {
    let (_dir, state) = setup_state();
    let author = register(&state, "author");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");

    let result = state
        .moderation
        .report(&author, TargetKind::Reviewer, reviewer_id, "spam");
    assert!(matches!(result, Err(AppError::Validation { .. })));
}

#[test]
fn test_duplicate_pending_report_conflicts() {
    let (_dir, state) = setup_state();
    let author = register(&state, "author");
    let reporter = register(&state, "reporter");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");

    let report = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, reviewer_id, "copied")
        .expect("Report failed");
    assert_eq!(report.status, "pending");
    assert_eq!(report.reported_user_id, *author.id());

    let again = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, reviewer_id, "copied again");
    assert!(matches!(again, Err(AppError::Conflict { .. })));
}

#[test]
fn test_direct_message_report_requires_participant() {
    let (_dir, state) = setup_state();
    let sender = register(&state, "sender");
    let recipient = register(&state, "recipient");
    let outsider = register(&state, "outsider");
    let message = state
        .chat
        .send(&sender, "rude words", Some(*recipient.id()))
        .expect("Send failed");

    let hidden = state
        .moderation
        .report(&outsider, TargetKind::Message, message.id, "rude");
    assert!(matches!(hidden, Err(AppError::NotFound { .. })));

    state
        .moderation
        .report(&recipient, TargetKind::Message, message.id, "rude")
        .expect("Participant report failed");
}

#[test]
fn test_regular_users_cannot_moderate() {
    let (_dir, state) = setup_state();
    let author = register(&state, "author");
    let reporter = register(&state, "reporter");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");
    let report = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, reviewer_id, "spam")
        .expect("Report failed");

    let result = state
        .moderation
        .act(&reporter, report.id, action(ModerationAction::Dismiss, None));
    assert!(matches!(result, Err(AppError::Forbidden { .. })));
    let listing = state.moderation.list_reports(&reporter, None, None, None);
    assert!(matches!(listing, Err(AppError::Forbidden { .. })));
}

#[test]
fn test_hide_resolves_sibling_reports() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let moderator = moderator(&state, &root, "mod");
    let author = register(&state, "author");
    let first = register(&state, "first");
    let second = register(&state, "second");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");

    let report = state
        .moderation
        .report(&first, TargetKind::Reviewer, reviewer_id, "spam")
        .expect("Report failed");
    state
        .moderation
        .report(&second, TargetKind::Reviewer, reviewer_id, "spam too")
        .expect("Report failed");

    let resolved = state
        .moderation
        .act(&moderator, report.id, action(ModerationAction::Hide, None))
        .expect("Hide failed");
    assert_eq!(resolved.status, "resolved");
    assert_eq!(resolved.resolution_action.as_deref(), Some("hide"));
    let snapshot = resolved.target.expect("Snapshot missing");
    assert!(snapshot.exists);
    assert!(snapshot.hidden);

    let pending = state
        .moderation
        .list_reports(&moderator, Some(reviewer_hub::ReportStatus::Pending), None, None)
        .expect("Listing failed");
    assert_eq!(pending.total, 0);

    let hidden = state.reviewers.get_reviewer(reviewer_id, Some(&first));
    assert!(matches!(hidden, Err(AppError::NotFound { .. })));
    state
        .reviewers
        .get_reviewer(reviewer_id, Some(&author))
        .expect("Author still sees hidden reviewer");

    let listing = state
        .reviewers
        .list_reviewers(ReviewerFilter::default(), PageRequest::resolve(None, None, 12, 50), None)
        .expect("Listing failed");
    assert_eq!(listing.total, 0);
}

#[test]
fn test_closed_report_cannot_be_reopened() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let author = register(&state, "author");
    let reporter = register(&state, "reporter");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");
    let report = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, reviewer_id, "spam")
        .expect("Report failed");

    let dismissed = state
        .moderation
        .act(&root, report.id, action(ModerationAction::Dismiss, None))
        .expect("Dismiss failed");
    assert_eq!(dismissed.status, "dismissed");

    let again = state
        .moderation
        .act(&root, report.id, action(ModerationAction::Delete, None));
    assert!(matches!(again, Err(AppError::Conflict { .. })));
}

#[test]
fn test_only_admins_ban() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let moderator = moderator(&state, &root, "mod");
    let (troll, session) = state
        .accounts
        .register("troll", "correct horse", None, None)
        .expect("Register failed");
    let reporter = register(&state, "reporter");
    let message = state.chat.send(&troll, "spam spam", None).expect("Send failed");
    let report = state
        .moderation
        .report(&reporter, TargetKind::Message, message.id, "spam")
        .expect("Report failed");

    let denied = state
        .moderation
        .act(&moderator, report.id, action(ModerationAction::Ban, None));
    assert!(matches!(denied, Err(AppError::Forbidden { .. })));

    state
        .moderation
        .act(&root, report.id, action(ModerationAction::Ban, Some(48)))
        .expect("Ban failed");

    let revoked = state.accounts.authenticate(session.token());
    assert!(revoked.is_err());
    let login = state.accounts.login("troll", "correct horse");
    assert!(matches!(login, Err(AppError::Forbidden { .. })));

    let lift = state
        .moderation
        .lift(&moderator, *troll.id(), reviewer_hub::Sanction::Ban);
    assert!(matches!(lift, Err(AppError::Forbidden { .. })));
    state
        .moderation
        .lift(&root, *troll.id(), reviewer_hub::Sanction::Ban)
        .expect("Lift failed");
    state
        .accounts
        .login("troll", "correct horse")
        .expect("Login after lift failed");
}

#[test]
fn test_moderators_cannot_act_on_equal_rank() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let first = moderator(&state, &root, "mod1");
    let second = moderator(&state, &root, "mod2");
    let reporter = register(&state, "reporter");
    let message = state.chat.send(&second, "off topic", None).expect("Send failed");
    let report = state
        .moderation
        .report(&reporter, TargetKind::Message, message.id, "off topic")
        .expect("Report failed");

    let denied = state
        .moderation
        .act(&first, report.id, action(ModerationAction::Delete, None));
    assert!(matches!(denied, Err(AppError::Forbidden { .. })));

    state
        .moderation
        .act(&first, report.id, action(ModerationAction::Dismiss, None))
        .expect("Dismiss is always allowed");
}

#[test]
fn test_mute_needs_valid_duration_and_blocks_chat() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let moderator = moderator(&state, &root, "mod");
    let noisy = register(&state, "noisy");
    let reporter = register(&state, "reporter");
    let message = state.chat.send(&noisy, "LOUD", None).expect("Send failed");
    let report = state
        .moderation
        .report(&reporter, TargetKind::Message, message.id, "shouting")
        .expect("Report failed");

    let missing = state
        .moderation
        .act(&moderator, report.id, action(ModerationAction::Mute, None));
    assert!(matches!(missing, Err(AppError::Validation { .. })));
    let too_long = state.moderation.act(
        &moderator,
        report.id,
        action(ModerationAction::Mute, Some(MAX_DURATION_HOURS + 1)),
    );
    assert!(matches!(too_long, Err(AppError::Validation { .. })));

    state
        .moderation
        .act(&moderator, report.id, action(ModerationAction::Mute, Some(2)))
        .expect("Mute failed");

    let noisy = reload(&state, &noisy);
    assert!(noisy.muted_until().is_some());
    let blocked = state.chat.send(&noisy, "still here", None);
    assert!(matches!(blocked, Err(AppError::Forbidden { .. })));
}

#[test]
fn test_warn_records_warning() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let author = register(&state, "author");
    let reporter = register(&state, "reporter");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");
    let report = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, reviewer_id, "plagiarism")
        .expect("Report failed");

    let request = ActionRequest {
        action: ModerationAction::Warn,
        duration_hours: None,
        note: Some("Cite your sources".to_string()),
    };
    state.moderation.act(&root, report.id, request).expect("Warn failed");

    let author = reload(&state, &author);
    assert_eq!(*author.warning_count(), 1);
    let warnings = state.accounts.warnings(*author.id()).expect("Warnings failed");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].note(), "Cite your sources");

    let log = state.moderation.log(&root, None).expect("Log failed");
    assert!(log.iter().any(|entry| entry.action() == "warn"));
}

#[test]
fn test_delete_then_restore_fails_but_hide_restores() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let author = register(&state, "author");
    let reporter = register(&state, "reporter");
    let subject_id = subject(&state, &author, "Algebra");
    let kept = publish(&state, &author, subject_id, "Vectors");
    let removed = publish(&state, &author, subject_id, "Spam");

    let hide = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, kept, "unsure")
        .expect("Report failed");
    state
        .moderation
        .act(&root, hide.id, action(ModerationAction::Hide, None))
        .expect("Hide failed");
    let snapshot = state
        .moderation
        .restore(&root, TargetKind::Reviewer, kept)
        .expect("Restore failed");
    assert!(snapshot.exists);
    assert!(!snapshot.hidden);
    state
        .reviewers
        .get_reviewer(kept, Some(&reporter))
        .expect("Restored reviewer visible");

    let delete = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, removed, "spam")
        .expect("Report failed");
    let resolved = state
        .moderation
        .act(&root, delete.id, action(ModerationAction::Delete, None))
        .expect("Delete failed");
    assert!(!resolved.target.expect("Snapshot missing").exists);
    let restore = state.moderation.restore(&root, TargetKind::Reviewer, removed);
    assert!(matches!(restore, Err(AppError::NotFound { .. })));
}

#[test]
fn test_suspension_blocks_posting_and_reporting() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let author = register(&state, "author");
    let reporter = register(&state, "reporter");
    let subject_id = subject(&state, &reporter, "Algebra");
    let reviewer_id = publish(&state, &reporter, subject_id, "Matrices");
    let message = state.chat.send(&author, "buy now", None).expect("Send failed");
    let report = state
        .moderation
        .report(&reporter, TargetKind::Message, message.id, "advertising")
        .expect("Report failed");

    state
        .moderation
        .act(&root, report.id, action(ModerationAction::Suspend, Some(24)))
        .expect("Suspend failed");

    let author = reload(&state, &author);
    assert!(author.suspended_until().is_some());
    assert!(author.is_suspended_at(reviewer_hub::utc_now()));

    let draft = reviewer_hub::ReviewerDraft {
        subject_id,
        title: "Vectors".to_string(),
        content: "<p>Arrows</p>".to_string(),
        flashcards: Vec::new(),
    };
    let reviewer = state.reviewers.create_reviewer(&author, draft);
    assert!(matches!(reviewer, Err(AppError::Forbidden { .. })));
    let new_subject = state.reviewers.create_subject(&author, "Geometry", None);
    assert!(matches!(new_subject, Err(AppError::Forbidden { .. })));
    let filed = state
        .moderation
        .report(&author, TargetKind::Reviewer, reviewer_id, "revenge");
    assert!(matches!(filed, Err(AppError::Forbidden { .. })));
}

#[test]
fn test_acting_on_vanished_content_leaves_report_pending() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let author = register(&state, "author");
    let reporter = register(&state, "reporter");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");
    let message = state.chat.send(&author, "oops", None).expect("Send failed");

    let on_reviewer = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, reviewer_id, "spam")
        .expect("Report failed");
    let on_message = state
        .moderation
        .report(&reporter, TargetKind::Message, message.id, "spam")
        .expect("Report failed");

    state
        .reviewers
        .delete_reviewer(&author, reviewer_id)
        .expect("Author delete failed");
    state.chat.delete(&author, message.id).expect("Sender delete failed");

    let deleted = state
        .moderation
        .act(&root, on_reviewer.id, action(ModerationAction::Delete, None));
    assert!(matches!(deleted, Err(AppError::NotFound { .. })));
    let hidden = state
        .moderation
        .act(&root, on_message.id, action(ModerationAction::Hide, None));
    assert!(matches!(hidden, Err(AppError::NotFound { .. })));

    for id in [on_reviewer.id, on_message.id] {
        let report = state.moderation.get_report(&root, id).expect("Report missing");
        assert_eq!(report.status, "pending");
        assert!(report.resolved_by.is_none());
        assert!(!report.target.expect("Snapshot missing").exists);
    }
    let log = state.moderation.log(&root, None).expect("Log failed");
    assert!(
        log.iter()
            .all(|entry| *entry.report_id() != Some(on_reviewer.id)
                && *entry.report_id() != Some(on_message.id))
    );
}

#[test]
fn test_hidden_reviewer_delete_looks_missing_to_others() {
    let (_dir, state) = setup_state();
    let root = admin(&state, "root");
    let author = register(&state, "author");
    let reporter = register(&state, "reporter");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");
    let report = state
        .moderation
        .report(&reporter, TargetKind::Reviewer, reviewer_id, "spam")
        .expect("Report failed");
    state
        .moderation
        .act(&root, report.id, action(ModerationAction::Hide, None))
        .expect("Hide failed");

    let denied = state.reviewers.delete_reviewer(&reporter, reviewer_id);
    assert!(matches!(denied, Err(AppError::NotFound { .. })));
    state
        .reviewers
        .delete_reviewer(&author, reviewer_id)
        .expect("Author can still delete");
}

#[test]
fn test_visible_reviewer_delete_by_stranger_forbidden() {
    let (_dir, state) = setup_state();
    let author = register(&state, "author");
    let stranger = register(&state, "stranger");
    let subject_id = subject(&state, &author, "Algebra");
    let reviewer_id = publish(&state, &author, subject_id, "Matrices");

    let denied = state.reviewers.delete_reviewer(&stranger, reviewer_id);
    assert!(matches!(denied, Err(AppError::Forbidden { .. })));
}
