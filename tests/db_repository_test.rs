//! Tests for database repository operations.

use chrono::Duration;
use tempfile::NamedTempFile;

use reviewer_hub::{
    DbErrorKind, FlashcardInput, MessageCursor, MessageScope, NewMessage, NewReviewer, NewSubject,
    NewUser, ProfileChanges, ReviewerChanges, ReviewerFilter, Role, Sanction, Session,
    StudyRepository, User, utc_now,
};

/// Creates a temporary database file with schema applied, returns the file
/// handle (must stay in scope to keep the file alive) and a ready repository.
fn setup_test_db() -> (NamedTempFile, StudyRepository) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();

    let repo = StudyRepository::new(db_path).expect("Failed to create repository");
    repo.run_migrations().expect("Migrations failed");
    (db_file, repo)
}

fn create_user(repo: &StudyRepository, username: &str) -> User {
    let now = utc_now();
    repo.create_user(NewUser::new(
        username.to_string(),
        None,
        username.to_string(),
        "hash".to_string(),
        Role::User.to_db_string().to_string(),
        now,
        now,
    ))
    .expect("Create user failed")
}

fn create_subject(repo: &StudyRepository, name: &str) -> i32 {
    *repo
        .create_subject(NewSubject::new(name.to_string(), String::new(), None, utc_now()))
        .expect("Create subject failed")
        .id()
}

fn cards(n: usize) -> Vec<FlashcardInput> {
    (0..n)
        .map(|i| FlashcardInput::new(format!("front {}", i), format!("back {}", i)))
        .collect()
}

fn create_reviewer(repo: &StudyRepository, subject_id: i32, author_id: i32, title: &str) -> i32 {
    let now = utc_now();
    let (reviewer, _) = repo
        .create_reviewer(
            NewReviewer::new(
                subject_id,
                author_id,
                title.to_string(),
                format!("<p>{}</p>", title),
                title.to_string(),
                now,
                now,
            ),
            cards(2),
        )
        .expect("Create reviewer failed");
    *reviewer.id()
}

#[test]
fn test_create_user() {
    let (_db, repo) = setup_test_db();
    let user = create_user(&repo, "alice");
    assert_eq!(user.username(), "alice");
    assert_eq!(user.role(), Role::User);
    assert!(*user.id() > 0);
    assert_eq!(*user.warning_count(), 0);
}

#[test]
fn test_username_unique_case_insensitive() {
    let (_db, repo) = setup_test_db();
    create_user(&repo, "Bob");
    let now = utc_now();
    let result = repo.create_user(NewUser::new(
        "bob".to_string(),
        None,
        "Bob Again".to_string(),
        "hash".to_string(),
        "user".to_string(),
        now,
        now,
    ));
    let err = result.expect_err("Duplicate username should fail");
    assert_eq!(err.kind, DbErrorKind::Conflict);
}

#[test]
fn test_get_user_by_name() {
    let (_db, repo) = setup_test_db();
    create_user(&repo, "carol");
    let found = repo.get_user_by_name("carol").expect("Query failed");
    assert!(found.is_some());
    let missing = repo.get_user_by_name("nobody").expect("Query failed");
    assert!(missing.is_none());
}

#[test]
fn test_update_profile_keeps_unset_fields() {
    let (_db, repo) = setup_test_db();
    let user = create_user(&repo, "dana");
    let changes = ProfileChanges {
        bio: Some("Physics major".to_string()),
        updated_at: Some(utc_now()),
        ..Default::default()
    };
    let updated = repo.update_profile(*user.id(), &changes).expect("Update failed");
    assert_eq!(updated.bio(), "Physics major");
    assert_eq!(updated.display_name(), "dana");
}

#[test]
fn test_session_lookup_and_revocation() {
    let (_db, repo) = setup_test_db();
    let user = create_user(&repo, "erin");
    let now = utc_now();
    repo.create_session(Session::new("tok-1".into(), *user.id(), now, now + Duration::hours(1)))
        .expect("Create session failed");
    repo.create_session(Session::new("tok-2".into(), *user.id(), now, now + Duration::hours(1)))
        .expect("Create session failed");

    let (session, owner) = repo
        .find_session("tok-1")
        .expect("Query failed")
        .expect("Session missing");
    assert_eq!(session.user_id(), owner.id());

    assert_eq!(repo.delete_sessions_for_user(*user.id()).expect("Revoke failed"), 2);
    assert!(repo.find_session("tok-2").expect("Query failed").is_none());
}

#[test]
fn test_purge_expired_sessions() {
    let (_db, repo) = setup_test_db();
    let user = create_user(&repo, "finn");
    let now = utc_now();
    repo.create_session(Session::new("old".into(), *user.id(), now, now - Duration::minutes(1)))
        .expect("Create session failed");
    repo.create_session(Session::new("new".into(), *user.id(), now, now + Duration::hours(1)))
        .expect("Create session failed");

    assert_eq!(repo.purge_expired_sessions(now).expect("Purge failed"), 1);
    assert!(repo.find_session("new").expect("Query failed").is_some());
}

#[test]
fn test_reviewer_flashcards_ordered_and_replaced() {
    let (_db, repo) = setup_test_db();
    let author = create_user(&repo, "gwen");
    let subject = create_subject(&repo, "Biology");
    let reviewer_id = create_reviewer(&repo, subject, *author.id(), "Cells");

    let stored = repo.flashcards_for(reviewer_id).expect("Query failed");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].front(), "front 0");
    assert_eq!(*stored[1].position(), 1);

    let changes = ReviewerChanges {
        title: Some("Cells II".to_string()),
        updated_at: Some(utc_now()),
        ..Default::default()
    };
    let (updated, replaced) = repo
        .update_reviewer(reviewer_id, &changes, Some(cards(3)))
        .expect("Update failed");
    assert_eq!(updated.title(), "Cells II");
    assert_eq!(replaced.len(), 3);

    let counts = repo.flashcard_counts(&[reviewer_id]).expect("Count failed");
    assert_eq!(counts.get(&reviewer_id), Some(&3));
}

#[test]
fn test_reviewer_listing_filters_and_hides() {
    let (_db, repo) = setup_test_db();
    let author = create_user(&repo, "hana");
    let other = create_user(&repo, "ivan");
    let bio = create_subject(&repo, "Biology");
    let chem = create_subject(&repo, "Chemistry");
    let cells = create_reviewer(&repo, bio, *author.id(), "Cell division");
    create_reviewer(&repo, bio, *other.id(), "Genetics");
    create_reviewer(&repo, chem, *author.id(), "Acids");

    let (page, total) = repo
        .list_reviewers(&ReviewerFilter::default().with_subject_id(bio), 0, 10)
        .expect("List failed");
    assert_eq!(total, 2);
    assert_eq!(page.len(), 2);

    let (_, by_author) = repo
        .list_reviewers(&ReviewerFilter::default().with_author_id(*author.id()), 0, 10)
        .expect("List failed");
    assert_eq!(by_author, 2);

    let (found, _) = repo
        .list_reviewers(&ReviewerFilter::default().with_query("division".to_string()), 0, 10)
        .expect("List failed");
    assert_eq!(found.len(), 1);
    assert_eq!(*found[0].id(), cells);

    repo.set_reviewer_hidden(cells, true, utc_now()).expect("Hide failed");
    let (_, visible) = repo
        .list_reviewers(&ReviewerFilter::default(), 0, 10)
        .expect("List failed");
    assert_eq!(visible, 2);
    let (_, all) = repo
        .list_reviewers(&ReviewerFilter::default().including_hidden(true), 0, 10)
        .expect("List failed");
    assert_eq!(all, 3);

    let counts = repo.visible_reviewer_counts().expect("Count failed");
    assert_eq!(counts.get(&bio), Some(&1));
}

#[test]
fn test_delete_subject_in_use_conflicts() {
    let (_db, repo) = setup_test_db();
    let author = create_user(&repo, "jade");
    let subject = create_subject(&repo, "History");
    let reviewer = create_reviewer(&repo, subject, *author.id(), "Rome");

    let err = repo.delete_subject(subject).expect_err("Subject in use");
    assert_eq!(err.kind, DbErrorKind::Conflict);

    assert!(repo.delete_reviewer(reviewer).expect("Delete failed"));
    repo.delete_subject(subject).expect("Delete subject failed");
    let err = repo.delete_subject(subject).expect_err("Already deleted");
    assert_eq!(err.kind, DbErrorKind::NotFound);
}

#[test]
fn test_message_cursors_and_scopes() {
    let (_db, repo) = setup_test_db();
    let kim = create_user(&repo, "kim");
    let lee = create_user(&repo, "lee");
    let now = utc_now();

    let mut room_ids = Vec::new();
    for i in 0..5 {
        let message = repo
            .create_message(NewMessage::new(*kim.id(), None, format!("room {}", i), now))
            .expect("Send failed");
        room_ids.push(*message.id());
    }
    repo.create_message(NewMessage::new(*kim.id(), Some(*lee.id()), "hi lee".into(), now))
        .expect("Send failed");
    repo.create_message(NewMessage::new(*lee.id(), Some(*kim.id()), "hi kim".into(), now))
        .expect("Send failed");

    let latest = repo
        .list_messages(MessageScope::Room, MessageCursor::Latest, 3, false)
        .expect("List failed");
    let ids: Vec<i32> = latest.iter().map(|m| *m.id()).collect();
    assert_eq!(ids, room_ids[2..].to_vec());

    let newer = repo
        .list_messages(MessageScope::Room, MessageCursor::After(room_ids[3]), 10, false)
        .expect("List failed");
    assert_eq!(newer.len(), 1);

    let older = repo
        .list_messages(MessageScope::Room, MessageCursor::Before(room_ids[2]), 10, false)
        .expect("List failed");
    let ids: Vec<i32> = older.iter().map(|m| *m.id()).collect();
    assert_eq!(ids, room_ids[..2].to_vec());

    let conversation = MessageScope::Conversation {
        user_a: *lee.id(),
        user_b: *kim.id(),
    };
    let direct = repo
        .list_messages(conversation, MessageCursor::Latest, 10, false)
        .expect("List failed");
    assert_eq!(direct.len(), 2);
    assert!(direct.iter().all(|m| m.recipient_id().is_some()));

    repo.set_message_hidden(room_ids[4], true).expect("Hide failed");
    let visible = repo
        .list_messages(MessageScope::Room, MessageCursor::Latest, 10, false)
        .expect("List failed");
    assert_eq!(visible.len(), 4);
}

#[test]
fn test_prune_room_messages_keeps_direct_messages() {
    let (_db, repo) = setup_test_db();
    let mia = create_user(&repo, "mia");
    let ned = create_user(&repo, "ned");
    let old = utc_now() - Duration::days(40);
    repo.create_message(NewMessage::new(*mia.id(), None, "old room".into(), old))
        .expect("Send failed");
    repo.create_message(NewMessage::new(*mia.id(), Some(*ned.id()), "old dm".into(), old))
        .expect("Send failed");
    repo.create_message(NewMessage::new(*mia.id(), None, "fresh".into(), utc_now()))
        .expect("Send failed");

    let pruned = repo
        .prune_room_messages(utc_now() - Duration::days(30))
        .expect("Prune failed");
    assert_eq!(pruned, 1);
}

#[test]
fn test_lift_sanction_clears_fields() {
    let (_db, repo) = setup_test_db();
    let user = create_user(&repo, "opal");
    let now = utc_now();
    let updated = repo.set_role(*user.id(), Role::Moderator, now).expect("Role failed");
    assert_eq!(updated.role(), Role::Moderator);

    let lifted = repo
        .lift_sanction(*user.id(), Sanction::All, now)
        .expect("Lift failed");
    assert!(lifted.muted_until().is_none());
    assert!(lifted.suspended_until().is_none());
    assert!(!*lifted.banned());
}

#[test]
fn test_presence_window() {
    let (_db, repo) = setup_test_db();
    let user = create_user(&repo, "pia");
    create_user(&repo, "quinn");
    let now = utc_now();
    repo.touch_last_seen(*user.id(), now).expect("Heartbeat failed");

    let online = repo
        .users_seen_since(now - Duration::seconds(60))
        .expect("Query failed");
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].username(), "pia");
}
