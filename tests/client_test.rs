//! REST client tests against a live server on a random port.

mod common;

use reviewer_hub::client::{ApiClient, ChatPoller, ReviewerQuery};
use reviewer_hub::{FlashcardInput, ReviewerDraft, TargetKind, api};
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn spawn_server() -> (TempDir, String) {
    let (dir, state) = common::setup_state();
    let app = api::router(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let address = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });
    (dir, format!("http://{}", address))
}

#[tokio::test]
async fn test_login_and_profile() {
    let (_dir, url) = spawn_server().await;
    let mut client = ApiClient::new(&url).expect("Client setup failed");
    client
        .register("ada", "correct horse")
        .await
        .expect("Register failed");

    let mut other = ApiClient::new(&url).expect("Client setup failed");
    let auth = other.login("ada", "correct horse").await.expect("Login failed");
    assert_eq!(auth.user.profile.username, "ada");
    assert!(other.token().is_some());

    let me = other.me().await.expect("Profile failed");
    assert_eq!(me.profile.id, auth.user.profile.id);

    other.logout().await.expect("Logout failed");
    assert!(other.token().is_none());
    let err = other.me().await.expect_err("Logged out client must fail");
    assert_eq!(err.status, Some(401));
}

#[tokio::test]
async fn test_wrong_password_reports_status() {
    let (_dir, url) = spawn_server().await;
    let mut client = ApiClient::new(&url).expect("Client setup failed");
    client
        .register("ada", "correct horse")
        .await
        .expect("Register failed");

    let mut intruder = ApiClient::new(&url).expect("Client setup failed");
    let err = intruder
        .login("ada", "battery staple")
        .await
        .expect_err("Wrong password must fail");
    assert_eq!(err.status, Some(401));
    assert!(!err.message.is_empty());
}

#[tokio::test]
async fn test_reviewer_pages_cached_until_write() {
    let (_dir, url) = spawn_server().await;
    let mut client = ApiClient::new(&url).expect("Client setup failed");
    client
        .register("author", "correct horse")
        .await
        .expect("Register failed");
    let subject = client
        .create_subject("Chemistry", Some("Organic"))
        .await
        .expect("Create subject failed");

    let draft = |title: &str| ReviewerDraft {
        subject_id: subject.id,
        title: title.to_string(),
        content: "<p>Carbon chains</p>".to_string(),
        flashcards: vec![FlashcardInput::new("C".into(), "Carbon".into())],
    };
    client
        .create_reviewer(&draft("Alkanes"))
        .await
        .expect("Create reviewer failed");

    let query = ReviewerQuery {
        subject_id: Some(subject.id),
        ..Default::default()
    };
    let first = client.reviewers(&query).await.expect("Listing failed");
    assert_eq!(first.total, 1);
    assert_eq!(client.page_cache().len(), 1);

    let cached = client.reviewers(&query).await.expect("Listing failed");
    assert_eq!(cached, first);

    let created = client
        .create_reviewer(&draft("Alkenes"))
        .await
        .expect("Create reviewer failed");
    assert!(client.page_cache().is_empty());
    let fresh = client.reviewers(&query).await.expect("Listing failed");
    assert_eq!(fresh.total, 2);

    let detail = client
        .reviewer(created.summary.id)
        .await
        .expect("Detail failed");
    assert_eq!(detail.flashcards.len(), 1);

    client
        .delete_reviewer(created.summary.id)
        .await
        .expect("Delete failed");
    let err = client
        .reviewer(created.summary.id)
        .await
        .expect_err("Deleted reviewer must be gone");
    assert_eq!(err.status, Some(404));
}

#[tokio::test]
async fn test_chat_poller_reads_only_new_messages() {
    let (_dir, url) = spawn_server().await;
    let mut ada = ApiClient::new(&url).expect("Client setup failed");
    ada.register("ada", "correct horse")
        .await
        .expect("Register failed");
    let mut bob = ApiClient::new(&url).expect("Client setup failed");
    bob.register("bob", "correct horse")
        .await
        .expect("Register failed");

    for text in ["hello", "anyone here?"] {
        ada.send_message(text, None).await.expect("Send failed");
    }

    let mut poller = ChatPoller::room(50);
    let first = poller.poll(&bob).await.expect("Poll failed");
    assert_eq!(first.len(), 2);

    assert!(poller.poll(&bob).await.expect("Poll failed").is_empty());

    let reply = bob.send_message("hi ada", None).await.expect("Send failed");
    let next = poller.poll(&bob).await.expect("Poll failed");
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].body, "hi ada");
    assert_eq!(poller.last_id(), Some(reply.id));

    bob.heartbeat().await.expect("Heartbeat failed");
    let online = ada.online_users().await.expect("Presence failed");
    assert!(online.iter().any(|u| u.username == "bob"));

    let report = bob
        .report(TargetKind::Message, first[0].id, "off topic")
        .await
        .expect("Report failed");
    assert_eq!(report.status, "pending");
}
