//! Typed REST client for the reviewer hub API.
//!
//! Used by the terminal chat command and by integration tests. Reviewer
//! listings go through a [`PageCache`]; chat reads go through a
//! [`ChatPoller`].

mod cache;
mod poller;

use std::time::Duration;

use derive_more::{Display, Error};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use cache::PageCache;
pub use poller::ChatPoller;

use crate::chat_service::MessageQuery;
use crate::pagination::Page;
use crate::reviewer_service::ReviewerDraft;
use crate::views::{
    AccountView, AuthResponse, CreateSubject, LoginRequest, MessageView, OnlineUser,
    RegisterRequest, ReportRequest, ReportView, ReviewerDetail, ReviewerSummary, SendMessage,
    SubjectView,
};
use crate::TargetKind;

/// How long reviewer listing pages stay cached.
pub const DEFAULT_PAGE_TTL: Duration = Duration::from_secs(30);

/// Client-side error with the HTTP status when the server answered.
#[derive(Debug, Clone, Display, Error)]
#[display("Client error: {}", message)]
pub struct ClientError {
    /// Error message (the server's `error` field when available).
    pub message: String,
    /// HTTP status returned by the server.
    pub status: Option<u16>,
}

impl ClientError {
    /// Creates an error that did not come from an HTTP response.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    fn from_status(status: StatusCode, message: String) -> Self {
        Self {
            message,
            status: Some(status.as_u16()),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        Self::new(format!("Invalid URL: {}", err))
    }
}

/// Filters for a reviewer listing page; also the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ReviewerQuery {
    /// Only this subject.
    pub subject_id: Option<i32>,
    /// Only this author.
    pub author_id: Option<i32>,
    /// Title/excerpt search.
    pub q: Option<String>,
    /// 1-based page.
    pub page: Option<i64>,
    /// Page size.
    pub per_page: Option<i64>,
}

/// HTTP client holding the base URL, a session token and the listing cache.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    token: Option<String>,
    pages: PageCache<ReviewerQuery, Page<ReviewerSummary>>,
}

impl ApiClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the URL is invalid.
    #[instrument]
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            token: None,
            pages: PageCache::new(DEFAULT_PAGE_TTL),
        })
    }

    /// Session token in use, if logged in.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Uses an existing session token.
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Cached reviewer listing pages.
    pub fn page_cache(&self) -> &PageCache<ReviewerQuery, Page<ReviewerSummary>> {
        &self.pages
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {}", status));
        warn!(status = %status, message = %message, "Request failed");
        Err(ClientError::from_status(status, message))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        let response = self.send(self.request(method, url).json(body)).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(&self, method: Method, path: &str) -> Result<(), ClientError> {
        let url = self.url(path)?;
        self.send(self.request(method, url)).await?;
        Ok(())
    }

    /// Creates an account and keeps its session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    #[instrument(skip(self, password))]
    pub async fn register(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let body = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            display_name: None,
            email: None,
        };
        let auth: AuthResponse = self.send_json(Method::POST, "api/auth/register", &body).await?;
        self.token = Some(auth.token.clone());
        info!(user_id = auth.user.profile.id, "Registered");
        Ok(auth)
    }

    /// Logs in and keeps the session token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    #[instrument(skip(self, password))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let auth: AuthResponse = self.send_json(Method::POST, "api/auth/login", &body).await?;
        self.token = Some(auth.token.clone());
        info!(user_id = auth.user.profile.id, "Logged in");
        Ok(auth)
    }

    /// Ends the session and forgets the token.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    #[instrument(skip(self))]
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        if self.token.is_none() {
            return Ok(());
        }
        self.send_empty(Method::POST, "api/auth/logout").await?;
        self.token = None;
        Ok(())
    }

    /// The logged-in account.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn me(&self) -> Result<AccountView, ClientError> {
        self.get_json(self.url("api/me")?).await
    }

    /// Marks the caller as online.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn heartbeat(&self) -> Result<(), ClientError> {
        self.send_empty(Method::POST, "api/presence/heartbeat").await
    }

    /// Users active within the server's online window.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn online_users(&self) -> Result<Vec<OnlineUser>, ClientError> {
        self.get_json(self.url("api/presence/online")?).await
    }

    /// Every subject.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn subjects(&self) -> Result<Vec<SubjectView>, ClientError> {
        self.get_json(self.url("api/subjects")?).await
    }

    /// Creates a subject.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn create_subject(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<SubjectView, ClientError> {
        let body = CreateSubject {
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        self.send_json(Method::POST, "api/subjects", &body).await
    }

    /// One page of reviewers, served from the cache while fresh.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    #[instrument(skip(self))]
    pub async fn reviewers(&self, query: &ReviewerQuery) -> Result<Page<ReviewerSummary>, ClientError> {
        if let Some(page) = self.pages.get(query) {
            debug!("Reviewer page served from cache");
            return Ok(page);
        }

        let mut url = self.url("api/reviewers")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(id) = query.subject_id {
                pairs.append_pair("subject_id", &id.to_string());
            }
            if let Some(id) = query.author_id {
                pairs.append_pair("author_id", &id.to_string());
            }
            if let Some(q) = &query.q {
                pairs.append_pair("q", q);
            }
            if let Some(page) = query.page {
                pairs.append_pair("page", &page.to_string());
            }
            if let Some(per_page) = query.per_page {
                pairs.append_pair("per_page", &per_page.to_string());
            }
        }
        let page: Page<ReviewerSummary> = self.get_json(url).await?;
        self.pages.insert(query.clone(), page.clone());
        Ok(page)
    }

    /// Full reviewer.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn reviewer(&self, reviewer_id: i32) -> Result<ReviewerDetail, ClientError> {
        self.get_json(self.url(&format!("api/reviewers/{}", reviewer_id))?)
            .await
    }

    /// Publishes a reviewer and invalidates cached listings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    pub async fn create_reviewer(&self, draft: &ReviewerDraft) -> Result<ReviewerDetail, ClientError> {
        let detail = self.send_json(Method::POST, "api/reviewers", draft).await?;
        self.pages.invalidate_all();
        Ok(detail)
    }

    /// Deletes a reviewer and invalidates cached listings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    #[instrument(skip(self))]
    pub async fn delete_reviewer(&self, reviewer_id: i32) -> Result<(), ClientError> {
        self.send_empty(Method::DELETE, &format!("api/reviewers/{}", reviewer_id))
            .await?;
        self.pages.invalidate_all();
        Ok(())
    }

    /// Reads chat messages.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn messages(&self, query: &MessageQuery) -> Result<Vec<MessageView>, ClientError> {
        let mut url = self.url("api/messages")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(after) = query.after {
                pairs.append_pair("after", &after.to_string());
            }
            if let Some(before) = query.before {
                pairs.append_pair("before", &before.to_string());
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(with) = query.with {
                pairs.append_pair("with", &with.to_string());
            }
        }
        self.get_json(url).await
    }

    /// Sends a chat message to the room or to one user.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn send_message(
        &self,
        body: &str,
        recipient_id: Option<i32>,
    ) -> Result<MessageView, ClientError> {
        let body = SendMessage {
            body: body.to_string(),
            recipient_id,
        };
        self.send_json(Method::POST, "api/messages", &body).await
    }

    /// Reports a reviewer or message.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on HTTP or server errors.
    pub async fn report(
        &self,
        target_type: TargetKind,
        target_id: i32,
        reason: &str,
    ) -> Result<ReportView, ClientError> {
        let body = ReportRequest {
            target_type,
            target_id,
            reason: reason.to_string(),
        };
        self.send_json(Method::POST, "api/reports", &body).await
    }
}
