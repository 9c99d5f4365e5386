//! Shared application state handed to every request handler.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::account_service::AccountService;
use crate::chat_service::ChatService;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::moderation_service::ModerationService;
use crate::reviewer_service::ReviewerService;
use crate::storage::FileStore;
use crate::StudyRepository;

/// Services and configuration shared by all handlers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Accounts, sessions and presence.
    pub accounts: AccountService,
    /// Subjects and reviewers.
    pub reviewers: ReviewerService,
    /// Chat room and direct messages.
    pub chat: ChatService,
    /// Reports and staff tools.
    pub moderation: ModerationService,
    /// Upload storage.
    pub files: Arc<dyn FileStore>,
}

impl AppState {
    /// Wires the services around one repository.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if a service rejects the configuration.
    #[instrument(skip_all, fields(db_path = %repository.db_path()))]
    pub fn new(
        config: AppConfig,
        repository: StudyRepository,
        files: Arc<dyn FileStore>,
    ) -> Result<Self, AppError> {
        let accounts = AccountService::new(repository.clone(), &config)?;
        let reviewers = ReviewerService::new(repository.clone(), &config)?;
        let chat = ChatService::new(repository.clone(), &config);
        let moderation = ModerationService::new(repository);
        info!("Application state ready");
        Ok(Self {
            config: Arc::new(config),
            accounts,
            reviewers,
            chat,
            moderation,
            files,
        })
    }
}
