//! Application error shared by the service layer and the HTTP surface.

use axum::{
    Json,
    extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use derive_more::{Display, Error};
use serde_json::json;
use tracing::{error, warn};

use crate::db::{DbError, DbErrorKind};
use crate::password::PasswordError;
use crate::storage::StorageError;

/// Error returned by every service operation.
#[derive(Debug, Display, Error)]
pub enum AppError {
    /// Input failed validation.
    #[display("{message}")]
    Validation {
        /// Explanation for the client.
        message: String,
    },
    /// Missing or invalid credentials.
    #[display("{message}")]
    Unauthorized {
        /// Explanation for the client.
        message: String,
    },
    /// Authenticated but not allowed.
    #[display("{message}")]
    Forbidden {
        /// Explanation for the client.
        message: String,
    },
    /// The requested resource does not exist (or is not visible to the caller).
    #[display("{message}")]
    NotFound {
        /// Explanation for the client.
        message: String,
    },
    /// The request conflicts with current state.
    #[display("{message}")]
    Conflict {
        /// Explanation for the client.
        message: String,
    },
    /// Upload exceeds the configured size.
    #[display("{message}")]
    PayloadTooLarge {
        /// Explanation for the client.
        message: String,
    },
    /// Upload has an unsupported content type.
    #[display("{message}")]
    UnsupportedMedia {
        /// Explanation for the client.
        message: String,
    },
    /// The caller is sending too fast.
    #[display("{message}")]
    TooManyRequests {
        /// Explanation for the client.
        message: String,
    },
    /// Unexpected database failure.
    #[display("{_0}")]
    Db(DbError),
    /// Password hashing failure.
    #[display("{_0}")]
    Password(PasswordError),
    /// File storage failure.
    #[display("{_0}")]
    Storage(StorageError),
    /// Any other internal failure.
    #[display("{message}")]
    Internal {
        /// Description for the logs.
        message: String,
    },
}

impl AppError {
    /// Invalid input.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Missing or bad credentials.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    /// Permission denied.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    /// Missing resource.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// State conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Oversized upload.
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::PayloadTooLarge { message: message.into() }
    }

    /// Unsupported upload type.
    pub fn unsupported_media(message: impl Into<String>) -> Self {
        Self::UnsupportedMedia { message: message.into() }
    }

    /// Rate limited.
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::TooManyRequests { message: message.into() }
    }

    /// Internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMedia { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Db(_) | Self::Password(_) | Self::Storage(_) | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err.kind {
            DbErrorKind::NotFound => Self::not_found(err.message),
            DbErrorKind::Conflict => Self::conflict(err.message),
            DbErrorKind::Other => Self::Db(err),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        Self::Password(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Maps an extractor rejection onto the matching variant.
fn from_rejection(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::payload_too_large(message),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => AppError::unsupported_media(message),
        s if s.is_client_error() => AppError::validation(message),
        _ => AppError::internal(message),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("Background task failed: {}", err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            warn!(status = %status, error = %self, "Request rejected");
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Runs a synchronous service call on the blocking pool.
///
/// # Errors
///
/// Returns the closure's error, or [`AppError::Internal`] if the task panicked.
pub async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
