//! File storage for uploaded avatars.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use derive_more::{Display, Error};
use tracing::{debug, info, instrument, warn};

/// File storage error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Storage error: {} at {}:{}", message, file, line)]
pub struct StorageError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl StorageError {
    /// Creates a new storage error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Blob store for user uploads. Names returned by [`FileStore::put`] are
/// relative and safe to embed in URLs.
#[async_trait]
pub trait FileStore: Send + Sync + std::fmt::Debug {
    /// Stores `bytes` under a fresh name ending in `extension`.
    async fn put(&self, bytes: Vec<u8>, extension: &str) -> Result<String, StorageError>;

    /// Removes a previously stored file. Missing files are not an error.
    async fn delete(&self, name: &str) -> Result<(), StorageError>;
}

/// [`FileStore`] writing into a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Creates a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory cannot be created.
    #[instrument(skip(root), fields(root = %root.as_ref().display()))]
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::new(format!("Failed to create {}: {}", root.display(), e))
        })?;
        info!(root = %root.display(), "Local file store ready");
        Ok(Self { root })
    }

    /// Directory files are written to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !name.starts_with('.');
        if !valid {
            return Err(StorageError::new(format!("Invalid stored file name '{}'", name)));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn put(&self, bytes: Vec<u8>, extension: &str) -> Result<String, StorageError> {
        let name = format!("{}.{}", uuid::Uuid::new_v4(), extension);
        let path = self.resolve(&name)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::new(format!("Failed to write {}: {}", path.display(), e)))?;
        debug!(name = %name, "File stored");
        Ok(name)
    }

    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(name, "File removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(name, "File already gone");
                Ok(())
            }
            Err(e) => Err(StorageError::new(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// File extension for an accepted image content type.
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}
