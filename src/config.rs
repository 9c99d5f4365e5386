//! Server configuration loaded from TOML, `.env` and environment variables.

use std::path::{Path, PathBuf};

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Root configuration.
#[derive(Debug, Clone, Default, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    server: ServerConfig,
    /// Database file location.
    database: DatabaseConfig,
    /// Uploaded file storage.
    storage: StorageConfig,
    /// Sessions and password hashing.
    auth: AuthConfig,
    /// Chat polling, presence and throttling.
    chat: ChatConfig,
    /// Reviewer listing pagination.
    reviewers: ReviewerListConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    host: String,
    /// Port to bind.
    port: u16,
    /// Directory with the browser front end, served at `/` when set.
    static_dir: Option<PathBuf>,
    /// Origins allowed by CORS. Empty disables the CORS layer.
    allowed_origins: Vec<String>,
    /// Largest accepted JSON body in bytes.
    max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: None,
            allowed_origins: Vec::new(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Database file location.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path.
    path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "reviewer_hub.db".to_string(),
        }
    }
}

/// Uploaded file storage.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory where avatars are written; served under `/uploads`.
    upload_dir: PathBuf,
    /// Largest accepted upload in bytes.
    max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Sessions and password hashing.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of a login session.
    session_ttl_hours: i64,
    /// Argon2 memory cost in KiB.
    hash_memory_kib: u32,
    /// Argon2 iteration count.
    hash_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24 * 7,
            hash_memory_kib: 19 * 1024,
            hash_iterations: 2,
        }
    }
}

/// Chat polling, presence and throttling.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// A user counts as online if their last heartbeat is this recent.
    online_window_secs: i64,
    /// Minimum gap between two messages from the same user.
    min_send_interval_millis: u64,
    /// Messages returned when the client does not ask for a count.
    default_limit: i64,
    /// Upper bound on messages per request.
    max_limit: i64,
    /// Room messages older than this are pruned at startup. Zero keeps everything.
    retention_days: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            online_window_secs: 60,
            min_send_interval_millis: 1000,
            default_limit: 50,
            max_limit: 100,
            retention_days: 0,
        }
    }
}

/// Reviewer listing pagination.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewerListConfig {
    /// Page size when the client does not ask for one.
    default_per_page: i64,
    /// Upper bound on page size.
    max_per_page: i64,
}

impl Default for ReviewerListConfig {
    fn default() -> Self {
        Self {
            default_per_page: 12,
            max_per_page: 50,
        }
    }
}

impl AppConfig {
    /// Parses configuration from TOML text. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML for this schema.
    #[instrument(skip(content))]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Config loaded successfully");
        Ok(config)
    }

    /// Loads the file at `path` if given and present, otherwise defaults, then
    /// applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is unreadable or the result is invalid.
    #[instrument(skip(path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) => {
                warn!(path = %p.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides selected fields from `REVIEWER_HUB_*` variables returned by `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric override does not parse.
    #[instrument(skip(self, lookup))]
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("REVIEWER_HUB_HOST") {
            info!(host = %host, "Host overridden from environment");
            self.server.host = host;
        }
        if let Some(port) = lookup("REVIEWER_HUB_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| ConfigError::new(format!("Invalid REVIEWER_HUB_PORT '{}': {}", port, e)))?;
            info!(port = self.server.port, "Port overridden from environment");
        }
        if let Some(path) = lookup("REVIEWER_HUB_DATABASE") {
            info!(path = %path, "Database path overridden from environment");
            self.database.path = path;
        }
        if let Some(dir) = lookup("REVIEWER_HUB_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("REVIEWER_HUB_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Applies command-line overrides.
    pub fn override_listener(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
    }

    /// Points the configuration at another database file.
    pub fn override_database(&mut self, path: String) {
        self.database.path = path;
    }

    /// Points the configuration at another upload directory.
    pub fn override_upload_dir(&mut self, dir: PathBuf) {
        self.storage.upload_dir = dir;
    }

    /// Checks semantic constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violated constraint.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::new("server.port must be non-zero".to_string()));
        }
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::new("database.path must not be empty".to_string()));
        }
        if self.auth.session_ttl_hours <= 0 {
            return Err(ConfigError::new("auth.session_ttl_hours must be positive".to_string()));
        }
        if self.auth.hash_iterations == 0 {
            return Err(ConfigError::new("auth.hash_iterations must be positive".to_string()));
        }
        if self.chat.default_limit <= 0 || self.chat.default_limit > self.chat.max_limit {
            return Err(ConfigError::new(
                "chat.default_limit must be between 1 and chat.max_limit".to_string(),
            ));
        }
        if self.chat.online_window_secs <= 0 {
            return Err(ConfigError::new("chat.online_window_secs must be positive".to_string()));
        }
        if self.reviewers.default_per_page <= 0
            || self.reviewers.default_per_page > self.reviewers.max_per_page
        {
            return Err(ConfigError::new(
                "reviewers.default_per_page must be between 1 and reviewers.max_per_page"
                    .to_string(),
            ));
        }
        if self.storage.max_upload_bytes == 0 {
            return Err(ConfigError::new("storage.max_upload_bytes must be positive".to_string()));
        }
        Ok(())
    }

    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
[server]
port = 9090

[chat]
online_window_secs = 30
"#,
        )
        .expect("parse failed");
        assert_eq!(*config.server().port(), 9090);
        assert_eq!(config.server().host(), "127.0.0.1");
        assert_eq!(*config.chat().online_window_secs(), 30);
        assert_eq!(*config.chat().max_limit(), 100);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|key| match key {
                "REVIEWER_HUB_PORT" => Some("7000".to_string()),
                "REVIEWER_HUB_DATABASE" => Some("/tmp/x.db".to_string()),
                _ => None,
            })
            .expect("overrides failed");
        assert_eq!(*config.server().port(), 7000);
        assert_eq!(config.database().path(), "/tmp/x.db");
    }

    #[test]
    fn bad_port_override_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|key| {
            (key == "REVIEWER_HUB_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn default_page_above_max_rejected() {
        let config = AppConfig::from_toml_str(
            r#"
[reviewers]
default_per_page = 80
max_per_page = 50
"#,
        )
        .expect("parse failed");
        assert!(config.validate().is_err());
    }
}
