//! Account, session and presence business logic.

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::error::{AppError, run_blocking};
use crate::password::CredentialHasher;
use crate::storage::{FileStore, image_extension};
use crate::views::{OnlineUser, UserView};
use crate::{NewUser, ProfileChanges, Role, Session, StudyRepository, User, Warning, utc_now};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 32;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;
const DISPLAY_NAME_MAX: usize = 64;
const BIO_MAX: usize = 1000;
const EMAIL_MAX: usize = 254;

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// The account behind the session.
    pub user: User,
    /// The session token used for this request.
    pub token: String,
}

impl CurrentUser {
    /// Account id.
    pub fn id(&self) -> i32 {
        *self.user.id()
    }

    /// Account role.
    pub fn role(&self) -> Role {
        self.user.role()
    }

    /// Whether the caller is a moderator or admin.
    pub fn is_staff(&self) -> bool {
        self.role().is_staff()
    }
}

/// Service layer for registration, login, profiles and presence.
#[derive(Debug, Clone)]
pub struct AccountService {
    repository: StudyRepository,
    hasher: CredentialHasher,
    session_ttl: Duration,
    online_window: Duration,
    max_upload_bytes: usize,
}

impl AccountService {
    /// Creates the service from the repository and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the hashing parameters are rejected.
    #[instrument(skip_all)]
    pub fn new(repository: StudyRepository, config: &AppConfig) -> Result<Self, AppError> {
        let hasher = CredentialHasher::new(
            *config.auth().hash_memory_kib(),
            *config.auth().hash_iterations(),
        )?;
        info!("Creating AccountService");
        Ok(Self {
            repository,
            hasher,
            session_ttl: Duration::hours(*config.auth().session_ttl_hours()),
            online_window: Duration::seconds(*config.chat().online_window_secs()),
            max_upload_bytes: *config.storage().max_upload_bytes(),
        })
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &StudyRepository {
        &self.repository
    }

    /// Whether `user` counts as online right now.
    pub fn is_online(&self, user: &User) -> bool {
        user.is_online_at(utc_now(), self.online_window)
    }

    /// Creates an account and logs it in.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input and a conflict if the username
    /// or email is taken.
    #[instrument(skip(self, password, email))]
    pub fn register(
        &self,
        username: &str,
        password: &str,
        display_name: Option<String>,
        email: Option<String>,
    ) -> Result<(User, Session), AppError> {
        let username = validate_username(username)?;
        validate_password(password)?;
        let display_name = match display_name {
            Some(name) => validate_display_name(&name)?,
            None => username.clone(),
        };
        let email = normalize_email(email)?;

        if self.repository.get_user_by_name(&username)?.is_some() {
            return Err(AppError::conflict(format!("Username '{}' is taken", username)));
        }

        let now = utc_now();
        let hash = self.hasher.hash(password)?;
        let user = self.repository.create_user(NewUser::new(
            username,
            email,
            display_name,
            hash,
            Role::User.to_db_string().to_string(),
            now,
            now,
        ))?;
        let session = self.open_session(*user.id(), now)?;
        info!(user_id = user.id(), "Account registered");
        Ok((user, session))
    }

    /// Checks credentials and opens a session.
    ///
    /// # Errors
    ///
    /// Returns unauthorized for wrong credentials and forbidden for banned accounts.
    #[instrument(skip(self, password))]
    pub fn login(&self, username: &str, password: &str) -> Result<(User, Session), AppError> {
        let rejected = || AppError::unauthorized("Invalid username or password");
        let user = self
            .repository
            .get_user_by_name(username.trim())?
            .ok_or_else(rejected)?;
        if !self.hasher.verify(password, user.password_hash())? {
            warn!(user_id = user.id(), "Login with wrong password");
            return Err(rejected());
        }

        let now = utc_now();
        if user.is_banned_at(now) {
            return Err(ban_error(&user));
        }

        let session = self.open_session(*user.id(), now)?;
        info!(user_id = user.id(), "User logged in");
        Ok((user, session))
    }

    fn open_session(&self, user_id: i32, now: NaiveDateTime) -> Result<Session, AppError> {
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let session = Session::new(token, user_id, now, now + self.session_ttl);
        Ok(self.repository.create_session(session)?)
    }

    /// Ends a session. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] on database failure.
    #[instrument(skip_all)]
    pub fn logout(&self, token: &str) -> Result<(), AppError> {
        let removed = self.repository.delete_session(token)?;
        debug!(removed, "Logout");
        Ok(())
    }

    /// Resolves a session token to the calling user.
    ///
    /// # Errors
    ///
    /// Returns unauthorized for unknown or expired tokens and forbidden for
    /// banned accounts.
    #[instrument(skip_all)]
    pub fn authenticate(&self, token: &str) -> Result<CurrentUser, AppError> {
        let (session, user) = self
            .repository
            .find_session(token)?
            .ok_or_else(|| AppError::unauthorized("Not logged in"))?;

        let now = utc_now();
        if *session.expires_at() <= now {
            self.repository.delete_session(token)?;
            debug!(user_id = user.id(), "Expired session removed");
            return Err(AppError::unauthorized("Session expired"));
        }
        if user.is_banned_at(now) {
            return Err(ban_error(&user));
        }

        Ok(CurrentUser {
            user,
            token: token.to_string(),
        })
    }

    /// Public profile of any user.
    ///
    /// # Errors
    ///
    /// Returns not found for unknown ids.
    #[instrument(skip(self))]
    pub fn profile(&self, user_id: i32) -> Result<UserView, AppError> {
        let user = self.load_user(user_id)?;
        Ok(UserView::from_user(&user, self.is_online(&user)))
    }

    pub(crate) fn load_user(&self, user_id: i32) -> Result<User, AppError> {
        self.repository
            .get_user(user_id)?
            .ok_or_else(|| AppError::not_found(format!("User {} not found", user_id)))
    }

    /// Updates display name and/or bio.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input.
    #[instrument(skip(self, bio))]
    pub fn update_profile(
        &self,
        user_id: i32,
        display_name: Option<String>,
        bio: Option<String>,
    ) -> Result<User, AppError> {
        let display_name = display_name.map(|n| validate_display_name(&n)).transpose()?;
        if let Some(bio) = &bio
            && bio.chars().count() > BIO_MAX
        {
            return Err(AppError::validation(format!(
                "Bio must be at most {} characters",
                BIO_MAX
            )));
        }
        if display_name.is_none() && bio.is_none() {
            return self.load_user(user_id);
        }
        let changes = ProfileChanges {
            display_name,
            bio,
            updated_at: Some(utc_now()),
        };
        Ok(self.repository.update_profile(user_id, &changes)?)
    }

    /// Replaces the password after checking the current one. Every session
    /// except the caller's is revoked.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the current password is wrong or the new
    /// one is too short.
    #[instrument(skip_all, fields(user_id = caller.id()))]
    pub fn change_password(
        &self,
        caller: &CurrentUser,
        current: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user_id = caller.id();
        let user = self.load_user(user_id)?;
        if !self.hasher.verify(current, user.password_hash())? {
            return Err(AppError::validation("Current password is incorrect"));
        }
        validate_password(new_password)?;
        let hash = self.hasher.hash(new_password)?;
        self.repository.update_password(user_id, hash, utc_now())?;
        let revoked = self.repository.delete_other_sessions(user_id, &caller.token)?;
        info!(user_id, revoked, "Password changed");
        Ok(())
    }

    /// Stores a new avatar image and removes the previous file.
    ///
    /// # Errors
    ///
    /// Returns payload-too-large or unsupported-media errors for bad uploads.
    #[instrument(skip(self, bytes, store), fields(len = bytes.len()))]
    pub async fn set_avatar(
        &self,
        user_id: i32,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        store: &dyn FileStore,
    ) -> Result<User, AppError> {
        if bytes.is_empty() {
            return Err(AppError::validation("Avatar upload is empty"));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(AppError::payload_too_large(format!(
                "Avatar exceeds {} bytes",
                self.max_upload_bytes
            )));
        }
        let extension = content_type.and_then(image_extension).ok_or_else(|| {
            AppError::unsupported_media("Avatar must be a PNG, JPEG, GIF or WebP image")
        })?;

        let name = store.put(bytes, extension).await?;
        let repository = self.repository.clone();
        let stored = name.clone();
        let previous =
            match run_blocking(move || Ok(repository.set_avatar_path(user_id, Some(stored))?))
                .await
            {
                Ok(previous) => previous,
                Err(e) => {
                    if let Err(cleanup) = store.delete(&name).await {
                        warn!(error = %cleanup, "Failed to remove orphaned avatar");
                    }
                    return Err(e);
                }
            };

        if let Some(old) = previous
            && let Err(e) = store.delete(&old).await
        {
            warn!(error = %e, old = %old, "Failed to remove previous avatar");
        }

        let service = self.clone();
        let user = run_blocking(move || service.load_user(user_id)).await?;
        info!(user_id, avatar = %name, "Avatar updated");
        Ok(user)
    }

    /// Records a presence heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] on database failure.
    #[instrument(skip(self))]
    pub fn heartbeat(&self, user_id: i32) -> Result<(), AppError> {
        self.repository.touch_last_seen(user_id, utc_now())?;
        Ok(())
    }

    /// Users with a heartbeat inside the online window, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] on database failure.
    #[instrument(skip(self))]
    pub fn online_users(&self) -> Result<Vec<OnlineUser>, AppError> {
        let cutoff = utc_now() - self.online_window;
        let users = self.repository.users_seen_since(cutoff)?;
        Ok(users
            .iter()
            .filter_map(|u| {
                u.last_seen_at().map(|seen| OnlineUser {
                    id: *u.id(),
                    username: u.username().clone(),
                    display_name: u.display_name().clone(),
                    last_seen_at: seen,
                })
            })
            .collect())
    }

    /// Warnings issued to the user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] on database failure.
    #[instrument(skip(self))]
    pub fn warnings(&self, user_id: i32) -> Result<Vec<Warning>, AppError> {
        Ok(self.repository.warnings_for(user_id)?)
    }

    /// Creates an admin account, or promotes an existing user.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input.
    #[instrument(skip(self, password))]
    pub fn create_admin(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = validate_username(username)?;
        let now = utc_now();
        if let Some(existing) = self.repository.get_user_by_name(&username)? {
            info!(user_id = existing.id(), "Promoting existing user to admin");
            return Ok(self.repository.set_role(*existing.id(), Role::Admin, now)?);
        }

        validate_password(password)?;
        let hash = self.hasher.hash(password)?;
        let user = self.repository.create_user(NewUser::new(
            username.clone(),
            None,
            username,
            hash,
            Role::Admin.to_db_string().to_string(),
            now,
            now,
        ))?;
        info!(user_id = user.id(), "Admin account created");
        Ok(user)
    }
}

fn ban_error(user: &User) -> AppError {
    match user.banned_until() {
        Some(until) => AppError::forbidden(format!(
            "Account is banned until {}",
            until.format("%Y-%m-%d %H:%M UTC")
        )),
        None => AppError::forbidden("Account is permanently banned"),
    }
}

fn validate_username(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::validation(format!(
            "Username must be {}-{} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::validation(
            "Username may only contain letters, digits and underscores",
        ));
    }
    Ok(name.to_string())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if len < PASSWORD_MIN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN
        )));
    }
    if len > PASSWORD_MAX {
        return Err(AppError::validation(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX
        )));
    }
    Ok(())
}

fn validate_display_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > DISPLAY_NAME_MAX {
        return Err(AppError::validation(format!(
            "Display name must be 1-{} characters",
            DISPLAY_NAME_MAX
        )));
    }
    Ok(name.to_string())
}

fn normalize_email(raw: Option<String>) -> Result<Option<String>, AppError> {
    let Some(email) = raw.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    let valid = email.len() <= EMAIL_MAX
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AppError::validation("Email address is not valid"));
    }
    Ok(Some(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_checked() {
        assert_eq!(validate_username("  ada_99 ").expect("valid"), "ada_99");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn passwords_need_eight_chars() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(
            normalize_email(Some(" Ada@Example.org ".into())).expect("valid"),
            Some("ada@example.org".to_string())
        );
        assert_eq!(normalize_email(Some("   ".into())).expect("blank"), None);
        assert!(normalize_email(Some("nope".into())).is_err());
    }
}
