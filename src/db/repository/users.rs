//! User account queries.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use tracing::{debug, info, instrument};

use super::{StudyRepository, like_pattern};
use crate::db::{DbError, NewUser, ProfileChanges, Role, Sanction, User, schema};

impl StudyRepository {
    /// Creates a new user account.
    ///
    /// # Errors
    ///
    /// Returns a conflict [`DbError`] if the username or email is taken.
    #[instrument(skip(self, new_user))]
    pub fn create_user(&self, new_user: NewUser) -> Result<User, DbError> {
        let mut conn = self.connection()?;

        let user = diesel::insert_into(schema::users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(&mut conn)?;

        info!(user_id = user.id(), username = %user.username(), "User created");
        Ok(user)
    }

    /// Gets a user by id. Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user(&self, user_id: i32) -> Result<Option<User>, DbError> {
        let mut conn = self.connection()?;
        let user = schema::users::table
            .find(user_id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(user)
    }

    /// Gets a user by username (case-insensitive). Returns `None` if not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_user_by_name(&self, username: &str) -> Result<Option<User>, DbError> {
        debug!(username = %username, "Looking up user by name");
        let mut conn = self.connection()?;

        let user = schema::users::table
            .filter(schema::users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?;

        if let Some(ref u) = user {
            debug!(user_id = u.id(), "User found");
        } else {
            debug!("User not found");
        }

        Ok(user)
    }

    /// Loads every user whose id is in `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn users_by_ids(&self, ids: &[i32]) -> Result<Vec<User>, DbError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        let users = schema::users::table
            .filter(schema::users::id.eq_any(ids))
            .select(User::as_select())
            .load(&mut conn)?;
        Ok(users)
    }

    /// Lists users ordered by id, optionally filtered by a username/display name
    /// substring. Returns the page and the total number of matches.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_users(
        &self,
        query: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<User>, i64), DbError> {
        let mut conn = self.connection()?;

        let filtered = || -> schema::users::BoxedQuery<'static, Sqlite> {
            let mut q = schema::users::table.into_boxed();
            if let Some(needle) = query {
                let pattern = like_pattern(needle);
                q = q.filter(
                    schema::users::username
                        .like(pattern.clone())
                        .escape('\\')
                        .or(schema::users::display_name.like(pattern).escape('\\')),
                );
            }
            q
        };

        let total: i64 = filtered().count().get_result(&mut conn)?;
        let users = filtered()
            .order(schema::users::id.asc())
            .offset(offset)
            .limit(limit)
            .select(User::as_select())
            .load(&mut conn)?;

        info!(total, count = users.len(), "Users loaded");
        Ok((users, total))
    }

    /// Applies profile changes and returns the updated user.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the user does not exist.
    #[instrument(skip(self, changes))]
    pub fn update_profile(&self, user_id: i32, changes: &ProfileChanges) -> Result<User, DbError> {
        let mut conn = self.connection()?;
        let user = diesel::update(schema::users::table.find(user_id))
            .set(changes)
            .returning(User::as_returning())
            .get_result(&mut conn)?;
        info!(user_id, "Profile updated");
        Ok(user)
    }

    /// Replaces the stored password hash.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the user does not exist.
    #[instrument(skip(self, password_hash))]
    pub fn update_password(
        &self,
        user_id: i32,
        password_hash: String,
        now: NaiveDateTime,
    ) -> Result<(), DbError> {
        use crate::db::schema::users::dsl;
        let mut conn = self.connection()?;
        let rows = diesel::update(dsl::users.find(user_id))
            .set((dsl::password_hash.eq(password_hash), dsl::updated_at.eq(now)))
            .execute(&mut conn)?;
        if rows == 0 {
            return Err(DbError::not_found(format!("User {} not found", user_id)));
        }
        info!(user_id, "Password updated");
        Ok(())
    }

    /// Stores a new avatar path and returns the previous one.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the user does not exist.
    #[instrument(skip(self))]
    pub fn set_avatar_path(
        &self,
        user_id: i32,
        avatar_path: Option<String>,
    ) -> Result<Option<String>, DbError> {
        use crate::db::schema::users::dsl;
        let mut conn = self.connection()?;
        conn.transaction::<_, DbError, _>(|conn| {
            let previous: Option<String> = dsl::users
                .find(user_id)
                .select(dsl::avatar_path)
                .first(conn)
                .optional()?
                .ok_or_else(|| DbError::not_found(format!("User {} not found", user_id)))?;
            diesel::update(dsl::users.find(user_id))
                .set(dsl::avatar_path.eq(avatar_path))
                .execute(conn)?;
            Ok(previous)
        })
    }

    /// Changes a user's role.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the user does not exist.
    #[instrument(skip(self))]
    pub fn set_role(&self, user_id: i32, role: Role, now: NaiveDateTime) -> Result<User, DbError> {
        use crate::db::schema::users::dsl;
        let mut conn = self.connection()?;
        let user = diesel::update(dsl::users.find(user_id))
            .set((dsl::role.eq(role.to_db_string()), dsl::updated_at.eq(now)))
            .returning(User::as_returning())
            .get_result(&mut conn)?;
        info!(user_id, role = %role, "Role changed");
        Ok(user)
    }

    /// Clears one or all sanctions from a user.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the user does not exist.
    #[instrument(skip(self))]
    pub fn lift_sanction(
        &self,
        user_id: i32,
        sanction: Sanction,
        now: NaiveDateTime,
    ) -> Result<User, DbError> {
        use crate::db::schema::users::dsl;
        let mut conn = self.connection()?;
        let target = dsl::users.find(user_id);
        let none: Option<NaiveDateTime> = None;

        let user = match sanction {
            Sanction::Mute => diesel::update(target)
                .set((dsl::muted_until.eq(none), dsl::updated_at.eq(now)))
                .returning(User::as_returning())
                .get_result(&mut conn)?,
            Sanction::Suspend => diesel::update(target)
                .set((dsl::suspended_until.eq(none), dsl::updated_at.eq(now)))
                .returning(User::as_returning())
                .get_result(&mut conn)?,
            Sanction::Ban => diesel::update(target)
                .set((
                    dsl::banned.eq(false),
                    dsl::banned_until.eq(none),
                    dsl::updated_at.eq(now),
                ))
                .returning(User::as_returning())
                .get_result(&mut conn)?,
            Sanction::All => diesel::update(target)
                .set((
                    dsl::muted_until.eq(none),
                    dsl::suspended_until.eq(none),
                    dsl::banned.eq(false),
                    dsl::banned_until.eq(none),
                    dsl::updated_at.eq(now),
                ))
                .returning(User::as_returning())
                .get_result(&mut conn)?,
        };

        info!(user_id, sanction = %sanction, "Sanction lifted");
        Ok(user)
    }

    /// Records a presence heartbeat.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn touch_last_seen(&self, user_id: i32, now: NaiveDateTime) -> Result<(), DbError> {
        use crate::db::schema::users::dsl;
        let mut conn = self.connection()?;
        diesel::update(dsl::users.find(user_id))
            .set(dsl::last_seen_at.eq(Some(now)))
            .execute(&mut conn)?;
        debug!(user_id, "Heartbeat recorded");
        Ok(())
    }

    /// Users whose last heartbeat is at or after `cutoff`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn users_seen_since(&self, cutoff: NaiveDateTime) -> Result<Vec<User>, DbError> {
        use crate::db::schema::users::dsl;
        let mut conn = self.connection()?;
        let users = dsl::users
            .filter(dsl::last_seen_at.is_not_null())
            .filter(dsl::last_seen_at.assume_not_null().ge(cutoff))
            .order(dsl::last_seen_at.desc())
            .select(User::as_select())
            .load(&mut conn)?;
        debug!(count = users.len(), "Online users loaded");
        Ok(users)
    }
}
