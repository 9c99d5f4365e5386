//! Login session storage.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use tracing::{debug, info, instrument};

use super::StudyRepository;
use crate::db::{DbError, Session, User, schema};

impl StudyRepository {
    /// Stores a new session.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the user does not exist or the token collides.
    #[instrument(skip(self, session), fields(user_id = session.user_id()))]
    pub fn create_session(&self, session: Session) -> Result<Session, DbError> {
        let mut conn = self.connection()?;
        let stored = diesel::insert_into(schema::sessions::table)
            .values(&session)
            .returning(Session::as_returning())
            .get_result(&mut conn)?;
        info!(user_id = stored.user_id(), "Session created");
        Ok(stored)
    }

    /// Looks up a session together with its user.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, token))]
    pub fn find_session(&self, token: &str) -> Result<Option<(Session, User)>, DbError> {
        let mut conn = self.connection()?;
        let found = schema::sessions::table
            .inner_join(schema::users::table)
            .filter(schema::sessions::token.eq(token))
            .select((Session::as_select(), User::as_select()))
            .first::<(Session, User)>(&mut conn)
            .optional()?;
        debug!(found = found.is_some(), "Session lookup");
        Ok(found)
    }

    /// Deletes one session. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, token))]
    pub fn delete_session(&self, token: &str) -> Result<bool, DbError> {
        let mut conn = self.connection()?;
        let rows = diesel::delete(schema::sessions::table.find(token)).execute(&mut conn)?;
        debug!(rows, "Session deleted");
        Ok(rows > 0)
    }

    /// Deletes every session belonging to a user.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn delete_sessions_for_user(&self, user_id: i32) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        let rows = diesel::delete(
            schema::sessions::table.filter(schema::sessions::user_id.eq(user_id)),
        )
        .execute(&mut conn)?;
        info!(user_id, rows, "Sessions revoked");
        Ok(rows)
    }

    /// Deletes every session of a user except the one holding `keep`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self, keep))]
    pub fn delete_other_sessions(&self, user_id: i32, keep: &str) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        let rows = diesel::delete(
            schema::sessions::table
                .filter(schema::sessions::user_id.eq(user_id))
                .filter(schema::sessions::token.ne(keep)),
        )
        .execute(&mut conn)?;
        info!(user_id, rows, "Other sessions revoked");
        Ok(rows)
    }

    /// Removes sessions that expired before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn purge_expired_sessions(&self, now: NaiveDateTime) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        let rows = diesel::delete(
            schema::sessions::table.filter(schema::sessions::expires_at.le(now)),
        )
        .execute(&mut conn)?;
        info!(rows, "Expired sessions purged");
        Ok(rows)
    }
}
