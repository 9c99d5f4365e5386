//! Chat message queries.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use tracing::{debug, info, instrument};

use super::StudyRepository;
use crate::db::{DbError, Message, NewMessage, schema};

/// Which conversation to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageScope {
    /// The shared room (messages without a recipient).
    Room,
    /// Direct messages exchanged between two users, in either direction.
    Conversation {
        /// One participant.
        user_a: i32,
        /// The other participant.
        user_b: i32,
    },
}

/// Position to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCursor {
    /// The most recent messages.
    Latest,
    /// Messages newer than the given id (used when polling).
    After(i32),
    /// Messages older than the given id (used when scrolling back).
    Before(i32),
}

impl MessageScope {
    fn boxed(self, include_hidden: bool) -> schema::messages::BoxedQuery<'static, Sqlite> {
        use crate::db::schema::messages::dsl;

        let mut query = dsl::messages.into_boxed();
        query = match self {
            Self::Room => query.filter(dsl::recipient_id.is_null()),
            Self::Conversation { user_a, user_b } => query.filter(
                dsl::sender_id
                    .eq(user_a)
                    .and(dsl::recipient_id.assume_not_null().eq(user_b))
                    .or(dsl::sender_id
                        .eq(user_b)
                        .and(dsl::recipient_id.assume_not_null().eq(user_a))),
            ),
        };
        if !include_hidden {
            query = query.filter(dsl::hidden.eq(false));
        }
        query
    }
}

impl StudyRepository {
    /// Stores a chat message.
    ///
    /// # Errors
    ///
    /// Returns a conflict [`DbError`] if the sender or recipient does not exist.
    #[instrument(skip(self, message))]
    pub fn create_message(&self, message: NewMessage) -> Result<Message, DbError> {
        let mut conn = self.connection()?;
        let stored = diesel::insert_into(schema::messages::table)
            .values(&message)
            .returning(Message::as_returning())
            .get_result(&mut conn)?;
        info!(message_id = stored.id(), sender_id = stored.sender_id(), "Message stored");
        Ok(stored)
    }

    /// Gets a message by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_message(&self, message_id: i32) -> Result<Option<Message>, DbError> {
        let mut conn = self.connection()?;
        let message = schema::messages::table
            .find(message_id)
            .select(Message::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(message)
    }

    /// Reads up to `limit` messages of a conversation, always returned in
    /// ascending id order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn list_messages(
        &self,
        scope: MessageScope,
        cursor: MessageCursor,
        limit: i64,
        include_hidden: bool,
    ) -> Result<Vec<Message>, DbError> {
        use crate::db::schema::messages::dsl;
        let mut conn = self.connection()?;

        let messages = match cursor {
            MessageCursor::After(after) => scope
                .boxed(include_hidden)
                .filter(dsl::id.gt(after))
                .order(dsl::id.asc())
                .limit(limit)
                .select(Message::as_select())
                .load(&mut conn)?,
            MessageCursor::Before(before) => {
                let mut page = scope
                    .boxed(include_hidden)
                    .filter(dsl::id.lt(before))
                    .order(dsl::id.desc())
                    .limit(limit)
                    .select(Message::as_select())
                    .load(&mut conn)?;
                page.reverse();
                page
            }
            MessageCursor::Latest => {
                let mut page = scope
                    .boxed(include_hidden)
                    .order(dsl::id.desc())
                    .limit(limit)
                    .select(Message::as_select())
                    .load(&mut conn)?;
                page.reverse();
                page
            }
        };

        debug!(count = messages.len(), "Messages loaded");
        Ok(messages)
    }

    /// Deletes a message. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn delete_message(&self, message_id: i32) -> Result<bool, DbError> {
        let mut conn = self.connection()?;
        let rows = diesel::delete(schema::messages::table.find(message_id)).execute(&mut conn)?;
        info!(message_id, rows, "Message deleted");
        Ok(rows > 0)
    }

    /// Sets the moderation `hidden` flag on a message.
    ///
    /// # Errors
    ///
    /// Returns a not-found [`DbError`] if the message does not exist.
    #[instrument(skip(self))]
    pub fn set_message_hidden(&self, message_id: i32, hidden: bool) -> Result<Message, DbError> {
        use crate::db::schema::messages::dsl;
        let mut conn = self.connection()?;
        let message = diesel::update(dsl::messages.find(message_id))
            .set(dsl::hidden.eq(hidden))
            .returning(Message::as_returning())
            .get_result(&mut conn)?;
        debug!(message_id, hidden, "Message visibility changed");
        Ok(message)
    }

    /// Deletes room messages older than `cutoff`. Direct messages are kept.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn prune_room_messages(&self, cutoff: NaiveDateTime) -> Result<usize, DbError> {
        use crate::db::schema::messages::dsl;
        let mut conn = self.connection()?;
        let rows = diesel::delete(
            dsl::messages
                .filter(dsl::recipient_id.is_null())
                .filter(dsl::created_at.lt(cutoff)),
        )
        .execute(&mut conn)?;
        info!(rows, "Old room messages pruned");
        Ok(rows)
    }
}
