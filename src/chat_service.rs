//! Global room and direct-message chat.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::views::MessageView;
use crate::{Message, MessageCursor, MessageScope, NewMessage, StudyRepository, User, utc_now};

const BODY_MAX: usize = 2000;

/// Query parameters for reading messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQuery {
    /// Only messages with a larger id (polling).
    pub after: Option<i32>,
    /// Only messages with a smaller id (scrolling back).
    pub before: Option<i32>,
    /// Maximum number of messages.
    pub limit: Option<i64>,
    /// Read the direct conversation with this user instead of the room.
    pub with: Option<i32>,
}

/// Per-user minimum interval between sent messages.
#[derive(Debug, Clone)]
struct SendThrottle {
    interval: Duration,
    last_sent: Arc<Mutex<HashMap<i32, Instant>>>,
}

impl SendThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<i32, Instant>> {
        self.last_sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rejects a send at `now` if the previous one was too recent, returning
    /// the remaining wait.
    fn check(&self, user_id: i32, now: Instant) -> Result<(), Duration> {
        if self.interval.is_zero() {
            return Ok(());
        }
        if let Some(previous) = self.slots().get(&user_id) {
            let elapsed = now.saturating_duration_since(*previous);
            if elapsed < self.interval {
                return Err(self.interval - elapsed);
            }
        }
        Ok(())
    }

    /// Records a completed send and drops entries that can no longer throttle.
    fn record(&self, user_id: i32, now: Instant) {
        if self.interval.is_zero() {
            return;
        }
        let mut slots = self.slots();
        slots.retain(|_, sent| now.saturating_duration_since(*sent) < self.interval);
        slots.insert(user_id, now);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots().len()
    }
}

/// Service layer for chat.
#[derive(Debug, Clone)]
pub struct ChatService {
    repository: StudyRepository,
    throttle: SendThrottle,
    default_limit: i64,
    max_limit: i64,
}

impl ChatService {
    /// Creates the service.
    #[instrument(skip_all)]
    pub fn new(repository: StudyRepository, config: &AppConfig) -> Self {
        info!("Creating ChatService");
        Self {
            repository,
            throttle: SendThrottle::new(Duration::from_millis(
                *config.chat().min_send_interval_millis(),
            )),
            default_limit: *config.chat().default_limit(),
            max_limit: *config.chat().max_limit(),
        }
    }

    /// Sends a message to the room, or to `recipient_id` directly.
    ///
    /// # Errors
    ///
    /// Returns forbidden for muted or suspended senders, a validation error
    /// for bad bodies or recipients, and too-many-requests when throttled.
    #[instrument(skip(self, sender, body), fields(sender_id = sender.id()))]
    pub fn send(
        &self,
        sender: &User,
        body: &str,
        recipient_id: Option<i32>,
    ) -> Result<MessageView, AppError> {
        let now = utc_now();
        if sender.is_suspended_at(now) {
            return Err(AppError::forbidden("Your account is suspended"));
        }
        if sender.is_muted_at(now) {
            return Err(AppError::forbidden(match sender.muted_until() {
                Some(until) => format!("You are muted until {}", until.format("%Y-%m-%d %H:%M UTC")),
                None => "You are muted".to_string(),
            }));
        }

        let body = body.trim();
        let len = body.chars().count();
        if len == 0 || len > BODY_MAX {
            return Err(AppError::validation(format!(
                "Message must be 1-{} characters",
                BODY_MAX
            )));
        }

        if let Some(recipient) = recipient_id {
            if recipient == *sender.id() {
                return Err(AppError::validation("Cannot send a direct message to yourself"));
            }
            if self.repository.get_user(recipient)?.is_none() {
                return Err(AppError::not_found(format!("User {} not found", recipient)));
            }
        }

        if let Err(wait) = self.throttle.check(*sender.id(), Instant::now()) {
            warn!(wait_ms = wait.as_millis() as u64, "Send throttled");
            return Err(AppError::too_many_requests(format!(
                "Slow down: wait {} ms before sending again",
                wait.as_millis()
            )));
        }

        let stored = self.repository.create_message(NewMessage::new(
            *sender.id(),
            recipient_id,
            body.to_string(),
            now,
        ))?;
        self.throttle.record(*sender.id(), Instant::now());
        Ok(MessageView::new(&stored, sender.username().clone()))
    }

    /// Reads messages from the room or a direct conversation, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns a validation error if both `after` and `before` are given.
    #[instrument(skip(self, viewer), fields(viewer_id = viewer.id()))]
    pub fn list(&self, viewer: &User, query: MessageQuery) -> Result<Vec<MessageView>, AppError> {
        let cursor = match (query.after, query.before) {
            (Some(_), Some(_)) => {
                return Err(AppError::validation("Use either 'after' or 'before', not both"));
            }
            (Some(after), None) => MessageCursor::After(after),
            (None, Some(before)) => MessageCursor::Before(before),
            (None, None) => MessageCursor::Latest,
        };
        let scope = match query.with {
            Some(other) => MessageScope::Conversation {
                user_a: *viewer.id(),
                user_b: other,
            },
            None => MessageScope::Room,
        };
        let limit = query
            .limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1));

        let messages =
            self.repository
                .list_messages(scope, cursor, limit, viewer.role().is_staff())?;
        let views = self.views(&messages)?;
        debug!(count = views.len(), "Messages listed");
        Ok(views)
    }

    /// Deletes a message. Allowed for the sender and staff.
    ///
    /// # Errors
    ///
    /// Returns not found for unknown ids and forbidden for anyone else.
    #[instrument(skip(self, actor), fields(actor_id = actor.id()))]
    pub fn delete(&self, actor: &User, message_id: i32) -> Result<(), AppError> {
        let message = self
            .repository
            .get_message(message_id)?
            .ok_or_else(|| AppError::not_found(format!("Message {} not found", message_id)))?;
        if message.sender_id() != actor.id() && !actor.role().is_staff() {
            return Err(AppError::forbidden("Only the sender or staff can delete this message"));
        }
        self.repository.delete_message(message_id)?;
        Ok(())
    }

    fn views(&self, messages: &[Message]) -> Result<Vec<MessageView>, AppError> {
        let sender_ids: Vec<i32> = messages.iter().map(|m| *m.sender_id()).collect();
        let names: HashMap<i32, String> = self
            .repository
            .users_by_ids(&sender_ids)?
            .into_iter()
            .map(|u| (*u.id(), u.username().clone()))
            .collect();
        Ok(messages
            .iter()
            .map(|m| {
                let name = names.get(m.sender_id()).cloned().unwrap_or_default();
                MessageView::new(m, name)
            })
            .collect())
    }
}
