//! Incremental chat polling.

use tracing::{debug, instrument};

use super::{ApiClient, ClientError};
use crate::chat_service::MessageQuery;
use crate::views::MessageView;

/// Remembers the newest message seen so each poll returns only new messages.
#[derive(Debug, Clone)]
pub struct ChatPoller {
    with: Option<i32>,
    limit: i64,
    last_id: Option<i32>,
}

impl ChatPoller {
    /// Polls the global room. `limit` is at least 1.
    pub fn room(limit: i64) -> Self {
        Self {
            with: None,
            limit: limit.max(1),
            last_id: None,
        }
    }

    /// Polls the direct conversation with `user_id`. `limit` is at least 1.
    pub fn conversation(user_id: i32, limit: i64) -> Self {
        Self {
            with: Some(user_id),
            limit: limit.max(1),
            last_id: None,
        }
    }

    /// Id of the newest message returned so far.
    pub fn last_id(&self) -> Option<i32> {
        self.last_id
    }

    /// Query for the next request: the latest page first, then `after`.
    pub fn next_query(&self) -> MessageQuery {
        MessageQuery {
            after: self.last_id,
            before: None,
            limit: Some(self.limit),
            with: self.with,
        }
    }

    /// Whether a batch of `len` messages means there is nothing more to read.
    pub fn caught_up(&self, len: usize) -> bool {
        len == 0 || (len as i64) < self.limit
    }

    /// Advances the cursor past `messages` and returns them.
    pub fn absorb(&mut self, messages: Vec<MessageView>) -> Vec<MessageView> {
        if let Some(newest) = messages.iter().map(|m| m.id).max() {
            self.last_id = Some(self.last_id.map_or(newest, |last| last.max(newest)));
        }
        messages
    }

    /// Fetches messages newer than the cursor. The first call returns the
    /// latest page; later calls keep reading until caught up.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if a request fails; the cursor keeps what was
    /// already read.
    #[instrument(skip(self, client), fields(last_id = ?self.last_id))]
    pub async fn poll(&mut self, client: &ApiClient) -> Result<Vec<MessageView>, ClientError> {
        let first = self.last_id.is_none();
        let mut collected = Vec::new();
        loop {
            let batch = client.messages(&self.next_query()).await?;
            let done = self.caught_up(batch.len());
            collected.extend(self.absorb(batch));
            if first || done {
                break;
            }
        }
        debug!(count = collected.len(), last_id = ?self.last_id, "Chat polled");
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn message(id: i32) -> MessageView {
        MessageView {
            id,
            sender_id: 1,
            sender_username: "ada".into(),
            recipient_id: None,
            body: format!("m{}", id),
            hidden: false,
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn first_query_reads_latest() {
        let poller = ChatPoller::room(20);
        let query = poller.next_query();
        assert_eq!(query.after, None);
        assert_eq!(query.limit, Some(20));
    }

    #[test]
    fn cursor_advances_to_newest() {
        let mut poller = ChatPoller::conversation(7, 20);
        poller.absorb(vec![message(3), message(5)]);
        assert_eq!(poller.last_id(), Some(5));
        poller.absorb(Vec::new());
        assert_eq!(poller.last_id(), Some(5));
        let query = poller.next_query();
        assert_eq!(query.after, Some(5));
        assert_eq!(query.with, Some(7));
    }

    #[test]
    fn non_positive_limit_is_clamped() {
        let poller = ChatPoller::room(0);
        assert_eq!(poller.next_query().limit, Some(1));
        let poller = ChatPoller::conversation(7, -5);
        assert_eq!(poller.next_query().limit, Some(1));
    }

    #[test]
    fn empty_or_short_batch_is_caught_up() {
        let poller = ChatPoller::room(0);
        assert!(poller.caught_up(0));
        assert!(!poller.caught_up(1));

        let poller = ChatPoller::room(3);
        assert!(poller.caught_up(0));
        assert!(poller.caught_up(2));
        assert!(!poller.caught_up(3));
    }
}
