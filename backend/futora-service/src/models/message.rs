use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on message body length, in characters
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Read marker used when a participant has never opened the conversation
pub fn never_read() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Append-only chat message. `read_at` goes from None to Some exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether this message counts as unread for `user` given their read marker
    pub fn is_unread_for(&self, user: Uuid, last_read_at: DateTime<Utc>) -> bool {
        self.sender_id != user && self.created_at > last_read_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(sender: Uuid, created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: sender,
            content: "hi".into(),
            created_at,
            read_at: None,
        }
    }

    #[test]
    fn test_own_messages_are_never_unread() {
        let me = Uuid::new_v4();
        let msg = message(me, Utc::now());
        assert!(!msg.is_unread_for(me, never_read()));
    }

    #[test]
    fn test_unread_is_strictly_after_marker() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let now = Utc::now();
        let msg = message(other, now);

        assert!(msg.is_unread_for(me, now - Duration::seconds(1)));
        assert!(!msg.is_unread_for(me, now));
    }
}
