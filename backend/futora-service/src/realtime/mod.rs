//! In-process real-time change feed.
//!
//! Services publish a `ChangeEvent` after every successful write. Consumers
//! hold a `Subscription` scoped to the tables, event kinds and owning user
//! they care about; dropping it releases the underlying receiver.

mod subscription;

pub use subscription::{ChangeFilter, FeedError, Subscription};

use crate::models::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Conversations,
    ConversationParticipants,
    Messages,
    Follows,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Conversations => "conversations",
            Table::ConversationParticipants => "conversation_participants",
            Table::Messages => "messages",
            Table::Follows => "follows",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row-level change notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// Conversation the row belongs to, when the table has one
    pub conversation_id: Option<Uuid>,
    /// User owning the row: participant, sender or follower
    pub user_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn conversation_created(conversation_id: Uuid) -> Self {
        Self {
            table: Table::Conversations,
            kind: ChangeKind::Insert,
            conversation_id: Some(conversation_id),
            user_id: None,
            at: Utc::now(),
        }
    }

    pub fn participant_added(conversation_id: Uuid, user_id: Uuid) -> Self {
        Self {
            table: Table::ConversationParticipants,
            kind: ChangeKind::Insert,
            conversation_id: Some(conversation_id),
            user_id: Some(user_id),
            at: Utc::now(),
        }
    }

    pub fn participant_read(conversation_id: Uuid, user_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            table: Table::ConversationParticipants,
            kind: ChangeKind::Update,
            conversation_id: Some(conversation_id),
            user_id: Some(user_id),
            at,
        }
    }

    pub fn message_inserted(message: &Message) -> Self {
        Self {
            table: Table::Messages,
            kind: ChangeKind::Insert,
            conversation_id: Some(message.conversation_id),
            user_id: Some(message.sender_id),
            at: message.created_at,
        }
    }

    pub fn follow_changed(kind: ChangeKind, follower_id: Uuid) -> Self {
        Self {
            table: Table::Follows,
            kind,
            conversation_id: None,
            user_id: Some(follower_id),
            at: Utc::now(),
        }
    }
}

/// Broadcast fan-out of change events, cheap to clone
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// `capacity` is the number of events a slow receiver may fall behind by
    /// before it observes `FeedError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of live receivers the event reached
    pub fn publish(&self, event: ChangeEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(table = event.table.as_str(), "change event dropped, no subscribers");
                0
            }
        }
    }

    /// Subscribe to events matching any of `filters`
    pub fn subscribe(&self, filters: Vec<ChangeFilter>) -> Subscription {
        Subscription::new(self.sender.subscribe(), filters)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}
