//! Storage seam for conversations, messages and the follow graph.
//!
//! `PgStore` is the production implementation; `MemoryStore` backs tests and
//! the `STORE_BACKEND=memory` mode.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppResult;
use crate::models::{DirectPair, Message, Participant};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Ids of every conversation `user_id` participates in
    async fn conversation_ids_for(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Single membership probe
    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    /// First conversation, in `candidates` order, that `user_id` also
    /// participates in
    async fn find_shared_conversation(
        &self,
        user_id: Uuid,
        candidates: &[Uuid],
    ) -> AppResult<Option<Uuid>>;

    /// Insert a direct conversation row. With `None` the store allocates the id.
    async fn insert_conversation(&self, id: Option<Uuid>) -> AppResult<Uuid>;

    async fn insert_participants(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> AppResult<()>;

    /// Atomically return the conversation keyed by `pair`, creating it (with
    /// `new_id` and both participant rows) when absent.
    /// Returns (conversation_id, created).
    async fn find_or_create_direct(&self, pair: &DirectPair, new_id: Uuid)
        -> AppResult<(Uuid, bool)>;

    /// Give a keyless conversation the key of `pair`. Returns false when the
    /// conversation already has a key or another conversation holds this one.
    async fn adopt_direct_pair(&self, conversation_id: Uuid, pair: &DirectPair)
        -> AppResult<bool>;

    async fn participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>>;

    /// (conversation_id, last_read_at) for every participation of `user_id`
    async fn participations(&self, user_id: Uuid)
        -> AppResult<Vec<(Uuid, Option<DateTime<Utc>>)>>;

    /// Advance the participant's read marker to the store clock.
    /// Returns the new marker, or None if `user_id` is not a participant.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<DateTime<Utc>>>;
}

#[async_trait::async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message>;

    /// Messages in one conversation sent by others after `since`
    async fn count_unread_in(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<i64>;

    /// Unread messages across all of the user's conversations in one query
    async fn count_unread_total(&self, user_id: Uuid) -> AppResult<i64>;

    /// Stamp `read_at` on messages from others created at or before `at`
    /// that have not been read yet. Returns the number of rows stamped.
    async fn mark_messages_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64>;
}

#[async_trait::async_trait]
pub trait FollowRepository: Send + Sync {
    /// Ids of users following `user_id`
    async fn follower_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Idempotent; returns true if a new edge was inserted
    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool>;

    /// Idempotent; returns true if an edge was removed
    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool>;
}

/// Trait-object handles to every repository, cheap to clone
#[derive(Clone)]
pub struct Repositories {
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub follows: Arc<dyn FollowRepository>,
}

impl Repositories {
    /// Use one store for all three repositories
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ConversationRepository + MessageRepository + FollowRepository + 'static,
    {
        Self {
            conversations: store.clone(),
            messages: store.clone(),
            follows: store,
        }
    }
}
