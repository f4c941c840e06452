use super::{ConversationRepository, FollowRepository, MessageRepository};
use crate::error::{AppError, AppResult};
use crate::models::message::never_read;
use crate::models::{Conversation, ConversationKind, DirectPair, Follow, Message, Participant};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    conversations: Vec<Conversation>,
    participants: Vec<Participant>,
    messages: Vec<Message>,
    follows: Vec<Follow>,
    pair_index: HashMap<String, Uuid>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing clock so two writes never share a timestamp
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(next);
        next
    }

    fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.conversation_id == conversation_id && p.user_id == user_id)
    }

    fn add_participant(&mut self, conversation_id: Uuid, user_id: Uuid) {
        if self.is_participant(conversation_id, user_id) {
            return;
        }
        let joined_at = self.stamp();
        self.participants.push(Participant {
            conversation_id,
            user_id,
            joined_at,
            last_read_at: None,
        });
    }

    fn add_conversation(&mut self, id: Uuid, direct_pair_key: Option<String>) -> AppResult<()> {
        if self.conversations.iter().any(|c| c.id == id) {
            return Err(AppError::Database(format!(
                "duplicate key value violates unique constraint \"conversations_pkey\" ({id})"
            )));
        }
        let created_at = self.stamp();
        self.conversations.push(Conversation {
            id,
            kind: ConversationKind::Direct,
            direct_pair_key,
            created_at,
        });
        Ok(())
    }
}

/// In-process store with the same observable behaviour as `PgStore`.
///
/// Every call suspends once before touching the tables, so concurrent
/// callers interleave between calls the way remote round trips do.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    operations: AtomicU64,
    fail_next_participant_insert: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls made so far
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Make the next `insert_participants` call fail after doing nothing
    pub fn fail_next_participant_insert(&self) {
        self.fail_next_participant_insert
            .store(true, Ordering::SeqCst);
    }

    pub async fn conversation_count(&self) -> usize {
        self.tables.lock().await.conversations.len()
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.tables.lock().await.conversations.clone()
    }

    pub async fn participant_count(&self) -> usize {
        self.tables.lock().await.participants.len()
    }

    pub async fn messages_in(&self, conversation_id: Uuid) -> Vec<Message> {
        self.tables
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    async fn enter(&self) -> tokio::sync::MutexGuard<'_, Tables> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.tables.lock().await
    }
}

#[async_trait::async_trait]
impl ConversationRepository for MemoryStore {
    async fn conversation_ids_for(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let tables = self.enter().await;
        Ok(tables
            .participants
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.conversation_id)
            .collect())
    }

    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let tables = self.enter().await;
        Ok(tables.is_participant(conversation_id, user_id))
    }

    async fn find_shared_conversation(
        &self,
        user_id: Uuid,
        candidates: &[Uuid],
    ) -> AppResult<Option<Uuid>> {
        let tables = self.enter().await;
        Ok(candidates
            .iter()
            .copied()
            .find(|conversation_id| tables.is_participant(*conversation_id, user_id)))
    }

    async fn insert_conversation(&self, id: Option<Uuid>) -> AppResult<Uuid> {
        let mut tables = self.enter().await;
        let id = id.unwrap_or_else(Uuid::new_v4);
        tables.add_conversation(id, None)?;
        Ok(id)
    }

    async fn insert_participants(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> AppResult<()> {
        let mut tables = self.enter().await;
        if self
            .fail_next_participant_insert
            .swap(false, Ordering::SeqCst)
        {
            return Err(AppError::Database(
                "new row violates row-level security policy for table \"conversation_participants\""
                    .into(),
            ));
        }
        if !tables.conversations.iter().any(|c| c.id == conversation_id) {
            return Err(AppError::Database(format!(
                "insert violates foreign key constraint: conversation {conversation_id} missing"
            )));
        }
        for user_id in user_ids {
            tables.add_participant(conversation_id, *user_id);
        }
        Ok(())
    }

    async fn find_or_create_direct(
        &self,
        pair: &DirectPair,
        new_id: Uuid,
    ) -> AppResult<(Uuid, bool)> {
        let mut tables = self.enter().await;
        let key = pair.key();
        if let Some(existing) = tables.pair_index.get(&key) {
            return Ok((*existing, false));
        }

        tables.add_conversation(new_id, Some(key.clone()))?;
        for user_id in pair.members() {
            tables.add_participant(new_id, user_id);
        }
        tables.pair_index.insert(key, new_id);
        Ok((new_id, true))
    }

    async fn adopt_direct_pair(&self, conversation_id: Uuid, pair: &DirectPair) -> AppResult<bool> {
        let mut tables = self.enter().await;
        let key = pair.key();
        if tables.pair_index.contains_key(&key) {
            return Ok(false);
        }
        let Some(conversation) = tables
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id && c.direct_pair_key.is_none())
        else {
            return Ok(false);
        };
        conversation.direct_pair_key = Some(key.clone());
        tables.pair_index.insert(key, conversation_id);
        Ok(true)
    }

    async fn participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>> {
        let tables = self.enter().await;
        Ok(tables
            .participants
            .iter()
            .filter(|p| p.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn participations(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<(Uuid, Option<DateTime<Utc>>)>> {
        let tables = self.enter().await;
        Ok(tables
            .participants
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| (p.conversation_id, p.last_read_at))
            .collect())
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let mut tables = self.enter().await;
        if !tables.is_participant(conversation_id, user_id) {
            return Ok(None);
        }
        let at = tables.stamp();
        for participant in tables
            .participants
            .iter_mut()
            .filter(|p| p.conversation_id == conversation_id && p.user_id == user_id)
        {
            participant.last_read_at = Some(at);
        }
        Ok(Some(at))
    }
}

#[async_trait::async_trait]
impl MessageRepository for MemoryStore {
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let mut tables = self.enter().await;
        if !tables.conversations.iter().any(|c| c.id == conversation_id) {
            return Err(AppError::NotFound);
        }
        let created_at = tables.stamp();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: content.to_string(),
            created_at,
            read_at: None,
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn count_unread_in(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<i64> {
        let tables = self.enter().await;
        let count = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.is_unread_for(user_id, since))
            .count();
        Ok(count as i64)
    }

    async fn count_unread_total(&self, user_id: Uuid) -> AppResult<i64> {
        let tables = self.enter().await;
        let markers: HashMap<Uuid, DateTime<Utc>> = tables
            .participants
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| (p.conversation_id, p.last_read_at.unwrap_or_else(never_read)))
            .collect();

        let count = tables
            .messages
            .iter()
            .filter(|m| {
                markers
                    .get(&m.conversation_id)
                    .is_some_and(|since| m.is_unread_for(user_id, *since))
            })
            .count();
        Ok(count as i64)
    }

    async fn mark_messages_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tables = self.enter().await;
        let mut stamped = 0;
        for message in tables.messages.iter_mut().filter(|m| {
            m.conversation_id == conversation_id
                && m.sender_id != reader_id
                && m.read_at.is_none()
                && m.created_at <= at
        }) {
            message.read_at = Some(at);
            stamped += 1;
        }
        Ok(stamped)
    }
}

#[async_trait::async_trait]
impl FollowRepository for MemoryStore {
    async fn follower_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let tables = self.enter().await;
        Ok(tables
            .follows
            .iter()
            .filter(|f| f.followee_id == user_id)
            .map(|f| f.follower_id)
            .collect())
    }

    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let mut tables = self.enter().await;
        if tables
            .follows
            .iter()
            .any(|f| f.follower_id == follower_id && f.followee_id == followee_id)
        {
            return Ok(false);
        }
        let created_at = tables.stamp();
        tables.follows.push(Follow {
            follower_id,
            followee_id,
            created_at,
        });
        Ok(true)
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let mut tables = self.enter().await;
        let before = tables.follows.len();
        tables
            .follows
            .retain(|f| !(f.follower_id == follower_id && f.followee_id == followee_id));
        Ok(tables.follows.len() != before)
    }
}
