use crate::error::{AppError, AppResult};
use crate::models::message::MAX_CONTENT_CHARS;
use crate::models::Message;
use crate::realtime::{ChangeEvent, ChangeFeed};
use crate::repository::{ConversationRepository, MessageRepository};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Sending messages and advancing read markers. Every successful write is
/// published on the change feed.
pub struct MessageService {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    feed: ChangeFeed,
}

impl MessageService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        feed: ChangeFeed,
    ) -> Self {
        Self {
            conversations,
            messages,
            feed,
        }
    }

    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("Message cannot be empty".into()));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::BadRequest(format!(
                "Message too long (max {MAX_CONTENT_CHARS})"
            )));
        }

        if !self
            .conversations
            .is_participant(conversation_id, sender_id)
            .await?
        {
            return Err(AppError::Forbidden);
        }

        let message = self
            .messages
            .insert_message(conversation_id, sender_id, content)
            .await?;
        self.feed.publish(ChangeEvent::message_inserted(&message));

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            "message sent"
        );
        Ok(message)
    }

    /// Mark everything currently in the conversation as read by `user_id`.
    /// Returns the new read marker.
    pub async fn mark_read(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<DateTime<Utc>> {
        let at = self
            .conversations
            .mark_read(conversation_id, user_id)
            .await?
            .ok_or(AppError::Forbidden)?;

        let stamped = self
            .messages
            .mark_messages_read(conversation_id, user_id, at)
            .await?;
        self.feed
            .publish(ChangeEvent::participant_read(conversation_id, user_id, at));

        tracing::debug!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            stamped,
            "conversation marked as read"
        );
        Ok(at)
    }
}
