use super::{ConversationRepository, FollowRepository, MessageRepository};
use crate::config::SERVICE_NAME;
use crate::error::AppResult;
use crate::models::{DirectPair, Message, Participant};
use chrono::{DateTime, Utc};
use db_pool::{acquire_with_metrics, timed};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL-backed store for every repository trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl ConversationRepository for PgStore {
    async fn conversation_ids_for(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let query = sqlx::query_scalar(
            r#"
            SELECT conversation_id
            FROM conversation_participants
            WHERE user_id = $1
            ORDER BY joined_at ASC, conversation_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool);
        let ids: Vec<Uuid> = timed(SERVICE_NAME, "conversation_ids_for", query).await?;

        Ok(ids)
    }

    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM conversation_participants
                WHERE conversation_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn find_shared_conversation(
        &self,
        user_id: Uuid,
        candidates: &[Uuid],
    ) -> AppResult<Option<Uuid>> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let found: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT conversation_id
            FROM conversation_participants
            WHERE user_id = $1 AND conversation_id = ANY($2)
            ORDER BY array_position($2, conversation_id)
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(candidates)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    async fn insert_conversation(&self, id: Option<Uuid>) -> AppResult<Uuid> {
        let inserted: Uuid = match id {
            Some(id) => {
                sqlx::query_scalar(
                    "INSERT INTO conversations (id, kind) VALUES ($1, 'direct') RETURNING id",
                )
                .bind(id)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("INSERT INTO conversations (kind) VALUES ('direct') RETURNING id")
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(inserted)
    }

    async fn insert_participants(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(conversation_id)
        .bind(user_ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_or_create_direct(
        &self,
        pair: &DirectPair,
        new_id: Uuid,
    ) -> AppResult<(Uuid, bool)> {
        let key = pair.key();
        let mut tx = self.pool.begin().await?;

        // A concurrent insert of the same key blocks here until it commits,
        // then this insert becomes a no-op.
        let insert = sqlx::query_scalar(
            r#"
            INSERT INTO conversations (id, kind, direct_pair_key)
            VALUES ($1, 'direct', $2)
            ON CONFLICT (direct_pair_key) WHERE direct_pair_key IS NOT NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(new_id)
        .bind(&key)
        .fetch_optional(&mut *tx);
        let inserted: Option<Uuid> = timed(SERVICE_NAME, "find_or_create_direct", insert).await?;

        let result = match inserted {
            Some(id) => {
                sqlx::query(
                    r#"
                    INSERT INTO conversation_participants (conversation_id, user_id)
                    VALUES ($1, $2), ($1, $3)
                    "#,
                )
                .bind(id)
                .bind(pair.low())
                .bind(pair.high())
                .execute(&mut *tx)
                .await?;
                (id, true)
            }
            None => {
                let existing: Uuid =
                    sqlx::query_scalar("SELECT id FROM conversations WHERE direct_pair_key = $1")
                        .bind(&key)
                        .fetch_one(&mut *tx)
                        .await?;
                (existing, false)
            }
        };

        tx.commit().await?;
        Ok(result)
    }

    async fn adopt_direct_pair(&self, conversation_id: Uuid, pair: &DirectPair) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET direct_pair_key = $2
            WHERE id = $1
              AND direct_pair_key IS NULL
              AND NOT EXISTS (SELECT 1 FROM conversations WHERE direct_pair_key = $2)
            "#,
        )
        .bind(conversation_id)
        .bind(pair.key())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            // Lost to a concurrent find-or-create of the same pair
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>> {
        let rows = sqlx::query_as::<_, Participant>(
            r#"
            SELECT conversation_id, user_id, joined_at, last_read_at
            FROM conversation_participants
            WHERE conversation_id = $1
            ORDER BY joined_at ASC, user_id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn participations(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<(Uuid, Option<DateTime<Utc>>)>> {
        let rows = sqlx::query_as::<_, (Uuid, Option<DateTime<Utc>>)>(
            r#"
            SELECT conversation_id, last_read_at
            FROM conversation_participants
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let marker: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE conversation_participants
            SET last_read_at = clock_timestamp()
            WHERE conversation_id = $1 AND user_id = $2
            RETURNING last_read_at
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(marker)
    }
}

#[async_trait::async_trait]
impl MessageRepository for PgStore {
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, sender_id, content, created_at, read_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn count_unread_in(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND created_at > $3
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_unread_total(&self, user_id: Uuid) -> AppResult<i64> {
        let mut conn = acquire_with_metrics(&self.pool, SERVICE_NAME).await?;

        let query = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages m
            JOIN conversation_participants cp ON cp.conversation_id = m.conversation_id
            WHERE cp.user_id = $1
              AND m.sender_id <> $1
              AND m.created_at > COALESCE(cp.last_read_at, 'epoch'::timestamptz)
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn);
        let count: i64 = timed(SERVICE_NAME, "count_unread_total", query).await?;

        Ok(count)
    }

    async fn mark_messages_read(
        &self,
        conversation_id: Uuid,
        reader_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read_at = $3
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND read_at IS NULL
              AND created_at <= $3
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl FollowRepository for PgStore {
    async fn follower_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let query = sqlx::query_scalar("SELECT follower_id FROM follows WHERE followee_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool);
        let ids: Vec<Uuid> = timed(SERVICE_NAME, "follower_ids", query).await?;

        Ok(ids)
    }

    async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO follows (follower_id, followee_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            RETURNING follower_id
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.is_some())
    }

    async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let affected = sqlx::query(
            r#"
            DELETE FROM follows
            WHERE follower_id = $1 AND followee_id = $2
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }
}
