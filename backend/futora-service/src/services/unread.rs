//! Unread message counting and the live unread counter.

use crate::error::{AppError, AppResult};
use crate::models::message::never_read;
use crate::realtime::{ChangeFeed, ChangeFilter, ChangeKind, FeedError, Subscription, Table};
use crate::repository::{ConversationRepository, MessageRepository};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMode {
    /// One count query per conversation, summed here
    FanOut,
    /// A single aggregate query in the store
    #[default]
    Aggregate,
}

impl FromStr for AggregationMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fanout" | "fan_out" => Ok(AggregationMode::FanOut),
            "aggregate" => Ok(AggregationMode::Aggregate),
            other => Err(AppError::Config(format!(
                "unknown UNREAD_AGGREGATION: {other}"
            ))),
        }
    }
}

/// Counts messages sent by others after the user's read marker, across all
/// of the user's conversations
pub struct UnreadCounter {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    mode: AggregationMode,
}

impl UnreadCounter {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        mode: AggregationMode,
    ) -> Self {
        Self {
            conversations,
            messages,
            mode,
        }
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    /// Total unread for `user_id`; zero without any store call when absent
    pub async fn count(&self, user_id: Option<Uuid>) -> AppResult<i64> {
        let Some(user_id) = user_id else {
            return Ok(0);
        };

        match self.mode {
            AggregationMode::Aggregate => self.messages.count_unread_total(user_id).await,
            AggregationMode::FanOut => {
                let participations = self.conversations.participations(user_id).await?;
                let mut total = 0;
                for (conversation_id, last_read_at) in participations {
                    total += self
                        .messages
                        .count_unread_in(
                            conversation_id,
                            user_id,
                            last_read_at.unwrap_or_else(never_read),
                        )
                        .await?;
                }
                Ok(total)
            }
        }
    }
}

/// Live unread count for one user.
///
/// Holds a change-feed subscription for message inserts and the user's own
/// participant updates, and recounts from scratch on each of them. The
/// subscription and the background task are released when the watcher is
/// dropped.
pub struct UnreadWatcher {
    user_id: Uuid,
    receiver: watch::Receiver<i64>,
    task: JoinHandle<()>,
}

impl UnreadWatcher {
    pub fn filters(user_id: Uuid) -> Vec<ChangeFilter> {
        vec![
            ChangeFilter::table(Table::Messages).kind(ChangeKind::Insert),
            ChangeFilter::table(Table::ConversationParticipants)
                .kind(ChangeKind::Update)
                .user(user_id),
        ]
    }

    /// Subscribe, compute the initial count and start recounting on events
    pub async fn start(
        counter: Arc<UnreadCounter>,
        feed: &ChangeFeed,
        user_id: Uuid,
    ) -> AppResult<Self> {
        // Subscribe first so nothing published during the initial count is missed
        let subscription = feed.subscribe(Self::filters(user_id));
        let initial = counter.count(Some(user_id)).await?;
        let (sender, receiver) = watch::channel(initial);

        let task = tokio::spawn(Self::run(counter, subscription, sender, user_id));
        tracing::debug!(user_id = %user_id, unread = initial, "unread watcher started");

        Ok(Self {
            user_id,
            receiver,
            task,
        })
    }

    async fn run(
        counter: Arc<UnreadCounter>,
        mut subscription: Subscription,
        sender: watch::Sender<i64>,
        user_id: Uuid,
    ) {
        loop {
            match subscription.recv().await {
                Ok(_) => {}
                Err(FeedError::Lagged(skipped)) => {
                    tracing::debug!(user_id = %user_id, skipped, "unread watcher lagged, recounting");
                }
                Err(FeedError::Closed) => break,
            }

            match counter.count(Some(user_id)).await {
                Ok(count) => {
                    sender.send_replace(count);
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "unread recount failed");
                }
            }

            if sender.is_closed() {
                break;
            }
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Most recent count
    pub fn current(&self) -> i64 {
        *self.receiver.borrow()
    }

    /// A receiver that observes every recount
    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.receiver.clone()
    }

    /// Wait until the count satisfies `predicate` and return it
    pub async fn wait_for(&mut self, predicate: impl FnMut(&i64) -> bool) -> AppResult<i64> {
        let value = self
            .receiver
            .wait_for(predicate)
            .await
            .map_err(|_| AppError::Internal)?;
        Ok(*value)
    }

    /// Wait for the next recount. `None` once the recount task has ended.
    pub async fn changed(&mut self) -> Option<i64> {
        self.receiver.changed().await.ok()?;
        let count = *self.receiver.borrow_and_update();
        Some(count)
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Abort the recount task now. The subscription it owns is released when
    /// the runtime drops the task, as it is on drop of the watcher.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for UnreadWatcher {
    fn drop(&mut self) {
        self.task.abort();
        tracing::debug!(user_id = %self.user_id, "unread watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("fanout".parse::<AggregationMode>().unwrap(), AggregationMode::FanOut);
        assert_eq!(
            "AGGREGATE".parse::<AggregationMode>().unwrap(),
            AggregationMode::Aggregate
        );
        assert!("sum".parse::<AggregationMode>().is_err());
    }

    #[tokio::test]
    async fn test_fan_out_issues_one_query_per_conversation() {
        let store = Arc::new(MemoryStore::new());
        let me = Uuid::new_v4();
        for _ in 0..3 {
            let id = store.insert_conversation(None).await.unwrap();
            store
                .insert_participants(id, &[me, Uuid::new_v4()])
                .await
                .unwrap();
        }

        let counter = UnreadCounter::new(store.clone(), store.clone(), AggregationMode::FanOut);
        let before = store.operations();
        assert_eq!(counter.count(Some(me)).await.unwrap(), 0);
        assert_eq!(store.operations() - before, 1 + 3);

        let counter = UnreadCounter::new(store.clone(), store.clone(), AggregationMode::Aggregate);
        let before = store.operations();
        assert_eq!(counter.count(Some(me)).await.unwrap(), 0);
        assert_eq!(store.operations() - before, 1);
    }

    #[tokio::test]
    async fn test_stop_releases_subscription() {
        let store = Arc::new(MemoryStore::new());
        let feed = ChangeFeed::new(8);
        let counter = Arc::new(UnreadCounter::new(
            store.clone(),
            store,
            AggregationMode::Aggregate,
        ));

        let watcher = UnreadWatcher::start(counter, &feed, Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        watcher.stop();
        for _ in 0..100 {
            if feed.subscriber_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_filters_are_scoped_to_user() {
        let user = Uuid::new_v4();
        let filters = UnreadWatcher::filters(user);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].table, Table::Messages);
        assert_eq!(filters[1].user_id, Some(user));
    }
}
