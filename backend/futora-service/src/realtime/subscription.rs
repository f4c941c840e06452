use super::{ChangeEvent, ChangeKind, Table};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Matches events on one table, optionally narrowed by kind and owning user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: Table,
    pub kind: Option<ChangeKind>,
    pub user_id: Option<Uuid>,
}

impl ChangeFilter {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            kind: None,
            user_id: None,
        }
    }

    pub fn kind(mut self, kind: ChangeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.table == event.table
            && self.kind.map_or(true, |kind| kind == event.kind)
            && self.user_id.map_or(true, |user| event.user_id == Some(user))
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FeedError {
    /// The receiver fell behind and `0` events were skipped
    #[error("change feed lagged by {0} events")]
    Lagged(u64),

    #[error("change feed closed")]
    Closed,
}

/// Filtered receiving end of the change feed
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    filters: Vec<ChangeFilter>,
}

impl Subscription {
    pub(super) fn new(receiver: broadcast::Receiver<ChangeEvent>, filters: Vec<ChangeFilter>) -> Self {
        Self { receiver, filters }
    }

    /// Wait for the next event matching one of the filters.
    ///
    /// An empty filter list matches nothing, so `recv` only ever returns
    /// errors for it.
    pub async fn recv(&mut self) -> Result<ChangeEvent, FeedError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filters.iter().any(|f| f.matches(&event)) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Err(FeedError::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(FeedError::Closed),
            }
        }
    }

    pub fn filters(&self) -> &[ChangeFilter] {
        &self.filters
    }
}

#[cfg(test)]
mod tests {
    use super::super::ChangeFeed;
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_filter_matching() {
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let conversation = Uuid::new_v4();
        let filter = ChangeFilter::table(Table::ConversationParticipants)
            .kind(ChangeKind::Update)
            .user(user);

        assert!(filter.matches(&ChangeEvent::participant_read(conversation, user, Utc::now())));
        assert!(!filter.matches(&ChangeEvent::participant_read(conversation, other, Utc::now())));
        assert!(!filter.matches(&ChangeEvent::participant_added(conversation, user)));
        assert!(!filter.matches(&ChangeEvent::conversation_created(conversation)));
    }

    #[tokio::test]
    async fn test_recv_skips_non_matching_events() {
        let feed = ChangeFeed::new(16);
        let user = Uuid::new_v4();
        let conversation = Uuid::new_v4();
        let mut subscription = feed.subscribe(vec![ChangeFilter::table(Table::ConversationParticipants)
            .kind(ChangeKind::Update)
            .user(user)]);

        feed.publish(ChangeEvent::conversation_created(conversation));
        feed.publish(ChangeEvent::participant_read(conversation, Uuid::new_v4(), Utc::now()));
        feed.publish(ChangeEvent::participant_read(conversation, user, Utc::now()));

        let event = subscription.recv().await.unwrap();
        assert_eq!(event.user_id, Some(user));
        assert_eq!(event.kind, ChangeKind::Update);
    }

    #[tokio::test]
    async fn test_lag_is_reported() {
        let feed = ChangeFeed::new(2);
        let mut subscription = feed.subscribe(vec![ChangeFilter::table(Table::Conversations)]);

        for _ in 0..5 {
            feed.publish(ChangeEvent::conversation_created(Uuid::new_v4()));
        }

        assert_eq!(subscription.recv().await, Err(FeedError::Lagged(3)));
        // The receiver resumes at the oldest retained event
        assert!(subscription.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_when_feed_dropped() {
        let feed = ChangeFeed::new(4);
        let mut subscription = feed.subscribe(vec![ChangeFilter::table(Table::Messages)]);
        drop(feed);
        assert_eq!(subscription.recv().await, Err(FeedError::Closed));
    }
}
