use crate::error::{AppError, AppResult};
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeKind};
use crate::repository::FollowRepository;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct FollowService {
    repo: Arc<dyn FollowRepository>,
    feed: ChangeFeed,
}

impl FollowService {
    pub fn new(repo: Arc<dyn FollowRepository>, feed: ChangeFeed) -> Self {
        Self { repo, feed }
    }

    /// Idempotent create follow; returns true if a new edge was inserted.
    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        if follower_id == followee_id {
            return Err(AppError::BadRequest("You cannot follow yourself".into()));
        }
        let inserted = self.repo.follow(follower_id, followee_id).await?;
        if inserted {
            self.feed
                .publish(ChangeEvent::follow_changed(ChangeKind::Insert, follower_id));
        }
        Ok(inserted)
    }

    /// Idempotent delete; returns true if an edge was removed.
    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let removed = self.repo.unfollow(follower_id, followee_id).await?;
        if removed {
            self.feed
                .publish(ChangeEvent::follow_changed(ChangeKind::Delete, follower_id));
        }
        Ok(removed)
    }
}

/// Size of the intersection of two users' follower sets
#[derive(Clone)]
pub struct MutualFollowers {
    repo: Arc<dyn FollowRepository>,
}

impl MutualFollowers {
    pub fn new(repo: Arc<dyn FollowRepository>) -> Self {
        Self { repo }
    }

    /// Zero without any store call when either id is absent or both are equal
    pub async fn count(&self, a: Option<Uuid>, b: Option<Uuid>) -> AppResult<u64> {
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) if a != b => (a, b),
            _ => return Ok(0),
        };

        let (followers_a, followers_b) =
            futures::try_join!(self.repo.follower_ids(a), self.repo.follower_ids(b))?;

        let lookup: HashSet<Uuid> = followers_a.into_iter().collect();
        let mutual = followers_b
            .into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .filter(|id| lookup.contains(id))
            .count();

        Ok(mutual as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    #[tokio::test]
    async fn test_follow_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let service = FollowService::new(store, ChangeFeed::new(8));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(service.follow(a, b).await.unwrap());
        assert!(!service.follow(a, b).await.unwrap());
        assert!(service.unfollow(a, b).await.unwrap());
        assert!(!service.unfollow(a, b).await.unwrap());
    }

    #[tokio::test]
    async fn test_self_follow_rejected() {
        let store = Arc::new(MemoryStore::new());
        let service = FollowService::new(store.clone(), ChangeFeed::new(8));
        let a = Uuid::new_v4();

        let err = service.follow(a, a).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(store.operations(), 0);
    }

    #[tokio::test]
    async fn test_absent_ids_count_zero() {
        let store = Arc::new(MemoryStore::new());
        let mutual = MutualFollowers::new(store.clone());

        assert_eq!(mutual.count(None, Some(Uuid::new_v4())).await.unwrap(), 0);
        assert_eq!(mutual.count(Some(Uuid::new_v4()), None).await.unwrap(), 0);
        assert_eq!(mutual.count(None, None).await.unwrap(), 0);
        assert_eq!(store.operations(), 0);
    }
}
