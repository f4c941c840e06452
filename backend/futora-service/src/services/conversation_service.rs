use crate::error::{AppError, AppResult};
use crate::models::{DirectPair, Participant};
use crate::realtime::{ChangeEvent, ChangeFeed};
use crate::repository::ConversationRepository;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// How an existing direct conversation is looked up and, when missing, created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionStrategy {
    /// Probe self's conversations one by one for the other user, first hit wins.
    /// Creation is a separate conversation insert followed by participant inserts.
    Scan,
    /// One membership query for the other user over all of self's conversations.
    /// Same two-step creation as `Scan`.
    Batch,
    /// Store-enforced find-or-create keyed by the canonical user pair
    #[default]
    AtomicPair,
}

impl FromStr for ResolutionStrategy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scan" => Ok(ResolutionStrategy::Scan),
            "batch" => Ok(ResolutionStrategy::Batch),
            "atomic" | "atomic_pair" => Ok(ResolutionStrategy::AtomicPair),
            other => Err(AppError::Config(format!(
                "unknown RESOLUTION_STRATEGY: {other}"
            ))),
        }
    }
}

/// Who allocates the id of a conversation created by the two-step path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdAllocation {
    /// Generated here before the insert, so the row never has to be read back
    #[default]
    Client,
    /// Generated by the store and returned from the insert
    Server,
}

impl FromStr for IdAllocation {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(IdAllocation::Client),
            "server" => Ok(IdAllocation::Server),
            other => Err(AppError::Config(format!("unknown ID_ALLOCATION: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub conversation_id: Uuid,
    pub created: bool,
}

/// Finds or creates the direct conversation between two users
pub struct ConversationResolver {
    repo: Arc<dyn ConversationRepository>,
    feed: ChangeFeed,
    strategy: ResolutionStrategy,
    id_allocation: IdAllocation,
}

impl ConversationResolver {
    pub fn new(
        repo: Arc<dyn ConversationRepository>,
        feed: ChangeFeed,
        strategy: ResolutionStrategy,
        id_allocation: IdAllocation,
    ) -> Self {
        Self {
            repo,
            feed,
            strategy,
            id_allocation,
        }
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Resolve the direct conversation between `self_id` and `other_id`.
    ///
    /// Returns `Ok(None)` without touching the store when both ids are the
    /// same user. The result is not cached; callers only use it to navigate.
    pub async fn resolve(&self, self_id: Uuid, other_id: Uuid) -> AppResult<Option<Resolution>> {
        let Some(pair) = DirectPair::new(self_id, other_id) else {
            tracing::debug!(user_id = %self_id, "resolve with self ignored");
            return Ok(None);
        };

        let resolution = match self.strategy {
            ResolutionStrategy::AtomicPair => match self.lookup(self_id, other_id).await? {
                Some(conversation_id) => {
                    self.adopt(conversation_id, &pair).await;
                    Resolution {
                        conversation_id,
                        created: false,
                    }
                }
                None => {
                    let (conversation_id, created) =
                        self.repo.find_or_create_direct(&pair, Uuid::new_v4()).await?;
                    Resolution {
                        conversation_id,
                        created,
                    }
                }
            },
            ResolutionStrategy::Scan | ResolutionStrategy::Batch => {
                match self.lookup(self_id, other_id).await? {
                    Some(conversation_id) => Resolution {
                        conversation_id,
                        created: false,
                    },
                    None => Resolution {
                        conversation_id: self.create(self_id, other_id).await?,
                        created: true,
                    },
                }
            }
        };

        if resolution.created {
            self.feed
                .publish(ChangeEvent::conversation_created(resolution.conversation_id));
            for user_id in pair.members() {
                self.feed.publish(ChangeEvent::participant_added(
                    resolution.conversation_id,
                    user_id,
                ));
            }
            tracing::info!(
                conversation_id = %resolution.conversation_id,
                strategy = ?self.strategy,
                "direct conversation created"
            );
        }

        Ok(Some(resolution))
    }

    async fn lookup(&self, self_id: Uuid, other_id: Uuid) -> AppResult<Option<Uuid>> {
        let candidates = self.repo.conversation_ids_for(self_id).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        // Candidates come in self's join order; both probes return the earliest
        match self.strategy {
            ResolutionStrategy::Scan => {
                for conversation_id in candidates {
                    if self.repo.is_participant(conversation_id, other_id).await? {
                        return Ok(Some(conversation_id));
                    }
                }
                Ok(None)
            }
            ResolutionStrategy::Batch | ResolutionStrategy::AtomicPair => {
                self.repo
                    .find_shared_conversation(other_id, &candidates)
                    .await
            }
        }
    }

    /// Key a conversation found by membership so later find-or-create calls
    /// land on it. Failure only costs the key, the resolution stands.
    async fn adopt(&self, conversation_id: Uuid, pair: &DirectPair) {
        match self.repo.adopt_direct_pair(conversation_id, pair).await {
            Ok(true) => {
                tracing::debug!(conversation_id = %conversation_id, "pair key adopted");
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "failed to adopt pair key"
                );
            }
        }
    }

    /// Two-step create: conversation row, then both participant rows.
    ///
    /// The steps are not atomic. If the participant insert fails the
    /// conversation row stays behind without members.
    async fn create(&self, self_id: Uuid, other_id: Uuid) -> AppResult<Uuid> {
        let requested = match self.id_allocation {
            IdAllocation::Client => Some(Uuid::new_v4()),
            IdAllocation::Server => None,
        };
        let conversation_id = self.repo.insert_conversation(requested).await?;

        if let Err(e) = self
            .repo
            .insert_participants(conversation_id, &[self_id, other_id])
            .await
        {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = %e,
                "participant insert failed, conversation left without participants"
            );
            return Err(e);
        }

        Ok(conversation_id)
    }

    /// Members of a conversation, visible only to its members
    pub async fn participants(
        &self,
        conversation_id: Uuid,
        requesting_user: Uuid,
    ) -> AppResult<Vec<Participant>> {
        let participants = self.repo.participants(conversation_id).await?;
        if participants.is_empty() {
            return Err(AppError::NotFound);
        }
        if !participants.iter().any(|p| p.user_id == requesting_user) {
            return Err(AppError::Forbidden);
        }
        Ok(participants)
    }
}
