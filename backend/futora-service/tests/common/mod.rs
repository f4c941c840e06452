//! Shared fixtures for the futora-service integration tests
#![allow(dead_code)]

use futora_service::config::ChatConfig;
use futora_service::realtime::ChangeFeed;
use futora_service::repository::{MemoryStore, Repositories};
use futora_service::services::{
    AggregationMode, ConversationResolver, IdAllocation, MessageService, ResolutionStrategy,
    UnreadCounter,
};
use futora_service::state::AppState;
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(2);

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub feed: ChangeFeed,
    pub resolver: Arc<ConversationResolver>,
    pub messages: MessageService,
    pub unread: Arc<UnreadCounter>,
}

impl Harness {
    pub fn new(strategy: ResolutionStrategy) -> Self {
        Self::with_options(strategy, IdAllocation::Client, AggregationMode::Aggregate, 64)
    }

    pub fn with_options(
        strategy: ResolutionStrategy,
        id_allocation: IdAllocation,
        mode: AggregationMode,
        feed_capacity: usize,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let feed = ChangeFeed::new(feed_capacity);
        let resolver = Arc::new(ConversationResolver::new(
            store.clone(),
            feed.clone(),
            strategy,
            id_allocation,
        ));
        let messages = MessageService::new(store.clone(), store.clone(), feed.clone());
        let unread = Arc::new(UnreadCounter::new(store.clone(), store.clone(), mode));

        Self {
            store,
            feed,
            resolver,
            messages,
            unread,
        }
    }
}

/// Application state over a fresh in-memory store
pub fn memory_state(chat: ChatConfig) -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(Repositories::from_store(store.clone()), &chat);
    (store, state)
}

pub const ALL_STRATEGIES: [ResolutionStrategy; 3] = [
    ResolutionStrategy::Scan,
    ResolutionStrategy::Batch,
    ResolutionStrategy::AtomicPair,
];
