use crate::config::ChatConfig;
use crate::realtime::ChangeFeed;
use crate::repository::Repositories;
use crate::services::{
    ConversationResolver, FollowService, MessageService, MutualFollowers, UnreadCounter,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub feed: ChangeFeed,
    pub resolver: Arc<ConversationResolver>,
    pub messages: Arc<MessageService>,
    pub unread: Arc<UnreadCounter>,
    pub follows: FollowService,
    pub mutual_followers: MutualFollowers,
}

impl AppState {
    pub fn new(repos: Repositories, chat: &ChatConfig) -> Self {
        let feed = ChangeFeed::new(chat.change_feed_capacity);

        let resolver = ConversationResolver::new(
            repos.conversations.clone(),
            feed.clone(),
            chat.resolution_strategy,
            chat.id_allocation,
        );
        let messages = MessageService::new(
            repos.conversations.clone(),
            repos.messages.clone(),
            feed.clone(),
        );
        let unread = UnreadCounter::new(
            repos.conversations.clone(),
            repos.messages.clone(),
            chat.unread_aggregation,
        );

        Self {
            resolver: Arc::new(resolver),
            messages: Arc::new(messages),
            unread: Arc::new(unread),
            follows: FollowService::new(repos.follows.clone(), feed.clone()),
            mutual_followers: MutualFollowers::new(repos.follows),
            feed,
        }
    }
}
