pub mod conversation_service;
pub mod follow;
pub mod message_service;
pub mod unread;

pub use conversation_service::{ConversationResolver, IdAllocation, Resolution, ResolutionStrategy};
pub use follow::{FollowService, MutualFollowers};
pub use message_service::MessageService;
pub use unread::{AggregationMode, UnreadCounter, UnreadWatcher};
