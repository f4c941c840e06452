pub mod conversation;
pub mod follow;
pub mod message;

pub use conversation::{Conversation, ConversationKind, DirectPair, Participant};
pub use follow::Follow;
pub use message::Message;
