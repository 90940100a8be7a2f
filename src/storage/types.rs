use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, Sender};

/// A persisted chat message row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Row id (insertion order)
    pub id: i64,
    /// Owning conversation
    pub conversation_id: i64,
    /// Message text
    pub text: String,
    /// Author
    pub sender: Sender,
    /// Insertion timestamp in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Owning user
    pub user_id: String,
}

impl MessageRecord {
    /// Maps the stored row to the message shown in the chat view
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            text: self.text.clone(),
            sender: self.sender,
        }
    }
}

/// A message about to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Owning conversation (never the unsaved sentinel)
    pub conversation_id: i64,
    /// Message text
    pub text: String,
    /// Author
    pub sender: Sender,
    /// Insertion timestamp in milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Owning user
    pub user_id: String,
}

/// One entry of the grouped conversation list query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation id
    pub id: i64,
    /// Timestamp of the newest message
    pub last_timestamp: i64,
}

/// Per-conversation title metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    /// Conversation id
    pub conversation_id: i64,
    /// Title chosen by the user, if any
    pub custom_title: Option<String>,
    /// Owning user
    pub user_id: String,
}

/// Change notification published by a store after every write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A message was inserted into the conversation
    MessageInserted {
        /// Owning user
        user_id: String,
        /// Conversation that changed
        conversation_id: i64,
    },
    /// The conversation's metadata was inserted, updated, or removed
    MetadataChanged {
        /// Owning user
        user_id: String,
        /// Conversation that changed
        conversation_id: i64,
    },
    /// All messages of the conversation were removed
    ConversationCleared {
        /// Owning user
        user_id: String,
        /// Conversation that changed
        conversation_id: i64,
    },
}

impl StoreChange {
    /// User whose data changed
    pub fn user_id(&self) -> &str {
        match self {
            Self::MessageInserted { user_id, .. }
            | Self::MetadataChanged { user_id, .. }
            | Self::ConversationCleared { user_id, .. } => user_id,
        }
    }

    /// Conversation whose data changed
    pub fn conversation_id(&self) -> i64 {
        match self {
            Self::MessageInserted {
                conversation_id, ..
            }
            | Self::MetadataChanged {
                conversation_id, ..
            }
            | Self::ConversationCleared {
                conversation_id, ..
            } => *conversation_id,
        }
    }

    /// Whether the change can alter the message list of a conversation
    pub fn touches_messages(&self) -> bool {
        !matches!(self, Self::MetadataChanged { .. })
    }
}
