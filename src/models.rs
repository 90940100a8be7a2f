//! Chat domain types shared by the orchestrator, the store, and the UI
//!
//! Messages are immutable once created. Conversations are identified by a
//! numeric id: the wall-clock millisecond timestamp at creation time, or the
//! [`NEW_CONVERSATION_ID`] sentinel for a conversation that has not been
//! persisted yet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel id of the "new, unsaved" conversation. Never persisted.
pub const NEW_CONVERSATION_ID: i64 = -1;

/// Title shown for the sentinel conversation and used as a last resort.
pub const NEW_CONVERSATION_TITLE: &str = "Nova conversa";

/// Returns true if `id` is the unsaved-conversation sentinel
pub fn is_new_conversation(id: i64) -> bool {
    id == NEW_CONVERSATION_ID
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sender {
    /// The person using the app
    User,
    /// The assistant
    Bot,
}

impl Sender {
    /// Stored representation of the sender
    ///
    /// # Examples
    ///
    /// ```
    /// use mentesa::models::Sender;
    ///
    /// assert_eq!(Sender::User.as_str(), "USER");
    /// assert_eq!(Sender::Bot.as_str(), "BOT");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Bot => "BOT",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Sender {
    /// Lenient decoding used for stored rows: anything other than `USER`
    /// is read back as the bot.
    pub fn from_stored(value: &str) -> Self {
        if value == "USER" {
            Self::User
        } else {
            Self::Bot
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "BOT" => Ok(Self::Bot),
            other => Err(format!("unknown sender: {}", other)),
        }
    }
}

/// A message as shown in the chat view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text
    pub text: String,
    /// Author of the message
    pub sender: Sender,
}

impl ChatMessage {
    /// Creates a message written by the user
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
        }
    }

    /// Creates a message written by the assistant
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Bot,
        }
    }
}

/// Kind of conversation shown in the drawer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    /// A regular support conversation
    #[default]
    General,
}

/// Read-only projection of a conversation for the navigation drawer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDisplayItem {
    /// Conversation id
    pub id: i64,
    /// Effective title (custom title or derived fallback)
    pub display_title: String,
    /// Timestamp (ms) of the newest message in the conversation
    pub last_updated: i64,
    /// Conversation kind
    pub conversation_type: ConversationType,
}
