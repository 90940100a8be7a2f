use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::Config;

/// Text published when a message is sent while a reply is still streaming
pub const BUSY_NOTICE: &str = "Aguarde a resposta anterior terminar.";

/// Reply persisted when the model finishes without any text
pub const EMPTY_REPLY_MESSAGE: &str =
    "Desculpe, não consegui formular uma resposta agora. Pode tentar de novo?";

/// Prefix of the error text published when the model call fails
pub const REPLY_ERROR_PREFIX: &str = "Erro ao obter resposta";

/// Status of the chat view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    /// Ready for input
    #[default]
    Idle,
    /// A reply is being generated
    Loading,
    /// The last operation failed; see the error message
    Error,
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Result of a send that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The model answered and the reply was stored
    Replied {
        /// Conversation the exchange was stored under
        conversation_id: i64,
        /// Stored reply text
        reply: String,
    },
    /// The prompt hit the content policy; the refusal was stored
    Refused {
        /// Conversation the exchange was stored under
        conversation_id: i64,
    },
    /// Persistence or the model call failed; see the error message
    Failed {
        /// Conversation the prompt was sent in
        conversation_id: i64,
        /// Published error text
        message: String,
    },
}

impl SendOutcome {
    /// Conversation the send belonged to
    pub fn conversation_id(&self) -> i64 {
        match self {
            Self::Replied {
                conversation_id, ..
            }
            | Self::Refused { conversation_id }
            | Self::Failed {
                conversation_id, ..
            } => *conversation_id,
        }
    }
}

/// Tunables of the chat orchestrator
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Number of prior messages sent with each prompt
    pub history_window: usize,
    /// Maximum length of a title derived from the first message
    pub title_max_chars: usize,
    /// Base system prompt
    pub system_prompt: String,
    /// Upper bound for one streamed reply
    pub reply_timeout: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            title_max_chars: crate::chat::title::DEFAULT_TITLE_MAX_CHARS,
            system_prompt: crate::prompts::SYSTEM_PROMPT.to_string(),
            reply_timeout: Duration::from_secs(60),
        }
    }
}

impl ChatSettings {
    /// Settings taken from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            history_window: config.chat.history_window,
            title_max_chars: config.chat.title_max_chars,
            system_prompt: config.system_prompt().to_string(),
            reply_timeout: Duration::from_secs(config.provider.gemini.timeout_seconds),
        }
    }
}
