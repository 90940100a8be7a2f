//! Model client trait and common message types
//!
//! This module defines the [`ModelClient`] trait every remote model backend
//! implements, plus the role-tagged [`Message`] used for conversation history.

use crate::error::Result;
use crate::models::{ChatMessage, Sender};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Role of the user turn in model history
pub const ROLE_USER: &str = "user";

/// Role of the assistant turn in model history
pub const ROLE_MODEL: &str = "model";

/// A stream of reply text chunks, terminated by completion or an error
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Message structure for model history
///
/// Represents one prior turn of the conversation as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (`user` or `model`)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use mentesa::providers::Message;
    ///
    /// let msg = Message::user("Oi, tudo bem?");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_USER.to_string(),
            content: content.into(),
        }
    }

    /// Creates a new model message
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_MODEL.to_string(),
            content: content.into(),
        }
    }

    /// Returns true if this is a user turn
    pub fn is_user(&self) -> bool {
        self.role == ROLE_USER
    }
}

impl From<&ChatMessage> for Message {
    fn from(message: &ChatMessage) -> Self {
        match message.sender {
            Sender::User => Self::user(message.text.clone()),
            Sender::Bot => Self::model(message.text.clone()),
        }
    }
}

/// Remote model trait
///
/// Implementations stream reply text for a prompt, given a system prompt and
/// the bounded prior history (oldest first, the new prompt excluded).
///
/// # Examples
///
/// ```no_run
/// use mentesa::providers::{Message, ModelClient, TextStream};
/// use mentesa::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoClient;
///
/// #[async_trait]
/// impl ModelClient for EchoClient {
///     async fn stream_reply(
///         &self,
///         _system_prompt: &str,
///         _history: &[Message],
///         prompt: &str,
///     ) -> Result<TextStream> {
///         let reply = prompt.to_string();
///         Ok(Box::pin(futures::stream::once(async move { Ok(reply) })))
///     }
/// }
/// ```
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Starts a streamed reply
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or is rejected before
    /// streaming starts. Failures mid-stream arrive as stream items.
    async fn stream_reply(
        &self,
        system_prompt: &str,
        history: &[Message],
        prompt: &str,
    ) -> Result<TextStream>;

    /// Name of the model in use
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// Collects a whole reply into one string
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        prompt: &str,
    ) -> Result<String> {
        let mut stream = self.stream_reply(system_prompt, history, prompt).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            reply.push_str(&chunk?);
        }
        Ok(reply)
    }
}
