//! Mente Sã - mental-health support chat library
//!
//! This library provides the conversation core of the Mente Sã assistant:
//! persisted multi-conversation chat history, a streaming model client,
//! topic restrictions, and an orchestrator that ties them together.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: Conversation orchestrator, titles, and observable state
//! - `storage`: SQLite-backed message and metadata store
//! - `providers`: Model client abstraction and the Gemini implementation
//! - `policy`: Keyword-based topic restrictions
//! - `auth`: Firebase sign-in and the session that scopes storage
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Terminal front-end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mentesa::auth::AnonymousIdentity;
//! use mentesa::chat::{ChatDependencies, ChatOrchestrator, ChatSettings};
//! use mentesa::config::Config;
//! use mentesa::policy::KeywordPolicy;
//! use mentesa::providers::create_provider;
//! use mentesa::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let deps = ChatDependencies {
//!         store: Arc::new(SqliteStorage::new()?),
//!         identity: Arc::new(AnonymousIdentity),
//!         model: create_provider(&config.provider)?,
//!         policy: Arc::new(KeywordPolicy::default()),
//!     };
//!     let chat = ChatOrchestrator::new(deps, ChatSettings::from_config(&config)).await;
//!     chat.send_message("Tenho me sentido ansioso").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod policy;
pub mod prompts;
pub mod providers;
pub mod storage;

// Re-export commonly used types
pub use chat::{ChatDependencies, ChatOrchestrator, ChatSettings, ChatStatus, SendOutcome};
pub use config::Config;
pub use error::{MenteSaError, Result};
pub use models::{ChatMessage, ConversationDisplayItem, Sender, NEW_CONVERSATION_ID};
