//! Chat orchestration
//!
//! The [`ChatOrchestrator`] drives the chat screen: it owns the active
//! conversation, sends prompts to the model under the content policy, and
//! publishes observable state for the front-end.

pub mod orchestrator;
pub mod state;
pub mod subscription;
pub mod title;

pub use orchestrator::{
    ensure_owned, load_display_items, prepare_rename, ChatDependencies, ChatOrchestrator,
};
pub use state::{ChatSettings, ChatStatus, SendOutcome};
pub use subscription::Subscription;
