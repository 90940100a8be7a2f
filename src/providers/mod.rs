//! Provider module for Mente Sã
//!
//! This module contains the remote model abstraction and the Google Gemini
//! implementation.

pub mod base;
pub mod gemini;

pub use base::{Message, ModelClient, TextStream, ROLE_MODEL, ROLE_USER};
pub use gemini::GeminiProvider;

use crate::config::ProviderConfig;
use crate::error::{MenteSaError, Result};
use std::sync::Arc;

/// Create a model client based on configuration
///
/// # Errors
///
/// Returns error if the provider type is unknown or initialization fails
/// (for example, when no API key is configured)
///
/// # Examples
///
/// ```
/// use mentesa::config::ProviderConfig;
/// use mentesa::providers::create_provider;
///
/// let mut config = ProviderConfig::default();
/// config.gemini.api_key = Some("test-key".to_string());
/// assert!(create_provider(&config).is_ok());
///
/// config.provider_type = "openai".to_string();
/// assert!(create_provider(&config).is_err());
/// ```
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelClient>> {
    match config.provider_type.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config.gemini.clone())?)),
        other => Err(MenteSaError::Provider(format!("Unknown provider type: {}", other)).into()),
    }
}
