//! Configuration management for Mente Sã
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{MenteSaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Mente Sã
///
/// Holds the model provider settings, chat behavior, storage location,
/// authentication endpoints, content policy additions and logging format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote model provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Chat behavior configuration
    #[serde(default)]
    pub chat: ChatConfig,
    /// Conversation storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Authentication backend configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Content policy additions
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider configuration
///
/// Specifies which remote model to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// Google Gemini configuration
    #[serde(default)]
    pub gemini: GeminiConfig,
}

fn default_provider_type() -> String {
    "gemini".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            gemini: GeminiConfig::default(),
        }
    }
}

/// Google Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Model to use for replies
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// API base URL (overridable so tests can point at a mock server)
    #[serde(default = "default_gemini_api_base")]
    pub api_base: String,

    /// API key; usually supplied through the environment
    #[serde(default)]
    pub api_key: Option<String>,

    /// Upper bound for one streamed reply, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            api_base: default_gemini_api_base(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            temperature: default_temperature(),
        }
    }
}

/// Chat behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of prior messages sent to the model with each prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Maximum length of a title derived from the first message
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Replaces the built-in system prompt when set
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_history_window() -> usize {
    10
}

fn default_title_max_chars() -> usize {
    crate::chat::title::DEFAULT_TITLE_MAX_CHARS
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            title_max_chars: default_title_max_chars(),
            system_prompt: None,
        }
    }
}

/// Conversation storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; the platform data directory is used when unset
    #[serde(default)]
    pub db_path: Option<String>,
}

/// Authentication backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Firebase web API key
    #[serde(default)]
    pub firebase_api_key: Option<String>,

    /// Identity Toolkit base URL
    #[serde(default = "default_identity_api_base")]
    pub identity_api_base: String,
}

fn default_identity_api_base() -> String {
    "https://identitytoolkit.googleapis.com".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            firebase_api_key: None,
            identity_api_base: default_identity_api_base(),
        }
    }
}

/// Content policy additions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Keywords blocked in addition to the built-in table
    #[serde(default)]
    pub extra_blocked_keywords: Vec<String>,
}

/// Log output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| MenteSaError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| MenteSaError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider_type) = std::env::var("MENTESA_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(model) = std::env::var("MENTESA_GEMINI_MODEL") {
            self.provider.gemini.model = model;
        }

        if let Ok(api_base) = std::env::var("MENTESA_GEMINI_API_BASE") {
            self.provider.gemini.api_base = api_base;
        }

        let api_key = std::env::var("MENTESA_GEMINI_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .ok();
        if let Some(key) = api_key {
            self.provider.gemini.api_key = Some(key);
        }

        if let Ok(window) = std::env::var("MENTESA_HISTORY_WINDOW") {
            match window.parse::<usize>() {
                Ok(v) => {
                    self.chat.history_window = v;
                    tracing::debug!(history_window = v, "Env override: MENTESA_HISTORY_WINDOW");
                }
                Err(_) => {
                    tracing::warn!("Invalid MENTESA_HISTORY_WINDOW: {}", window);
                }
            }
        }

        if let Ok(db_path) = std::env::var(crate::storage::DB_PATH_ENV) {
            self.storage.db_path = Some(db_path);
        }

        if let Ok(key) = std::env::var("MENTESA_FIREBASE_API_KEY") {
            self.auth.firebase_api_key = Some(key);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(db) = &cli.db {
            self.storage.db_path = Some(db.clone());
        }
    }

    /// System prompt sent with every model call
    pub fn system_prompt(&self) -> &str {
        self.chat
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(crate::prompts::SYSTEM_PROMPT)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.provider.provider_type.is_empty() {
            return Err(MenteSaError::Config("Provider type cannot be empty".to_string()).into());
        }

        let valid_providers = ["gemini"];
        if !valid_providers.contains(&self.provider.provider_type.as_str()) {
            return Err(MenteSaError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                valid_providers.join(", ")
            ))
            .into());
        }

        if self.chat.history_window == 0 || self.chat.history_window > 100 {
            return Err(MenteSaError::Config(
                "chat.history_window must be between 1 and 100".to_string(),
            )
            .into());
        }

        if self.chat.title_max_chars < 4 {
            return Err(MenteSaError::Config(
                "chat.title_max_chars must be at least 4".to_string(),
            )
            .into());
        }

        if self.provider.gemini.timeout_seconds == 0 {
            return Err(MenteSaError::Config(
                "provider.gemini.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.provider.gemini.temperature) {
            return Err(MenteSaError::Config(
                "provider.gemini.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            chat: ChatConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            policy: PolicyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
