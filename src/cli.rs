//! Command-line interface definition for Mente Sã
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for chatting, browsing history, and signing in.

use clap::{Parser, Subcommand};

/// Mente Sã - mental-health support chat
///
/// Talk with an assistant focused on emotional well-being. Conversations
/// are stored locally and can be resumed, renamed, or deleted.
#[derive(Parser, Debug, Clone)]
#[command(name = "mentesa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Override the conversation database path
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Mente Sã
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the interactive chat
    Chat {
        /// Start on a new conversation instead of the most recent one
        #[arg(short, long)]
        new: bool,
    },

    /// Browse and manage stored conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Sign in, sign out, and manage the account
    Auth {
        /// Authentication subcommand
        #[command(subcommand)]
        command: AuthCommand,
    },
}

/// Conversation history subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List conversations, most recent first
    List,

    /// Delete a conversation and its title
    Delete {
        /// Conversation id
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },

    /// Give a conversation a custom title
    Rename {
        /// Conversation id
        #[arg(allow_negative_numbers = true)]
        id: i64,
        /// New title
        title: String,
    },

    /// Print the messages of a conversation
    Show {
        /// Conversation id
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
}

/// Account subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Sign in with e-mail and password
    Login {
        /// Account e-mail; prompted for when omitted
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Create an account with e-mail and password
    Register {
        /// Account e-mail; prompted for when omitted
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Sign in with a Google ID token
    Google {
        /// ID token issued by Google Sign-In
        id_token: String,
    },

    /// Send a password reset e-mail
    ResetPassword {
        /// Account e-mail; prompted for when omitted
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Sign out and forget the saved login
    Logout,

    /// Show who is signed in
    Status,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            db: None,
            command: Commands::Chat { new: false },
        }
    }
}
