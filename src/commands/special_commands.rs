//! Special commands parser for the interactive chat
//!
//! Special commands manage conversations and the session instead of being
//! sent to the assistant:
//! - Start, list, open, rename, and delete conversations
//! - Sign in and out
//! - Show status and help, or exit
//!
//! Commands are prefixed with `/` and are case-insensitive. Arguments keep
//! their original case.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Comando desconhecido: {0}\n\nDigite '/help' para ver os comandos disponíveis")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Argumento inválido para {command}: {arg}\n\nDigite '/help' para ver o uso correto")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("O comando {command} precisa de um argumento\n\nUso: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Where an `/open` argument points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationRef {
    /// Number shown by `/list`, starting at 1
    Position(usize),
    /// Stored conversation id
    Id(i64),
}

impl ConversationRef {
    /// Interprets `value` against a list of `listed` conversations
    ///
    /// Small numbers within the list are positions; anything else is an id.
    pub fn parse(value: i64, listed: usize) -> Self {
        match usize::try_from(value) {
            Ok(n) if n >= 1 && n <= listed => Self::Position(n),
            _ => Self::Id(value),
        }
    }
}

/// Special commands that can be executed during the interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Start a new conversation
    New,

    /// List stored conversations
    List,

    /// Open a conversation by list position or id
    Open(i64),

    /// Rename the active conversation
    Rename(String),

    /// Delete a conversation; the active one when no id is given
    Delete(Option<i64>),

    /// Show session and conversation status
    ShowStatus,

    /// Sign in with e-mail and password
    Login,

    /// Sign out
    Logout,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; the input is a message for the assistant
    None,
}

fn parse_id(command: &str, arg: &str) -> Result<i64, CommandError> {
    arg.parse::<i64>()
        .map_err(|_| CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        })
}

/// Parse a user input string into a special command
///
/// # Errors
///
/// Returns CommandError::UnknownCommand if input starts with "/" but is not a valid command.
/// Returns CommandError::UnsupportedArgument if a command receives an invalid argument.
/// Returns CommandError::MissingArgument if a command requires an argument but none was provided.
///
/// # Examples
///
/// ```
/// use mentesa::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::New);
/// assert_eq!(
///     parse_special_command("/rename Minha semana").unwrap(),
///     SpecialCommand::Rename("Minha semana".to_string())
/// );
/// assert_eq!(parse_special_command("olá").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') {
        return Ok(match lower.as_str() {
            "exit" | "quit" | "sair" => SpecialCommand::Exit,
            _ => SpecialCommand::None,
        });
    }

    let (name, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((name, arg)) => (name.to_lowercase(), arg.trim()),
        None => (lower.clone(), ""),
    };

    match (name.as_str(), arg) {
        ("/new" | "/nova", "") => Ok(SpecialCommand::New),
        ("/list" | "/ls", "") => Ok(SpecialCommand::List),
        ("/status", "") => Ok(SpecialCommand::ShowStatus),
        ("/login", "") => Ok(SpecialCommand::Login),
        ("/logout", "") => Ok(SpecialCommand::Logout),
        ("/help" | "/?", "") => Ok(SpecialCommand::Help),
        ("/exit" | "/quit", "") => Ok(SpecialCommand::Exit),

        ("/open", "") => Err(CommandError::MissingArgument {
            command: "/open".to_string(),
            usage: "/open <número|id>".to_string(),
        }),
        ("/open", arg) => parse_id("/open", arg).map(SpecialCommand::Open),

        ("/rename", "") => Err(CommandError::MissingArgument {
            command: "/rename".to_string(),
            usage: "/rename <título>".to_string(),
        }),
        ("/rename", arg) => Ok(SpecialCommand::Rename(arg.to_string())),

        ("/delete", "") => Ok(SpecialCommand::Delete(None)),
        ("/delete", arg) => parse_id("/delete", arg).map(|id| SpecialCommand::Delete(Some(id))),

        ("/new" | "/nova" | "/list" | "/ls" | "/status" | "/login" | "/logout" | "/help"
        | "/?" | "/exit" | "/quit", arg) => Err(CommandError::UnsupportedArgument {
            command: name.clone(),
            arg: arg.to_string(),
        }),

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Display help for the interactive chat
pub fn print_help() {
    println!(
        r#"
Comandos do chat
================

CONVERSAS:
  /new              - Começar uma nova conversa
  /list             - Listar conversas (mais recentes primeiro)
  /open <n|id>      - Abrir a conversa de número n em /list, ou pelo id
  /rename <título>  - Renomear a conversa atual
  /delete [id]      - Excluir a conversa atual, ou a de id informado

CONTA:
  /login            - Entrar com e-mail e senha
  /logout           - Sair da conta (as conversas continuam salvas)

OUTROS:
  /status           - Mostrar a conversa e o usuário atuais
  /help             - Mostrar esta ajuda
  /exit             - Encerrar (também: exit, quit, sair)

Qualquer outro texto é enviado como mensagem.
"#
    );
}
