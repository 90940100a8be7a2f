/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `chat`   : Interactive chat
- `history`: Conversation listing and maintenance
- `auth`   : Sign-in and account helpers

The handlers wire configuration into the library components: storage,
session, model client, content policy, and the chat orchestrator.
*/

use crate::auth::{CredentialStore, FirebaseAuthBackend, IdentityProvider, Session};
use crate::config::Config;
use crate::error::Result;
use crate::policy::KeywordPolicy;
use crate::storage::SqliteStorage;
use rustyline::DefaultEditor;
use std::sync::Arc;

// Special commands parser for the chat REPL
pub mod special_commands;

// Conversation history commands
pub mod history;

/// Opens the conversation database configured in `config`
pub fn open_storage(config: &Config) -> Result<SqliteStorage> {
    match &config.storage.db_path {
        Some(path) => SqliteStorage::new_with_path(path),
        None => SqliteStorage::new(),
    }
}

/// Builds the session, restoring a saved login
///
/// Without a Firebase API key the session is offline: it still restores the
/// saved user but cannot sign in again.
pub fn build_session(config: &Config) -> Session {
    let session = match FirebaseAuthBackend::from_config(&config.auth) {
        Ok(backend) => Session::new(Arc::new(backend)),
        Err(e) => {
            tracing::debug!("Sign-in unavailable: {}", e);
            Session::offline()
        }
    };
    session.with_credentials(CredentialStore::default())
}

/// User id that scopes storage for one-shot commands
pub fn session_user_id(config: &Config) -> String {
    build_session(config).effective_user_id()
}

/// Builds the content policy, including configured extra keywords
pub fn build_policy(config: &Config) -> Result<KeywordPolicy> {
    KeywordPolicy::default().with_extra_keywords(&config.policy.extra_blocked_keywords)
}

/// Reads one non-empty line, returning `None` on cancel
fn prompt_line(rl: &mut DefaultEditor, label: &str) -> Result<Option<String>> {
    use rustyline::error::ReadlineError;

    match rl.readline(label) {
        Ok(line) => Ok(Some(line.trim().to_string()).filter(|l| !l.is_empty())),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Builds the orchestrator and runs a readline-based loop. Plain input is
    //! sent to the assistant; the reply is printed as it streams in.

    use super::history::print_conversation_table;
    use super::special_commands::{
        parse_special_command, print_help, ConversationRef, SpecialCommand,
    };
    use super::*;
    use crate::chat::{ChatDependencies, ChatOrchestrator, ChatSettings, SendOutcome};
    use crate::models::{is_new_conversation, ChatMessage, Sender};
    use crate::policy::ContentPolicy;
    use crate::providers::create_provider;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use std::io::Write;
    use tokio::sync::oneshot;

    /// Start the interactive chat
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `new_conversation` - Start on a new conversation instead of the most recent one
    pub async fn run_chat(config: Config, new_conversation: bool) -> Result<()> {
        tracing::info!("Starting interactive chat");

        let model = create_provider(&config.provider)?;
        let store = Arc::new(open_storage(&config)?);
        let policy = Arc::new(build_policy(&config)?);
        let session = Arc::new(build_session(&config));

        let chat = ChatOrchestrator::new(
            ChatDependencies {
                store,
                identity: session.clone(),
                model,
                policy: policy.clone(),
            },
            ChatSettings::from_config(&config),
        )
        .await;

        if new_conversation {
            chat.start_new_conversation().await;
        }

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&session);
        print_messages(&chat.messages().borrow());
        print_pending_error(&chat);

        loop {
            match rl.readline(&format!("{} ", "você>".cyan().bold())) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::None) => {}
                        Ok(SpecialCommand::Exit) => break,
                        Ok(command) => {
                            handle_special(&chat, &session, &mut rl, command).await?;
                            continue;
                        }
                        Err(e) => {
                            eprintln!("{}\n", e.to_string().red());
                            continue;
                        }
                    }

                    send_and_render(&chat, policy.as_ref(), trimmed).await;
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Até logo! Cuide-se.");
        Ok(())
    }

    fn print_welcome_banner(session: &Session) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                   Mente Sã - Bem-vindo(a)!                   ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        match session.current_user() {
            Some(user) => println!("Conectado como {}", user.label().green()),
            None => println!("{}", "Usando o modo local (sem login)".dimmed()),
        }
        println!("Em caso de crise, ligue para o CVV: {}", "188".bold());
        println!("Digite '/help' para ver os comandos, 'exit' para sair\n");
    }

    fn print_messages(messages: &[ChatMessage]) {
        for message in messages {
            match message.sender {
                Sender::User => println!("{} {}", "você>".cyan().bold(), message.text),
                Sender::Bot => println!("{} {}\n", "mente sã>".green().bold(), message.text),
            }
        }
    }

    fn print_pending_error(chat: &ChatOrchestrator) {
        if let Some(error) = chat.error_message().borrow().clone() {
            eprintln!("{}\n", error.red());
        }
    }

    /// Sends `text` and prints the reply while it streams
    async fn send_and_render(chat: &ChatOrchestrator, policy: &dyn ContentPolicy, text: &str) {
        let mut partial = chat.streaming_reply();
        partial.borrow_and_update();
        let (done_tx, mut done_rx) = oneshot::channel::<()>();

        let printer = tokio::spawn(async move {
            let mut printed = String::new();
            loop {
                tokio::select! {
                    _ = &mut done_rx => break,
                    changed = partial.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = partial.borrow_and_update().clone().unwrap_or_default();
                        if let Some(delta) = current.strip_prefix(printed.as_str()) {
                            if printed.is_empty() && !delta.is_empty() {
                                print!("{} ", "mente sã>".green().bold());
                            }
                            print!("{}", delta);
                            let _ = std::io::stdout().flush();
                            printed = current;
                        }
                    }
                }
            }
            printed
        });

        let outcome = chat.send_message(text).await;
        let _ = done_tx.send(());
        let printed = printer.await.unwrap_or_default();

        match outcome {
            Ok(SendOutcome::Replied { reply, .. }) => match reply.strip_prefix(printed.trim()) {
                Some(rest) if !printed.is_empty() => println!("{}\n", rest),
                _ => {
                    if !printed.is_empty() {
                        println!();
                    }
                    println!("{} {}\n", "mente sã>".green().bold(), reply);
                }
            },
            Ok(SendOutcome::Refused { .. }) => {
                println!("{} {}\n", "mente sã>".green().bold(), policy.refusal_message());
            }
            Ok(SendOutcome::Failed { message, .. }) => {
                if !printed.is_empty() {
                    println!();
                }
                eprintln!("{}\n", message.red());
                chat.clear_error();
            }
            Err(e) => eprintln!("{}\n", e.to_string().yellow()),
        }
    }

    async fn handle_special(
        chat: &ChatOrchestrator,
        session: &Session,
        rl: &mut DefaultEditor,
        command: SpecialCommand,
    ) -> Result<()> {
        match command {
            SpecialCommand::New => {
                chat.start_new_conversation().await;
                println!("{}\n", "Nova conversa iniciada.".green());
            }
            SpecialCommand::List => {
                let items = chat.conversation_list().borrow().clone();
                let active = *chat.current_conversation_id().borrow();
                print_conversation_table(&items, Some(active));
            }
            SpecialCommand::Open(value) => {
                let items = chat.conversation_list().borrow().clone();
                let id = match ConversationRef::parse(value, items.len()) {
                    ConversationRef::Position(n) => items[n - 1].id,
                    ConversationRef::Id(id) => id,
                };
                match chat.select_conversation(id).await {
                    Ok(()) => {
                        let title = chat.display_title(id).await.unwrap_or_default();
                        println!("{}\n", format!("Conversa: {}", title).green().bold());
                        print_messages(&chat.messages().borrow());
                    }
                    Err(e) => eprintln!("{}\n", e.to_string().red()),
                }
            }
            SpecialCommand::Rename(title) => {
                let id = *chat.current_conversation_id().borrow();
                if is_new_conversation(id) {
                    println!(
                        "{}\n",
                        "Envie uma mensagem antes de renomear a conversa.".yellow()
                    );
                    return Ok(());
                }
                match chat.rename_conversation(id, &title).await {
                    Ok(()) => println!("{}\n", "Conversa renomeada.".green()),
                    Err(e) => {
                        eprintln!("{}\n", e.to_string().red());
                        chat.clear_error();
                    }
                }
            }
            SpecialCommand::Delete(target) => {
                let id = target.unwrap_or(*chat.current_conversation_id().borrow());
                if is_new_conversation(id) {
                    println!("{}\n", "Nada para excluir.".yellow());
                    return Ok(());
                }
                match chat.delete_conversation(id).await {
                    Ok(()) => {
                        println!("{}\n", format!("Conversa {} excluída.", id).green());
                        print_messages(&chat.messages().borrow());
                    }
                    Err(e) => {
                        eprintln!("{}\n", e.to_string().red());
                        chat.clear_error();
                    }
                }
            }
            SpecialCommand::ShowStatus => print_status(chat, session).await,
            SpecialCommand::Login => {
                let Some(email) = prompt_line(rl, "E-mail: ")? else {
                    return Ok(());
                };
                let Some(password) = prompt_line(rl, "Senha: ")? else {
                    return Ok(());
                };
                match session.login_with_email(&email, &password).await {
                    Ok(user) => {
                        chat.handle_login().await;
                        println!("{}\n", format!("Conectado como {}", user.label()).green());
                    }
                    Err(e) => eprintln!("{}\n", e.to_string().red()),
                }
            }
            SpecialCommand::Logout => {
                session.logout();
                chat.handle_logout().await;
                println!("{}\n", "Você saiu da conta. Suas conversas continuam salvas.".green());
            }
            SpecialCommand::Help => print_help(),
            SpecialCommand::Exit | SpecialCommand::None => {}
        }
        Ok(())
    }

    async fn print_status(chat: &ChatOrchestrator, session: &Session) {
        let id = *chat.current_conversation_id().borrow();
        let title = chat
            .display_title(id)
            .await
            .unwrap_or_else(|e| format!("({})", e));
        let message_count = chat.messages().borrow().len();
        let user = session
            .current_user()
            .map(|u| u.label().to_string())
            .unwrap_or_else(|| "modo local".to_string());

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Mente Sã - Status                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");
        println!("Usuário:     {}", user.green());
        println!("Conversa:    {} ({})", title.bold(), id);
        println!("Mensagens:   {}", message_count);
        println!("Estado:      {}", *chat.status().borrow());
        println!(
            "Conversas:   {}",
            chat.conversation_list().borrow().len()
        );
        println!();
    }

}

// Account command handler
pub mod auth {
    use super::*;
    use crate::cli::AuthCommand;
    use colored::Colorize;

    /// Runs an account command
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `command` - Parsed `auth` subcommand
    pub async fn handle_auth(config: &Config, command: AuthCommand) -> Result<()> {
        let session = build_session(config);

        match command {
            AuthCommand::Login { email } => {
                let mut rl = DefaultEditor::new()?;
                let Some((email, password)) = read_credentials(&mut rl, email)? else {
                    return Ok(());
                };
                let user = session.login_with_email(&email, &password).await?;
                println!("{}", format!("Conectado como {}", user.label()).green());
            }
            AuthCommand::Register { email } => {
                let mut rl = DefaultEditor::new()?;
                let Some((email, password)) = read_credentials(&mut rl, email)? else {
                    return Ok(());
                };
                let user = session.register_with_email(&email, &password).await?;
                println!("{}", format!("Conta criada para {}", user.label()).green());
            }
            AuthCommand::Google { id_token } => {
                let user = session.sign_in_with_google(&id_token).await?;
                println!("{}", format!("Conectado como {}", user.label()).green());
            }
            AuthCommand::ResetPassword { email } => {
                let email = match email {
                    Some(email) => email,
                    None => {
                        let mut rl = DefaultEditor::new()?;
                        match prompt_line(&mut rl, "E-mail: ")? {
                            Some(email) => email,
                            None => return Ok(()),
                        }
                    }
                };
                session.reset_password(&email).await?;
                println!(
                    "{}",
                    format!("Enviamos um e-mail de recuperação para {}", email.trim()).green()
                );
            }
            AuthCommand::Logout => {
                session.logout();
                println!("{}", "Você saiu da conta.".green());
            }
            AuthCommand::Status => match session.current_user() {
                Some(user) => {
                    println!("Conectado como {}", user.label().green());
                    println!("ID: {}", user.uid);
                }
                None => println!("{}", "Nenhum usuário conectado (modo local).".yellow()),
            },
        }
        Ok(())
    }

    fn read_credentials(
        rl: &mut DefaultEditor,
        email: Option<String>,
    ) -> Result<Option<(String, String)>> {
        let email = match email {
            Some(email) => email,
            None => match prompt_line(rl, "E-mail: ")? {
                Some(email) => email,
                None => return Ok(None),
            },
        };
        Ok(prompt_line(rl, "Senha: ")?.map(|password| (email, password)))
    }
}
