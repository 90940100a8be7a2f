use crate::chat::{ensure_owned, load_display_items, prepare_rename};
use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::Result;
use crate::models::{ConversationDisplayItem, Sender};
use crate::storage::{ConversationStore, MessageRecord};
use chrono::{Local, TimeZone};
use colored::Colorize;
use prettytable::{format, Table};

/// Formats a millisecond timestamp in local time
pub fn format_timestamp(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Prints conversations as a table, marking the `active` one
pub fn print_conversation_table(items: &[ConversationDisplayItem], active: Option<i64>) {
    if items.is_empty() {
        println!("{}", "Nenhuma conversa salva.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "#".bold(),
        "ID".bold(),
        "Título".bold(),
        "Última mensagem".bold()
    ]);

    for (index, item) in items.iter().enumerate() {
        let position = if Some(item.id) == active {
            format!("{}*", index + 1).green()
        } else {
            (index + 1).to_string().normal()
        };
        table.add_row(prettytable::row![
            position,
            item.id.to_string().cyan(),
            item.display_title,
            format_timestamp(item.last_updated)
        ]);
    }

    println!();
    table.printstd();
    println!();
}

/// Prints the messages of a conversation
pub fn print_transcript(records: &[MessageRecord]) {
    for record in records {
        let speaker = match record.sender {
            Sender::User => "Você".cyan().bold(),
            Sender::Bot => "Mente Sã".green().bold(),
        };
        println!(
            "{} {} {}",
            format_timestamp(record.timestamp).dimmed(),
            speaker,
            record.text
        );
    }
}

/// Handle history commands
///
/// Conversations are scoped to the user of the saved session, or to the
/// local user when nobody is signed in.
pub async fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let store = super::open_storage(config)?;
    let user_id = super::session_user_id(config);
    tracing::debug!("History command for user {}", user_id);

    run_history(&store, &user_id, config.chat.title_max_chars, command).await
}

/// Runs a history command against `store`
pub async fn run_history(
    store: &dyn ConversationStore,
    user_id: &str,
    title_max_chars: usize,
    command: HistoryCommand,
) -> Result<()> {
    match command {
        HistoryCommand::List => {
            let items = load_display_items(store, user_id, title_max_chars).await?;
            print_conversation_table(&items, None);
            if !items.is_empty() {
                println!(
                    "Use {} para continuar uma conversa.",
                    "/open <id>".cyan()
                );
            }
        }
        HistoryCommand::Delete { id } => {
            ensure_owned(store, user_id, id).await?;
            store.clear_conversation(user_id, id).await?;
            store.delete_metadata(user_id, id).await?;
            println!("{}", format!("Conversa {} excluída", id).green());
        }
        HistoryCommand::Rename { id, title } => {
            let metadata = prepare_rename(store, user_id, id, &title).await?;
            let title = metadata.custom_title.clone().unwrap_or_default();
            store.upsert_metadata(metadata).await?;
            println!("{}", format!("Conversa {} renomeada para \"{}\"", id, title).green());
        }
        HistoryCommand::Show { id } => {
            let records = store.messages_for_conversation(user_id, id).await?;
            if records.is_empty() {
                println!("{}", format!("A conversa {} está vazia.", id).yellow());
            } else {
                print_transcript(&records);
            }
        }
    }

    Ok(())
}
