//! Conversation title derivation
//!
//! All functions here are pure: the same inputs always give the same title.
//! Truncation counts characters, not bytes, so accented Portuguese text is
//! never split inside a code point.

use chrono::{Local, TimeZone};

use crate::models::{is_new_conversation, NEW_CONVERSATION_TITLE};

/// Default maximum number of characters of a derived title
pub const DEFAULT_TITLE_MAX_CHARS: usize = 30;

const ELLIPSIS: &str = "...";

/// Shortens `text` to at most `max_chars` characters, ending in `...` when cut
///
/// # Examples
///
/// ```
/// use mentesa::chat::title::truncate_title;
///
/// assert_eq!(truncate_title("curto", 30), "curto");
/// assert_eq!(
///     truncate_title("Tenho me sentido muito cansado ultimamente", 30),
///     "Tenho me sentido muito cans..."
/// );
/// ```
pub fn truncate_title(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut title: String = text.chars().take(keep).collect();
    title.push_str(ELLIPSIS);
    title
}

/// Title derived from the conversation id read as a millisecond timestamp
///
/// Ids that do not map to a representable local time render as
/// `Conversa <id>`.
pub fn date_title(conversation_id: i64) -> String {
    if conversation_id < 0 {
        return format!("Conversa {}", conversation_id);
    }

    match Local.timestamp_millis_opt(conversation_id).single() {
        Some(created) => format!("Conversa de {}", created.format("%d/%m/%Y %H:%M")),
        None => format!("Conversa {}", conversation_id),
    }
}

/// Title used when the user never renamed the conversation
pub fn fallback_title(
    conversation_id: i64,
    first_user_message: Option<&str>,
    max_chars: usize,
) -> String {
    if is_new_conversation(conversation_id) {
        return NEW_CONVERSATION_TITLE.to_string();
    }

    match first_user_message.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => truncate_title(text, max_chars),
        None => date_title(conversation_id),
    }
}

/// Title shown for a conversation: the custom title when set, else the fallback
pub fn effective_title(
    conversation_id: i64,
    custom_title: Option<&str>,
    first_user_message: Option<&str>,
    max_chars: usize,
) -> String {
    if is_new_conversation(conversation_id) {
        return NEW_CONVERSATION_TITLE.to_string();
    }

    match custom_title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => fallback_title(conversation_id, first_user_message, max_chars),
    }
}
