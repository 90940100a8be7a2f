//! Topic restrictions for the assistant
//!
//! Prompts about off-topic subjects are answered with a fixed refusal and
//! never reach the model. Model replies that drift into those subjects
//! without a wellbeing context are replaced by a fallback text. Matching is
//! heuristic: false positives and negatives are acceptable.

use regex::Regex;

use crate::error::{MenteSaError, Result};

pub mod keywords;

pub use keywords::{ALLOWED_CONTEXT, BLOCKED_CATEGORIES};

/// Reply used when the user asks about a blocked topic
pub const REFUSAL_MESSAGE: &str = "Desculpe, sou um assistente focado em saúde mental e bem-estar emocional. \
Não posso ajudar com esse assunto, mas estou aqui se você quiser conversar sobre como está se sentindo.";

/// Reply used when the model's answer fails validation
pub const FALLBACK_MESSAGE: &str = "Desculpe, não consegui gerar uma resposta adequada. \
Podemos voltar a falar sobre como você está se sentindo?";

/// Characters inspected on each side of a match when looking for allowed context
const CONTEXT_RADIUS: usize = 80;

/// Outcome of checking a user prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// The prompt may be sent to the model
    Allowed,
    /// The prompt matched a blocked category
    Blocked {
        /// Name of the matched category
        category: String,
    },
}

impl PolicyVerdict {
    /// Returns true if the prompt matched a blocked category
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Pluggable content policy consulted before and after each model call
pub trait ContentPolicy: Send + Sync {
    /// Decide whether a user prompt may reach the model
    fn check_prompt(&self, text: &str) -> PolicyVerdict;

    /// Returns false if the model reply must be replaced
    fn validate_response(&self, text: &str) -> bool;

    /// Text persisted as the bot reply to a blocked prompt
    fn refusal_message(&self) -> &str {
        REFUSAL_MESSAGE
    }

    /// Text persisted in place of a reply that failed validation
    fn fallback_message(&self) -> &str {
        FALLBACK_MESSAGE
    }
}

#[derive(Debug)]
struct Category {
    name: String,
    patterns: Vec<Regex>,
}

/// Keyword-table content policy
///
/// # Examples
///
/// ```
/// use mentesa::policy::{ContentPolicy, KeywordPolicy};
///
/// let policy = KeywordPolicy::default();
/// assert!(policy.check_prompt("Me ajuda com física?").is_blocked());
/// assert!(!policy.check_prompt("Tenho sentido muita ansiedade").is_blocked());
/// ```
#[derive(Debug)]
pub struct KeywordPolicy {
    categories: Vec<Category>,
    allowed_context: Vec<String>,
}

fn keyword_pattern(keyword: &str) -> Result<Regex> {
    let pattern = format!(r"\b{}\b", regex::escape(&keyword.trim().to_lowercase()));
    Regex::new(&pattern)
        .map_err(|e| MenteSaError::Config(format!("Invalid policy keyword '{}': {}", keyword, e)).into())
}

/// Widens the byte range `start..end` by up to `radius` characters per side
fn context_window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(radius.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    &text[from..to]
}

impl KeywordPolicy {
    /// Builds a policy from a custom category table
    pub fn from_categories(categories: &[(&str, &[&str])]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(categories.len());
        for (name, words) in categories {
            let patterns = words
                .iter()
                .map(|w| keyword_pattern(w))
                .collect::<Result<Vec<_>>>()?;
            compiled.push(Category {
                name: name.to_string(),
                patterns,
            });
        }

        Ok(Self {
            categories: compiled,
            allowed_context: ALLOWED_CONTEXT.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Adds user-configured keywords under a `personalizado` category
    pub fn with_extra_keywords(mut self, keywords: &[String]) -> Result<Self> {
        let patterns = keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| keyword_pattern(k))
            .collect::<Result<Vec<_>>>()?;

        if !patterns.is_empty() {
            self.categories.push(Category {
                name: "personalizado".to_string(),
                patterns,
            });
        }
        Ok(self)
    }

    fn first_match(&self, lowered: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.patterns.iter().any(|p| p.is_match(lowered)))
    }

    fn has_allowed_context(&self, window: &str) -> bool {
        self.allowed_context.iter().any(|phrase| window.contains(phrase.as_str()))
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        let categories = BLOCKED_CATEGORIES
            .iter()
            .map(|(name, words)| Category {
                name: name.to_string(),
                patterns: words.iter().filter_map(|w| keyword_pattern(w).ok()).collect(),
            })
            .collect();

        Self {
            categories,
            allowed_context: ALLOWED_CONTEXT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ContentPolicy for KeywordPolicy {
    fn check_prompt(&self, text: &str) -> PolicyVerdict {
        let lowered = text.to_lowercase();
        match self.first_match(&lowered) {
            Some(category) => {
                tracing::debug!("Prompt matched blocked category '{}'", category.name);
                PolicyVerdict::Blocked {
                    category: category.name.clone(),
                }
            }
            None => PolicyVerdict::Allowed,
        }
    }

    fn validate_response(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        for category in &self.categories {
            for pattern in &category.patterns {
                for found in pattern.find_iter(&lowered) {
                    let window =
                        context_window(&lowered, found.start(), found.end(), CONTEXT_RADIUS);
                    if !self.has_allowed_context(window) {
                        tracing::warn!(
                            "Model reply drifted into blocked category '{}'",
                            category.name
                        );
                        return false;
                    }
                }
            }
        }
        true
    }
}
