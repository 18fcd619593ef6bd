//! Conversation titles.

use tracing::{debug, warn};

use crate::chat::prompt::title_request;
use crate::providers::Provider;

pub const MAX_TITLE_CHARS: usize = 60;
const CUT_CHARS: usize = MAX_TITLE_CHARS - 3;
/// A word boundary earlier than this is not worth backing off to.
const MIN_WORD_CUT: usize = 30;
const TITLE_MAX_TOKENS: u32 = 32;

/// Ask `provider` for a title; fall back to truncating `first_message`.
pub async fn generate_title(provider: &dyn Provider, first_message: &str) -> String {
    match provider
        .send_message(None, &title_request(first_message), TITLE_MAX_TOKENS)
        .await
    {
        Ok(response) => match clean_title(&response.text) {
            Some(title) => {
                debug!("Generated title with {}: {}", provider.model(), title);
                title
            }
            None => fallback_title(first_message),
        },
        Err(e) => {
            warn!("Title generation failed, truncating first message: {}", e);
            fallback_title(first_message)
        }
    }
}

/// Strip whitespace and one pair of surrounding quotes, then clamp length.
pub fn clean_title(raw: &str) -> Option<String> {
    let mut title = raw.trim();
    for quote in ['"', '\''] {
        if title.len() >= 2 && title.starts_with(quote) && title.ends_with(quote) {
            title = title[1..title.len() - 1].trim();
        }
    }
    if title.is_empty() {
        return None;
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        let cut: String = title.chars().take(CUT_CHARS).collect();
        return Some(format!("{cut}..."));
    }
    Some(title.to_string())
}

/// Truncate at a word boundary when one is reasonably close to the cut.
pub fn fallback_title(first_message: &str) -> String {
    let message = first_message.trim();
    if message.chars().count() <= MAX_TITLE_CHARS {
        return message.to_string();
    }
    let truncated: String = message.chars().take(CUT_CHARS).collect();
    if let Some((idx, _)) = truncated.char_indices().rev().find(|(_, c)| *c == ' ')
        && truncated[..idx].chars().count() > MIN_WORD_CUT
    {
        return format!("{}...", &truncated[..idx]);
    }
    format!("{truncated}...")
}
