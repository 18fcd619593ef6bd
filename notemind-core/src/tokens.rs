//! Token counting for budgeting and accounting.
//!
//! Counts use the `o200k_base` BPE encoding shared by the default OpenAI
//! models, so numbers stay comparable across providers. If the BPE tables
//! cannot be loaded the counter degrades to a `ceil(chars / 3.5)` estimate.

use std::sync::LazyLock;

use tiktoken_rs::CoreBPE;

use crate::provider::MessageRole;

/// Framing overhead per chat message (role markers, separators)
pub const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Tokens primed for the assistant reply
pub const REPLY_PRIMING_TOKENS: u32 = 2;

static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match tiktoken_rs::o200k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        tracing::warn!("o200k_base tokenizer unavailable, using estimate: {}", e);
        None
    }
});

/// Count tokens in a piece of text.
pub fn count(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    match ENCODER.as_ref() {
        Some(bpe) => bpe.encode_ordinary(text).len() as u32,
        None => estimate(text),
    }
}

/// Character heuristic used when no tokenizer is available.
pub fn estimate(text: &str) -> u32 {
    (text.chars().count() as f64 / 3.5).ceil() as u32
}

/// Tokens a message costs on top of its content when sent on its own.
pub fn message_framing(role: MessageRole) -> u32 {
    MESSAGE_OVERHEAD_TOKENS + count(role.as_str()) + REPLY_PRIMING_TOKENS
}

/// Count one message as a standalone request, framing included.
///
/// This is the per-message figure context budgeting works with.
pub fn count_message(role: MessageRole, content: &str) -> u32 {
    count(content) + message_framing(role)
}

/// Count a chat payload including per-message framing.
pub fn count_chat<'a, I>(messages: I) -> u32
where
    I: IntoIterator<Item = (MessageRole, &'a str)>,
{
    messages
        .into_iter()
        .map(|(role, content)| MESSAGE_OVERHEAD_TOKENS + count(role.as_str()) + count(content))
        .sum::<u32>()
        + REPLY_PRIMING_TOKENS
}
