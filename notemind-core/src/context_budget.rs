//! History selection under a per-request token limit.

/// Limit applied when a request does not name one
pub const DEFAULT_CONTEXT_LIMIT_TOKENS: u32 = 4000;

/// Smallest accepted `context_limit_tokens`
pub const MIN_CONTEXT_LIMIT_TOKENS: u32 = 100;

/// Largest accepted `context_limit_tokens`
pub const MAX_CONTEXT_LIMIT_TOKENS: u32 = 200_000;

/// Whether a requested limit falls in the accepted range.
pub fn is_valid_limit(limit: u32) -> bool {
    (MIN_CONTEXT_LIMIT_TOKENS..=MAX_CONTEXT_LIMIT_TOKENS).contains(&limit)
}

/// Select the newest contiguous run of `messages` that fits `limit_tokens`.
///
/// `messages` is in chronological order. The walk goes newest to oldest and
/// stops at the first message that would overflow the budget, so an older
/// cheap message is never picked past an expensive one. When the newest
/// message alone is over budget it is still returned by itself: a non-empty
/// history never yields an empty context.
pub fn select_context<T, F>(messages: &[T], limit_tokens: u32, token_count: F) -> &[T]
where
    F: Fn(&T) -> u32,
{
    if messages.is_empty() {
        return messages;
    }

    let mut used: u64 = 0;
    let mut start = messages.len();
    for (idx, message) in messages.iter().enumerate().rev() {
        let next = used + u64::from(token_count(message));
        if next > u64::from(limit_tokens) {
            break;
        }
        used = next;
        start = idx;
    }

    if start == messages.len() {
        start = messages.len() - 1;
    }
    &messages[start..]
}

/// Total tokens of a selection, for logging.
pub fn total_tokens<T, F>(messages: &[T], token_count: F) -> u64
where
    F: Fn(&T) -> u32,
{
    messages.iter().map(|m| u64::from(token_count(m))).sum()
}
