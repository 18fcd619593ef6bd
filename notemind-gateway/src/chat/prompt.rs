/// System prompt sent when the history carries none of its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a helpful assistant inside a note-taking app.

Answer in clean, well-structured Markdown:
- Use headings (##, ###) for longer answers and keep paragraphs short.
- Use bullet lists for options and numbered lists for steps.
- Put every code sample in a fenced block that names its language, e.g. ```rust.
- Use tables to compare several items and blockquotes for warnings.
- Never emit HTML and never talk about the formatting itself.

Be concise. If a question is ambiguous, state a reasonable assumption and answer it.";

/// Instruction used to title a new conversation.
pub fn title_request(first_message: &str) -> String {
    format!(
        "Write a short, descriptive title (at most 60 characters) for a conversation \
         that starts with this message:\n\n\"{first_message}\"\n\nReply with the title only."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_request_embeds_message() {
        let prompt = title_request("How do lifetimes work?");
        assert!(prompt.contains("\"How do lifetimes work?\""));
        assert!(prompt.contains("60 characters"));
    }
}
