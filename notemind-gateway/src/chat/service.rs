//! Create and continue conversations.
//!
//! The provider is always called before anything is written, so a failed
//! upstream call leaves the stored conversation untouched.

use notemind_core::{ConversationAccount, LlmProvider, MessageRole, context_budget, tokens};
use notemind_db::{
    Conversation, ConversationRepository, Message, MessageRepository, NewConversation, NewMessage,
    UserRepository,
};
use tracing::{debug, info, warn};

use crate::chat::ChatError;
use crate::chat::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::chat::title::generate_title;
use crate::providers::{ChatTurn, ProviderResponse};
use crate::state::AppState;

/// Chat flows bound to the shared application state
pub struct ChatService<'a> {
    state: &'a AppState,
}

impl<'a> ChatService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Decrypt the caller's key for `provider`.
    pub async fn resolve_key(&self, user_id: &str, provider: LlmProvider) -> Result<String, ChatError> {
        let keys = UserRepository::get_api_keys(self.state.pool(), user_id).await?;
        let sealed = keys
            .get(provider)
            .ok_or(ChatError::ApiKeyMissing(provider))?;
        Ok(self.state.vault.decrypt(sealed)?)
    }

    /// Answer the first message, title the conversation and store both
    /// messages. `account` must come from a validated registry lookup.
    pub async fn create_conversation(
        &self,
        user_id: &str,
        folder_id: Option<&str>,
        account: &ConversationAccount,
        first_message: &str,
    ) -> Result<(Conversation, Vec<Message>), ChatError> {
        let api_key = self.resolve_key(user_id, account.provider()).await?;
        let client = self
            .state
            .providers
            .build(account.provider(), account.model(), &api_key);

        let turns = [ChatTurn::user(first_message)];
        let reply = client
            .send_conversation(
                Some(DEFAULT_SYSTEM_PROMPT),
                &turns,
                self.state.chat.max_output_tokens,
            )
            .await?;
        log_usage(&reply);

        let title_model = match account.provider() {
            LlmProvider::OpenAi => self.state.chat.title_model.as_str(),
            _ => account.model(),
        };
        let titler = self
            .state
            .providers
            .build(account.provider(), title_model, &api_key);
        let title = generate_title(titler.as_ref(), first_message).await;

        let messages = [
            NewMessage::new(MessageRole::User, first_message, tokens::count(first_message)),
            NewMessage::new(MessageRole::Assistant, reply.text.as_str(), tokens::count(&reply.text)),
        ];
        let (conversation, stored) = ConversationRepository::create(
            self.state.pool(),
            NewConversation {
                user_id,
                folder_id,
                title: &title,
                account,
            },
            &messages,
        )
        .await?;

        let usage = conversation.usage();
        if usage.is_over_budget() {
            warn!(
                "Conversation {} opened over its context window ({} > {})",
                conversation.id, usage.total_tokens_used, usage.total_context_size
            );
        }
        info!("Conversation {} created for {}", conversation.id, user_id);
        Ok((conversation, stored))
    }

    /// Send `content` with as much recent history as fits `context_limit`,
    /// then append the user message and the reply.
    ///
    /// Returns the updated conversation and the two stored messages.
    pub async fn send_message(
        &self,
        conversation: &Conversation,
        content: &str,
        context_limit: u32,
    ) -> Result<(Conversation, Vec<Message>), ChatError> {
        let api_key = self
            .resolve_key(&conversation.user_id, conversation.provider)
            .await?;
        let history =
            MessageRepository::list_for_conversation(self.state.pool(), &conversation.id).await?;

        // Stored counts are bare content; budgeting charges each message's framing too.
        let user_tokens = tokens::count(content);
        let mut candidates: Vec<(MessageRole, &str, u32)> = history
            .iter()
            .map(|m| {
                let framed = m.tokens_used + tokens::message_framing(m.role);
                (m.role, m.content.as_str(), framed)
            })
            .collect();
        candidates.push((
            MessageRole::User,
            content,
            user_tokens + tokens::message_framing(MessageRole::User),
        ));

        let budget = context_limit.saturating_sub(self.state.chat.system_prompt_reserve_tokens);
        let selected = context_budget::select_context(&candidates, budget, |m| m.2);
        debug!(
            "Conversation {}: sending {}/{} messages ({} framed tokens, budget {})",
            conversation.id,
            selected.len(),
            candidates.len(),
            context_budget::total_tokens(selected, |m| m.2),
            budget,
        );

        let system = if selected.iter().any(|m| m.0 == MessageRole::System) {
            None
        } else {
            Some(DEFAULT_SYSTEM_PROMPT)
        };
        let turns: Vec<ChatTurn> = selected
            .iter()
            .map(|&(role, text, _)| ChatTurn::new(role, text))
            .collect();

        let client = self
            .state
            .providers
            .build(conversation.provider, &conversation.model_name, &api_key);
        let reply = client
            .send_conversation(system, &turns, self.state.chat.max_output_tokens)
            .await?;
        log_usage(&reply);

        let reply_tokens = tokens::count(&reply.text);
        let mut account = conversation.account();
        account.recompute(user_tokens);
        let expected = account.recompute(reply_tokens);

        let messages = [
            NewMessage::new(MessageRole::User, content, user_tokens),
            NewMessage::new(MessageRole::Assistant, reply.text, reply_tokens),
        ];
        let (updated, stored) =
            ConversationRepository::append_messages(self.state.pool(), &conversation.id, &messages)
                .await?
                .ok_or_else(|| ChatError::ConversationGone(conversation.id.clone()))?;

        let usage = updated.usage();
        if usage != expected {
            // A concurrent send or edit, or a stored window the registry has since changed.
            debug!(
                "Conversation {} usage differs from recompute: expected {}/{}, stored {}/{}",
                updated.id,
                expected.total_tokens_used,
                expected.total_context_size,
                usage.total_tokens_used,
                usage.total_context_size
            );
        }
        Ok((updated, stored))
    }
}

fn log_usage(reply: &ProviderResponse) {
    match reply.usage {
        Some(usage) => debug!(
            "Provider model {} reported {} input / {} output tokens",
            reply.model, usage.input_tokens, usage.output_tokens
        ),
        None => debug!("Provider model {} reported no usage", reply.model),
    }
}
