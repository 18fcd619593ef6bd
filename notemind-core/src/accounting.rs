//! Context-window accounting for a conversation.
//!
//! Only `total_tokens_used` and the current `(provider, model)` are state;
//! everything else is derived from the registry window on demand.

use serde::{Deserialize, Serialize};

use crate::model_registry::{self, RegistryError};
use crate::provider::LlmProvider;

/// Derived usage figures reported with every conversation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextUsage {
    pub total_tokens_used: u64,
    pub total_context_size: u32,
    /// Negative once usage exceeds the window
    pub remaining_context_size: i64,
    pub total_used_percentage: f64,
    pub remaining_percentage: f64,
}

impl ContextUsage {
    /// Derive usage from stored totals.
    pub fn compute(total_tokens_used: u64, total_context_size: u32) -> Self {
        let remaining_context_size = i64::from(total_context_size) - total_tokens_used as i64;
        let total_used_percentage = if total_context_size == 0 {
            0.0
        } else {
            100.0 * total_tokens_used as f64 / f64::from(total_context_size)
        };
        Self {
            total_tokens_used,
            total_context_size,
            remaining_context_size,
            total_used_percentage,
            remaining_percentage: 100.0 - total_used_percentage,
        }
    }

    pub fn is_over_budget(&self) -> bool {
        self.remaining_context_size < 0
    }
}

/// Accounting state of one conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationAccount {
    provider: LlmProvider,
    model: String,
    total_tokens_used: u64,
    total_context_size: u32,
}

impl ConversationAccount {
    /// Start accounting for a new conversation on a registered model.
    pub fn open(provider: LlmProvider, model: &str) -> Result<Self, RegistryError> {
        let total_context_size = model_registry::context_window(provider, model)?;
        Ok(Self {
            provider,
            model: model.to_string(),
            total_tokens_used: 0,
            total_context_size,
        })
    }

    /// Rebuild from persisted values.
    pub fn restore(
        provider: LlmProvider,
        model: impl Into<String>,
        total_tokens_used: u64,
        total_context_size: u32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            total_tokens_used,
            total_context_size,
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn total_tokens_used(&self) -> u64 {
        self.total_tokens_used
    }

    pub fn total_context_size(&self) -> u32 {
        self.total_context_size
    }

    /// Record an appended message of `new_tokens`.
    ///
    /// The window is re-read from the registry; a model that has since left
    /// the registry keeps its last known window.
    pub fn recompute(&mut self, new_tokens: u32) -> ContextUsage {
        self.total_tokens_used += u64::from(new_tokens);
        if let Ok(window) = model_registry::context_window(self.provider, &self.model) {
            self.total_context_size = window;
        }
        let usage = self.usage();
        if usage.is_over_budget() {
            tracing::warn!(
                model = %self.model,
                used = usage.total_tokens_used,
                window = usage.total_context_size,
                "conversation usage exceeds the model context window"
            );
        }
        usage
    }

    /// Move the conversation to another model.
    ///
    /// The pair is validated before anything changes; on error the account
    /// is left exactly as it was.
    pub fn on_model_switch(
        &mut self,
        provider: LlmProvider,
        model: &str,
    ) -> Result<ContextUsage, RegistryError> {
        let window = model_registry::context_window(provider, model)?;
        self.provider = provider;
        self.model = model.to_string();
        self.total_context_size = window;
        Ok(self.usage())
    }

    pub fn usage(&self) -> ContextUsage {
        ContextUsage::compute(self.total_tokens_used, self.total_context_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sums_to_100(usage: &ContextUsage) {
        let sum = usage.total_used_percentage + usage.remaining_percentage;
        assert!((sum - 100.0).abs() < 1e-6, "sum was {sum}");
    }

    #[test]
    fn test_gpt4o_one_percent() {
        let mut account = ConversationAccount::open(LlmProvider::OpenAi, "gpt-4o").unwrap();
        let usage = account.recompute(1280);
        assert_eq!(usage.total_context_size, 128_000);
        assert_eq!(usage.remaining_context_size, 126_720);
        assert!((usage.total_used_percentage - 1.0).abs() < 1e-9);
        assert!((usage.remaining_percentage - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_switch_to_same_window_keeps_percentages() {
        let mut account = ConversationAccount::restore(LlmProvider::OpenAi, "gpt-4o", 1280, 128_000);
        let before = account.usage();
        let after = account
            .on_model_switch(LlmProvider::OpenAi, "gpt-4-turbo")
            .unwrap();
        assert_eq!(before, after);
        assert_eq!(account.model(), "gpt-4-turbo");
    }

    #[test]
    fn test_half_window_doubles_percentage() {
        let usage = ContextUsage::compute(1280, 64_000);
        assert!((usage.total_used_percentage - 2.0).abs() < 1e-9);
        assert_sums_to_100(&usage);
    }

    #[test]
    fn test_switch_preserves_tokens_used() {
        let mut account = ConversationAccount::restore(LlmProvider::OpenAi, "gpt-4o", 20_000, 128_000);
        let usage = account
            .on_model_switch(LlmProvider::OpenAi, "gpt-3.5-turbo")
            .unwrap();
        assert_eq!(usage.total_tokens_used, 20_000);
        assert_eq!(usage.total_context_size, 16_385);
        assert_eq!(usage.remaining_context_size, 16_385 - 20_000);
        assert!(usage.total_used_percentage > 100.0);
        assert_sums_to_100(&usage);
    }

    #[test]
    fn test_invalid_switch_leaves_account_untouched() {
        let mut account =
            ConversationAccount::restore(LlmProvider::Anthropic, "claude-3-5-sonnet", 777, 200_000);
        let snapshot = account.clone();
        let usage_before = account.usage();

        assert!(account.on_model_switch(LlmProvider::Anthropic, "gpt-4o").is_err());
        assert!(account.on_model_switch(LlmProvider::Google, "gemini-9").is_err());

        assert_eq!(account, snapshot);
        let usage_after = account.usage();
        assert_eq!(
            usage_before.total_used_percentage.to_bits(),
            usage_after.total_used_percentage.to_bits()
        );
        assert_eq!(
            usage_before.remaining_percentage.to_bits(),
            usage_after.remaining_percentage.to_bits()
        );
    }

    #[test]
    fn test_percentages_sum_after_mixed_operations() {
        let mut account = ConversationAccount::open(LlmProvider::Google, "gemini-1.0-pro").unwrap();
        let switches = [
            (LlmProvider::OpenAi, "gpt-4o-mini"),
            (LlmProvider::Anthropic, "claude-3-opus-20240229"),
            (LlmProvider::Google, "gemini-1.5-flash"),
            (LlmProvider::OpenAi, "gpt-3.5-turbo"),
        ];
        for step in 0..40u32 {
            let usage = account.recompute(step * 131 % 997);
            assert_sums_to_100(&usage);
            if step % 7 == 0 {
                let (provider, model) = switches[(step as usize / 7) % switches.len()];
                let before = account.total_tokens_used();
                let usage = account.on_model_switch(provider, model).unwrap();
                assert_eq!(usage.total_tokens_used, before);
                assert_sums_to_100(&usage);
            }
        }
    }

    #[test]
    fn test_recompute_refreshes_window_from_registry() {
        let mut account = ConversationAccount::restore(LlmProvider::OpenAi, "gpt-4o", 100, 8_000);
        let usage = account.recompute(1180);
        assert_eq!(usage.total_context_size, 128_000);
        assert_eq!(usage.total_tokens_used, 1280);
        assert!((usage.total_used_percentage - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recompute_keeps_window_of_retired_model() {
        let mut account = ConversationAccount::restore(LlmProvider::OpenAi, "gpt-2", 100, 1_024);
        let usage = account.recompute(412);
        assert_eq!(usage.total_context_size, 1_024);
        assert_eq!(usage.remaining_context_size, 512);
    }

    #[test]
    fn test_open_rejects_unknown_model() {
        assert!(ConversationAccount::open(LlmProvider::OpenAi, "gpt-2").is_err());
    }
}
