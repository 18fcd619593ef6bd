//! Static catalogue of supported models and their context windows.
//!
//! Every conversation is pinned to one `(provider, model)` pair from this
//! table. Creating a conversation or switching its model validates the pair
//! here first, so an unknown pair never reaches storage.

use serde::Serialize;

use crate::provider::LlmProvider;

/// One registered model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelSpec {
    pub provider: LlmProvider,
    pub model: &'static str,
    /// Human-readable label for pickers
    pub display_name: &'static str,
    /// Max tokens (input + output) the model accepts
    pub context_window: u32,
    /// USD per 1k input tokens
    pub cost_input_per_1k: f64,
    /// USD per 1k output tokens
    pub cost_output_per_1k: f64,
}

const fn spec(
    provider: LlmProvider,
    model: &'static str,
    display_name: &'static str,
    context_window: u32,
    cost_input_per_1k: f64,
    cost_output_per_1k: f64,
) -> ModelSpec {
    ModelSpec {
        provider,
        model,
        display_name,
        context_window,
        cost_input_per_1k,
        cost_output_per_1k,
    }
}

static MODELS: &[ModelSpec] = &[
    spec(LlmProvider::OpenAi, "gpt-4o", "GPT-4o", 128_000, 0.0025, 0.01),
    spec(LlmProvider::OpenAi, "gpt-4o-mini", "GPT-4o Mini", 128_000, 0.000_15, 0.0006),
    spec(LlmProvider::OpenAi, "gpt-4-turbo", "GPT-4 Turbo", 128_000, 0.01, 0.03),
    spec(LlmProvider::OpenAi, "gpt-3.5-turbo", "GPT-3.5 Turbo", 16_385, 0.0005, 0.0015),
    spec(
        LlmProvider::Anthropic,
        "claude-sonnet-4-20250514",
        "Claude Sonnet 4",
        200_000,
        0.003,
        0.015,
    ),
    spec(
        LlmProvider::Anthropic,
        "claude-3-5-sonnet-20241022",
        "Claude 3.5 Sonnet (2024-10-22)",
        200_000,
        0.003,
        0.015,
    ),
    spec(
        LlmProvider::Anthropic,
        "claude-3-5-sonnet",
        "Claude 3.5 Sonnet",
        200_000,
        0.003,
        0.015,
    ),
    spec(
        LlmProvider::Anthropic,
        "claude-3-opus-20240229",
        "Claude 3 Opus",
        200_000,
        0.015,
        0.075,
    ),
    spec(LlmProvider::Google, "gemini-1.5-pro", "Gemini 1.5 Pro", 2_000_000, 0.001_25, 0.005),
    spec(
        LlmProvider::Google,
        "gemini-1.5-flash",
        "Gemini 1.5 Flash",
        1_000_000,
        0.000_075,
        0.0003,
    ),
    spec(LlmProvider::Google, "gemini-1.0-pro", "Gemini 1.0 Pro", 32_768, 0.0005, 0.0015),
];

/// Errors from registry lookups
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown model '{model}' for provider '{provider}'")]
    UnknownModel { provider: String, model: String },
}

/// All registered models, in catalogue order.
pub fn all() -> &'static [ModelSpec] {
    MODELS
}

/// Look up a `(provider, model)` pair.
pub fn lookup(provider: LlmProvider, model: &str) -> Result<&'static ModelSpec, RegistryError> {
    MODELS
        .iter()
        .find(|m| m.provider == provider && m.model == model)
        .ok_or_else(|| RegistryError::UnknownModel {
            provider: provider.to_string(),
            model: model.to_string(),
        })
}

/// Context window for a `(provider, model)` pair.
pub fn context_window(provider: LlmProvider, model: &str) -> Result<u32, RegistryError> {
    lookup(provider, model).map(|m| m.context_window)
}

/// Resolve a bare model name. Model names are unique across providers.
pub fn find(model: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.model == model)
}

/// Default model used when a provider is picked without a model.
pub fn default_model(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "gpt-4o",
        LlmProvider::Anthropic => "claude-sonnet-4-20250514",
        LlmProvider::Google => "gemini-1.5-pro",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_known_windows() {
        assert_eq!(context_window(LlmProvider::OpenAi, "gpt-4o").unwrap(), 128_000);
        assert_eq!(
            context_window(LlmProvider::Anthropic, "claude-3-5-sonnet").unwrap(),
            200_000
        );
        assert_eq!(
            context_window(LlmProvider::Google, "gemini-1.5-pro").unwrap(),
            2_000_000
        );
    }

    #[test]
    fn test_pair_must_match_provider() {
        let err = context_window(LlmProvider::Anthropic, "gpt-4o").unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownModel {
                provider: "anthropic".to_string(),
                model: "gpt-4o".to_string(),
            }
        );
        assert!(context_window(LlmProvider::OpenAi, "gpt-5-ultra").is_err());
    }

    #[test]
    fn test_model_names_are_unique() {
        let names: HashSet<_> = all().iter().map(|m| m.model).collect();
        assert_eq!(names.len(), all().len());
    }

    #[test]
    fn test_defaults_are_registered() {
        for provider in LlmProvider::ALL {
            let model = default_model(provider);
            assert!(lookup(provider, model).is_ok(), "{model} missing");
        }
    }

    #[test]
    fn test_find_by_name() {
        let spec = find("gemini-1.5-flash").unwrap();
        assert_eq!(spec.provider, LlmProvider::Google);
        assert_eq!(spec.context_window, 1_000_000);
        assert!(find("nope").is_none());
    }
}
