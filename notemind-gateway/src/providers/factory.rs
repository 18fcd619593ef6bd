//! Builds provider clients from a user's stored key.

use std::sync::Arc;
use std::time::Duration;

use notemind_core::LlmProvider;

use crate::providers::anthropic::AnthropicClient;
use crate::providers::gemini::GeminiClient;
use crate::providers::openai::OpenAiClient;
use crate::providers::provider::{Provider, ProviderFactory};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Factory over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct HttpProviderFactory {
    http_client: reqwest::Client,
    dump_queries: bool,
}

impl HttpProviderFactory {
    pub fn new(dump_queries: bool) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http_client,
            dump_queries,
        })
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn build(&self, provider: LlmProvider, model: &str, api_key: &str) -> Arc<dyn Provider> {
        let client = self.http_client.clone();
        match provider {
            LlmProvider::OpenAi => Arc::new(
                OpenAiClient::new(client, api_key, model).with_dump_queries(self.dump_queries),
            ),
            LlmProvider::Anthropic => Arc::new(
                AnthropicClient::new(client, api_key, model).with_dump_queries(self.dump_queries),
            ),
            LlmProvider::Google => Arc::new(
                GeminiClient::new(client, api_key, model).with_dump_queries(self.dump_queries),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_picks_client_per_provider() {
        let factory = HttpProviderFactory::new(false).unwrap();
        for (provider, name, model) in [
            (LlmProvider::OpenAi, "openai", "gpt-4o"),
            (LlmProvider::Anthropic, "anthropic", "claude-3-5-sonnet"),
            (LlmProvider::Google, "google", "gemini-1.5-pro"),
        ] {
            let client = factory.build(provider, model, "key");
            assert_eq!(client.name(), name);
            assert_eq!(client.model(), model);
        }
    }
}
