//! Generation backends.
//!
//! `LlmConfig::build` turns a provider choice, API key and model id into a
//! ready `GenerationBackend`. Both providers are reached through rig-core;
//! `RigAdapter` closes the gap between rig's `CompletionModel` and the
//! pipeline's request shape.

pub mod provider;
mod rig_adapter;

pub use provider::{GenerationBackend, GenerationRequest, GenerationResponse};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    fn label(self) -> &'static str {
        match self {
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::OpenAi => "openai",
        }
    }
}

/// Everything needed to construct a generation backend.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Construct the configured backend.
    ///
    /// Construction is offline: the key is only validated by the provider on
    /// the first generation call.
    pub fn build(&self) -> Result<Arc<dyn GenerationBackend>, LlmError> {
        let key = self.api_key.expose_secret();
        let backend: Arc<dyn GenerationBackend> = match self.backend {
            LlmBackend::Anthropic => {
                use rig::providers::anthropic;
                let client: rig::client::Client<anthropic::client::AnthropicExt> =
                    anthropic::Client::new(key).map_err(|e| self.construction_error(e))?;
                Arc::new(RigAdapter::new(
                    client.completion_model(&self.model),
                    &self.model,
                ))
            }
            LlmBackend::OpenAi => {
                use rig::providers::openai;
                let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                    openai::Client::new(key).map_err(|e| self.construction_error(e))?;
                Arc::new(RigAdapter::new(
                    client.completion_model(&self.model),
                    &self.model,
                ))
            }
        };
        tracing::info!(
            provider = self.backend.label(),
            model = %self.model,
            "Generation backend ready"
        );
        Ok(backend)
    }

    fn construction_error(&self, e: impl std::fmt::Display) -> LlmError {
        LlmError::RequestFailed {
            provider: self.backend.label().to_string(),
            reason: format!("client construction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend, model: &str) -> LlmConfig {
        LlmConfig {
            backend,
            api_key: secrecy::SecretString::from("key-under-test"),
            model: model.to_string(),
        }
    }

    #[test]
    fn builds_anthropic_backend_offline() {
        let backend = config(LlmBackend::Anthropic, "claude-sonnet-4-20250514")
            .build()
            .unwrap();
        assert_eq!(backend.model_name(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn builds_openai_backend_offline() {
        let backend = config(LlmBackend::OpenAi, "gpt-4o").build().unwrap();
        assert_eq!(backend.model_name(), "gpt-4o");
    }
}
