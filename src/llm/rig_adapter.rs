//! Bridges rig's `CompletionModel` trait to our `GenerationBackend` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};

use crate::error::LlmError;
use crate::llm::provider::{GenerationBackend, GenerationRequest, GenerationResponse};

/// Adapter wrapping any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> GenerationBackend for RigAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let mut builder = self
            .model
            .completion_request(Message::user(request.prompt.clone()))
            .max_tokens(request.max_output_tokens as u64);

        let mut extra = serde_json::Map::new();
        if request.grounded {
            // Provider-native web search. Anthropic exposes it as a server
            // tool; passed through additional_params so the adapter stays
            // model-agnostic.
            extra.insert(
                "tools".to_string(),
                serde_json::json!([{
                    "type": "web_search_20250305",
                    "name": "web_search",
                    "max_uses": 3,
                }]),
            );
        }
        if request.json_only {
            extra.insert(
                "response_format".to_string(),
                serde_json::json!({ "type": "json_object" }),
            );
        }
        if !extra.is_empty() {
            builder = builder.additional_params(serde_json::Value::Object(extra));
        }

        let response =
            builder
                .send()
                .await
                .map_err(|e| LlmError::RequestFailed {
                    provider: self.model_name.clone(),
                    reason: e.to_string(),
                })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "response contained no text content".to_string(),
            });
        }

        Ok(GenerationResponse {
            content,
            model: self.model_name.clone(),
        })
    }
}
