//! Generation backend trait and request/response types.

use async_trait::async_trait;

use crate::error::LlmError;

/// A single prompt-in, text-out generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    /// Augment the call with the provider's retrieval/search tool.
    pub grounded: bool,
    /// Ask the provider for a bare JSON object response where supported.
    pub json_only: bool,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_output_tokens: 1024,
            grounded: false,
            json_only: false,
        }
    }

    pub fn with_max_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn grounded(mut self) -> Self {
        self.grounded = true;
        self
    }

    pub fn json_only(mut self) -> Self {
        self.json_only = true;
        self
    }
}

/// Response from a generation backend.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub content: String,
    /// Model identifier that produced the response, recorded per stage.
    pub model: String,
}

/// Abstract generative-text backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// The model identifier this backend calls.
    fn model_name(&self) -> &str;

    /// Run one generation call.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}
