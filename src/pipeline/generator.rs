//! Stage-1 generator — grounded generation of candidate content.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::error::LlmError;
use crate::llm::{GenerationBackend, GenerationRequest};
use crate::pipeline::types::StepOne;
use crate::registry::Automation;

/// Trigger instruction appended to every stage-1 prompt.
const TRIGGER_INSTRUCTION: &str = "It is time for your scheduled update. Review the \
conversation above and, if there is genuinely new content worth sharing, write the \
full update message now. If there is nothing new, say so plainly.";

/// Runs the grounded stage-1 generation call.
///
/// A stage-1 failure is terminal for the run: the caller must not proceed to
/// stage 2 or dispatch.
pub struct StageOneGenerator {
    llm: Arc<dyn GenerationBackend>,
    max_tokens: u32,
    call_timeout: Duration,
}

impl StageOneGenerator {
    pub fn new(llm: Arc<dyn GenerationBackend>, max_tokens: u32, call_timeout: Duration) -> Self {
        Self {
            llm,
            max_tokens,
            call_timeout,
        }
    }

    /// Compose the stage-1 prompt from the automation definition and the
    /// assembled transcript.
    pub fn compose_prompt(automation: &Automation, transcript: &str) -> String {
        let mut prompt = String::with_capacity(
            automation.system_prompt.len() + transcript.len() + TRIGGER_INSTRUCTION.len() + 128,
        );
        prompt.push_str(&automation.system_prompt);
        prompt.push_str("\n\nRecent conversation:\n");
        prompt.push_str(transcript);
        prompt.push_str("\n\n");
        prompt.push_str(TRIGGER_INSTRUCTION);
        if let Some(ref scheduled) = automation.scheduled_prompt {
            prompt.push_str("\n\n");
            prompt.push_str(scheduled);
        }
        prompt
    }

    /// Run stage 1 and capture the outcome as a `StepOne` block.
    pub async fn generate(&self, automation: &Automation, transcript: &str) -> StepOne {
        let prompt = Self::compose_prompt(automation, transcript);
        let mut step = StepOne {
            prompt: prompt.clone(),
            model: self.llm.model_name().to_string(),
            timestamp: Some(Utc::now()),
            ..StepOne::default()
        };

        let request = GenerationRequest::new(prompt)
            .with_max_tokens(self.max_tokens)
            .grounded();

        let result = tokio::time::timeout(self.call_timeout, self.llm.generate(request))
            .await
            .map_err(|_| LlmError::Timeout {
                timeout: self.call_timeout,
            })
            .and_then(|r| r);

        match result {
            Ok(response) => {
                info!(
                    automation = %automation.id,
                    length = response.content.len(),
                    "Stage-1 generation complete"
                );
                step.success = true;
                step.response_length = response.content.len();
                step.response = Some(response.content);
            }
            Err(e) => {
                error!(automation = %automation.id, error = %e, "Stage-1 generation failed");
                step.error = Some(e.to_string());
            }
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationResponse;
    use crate::registry::test_support::chat_automation;
    use async_trait::async_trait;

    struct FixedBackend {
        response: Result<String, String>,
    }

    #[async_trait]
    impl GenerationBackend for FixedBackend {
        fn model_name(&self) -> &str {
            "mock-model"
        }

        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            match &self.response {
                Ok(content) => Ok(GenerationResponse {
                    content: content.clone(),
                    model: "mock-model".to_string(),
                }),
                Err(reason) => Err(LlmError::RequestFailed {
                    provider: "mock".to_string(),
                    reason: reason.clone(),
                }),
            }
        }
    }

    #[test]
    fn prompt_contains_all_sections() {
        let mut automation = chat_automation("a1");
        automation.scheduled_prompt = Some("Mention the roadmap.".to_string());
        let prompt = StageOneGenerator::compose_prompt(&automation, "Them: hello\n");

        assert!(prompt.starts_with(&automation.system_prompt));
        assert!(prompt.contains("Recent conversation:"));
        assert!(prompt.contains("Them: hello"));
        assert!(prompt.contains("scheduled update"));
        assert!(prompt.ends_with("Mention the roadmap."));
    }

    #[test]
    fn prompt_without_scheduled_prompt() {
        let automation = chat_automation("a1");
        let prompt = StageOneGenerator::compose_prompt(&automation, "(no chat history available)");
        assert!(prompt.ends_with("say so plainly."));
    }

    #[tokio::test]
    async fn success_populates_response() {
        let llm = Arc::new(FixedBackend {
            response: Ok("📣 Big update\n\nDetails here.".to_string()),
        });
        let generator = StageOneGenerator::new(llm, 2048, Duration::from_secs(5));
        let step = generator
            .generate(&chat_automation("a1"), "Them: hi\n")
            .await;

        assert!(step.success);
        assert!(step.error.is_none());
        assert_eq!(step.response_length, step.response.as_ref().unwrap().len());
        assert_eq!(step.model, "mock-model");
        assert!(step.timestamp.is_some());
    }

    #[tokio::test]
    async fn failure_records_error() {
        let llm = Arc::new(FixedBackend {
            response: Err("backend unavailable".to_string()),
        });
        let generator = StageOneGenerator::new(llm, 2048, Duration::from_secs(5));
        let step = generator
            .generate(&chat_automation("a1"), "Them: hi\n")
            .await;

        assert!(!step.success);
        assert!(step.response.is_none());
        assert!(step.error.as_ref().unwrap().contains("backend unavailable"));
    }
}
