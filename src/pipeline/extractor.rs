//! Stage-2 extractor — classifies stage-1 output and extracts a clean
//! message body as structured JSON.
//!
//! The instruction template enumerates the patterns that must force
//! `has_new_message` to false, and the extractor defaults to false when
//! ambiguous. Skipping a real update is preferred over sending noise; the
//! stage-2 failure fallback (handled by the runner) is the only path that
//! overrides that bias.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::LlmError;
use crate::llm::{GenerationBackend, GenerationRequest};
use crate::pipeline::types::{ExtractorVerdict, StepTwo};

/// Runs the stage-2 extraction call and parses its verdict.
pub struct StageTwoExtractor {
    llm: Arc<dyn GenerationBackend>,
    max_tokens: u32,
    call_timeout: Duration,
}

impl StageTwoExtractor {
    pub fn new(llm: Arc<dyn GenerationBackend>, max_tokens: u32, call_timeout: Duration) -> Self {
        Self {
            llm,
            max_tokens,
            call_timeout,
        }
    }

    /// Build the rigid extraction prompt around the stage-1 output.
    pub fn build_prompt(step1_text: &str) -> String {
        format!(
            "You are a strict message validator. Below is the raw output of a content \
             generator. Decide whether it contains a genuine new message worth posting, \
             and if so extract ONLY the polished message body.\n\n\
             Respond with ONLY a JSON object, no prose, no code fences:\n\
             {{\"message\": \"...\", \"has_new_message\": true/false, \"notes\": \"...\"}}\n\n\
             Set has_new_message to FALSE when the output:\n\
             - says there is nothing new, no update, or no new content\n\
             - is only a list of titles or headlines with no body\n\
             - is meta-commentary about the task, the prompt, or the conversation\n\
             - is internal reasoning, analysis, or a draft outline\n\
             - is empty, or you are unsure\n\n\
             Set has_new_message to TRUE only when the output is a complete post with:\n\
             - a title line decorated with an emoji\n\
             - a substantive body\n\
             - a trailing call-to-action link\n\n\
             When has_new_message is false, message must be an empty string. Put your \
             one-sentence rationale in notes. When in doubt, choose false.\n\n\
             Generator output:\n---\n{step1_text}\n---"
        )
    }

    /// Run stage 2 and capture the outcome as a `StepTwo` block.
    ///
    /// A failed call or unparseable response yields `success = false` with
    /// the error recorded; the runner then falls back to the stage-1 text.
    pub async fn extract(&self, automation_id: &str, step1_text: &str) -> StepTwo {
        let prompt = Self::build_prompt(step1_text);
        let mut step = StepTwo {
            prompt: prompt.clone(),
            model: self.llm.model_name().to_string(),
            ..StepTwo::default()
        };

        let request = GenerationRequest::new(prompt)
            .with_max_tokens(self.max_tokens)
            .json_only();

        let result = tokio::time::timeout(self.call_timeout, self.llm.generate(request))
            .await
            .map_err(|_| LlmError::Timeout {
                timeout: self.call_timeout,
            })
            .and_then(|r| r);

        let raw = match result {
            Ok(response) => response.content,
            Err(e) => {
                warn!(automation = %automation_id, error = %e, "Stage-2 call failed");
                step.error = Some(e.to_string());
                return step;
            }
        };
        step.raw_response = Some(raw.clone());

        match parse_verdict(&raw) {
            Ok(verdict) => {
                info!(
                    automation = %automation_id,
                    has_new_message = verdict.has_new_message,
                    extracted_length = verdict.message.len(),
                    "Stage-2 extraction complete"
                );
                step.success = true;
                step.verdict = Some(verdict);
            }
            Err(e) => {
                warn!(
                    automation = %automation_id,
                    error = %e,
                    "Stage-2 response did not parse as a verdict"
                );
                step.error = Some(format!("verdict parse failed: {e}"));
            }
        }
        step
    }
}

/// Parse the extractor's raw response into a verdict, tolerating optional
/// code-fence wrapping and surrounding prose.
pub fn parse_verdict(raw: &str) -> Result<ExtractorVerdict, serde_json::Error> {
    serde_json::from_str(&extract_json_object(raw))
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in a ```json fence
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Wrapped in a bare fence
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Object embedded in surrounding text
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
