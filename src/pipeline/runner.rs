//! Pipeline runner — the single invocation entrypoint.
//!
//! `run` drives one automation through every stage and returns the full
//! execution record. Only configuration problems (unknown or paused
//! automation) surface as `Err`; every downstream failure is captured inside
//! the record, which is persisted before returning on all paths.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::{Error, RegistryError};
use crate::llm::GenerationBackend;
use crate::logstore::ExecutionLogStore;
use crate::pipeline::dispatcher::DeliveryDispatcher;
use crate::pipeline::extractor::StageTwoExtractor;
use crate::pipeline::generator::StageOneGenerator;
use crate::pipeline::transcript::TranscriptAssembler;
use crate::pipeline::types::{ExecutionRecord, FinalOutcome, HistoryEntry};
use crate::registry::{Automation, AutomationRegistry};
use crate::transport::ChatTransport;

/// External collaborators consumed by the runner.
pub struct RunnerDeps {
    pub registry: Arc<dyn AutomationRegistry>,
    pub transport: Arc<dyn ChatTransport>,
    pub llm: Arc<dyn GenerationBackend>,
    pub logs: Arc<ExecutionLogStore>,
}

/// Runs automations end to end.
pub struct AutomationRunner {
    deps: RunnerDeps,
    config: PipelineConfig,
}

impl AutomationRunner {
    pub fn new(config: PipelineConfig, deps: RunnerDeps) -> Self {
        Self { deps, config }
    }

    /// Execute one pipeline run for the given automation.
    pub async fn run(&self, automation_id: &str) -> Result<ExecutionRecord, Error> {
        let automation = self
            .deps
            .registry
            .get(automation_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                id: automation_id.to_string(),
            })?;
        if !automation.is_active() {
            return Err(RegistryError::Paused {
                id: automation_id.to_string(),
            }
            .into());
        }

        let mut record = ExecutionRecord::new(&automation);
        info!(
            automation = %automation.id,
            chat = %automation.chat_name,
            run = %record.run_id,
            "Starting automation run"
        );

        // Transcript (never fails; degrades to placeholder)
        let assembler =
            TranscriptAssembler::new(self.deps.transport.clone(), self.config.history_limit);
        let transcript = assembler.assemble(&automation.chat_id).await;

        // Stage 1 — terminal on failure
        let generator = StageOneGenerator::new(
            self.deps.llm.clone(),
            self.config.step1_max_tokens,
            self.config.call_timeout,
        );
        record.step1 = generator.generate(&automation, &transcript).await;
        if !record.step1.success {
            record.final_outcome.reason = Some(format!(
                "stage-1 generation failed: {}",
                record.step1.error.as_deref().unwrap_or("unknown error")
            ));
            self.persist(&automation, &record).await;
            return Ok(record);
        }
        let step1_text = record.step1.response.clone().unwrap_or_default();

        // Stage 2 — recovered via fallback on failure
        let extractor = StageTwoExtractor::new(
            self.deps.llm.clone(),
            self.config.step2_max_tokens,
            self.config.call_timeout,
        );
        record.step2 = extractor.extract(&automation.id, &step1_text).await;

        // Resolve the final message
        let mut outcome = self.resolve_outcome(&record, &step1_text);

        // Dispatch
        let dispatcher = DeliveryDispatcher::new(self.deps.transport.clone());
        let dispatch = dispatcher
            .dispatch(&automation, &outcome.message, outcome.has_new_message)
            .await;
        outcome.sent = dispatch.sent;
        outcome.sent_to = dispatch.sent_to;
        outcome.send_error = dispatch.send_error;
        if outcome.reason.is_none() {
            outcome.reason = dispatch.reason;
        }
        outcome.message_length = outcome.message.len();
        record.final_outcome = outcome;

        self.persist(&automation, &record).await;
        info!(
            automation = %automation.id,
            run = %record.run_id,
            sent = record.final_outcome.sent,
            "Automation run complete"
        );
        Ok(record)
    }

    /// Reconcile the two stages into the final message and flags.
    fn resolve_outcome(&self, record: &ExecutionRecord, step1_text: &str) -> FinalOutcome {
        let mut outcome = FinalOutcome::default();

        match record.step2.verdict.as_ref().filter(|_| record.step2.success) {
            Some(verdict) => {
                outcome.message = verdict.message.clone();
                outcome.has_new_message = verdict.has_new_message;
                outcome.notes = verdict.notes.clone();

                // Truncation guard: only reconciles messages that would be
                // sent; a no-new-message verdict is not overridden.
                if outcome.has_new_message
                    && self.config.truncation.is_truncated(
                        step1_text.chars().count(),
                        outcome.message.chars().count(),
                    )
                {
                    info!(
                        automation = %record.automation_id,
                        step1_len = step1_text.chars().count(),
                        extracted_len = outcome.message.chars().count(),
                        "Extraction suspiciously short; using full stage-1 output"
                    );
                    outcome.message = step1_text.to_string();
                    outcome.truncation_detected = true;
                    outcome.used_step1_response = true;
                }
            }
            None => {
                // Stage-2 fallback: trust the raw stage-1 text and send it.
                outcome.message = step1_text.to_string();
                outcome.has_new_message = true;
                outcome.used_step1_response = true;
                outcome.reason = Some(format!(
                    "stage-2 extraction failed; using raw stage-1 output ({})",
                    record.step2.error.as_deref().unwrap_or("no verdict")
                ));
            }
        }
        outcome
    }

    /// Persist the record file and history entry. Best effort: failures are
    /// logged and the in-memory record is still returned to the caller.
    async fn persist(&self, automation: &Automation, record: &ExecutionRecord) {
        if let Err(e) = self.deps.logs.write_execution_record(record).await {
            error!(
                automation = %automation.id,
                run = %record.run_id,
                error = %e,
                "Failed to write execution record"
            );
        }
        let entry = HistoryEntry::from_record(record);
        if let Err(e) = self
            .deps
            .logs
            .append_history(&automation.log_file, entry)
            .await
        {
            error!(
                automation = %automation.id,
                run = %record.run_id,
                error = %e,
                "Failed to append history entry"
            );
        }
    }
}
