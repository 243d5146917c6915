//! Execution record types.
//!
//! One `ExecutionRecord` is created per run, populated stage by stage, and
//! persisted exactly once at run end. It is never mutated after persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::Automation;

/// Result of the stage-1 (grounded generation) pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOne {
    pub success: bool,
    pub prompt: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub response_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Structured verdict extracted by stage 2.
///
/// A missing `has_new_message` field decodes as `false`: the extractor's
/// conservative bias is the single sendability policy (see DESIGN.md).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractorVerdict {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub has_new_message: bool,
    #[serde(default)]
    pub notes: String,
}

/// Result of the stage-2 (extraction/validation) pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepTwo {
    pub success: bool,
    pub prompt: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ExtractorVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where a message was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentTo {
    Chat,
    Channel,
}

/// Resolved outcome of a run: what was (or was not) sent, and why.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalOutcome {
    pub message: String,
    pub has_new_message: bool,
    pub notes: String,
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_to: Option<SentTo>,
    pub message_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_error: Option<String>,
    #[serde(default)]
    pub truncation_detected: bool,
    #[serde(default)]
    pub used_step1_response: bool,
    /// Set whenever nothing was sent, or a fallback path was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The full structured trace of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub run_id: Uuid,
    pub automation_id: String,
    pub automation_name: String,
    pub chat_id: String,
    pub timestamp: DateTime<Utc>,
    pub step1: StepOne,
    pub step2: StepTwo,
    #[serde(rename = "final")]
    pub final_outcome: FinalOutcome,
}

impl ExecutionRecord {
    /// Create a fresh record at run start.
    pub fn new(automation: &Automation) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            automation_id: automation.id.clone(),
            automation_name: automation.chat_name.clone(),
            chat_id: automation.chat_id.clone(),
            timestamp: Utc::now(),
            step1: StepOne::default(),
            step2: StepTwo::default(),
            final_outcome: FinalOutcome::default(),
        }
    }

    /// Outcome tag for history entries.
    ///
    /// "skipped" means nothing was attempted; a failed delivery attempt
    /// (permission refusal, send error) is a failure, same as a failed
    /// generation.
    pub fn outcome_tag(&self) -> &'static str {
        if self.final_outcome.sent {
            "sent"
        } else if !self.step1.success || self.final_outcome.send_error.is_some() {
            "failed"
        } else {
            "skipped"
        }
    }
}

/// Compact projection of an execution record for the rotating history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub message: String,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
    /// Assigned on read, not write, to track provenance across rotated files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

impl HistoryEntry {
    pub fn from_record(record: &ExecutionRecord) -> Self {
        // Most proximate explanation wins: a delivery failure, then a
        // skip/fallback reason, then a stage-1 error, then verdict notes.
        let final_outcome = &record.final_outcome;
        let notes = final_outcome
            .send_error
            .as_ref()
            .or(final_outcome.reason.as_ref())
            .or(record.step1.error.as_ref())
            .unwrap_or(&final_outcome.notes)
            .clone();
        Self {
            entry_type: record.outcome_tag().to_string(),
            message: record.final_outcome.message.clone(),
            notes,
            timestamp: record.timestamp,
            source_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::chat_automation;

    #[test]
    fn new_record_copies_identity() {
        let automation = chat_automation("a1");
        let record = ExecutionRecord::new(&automation);
        assert_eq!(record.automation_id, "a1");
        assert_eq!(record.chat_id, automation.chat_id);
        assert!(!record.step1.success);
        assert!(!record.final_outcome.sent);
    }

    #[test]
    fn verdict_missing_has_new_message_defaults_false() {
        let verdict: ExtractorVerdict =
            serde_json::from_str(r#"{"message": "hi", "notes": "n"}"#).unwrap();
        assert!(!verdict.has_new_message);
    }

    #[test]
    fn final_serializes_under_final_key() {
        let automation = chat_automation("a1");
        let record = ExecutionRecord::new(&automation);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("final").is_some());
        assert!(json.get("final_outcome").is_none());
    }

    #[test]
    fn outcome_tags() {
        let automation = chat_automation("a1");
        let mut record = ExecutionRecord::new(&automation);
        assert_eq!(record.outcome_tag(), "failed");

        record.step1.success = true;
        assert_eq!(record.outcome_tag(), "skipped");

        record.final_outcome.send_error = Some("no posting rights".to_string());
        assert_eq!(record.outcome_tag(), "failed");

        record.final_outcome.send_error = None;
        record.final_outcome.sent = true;
        assert_eq!(record.outcome_tag(), "sent");
    }

    #[test]
    fn history_entry_prefers_reason_over_notes() {
        let automation = chat_automation("a1");
        let mut record = ExecutionRecord::new(&automation);
        record.step1.success = true;
        record.final_outcome.notes = "verdict notes".to_string();
        record.final_outcome.reason = Some("nothing to send".to_string());

        let entry = HistoryEntry::from_record(&record);
        assert_eq!(entry.notes, "nothing to send");
        assert!(entry.source_file.is_none());
    }

    #[test]
    fn history_entry_surfaces_send_error() {
        let automation = chat_automation("a1");
        let mut record = ExecutionRecord::new(&automation);
        record.step1.success = true;
        record.final_outcome.notes = "verdict notes".to_string();
        record.final_outcome.send_error = Some("channel send failed: socket closed".to_string());

        let entry = HistoryEntry::from_record(&record);
        assert_eq!(entry.entry_type, "failed");
        assert_eq!(entry.notes, "channel send failed: socket closed");
    }
}
