//! Transcript assembler — renders recent conversation turns for prompting.

use std::sync::Arc;

use tracing::warn;

use crate::transport::ChatTransport;

/// Sentinel used when no usable history exists. The run continues with
/// degraded context rather than aborting.
pub const NO_HISTORY_PLACEHOLDER: &str = "(no chat history available)";

/// Assembles a bounded, role-tagged dialogue transcript.
pub struct TranscriptAssembler {
    transport: Arc<dyn ChatTransport>,
    limit: usize,
}

impl TranscriptAssembler {
    pub fn new(transport: Arc<dyn ChatTransport>, limit: usize) -> Self {
        Self { transport, limit }
    }

    /// Build the transcript for a destination. Never fails: transport errors
    /// and empty histories both degrade to the placeholder.
    pub async fn assemble(&self, destination: &str) -> String {
        let messages = match self
            .transport
            .fetch_recent_messages(destination, self.limit)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(destination, error = %e, "History fetch failed; using placeholder");
                return NO_HISTORY_PLACEHOLDER.to_string();
            }
        };

        if messages.is_empty() {
            return NO_HISTORY_PLACEHOLDER.to_string();
        }

        let mut transcript = String::with_capacity(messages.len() * 64);
        for message in &messages {
            let role = if message.from_self { "Me" } else { "Them" };
            transcript.push_str(role);
            transcript.push_str(": ");
            transcript.push_str(&message.body);
            transcript.push('\n');
        }
        transcript
    }
}
