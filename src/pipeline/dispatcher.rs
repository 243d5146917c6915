//! Delivery dispatcher — permission-gated send to the destination.

use std::sync::Arc;

use tracing::{info, warn};

use crate::pipeline::types::SentTo;
use crate::registry::{Automation, AutomationType};
use crate::transport::ChatTransport;

/// Outcome of a dispatch attempt, folded into the record's final block.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub sent: bool,
    pub sent_to: Option<SentTo>,
    pub send_error: Option<String>,
    /// Populated when nothing was attempted at all.
    pub reason: Option<String>,
}

impl DispatchOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            send_error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Resolves destination capability, enforces permissions, and sends.
///
/// A send failure is local to the run: it is recorded, never retried here
/// (retries belong to the transport), and never blocks record persistence.
pub struct DeliveryDispatcher {
    transport: Arc<dyn ChatTransport>,
}

impl DeliveryDispatcher {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Attempt delivery. The no-new-message and empty-body gates live here
    /// so the invariant is enforced in one place.
    pub async fn dispatch(
        &self,
        automation: &Automation,
        message: &str,
        has_new_message: bool,
    ) -> DispatchOutcome {
        if !has_new_message {
            info!(automation = %automation.id, "No new message; nothing to send");
            return DispatchOutcome::skipped("extractor reported no new message");
        }
        if message.trim().is_empty() {
            warn!(automation = %automation.id, "New-message verdict with empty body; skipping");
            return DispatchOutcome::skipped("message body is empty");
        }

        match automation.automation_type {
            AutomationType::Channel => self.dispatch_channel(automation, message).await,
            AutomationType::Chat => self.dispatch_chat(automation, message).await,
        }
    }

    /// Channel delivery requires the destination to resolve as a channel the
    /// caller can post to. Fails closed on any doubt.
    async fn dispatch_channel(&self, automation: &Automation, message: &str) -> DispatchOutcome {
        let info = match self.transport.destination_info(&automation.chat_id).await {
            Ok(info) => info,
            Err(e) => {
                warn!(automation = %automation.id, error = %e, "Destination lookup failed");
                return DispatchOutcome::failed(format!("destination lookup failed: {e}"));
            }
        };

        if !info.is_channel {
            warn!(
                automation = %automation.id,
                chat_id = %automation.chat_id,
                "Channel automation points at a non-channel destination"
            );
            return DispatchOutcome::failed(format!(
                "destination {} is not a channel",
                automation.chat_id
            ));
        }
        if info.is_read_only {
            warn!(
                automation = %automation.id,
                chat_id = %automation.chat_id,
                "No posting rights in channel; refusing to send"
            );
            return DispatchOutcome::failed(format!(
                "no posting rights in read-only channel {}",
                automation.chat_id
            ));
        }

        match self.transport.send(&automation.chat_id, message).await {
            Ok(()) => {
                info!(automation = %automation.id, "Message posted to channel");
                DispatchOutcome {
                    sent: true,
                    sent_to: Some(SentTo::Channel),
                    ..DispatchOutcome::default()
                }
            }
            Err(e) => DispatchOutcome::failed(format!("channel send failed: {e}")),
        }
    }

    /// Chat delivery has no permission gate beyond normal addressing.
    async fn dispatch_chat(&self, automation: &Automation, message: &str) -> DispatchOutcome {
        match self.transport.send(&automation.chat_id, message).await {
            Ok(()) => {
                info!(automation = %automation.id, "Message sent to chat");
                DispatchOutcome {
                    sent: true,
                    sent_to: Some(SentTo::Chat),
                    ..DispatchOutcome::default()
                }
            }
            Err(e) => DispatchOutcome::failed(format!("chat send failed: {e}")),
        }
    }
}
