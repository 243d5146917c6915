//! Chat transport interface.
//!
//! The pipeline only needs three operations from the underlying chat client:
//! a bounded history read, a destination capability lookup, and a send.
//! Rate limiting and retries are the transport's concern, not the
//! dispatcher's.

pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub use telegram::TelegramTransport;

/// One prior conversation turn, as seen by the transcript assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// True if the message was sent by this account.
    pub from_self: bool,
    pub body: String,
}

/// Capability of a destination, used for permission-gated delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationInfo {
    /// The destination is a broadcast channel (admin-only posting).
    pub is_channel: bool,
    /// The caller can read but not post.
    pub is_read_only: bool,
}

/// Abstract chat transport consumed by the pipeline.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Fetch up to `limit` most recent messages for a destination,
    /// oldest first.
    async fn fetch_recent_messages(
        &self,
        destination: &str,
        limit: usize,
    ) -> Result<Vec<TranscriptMessage>, TransportError>;

    /// Resolve a destination's type and the caller's posting rights there.
    async fn destination_info(&self, destination: &str)
    -> Result<DestinationInfo, TransportError>;

    /// Send a text message to a destination.
    async fn send(&self, destination: &str, text: &str) -> Result<(), TransportError>;
}
