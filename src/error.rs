//! Error types for autopost.

use std::time::Duration;

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Log store error: {0}")]
    Log(#[from] LogError),
}

/// Automation registry errors.
///
/// These are the only errors `AutomationRunner::run` surfaces to callers
/// directly. Everything downstream of a successful registry lookup is
/// captured inside the returned execution record instead.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Automation {id} not found")]
    NotFound { id: String },

    #[error("Automation {id} is paused")]
    Paused { id: String },

    #[error("Automation {id} is invalid: {reason}")]
    Invalid { id: String, reason: String },

    #[error("Failed to load registry: {0}")]
    Load(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to fetch history for {destination}: {reason}")]
    FetchFailed { destination: String, reason: String },

    #[error("Failed to resolve destination {destination}: {reason}")]
    DestinationLookup { destination: String, reason: String },

    #[error("Destination {destination} is not a channel")]
    NotAChannel { destination: String },

    #[error("No posting rights in read-only channel {destination}")]
    ReadOnlyChannel { destination: String },

    #[error("Failed to send to {destination}: {reason}")]
    SendFailed { destination: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Generation backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Generation call timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Execution log store errors.
///
/// Log write failures never fail a run — the runner logs them and returns
/// the in-memory record unchanged.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("History file {file} is corrupt: {reason}")]
    Corrupt { file: String, reason: String },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
