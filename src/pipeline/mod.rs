//! The content-automation pipeline.
//!
//! Control flow per run:
//! registry lookup → transcript assembly → stage-1 grounded generation →
//! stage-2 extraction → truncation guard → permission-gated dispatch →
//! durable record + history append.

pub mod dispatcher;
pub mod extractor;
pub mod generator;
pub mod runner;
pub mod transcript;
pub mod truncation;
pub mod types;

pub use dispatcher::{DeliveryDispatcher, DispatchOutcome};
pub use extractor::StageTwoExtractor;
pub use generator::StageOneGenerator;
pub use runner::{AutomationRunner, RunnerDeps};
pub use transcript::{NO_HISTORY_PLACEHOLDER, TranscriptAssembler};
pub use truncation::TruncationPolicy;
pub use types::{
    ExecutionRecord, ExtractorVerdict, FinalOutcome, HistoryEntry, SentTo, StepOne, StepTwo,
};
