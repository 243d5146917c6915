//! autopost — scheduled content-automation pipeline.

pub mod config;
pub mod error;
pub mod llm;
pub mod logstore;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod transport;
