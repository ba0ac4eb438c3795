//! Unified error type for the scoring pipeline.
//!
//! Per-candidate errors are isolated: a bad score set rejects one candidate,
//! never the batch. Persistence and weight-store errors never alter a scoring
//! result already produced for the current request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input for {candidate_key}: {reason}")]
    InvalidInput {
        candidate_key: String,
        reason: String,
    },

    #[error("ledger persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("weight store corrupt at {path}: {reason}")]
    WeightStoreCorrupt { path: String, reason: String },

    #[error("config invariant violated: {0}")]
    ConfigInvariant(String),

    #[error("stats store error: {0}")]
    Stats(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
