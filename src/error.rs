//! Error types for posegate

use thiserror::Error;

/// Errors that can occur outside of per-frame evaluation.
///
/// Frame content never produces an error: missing or low-confidence keypoints
/// degrade to a "not ready" status instead.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Failed to parse frame payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Invalid stage transition: {0}")]
    InvalidStage(String),
}
