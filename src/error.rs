// error.rs
// Description: Library error type shared by layers, training, generation, tokenizer and
//              checkpoint persistence.
// History:
// - 2026-02-01: Replace string error codes with a typed error enum.
// Author: Marcus Schlieper

/// Result type for this library
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Library error type
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// An input vector does not match the width a layer or network expects.
    #[error("shape_mismatch ({context}): expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("resonance_not_attached: generation requires a resonance transform")]
    MissingResonance,

    #[error("tokenizer_not_set: trace output requires a tokenizer")]
    MissingTokenizer,

    #[error("invalid_argument: {0}")]
    InvalidArgument(String),

    /// Artifact content does not describe a network this build can restore.
    #[error("checkpoint_invalid: {0}")]
    Checkpoint(String),

    #[error("io_error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization_error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("json_error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NetworkError {
    pub fn shape(context: &'static str, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            context,
            expected,
            actual,
        }
    }
}
