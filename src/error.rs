//! Error types for the chunking engine.
//!
//! A single [`ChunkError`] enum covers every failure kind described by
//! the engine's error-handling design: validation, I/O, callback,
//! transient and terminal LLM failures, cancellation, and tolerant-JSON
//! repair failure.

use thiserror::Error;

/// Errors produced by the chunking engine.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// Malformed options or a missing required field (e.g. connector id).
    #[error("invalid chunking options: {message}")]
    Validation {
        /// Human-readable description of what was invalid.
        message: String,
    },

    /// Seek/read/open failure against the input source.
    #[error("I/O error while chunking: {0}")]
    Io(#[from] std::io::Error),

    /// The user's chunk callback returned an error; the run is aborted.
    #[error("chunk callback failed: {message}")]
    Callback {
        /// Description of the callback failure, wrapped from the caller.
        message: String,
    },

    /// A streaming request to the LLM connector failed or timed out.
    #[error("LLM transport error: {message}")]
    Transport {
        /// Transport-level failure description.
        message: String,
    },

    /// The LLM produced no usable segmentation after exhausting retries.
    #[error("LLM segmentation failed after {attempts} attempt(s): {message}")]
    LlmExhausted {
        /// Number of attempts made, including the first.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// A tolerant-JSON repair pass still failed to produce valid JSON.
    #[error("could not parse or repair JSON: {message}")]
    JsonRepair {
        /// Description of why repair failed.
        message: String,
    },

    /// The run was cancelled via the caller's cancellation token.
    #[error("chunking cancelled")]
    Cancelled,

    /// A connector id referenced by [`SemanticOptions`](crate::model::SemanticOptions)
    /// was not registered.
    #[error("unknown connector: {0}")]
    UnknownConnector(String),

    /// Positions decoded from an LLM response violated the ordering or
    /// bounds invariants required of a [`Position`](crate::model::Position) list.
    #[error("invalid segmentation positions: {message}")]
    InvalidPositions {
        /// Description of which invariant was violated.
        message: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChunkError>;
