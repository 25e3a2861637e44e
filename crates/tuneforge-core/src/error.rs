//! Error types shared across the TuneForge crates.

use thiserror::Error;

/// Result type alias for tuner operations.
pub type Result<T> = std::result::Result<T, TunerError>;

/// Error type for all tuner operations.
///
/// Setup errors (unknown ids, malformed input, wrong run mode) propagate to
/// the caller. Run-time errors (engine failures, validation mismatches,
/// timeouts) are captured by the tuning runner and recorded on the failed run
/// instead of aborting the session.
#[derive(Debug, Error)]
pub enum TunerError {
    /// Unknown kernel or composition id.
    #[error("unknown kernel id: {0}")]
    InvalidKernelId(usize),

    /// Unknown argument id.
    #[error("unknown argument id: {0}")]
    InvalidArgumentId(usize),

    /// Malformed input: empty value list, duplicate parameter name,
    /// insufficient search arguments, zero-sized buffer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation forbidden in the current run mode.
    #[error("{operation} cannot be performed in {mode} mode")]
    InvalidMode { operation: String, mode: String },

    /// Constraint violation or geometry derivation produced an unusable
    /// launch size.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Device-side error reported by the compute engine.
    #[error("compute engine failure: {0}")]
    EngineFailure(String),

    /// Output differs from the reference beyond tolerance.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// Per-kernel soft time budget exceeded.
    #[error("soft time budget of {budget_ms} ms exceeded")]
    Timeout { budget_ms: u64 },

    /// Failure while loading kernel source from disk.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}
