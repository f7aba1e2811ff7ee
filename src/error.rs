//! Error types for ethotrace
//!
//! Every user-visible failure carries enough context (item path, attribute
//! name, model id) to locate the offending node without a debugger.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Ethotrace error types
#[derive(Error, Debug)]
pub enum Error {
    /// Path or child lookup miss. Recoverable: the caller decides fallback.
    #[error("item not found: {path}")]
    NotFound {
        /// Slash-joined display-name path that failed to resolve
        path: String,
    },

    /// An expected attribute is absent. The operation for that item aborts,
    /// sibling items continue.
    #[error("missing attribute '{attribute}' on item '{item}'")]
    MissingMetadata {
        /// Path of the item missing the attribute
        item: String,
        /// Name of the absent attribute
        attribute: String,
    },

    /// Trigger channel value does not map to a known category
    #[error("unknown trigger code {code} at step {step} (expected 1-5)")]
    UnknownTriggerCode {
        /// The raw channel value, truncated to integer
        code: i64,
        /// Sample index in the trigger channel
        step: usize,
    },

    /// Series length incompatible with a fixed-length operation
    #[error("shape mismatch: expected {expected} samples, got {actual}")]
    ShapeMismatch {
        /// Length required by the operation
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },

    /// Resample target point outside the source's native time range.
    /// Callers must clip the target axis first.
    #[error("resample target {t} ms outside source range [{t_min}, {t_max}] ms")]
    ResampleOutOfRange {
        /// Offending target time
        t: f64,
        /// First native timestamp of the source
        t_min: f64,
        /// Last native timestamp of the source
        t_max: f64,
    },

    /// Sample period must be positive and finite
    #[error("invalid sample period {0} ms (must be positive and finite)")]
    InvalidSamplePeriod(f64),

    /// Nonlinear least-squares fit failed to converge.
    /// No silent fallback to initial parameters.
    #[error("fit of model '{model}' did not converge after {iterations} iterations")]
    FitDidNotConverge {
        /// Model identifier from the registry
        model: String,
        /// Iterations performed before giving up
        iterations: usize,
    },
}

impl Error {
    /// Build a `NotFound` from path segments
    #[must_use]
    pub fn not_found(segments: &[&str]) -> Self {
        Self::NotFound {
            path: segments.join("/"),
        }
    }
}
