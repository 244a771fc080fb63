//! Errors in the crate.
use thiserror::Error;

/// Errors raised by configuration, training and checkpointing.
#[derive(Error, Debug)]
pub enum PpoError {
    /// A hyperparameter is out of its allowed range.
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// `reset` or `step` of the environment failed. Never retried.
    #[error("environment error: {0}")]
    Environment(#[source] anyhow::Error),

    /// The update engine was handed zero transitions.
    #[error("cannot build a training batch from zero transitions")]
    EmptyBatch,

    /// Saving or loading network / optimizer records failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Saving or loading the JSON config failed.
    #[error("config io error: {0}")]
    ConfigIo(String),
}

impl PpoError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        PpoError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}
