//! Error types for the dialogue learner

use thiserror::Error;

/// Main error type for learner operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration, detected before any state is touched
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failure inside the blocking model step (forward, backward or update)
    #[error("Model execution failed: {0}")]
    ModelExecution(String),

    /// A batch or graph context that violates the data contract
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// Checkpoint layout or persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Tensor operation error
    #[error("Tensor operation error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for learner operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid-configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a model execution error
    pub fn model_execution(msg: impl Into<String>) -> Self {
        Self::ModelExecution(msg.into())
    }

    /// Create a malformed batch error
    pub fn malformed_batch(msg: impl Into<String>) -> Self {
        Self::MalformedBatch(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is an invalid-configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Find the typed learner error inside an `anyhow` chain, if any
pub fn classify(err: &anyhow::Error) -> Option<&Error> {
    err.chain().find_map(|cause| cause.downcast_ref::<Error>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_constructors() {
        assert!(matches!(Error::config("x"), Error::Config(_)));
        assert!(matches!(Error::model_execution("x"), Error::ModelExecution(_)));
        assert!(matches!(Error::malformed_batch("x"), Error::MalformedBatch(_)));
        assert!(Error::config("bad optimizer").is_config());
        assert!(!Error::internal("x").is_config());
    }

    #[test]
    fn test_classify_through_context() {
        let err: anyhow::Result<()> = Err(Error::malformed_batch("shape")).context("running chunk");
        let err = err.unwrap_err();
        assert!(matches!(classify(&err), Some(Error::MalformedBatch(_))));
    }

    #[test]
    fn test_display() {
        let err = Error::config("unknown optimizer 'rmsprop'");
        assert_eq!(err.to_string(), "Invalid configuration: unknown optimizer 'rmsprop'");
    }
}
