//! Core types and error definitions for the Brandmesh orchestration services.
//!
//! This crate provides the foundational pieces shared by every Brandmesh crate:
//! the unified error enum and the identifier scheme used for jobs and agents.
//!
//! # Main types
//!
//! - [`BrandmeshError`]: Unified error enum for all Brandmesh subsystems.
//! - [`BrandmeshResult`]: Convenience alias for `Result<T, BrandmeshError>`.
//! - [`generate_id()`]: Builds `{prefix}-{unix_millis}-{random}` identifiers.

/// Identifier generation and clock helpers.
pub mod id;

pub use id::{generate_id, now_millis};

// --- Error types ---

/// Top-level error type for the Brandmesh services.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum BrandmeshError {
    /// An error raised by the task queue facade or a worker.
    #[error("Queue error: {0}")]
    Queue(String),

    /// An error talking to the job ledger (broker connection, script failure).
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// An error from the agent registry or an agent execution.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An unexpected failure inside a model provider backend.
    #[error("Provider error: {0}")]
    Provider(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Malformed tool or resource input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// One or more resources failed to close during shutdown.
    #[error("Shutdown error: {0}")]
    Shutdown(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrandmeshError {
    /// True for errors caused by the caller's input rather than by the service.
    pub fn is_validation(&self) -> bool {
        matches!(self, BrandmeshError::Validation(_))
    }
}

/// A convenience `Result` alias using [`BrandmeshError`].
pub type BrandmeshResult<T> = Result<T, BrandmeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrandmeshError::Queue("worker already registered".into());
        assert_eq!(err.to_string(), "Queue error: worker already registered");

        let err = BrandmeshError::NotFound("job x".into());
        assert_eq!(err.to_string(), "Not found: job x");
    }

    #[test]
    fn test_only_validation_is_caller_error() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: BrandmeshError = match parse {
            Ok(_) => panic!("expected parse failure"),
            Err(e) => e.into(),
        };
        assert!(err.to_string().starts_with("JSON error: "));
        assert!(!err.is_validation());
        assert!(BrandmeshError::Validation("bad".into()).is_validation());
        assert!(!BrandmeshError::Ledger("down".into()).is_validation());
    }
}
