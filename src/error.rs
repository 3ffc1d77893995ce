//! Crate-wide typed error.
//!
//! Every fallible operation in the Token Counter, Validation Service,
//! Compression Pipeline/Engine, Context Manager, and Tool Registry returns
//! [`CoreError`]. Application glue (config loading, database setup, CLI
//! dispatch) uses `anyhow::Result` instead and converts a `CoreError` into an
//! opaque report only at the outermost boundary.

use crate::validation::Suggestion;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A context mutation would exceed the hard token limit.
    #[error("context capacity exceeded: {tokens} tokens, limit {limit} (overage {overage})")]
    CapacityExceeded {
        tokens: usize,
        limit: usize,
        overage: usize,
        suggestions: Vec<Suggestion>,
    },

    /// Compression found fewer than two eligible messages to fold.
    #[error("no messages to compress")]
    NoMessagesToCompress,

    /// The Summarization Service failed to produce a usable summary.
    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    /// Compression ran but did not reduce the token count.
    #[error("compression did not reduce token count")]
    NoReduction,

    /// The context produced after compression failed validation.
    #[error("compression failed validation: {0}")]
    ValidationFailed(String),

    /// Compression was requested while one was already in flight.
    #[error("a compression is already in progress")]
    CompressionInProgress,

    /// The model requested a tool that was never offered to it.
    #[error("tool '{0}' not found or not offered to the model")]
    ToolNotFound(String),

    /// A tool requiring approval was denied or had no approval mechanism.
    #[error("tool '{0}' execution denied")]
    ToolDenied(String),

    /// A registered tool failed during execution.
    #[error("tool '{tool}' execution error: {message}")]
    ToolExecution { tool: String, message: String },

    /// Loop detection tripped: repeated identical tool calls or outputs.
    #[error("loop detected after {0} repeated calls")]
    LoopDetected(usize),

    /// The provider's stream ended with an explicit error event.
    #[error("provider stream error: {0}")]
    ProviderStream(String),

    /// The operation was cancelled via a cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// A suspension point exceeded its configured timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A session or message id referenced by the caller does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invariant violation — a programmer error, not a runtime condition.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Database access failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection-pool failure.
    #[error("database pool error: {0}")]
    Pool(String),

    /// Config (de)serialization failure.
    #[error("config error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ProviderStream(_) | CoreError::Timeout(_)
        )
    }
}
