//! Error types for pipeline construction, cursors and the text DSL.

use thiserror::Error;

/// Errors raised by `xform-rs`.
///
/// Caller-supplied closures are never wrapped: a panicking predicate or
/// reducer unwinds straight through `fold`.
#[derive(Debug, Error)]
pub enum XformError {
    /// A `drop`/`take` amount was negative.
    #[error("{op} amount must be non-negative, got {amount}")]
    NegativeAmount { op: &'static str, amount: i64 },

    /// A cursor was read without first confirming an element is available.
    #[error("cursor read past the end (call has_next() before next())")]
    Exhausted,

    /// A pipeline text line could not be parsed.
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    /// The pipeline text parsed but does not form a runnable pipeline.
    #[error("{0}")]
    InvalidPipeline(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, XformError>;
