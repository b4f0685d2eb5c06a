use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for kdep orchestration.
///
/// Typed errors from the core and resolver crates are folded into one of
/// these classes before they reach a caller.
#[derive(Debug, Error, Diagnostic)]
pub enum KdepError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed manifest, constraint or lock. Never retried.
    #[error("Input error: {message}")]
    #[diagnostic(help("Check the declared constraints for syntax errors"))]
    Input { message: String },

    /// No assignment of versions satisfies the declared constraints.
    #[error("Dependency resolution failed: {message}")]
    Unsatisfiable { message: String },

    /// The version source failed; the caller decides whether to retry.
    #[error("Source error: {message}")]
    Source { message: String },

    /// A package required by the solution could not be parsed.
    #[error("Package {path} could not be parsed: {message}")]
    PartialParse { path: String, message: String },

    /// The solve was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type KdepResult<T> = miette::Result<T>;
