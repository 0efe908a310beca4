//! Convert Error Types
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.
//! Dependency failures are raised as the subsystem that failed (`Storage`,
//! `Cache`, ...) with the underlying error kept as a child in the tree.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A conversion error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a conversion failure.
///
/// ### Dependency Errors
/// - [`ErrorKind::Storage`]
/// - [`ErrorKind::Cache`]
/// - [`ErrorKind::Config`]
/// - [`ErrorKind::Fallback`]
///
/// ### Operational Errors
/// - [`ErrorKind::Staging`]
/// - [`ErrorKind::Conversion`] and the more specific
///   [`ErrorKind::ProgramNotFound`], [`ErrorKind::CommandFailed`] and
///   [`ErrorKind::NoOutput`]
/// - [`ErrorKind::InvalidAsset`]
/// - [`ErrorKind::UnknownConverter`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A destination store operation failed.
    #[display("destination store operation failed")]
    Storage,
    /// Reading the freshness cache failed.
    #[display("freshness cache operation failed")]
    Cache,
    /// The local staging directory could not be prepared or removed.
    #[display("staging directory operation failed")]
    Staging,
    /// A converter failed to produce its output.
    #[display("conversion failed")]
    Conversion,
    /// The parser configuration could not be turned into a registry.
    #[display("invalid parser configuration")]
    Config,
    /// The generic fallback converter failed.
    #[display("fallback conversion failed")]
    Fallback,
    /// The asset or base path is not a valid relative path.
    #[display("invalid asset path: {_0}")]
    InvalidAsset(#[error(not(source))] String),
    /// A parser names an in-process converter that was never registered.
    #[display("no converter registered as `{_0}`")]
    UnknownConverter(#[error(not(source))] String),
    /// The program an external command starts with is not on `PATH`.
    #[display("program `{_0}` not found in PATH")]
    ProgramNotFound(#[error(not(source))] String),
    /// An external command exited unsuccessfully.
    #[display(
        "command `{command}` failed with exit code {}: {stderr}",
        code.map_or_else(|| "(none)".to_string(), |c| c.to_string())
    )]
    CommandFailed { command: String, code: Option<i32>, stderr: String },
    /// The converter finished but left no output file in staging.
    #[display("conversion produced no output at {}", _0.display())]
    NoOutput(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Nothing is retried internally; a store hiccup is the only failure
    /// that might go away on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
