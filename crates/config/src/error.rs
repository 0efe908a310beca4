//! Config Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every variant means the configuration has to be fixed by whoever wrote
/// it; none of them are retryable.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist.
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The file extension doesn't map to a known configuration format.
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// Configuration sources could not be merged into a valid [`Config`](crate::Config).
    #[display("invalid configuration")]
    Invalid,
    /// A parser for this extension has no output suffix, neither configured
    /// nor inherited from the default table.
    #[display("parser for `.{_0}` has no output extension")]
    MissingOutput(#[error(not(source))] String),
    /// A parser runs as an external command but no command template is
    /// registered for its extension.
    #[display("parser for `.{_0}` runs as a command, but no command is configured")]
    MissingCommand(#[error(not(source))] String),
    /// A parser runs in-process but names no converter.
    #[display("parser for `.{_0}` names no converter")]
    MissingConverter(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
