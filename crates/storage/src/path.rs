//! Path validation.
//!
//! Every key handed to a backend goes through [`validate`] first, so a
//! backend never has to reason about `..`, `.`, doubled separators or
//! absolute paths itself.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalises a storage path.
///
/// Leading separators and `.` components are dropped, `..` is resolved
/// lexically and must never climb above the storage root.
///
/// > **Note:** backslashes are only separators on Windows; elsewhere they are
/// >           ordinary filename bytes. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use kiln_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("assets/styles/app.scss").is_ok());
/// assert!(validate_path("/assets/app.less").is_ok());
/// assert!(validate_path("assets/../app.less").is_ok());
/// // Invalid paths
/// assert!(validate_path("../secrets.env").is_err());
/// assert!(validate_path("assets/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("assets//compiled/./../compiled/app.css/").unwrap(),
///     Path::new("assets/compiled/app.css")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes survive Path::components() on Unix but truncate
                // paths in the underlying syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate("assets/app.scss").unwrap(), Path::new("assets/app.scss"));
        assert_eq!(validate("a/b/c/app.less").unwrap(), Path::new("a/b/c/app.less"));
        assert_eq!(validate("app.ts").unwrap(), Path::new("app.ts"));
    }

    #[test]
    fn test_leading_slash_is_relative() {
        assert_eq!(validate("/compiled/app.css").unwrap(), Path::new("compiled/app.css"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate("a//b//c").unwrap(), Path::new("a/b/c"));
        assert_eq!(validate("a/./b/./c").unwrap(), Path::new("a/b/c"));
        assert_eq!(validate("a/b/..").unwrap(), Path::new("a"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate("../etc/passwd").is_err());
        assert!(validate("a/../../b").is_err());
        assert!(validate("..").is_err());
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate("a\0b").is_err());
    }

    #[test]
    fn test_empty_paths() {
        assert!(validate("").is_err());
        assert!(validate(".").is_err());
        assert!(validate("./").is_err());
        assert!(validate("//").is_err());
    }

    #[test]
    fn test_trailing_slashes() {
        assert_eq!(validate("assets/").unwrap(), Path::new("assets"));
        assert_eq!(validate("assets///").unwrap(), Path::new("assets"));
    }
}
