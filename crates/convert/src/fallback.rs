use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Handles assets that no parser is registered for.
#[async_trait]
pub trait Fallback: Send + Sync {
    /// Return the path (relative to `base_path`) callers should use for
    /// `asset`.
    async fn convert(&self, asset: &Path, base_path: &Path) -> Result<PathBuf>;
}

/// Hands the asset back untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

#[async_trait]
impl Fallback for PassThrough {
    async fn convert(&self, asset: &Path, _base_path: &Path) -> Result<PathBuf> {
        Ok(asset.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pass_through() {
        let path = PassThrough.convert(Path::new("img/logo.svg"), Path::new("web")).await.unwrap();
        assert_eq!(path, Path::new("img/logo.svg"));
    }
}
