use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use kiln_storage::validate_path;
use std::path::{Path, PathBuf};

/// Where an asset comes from and where its compiled output goes.
///
/// `asset` and `output` are relative to `base`; `from` and `to` are the
/// corresponding keys in the destination store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub base: PathBuf,
    pub asset: PathBuf,
    pub output: PathBuf,
    pub from: PathBuf,
    pub to: PathBuf,
}

impl Target {
    /// Compute source and output paths for `asset` under `base_path`.
    ///
    /// The output keeps the asset's directory, swaps its extension for
    /// `output_suffix`, and is placed under `destination_dir` (slashes
    /// trimmed; an empty directory adds no prefix).
    ///
    /// ```
    /// use kiln_convert::Target;
    /// use std::path::Path;
    ///
    /// let target = Target::resolve(Path::new("styles/app.scss"), Path::new("web"), "compiled", "css").unwrap();
    /// assert_eq!(target.output, Path::new("compiled/styles/app.css"));
    /// assert_eq!(target.to, Path::new("web/compiled/styles/app.css"));
    /// ```
    pub fn resolve(asset: &Path, base_path: &Path, destination_dir: &str, output_suffix: &str) -> Result<Self> {
        let base = normalize_base(base_path)?;
        let asset =
            validate_path(asset).or_raise(|| ErrorKind::InvalidAsset(asset.to_string_lossy().into_owned()))?;
        let compiled = asset.with_extension(output_suffix.trim_start_matches('.'));
        let destination_dir = destination_dir.trim_matches('/');
        let output = match destination_dir.is_empty() {
            true => compiled,
            false => validate_path(destination_dir)
                .or_raise(|| ErrorKind::InvalidAsset(destination_dir.to_string()))?
                .join(compiled),
        };
        Ok(Self {
            from: base.join(&asset),
            to: base.join(&output),
            base,
            asset,
            output,
        })
    }

    /// Output path relative to the base, as handed back to callers and
    /// stored in the freshness cache.
    pub fn output_str(&self) -> String {
        self.output.to_string_lossy().into_owned()
    }
}

/// Extension of the asset's file name, used to select a parser.
pub fn extension(asset: &Path) -> Option<&str> {
    asset.extension().and_then(|e| e.to_str()).filter(|e| !e.is_empty())
}

pub(crate) fn normalize_base(base_path: &Path) -> Result<PathBuf> {
    validate_path(base_path).or_raise(|| ErrorKind::InvalidAsset(base_path.to_string_lossy().into_owned()))
}
