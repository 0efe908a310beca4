use crate::decision;
use crate::dispatch::{Registry, Rule};
use crate::error::{ErrorKind, Result};
use crate::fallback::{Fallback, PassThrough};
use crate::locks::BaseLocks;
use crate::staging::Staging;
use crate::target::{self, Target};
use exn::ResultExt;
use kiln_cache::{CacheHandle, CacheKey};
use kiln_config::{CacheConfig, Config, PublishPolicy};
use kiln_storage::BackendHandle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Knobs that shape a conversion, independent of the registered parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Local directory that staging directories are created in.
    pub scratch_dir: PathBuf,
    /// Prefix (relative to the base path) for compiled outputs.
    pub destination_dir: String,
    /// Recompile regardless of cache and store state.
    pub force: bool,
    pub cache_prefix: String,
    pub cache_ttl: Duration,
    pub publish: PublishPolicy,
}

impl Settings {
    /// Default settings staging under `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        let cache = CacheConfig::default();
        Self {
            scratch_dir: scratch_dir.into(),
            destination_dir: "compiled".to_string(),
            force: false,
            cache_ttl: cache.ttl(),
            cache_prefix: cache.prefix,
            publish: PublishPolicy::default(),
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            destination_dir: config.destination_dir.clone(),
            force: config.force,
            cache_prefix: config.cache.prefix.clone(),
            cache_ttl: config.cache.ttl(),
            publish: config.publish,
        }
    }
}

/// The outcome of a successful [`AssetConverter::convert()`].
///
/// Every variant carries the path, relative to the base path, that callers
/// should reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Converted {
    /// The output was already fresh; nothing was staged or converted.
    UpToDate(PathBuf),
    /// The asset was converted. `published` is `false` when the publish
    /// policy kept an output that already existed in the store.
    Compiled { path: PathBuf, published: bool },
    /// No parser handles the asset; the path came from the fallback.
    PassThrough(PathBuf),
}

impl Converted {
    pub fn path(&self) -> &Path {
        match self {
            Self::UpToDate(path) | Self::Compiled { path, .. } | Self::PassThrough(path) => path,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Self::UpToDate(path) | Self::Compiled { path, .. } | Self::PassThrough(path) => path,
        }
    }
}

/// Converts assets that live in a destination store.
///
/// Conversions never touch the store's files directly: the base directory is
/// mirrored into a local staging directory, the converter runs there, and
/// only the finished output is copied back. A short-lived cache entry per
/// output lets repeated calls skip even the metadata lookups.
///
/// # Examples
///
/// ```no_run
/// use kiln_cache::MemoryCache;
/// use kiln_config::Config;
/// use kiln_convert::{AssetConverter, Registry, Settings};
/// use kiln_storage::backend::LocalBackend;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() -> kiln_convert::error::Result<()> {
/// let config = Config::default();
/// let store = LocalBackend::new("public", "/srv/public").unwrap();
/// let converter = AssetConverter::new(
///     Arc::new(store),
///     Arc::new(MemoryCache::new()),
///     Settings::from(&config),
///     Registry::from_config(&config)?,
/// );
/// let converted = converter.convert(Path::new("styles/app.scss"), Path::new("assets")).await?;
/// println!("{}", converted.path().display());
/// # Ok(())
/// # }
/// ```
pub struct AssetConverter {
    destination: BackendHandle,
    cache: CacheHandle,
    settings: Settings,
    registry: Registry,
    fallback: Arc<dyn Fallback>,
    locks: BaseLocks,
}

impl AssetConverter {
    pub fn new(destination: BackendHandle, cache: CacheHandle, settings: Settings, registry: Registry) -> Self {
        Self {
            destination,
            cache,
            settings,
            registry,
            fallback: Arc::new(PassThrough),
            locks: BaseLocks::new(),
        }
    }

    /// Replace the [`PassThrough`] fallback used for unhandled assets.
    pub fn with_fallback(mut self, fallback: Arc<dyn Fallback>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Cache key of the freshness marker for the store path `to`.
    pub fn cache_key(&self, to: &Path) -> CacheKey {
        CacheKey::new(&self.settings.cache_prefix, to)
    }

    /// Source and output paths for `asset`, or `None` if no parser handles
    /// its extension.
    pub fn resolve(&self, asset: &Path, base_path: &Path) -> Result<Option<(&Rule, Target)>> {
        let Some(rule) = target::extension(asset).and_then(|extension| self.registry.get(extension)) else {
            return Ok(None);
        };
        let target = Target::resolve(asset, base_path, &self.settings.destination_dir, &rule.output)?;
        Ok(Some((rule, target)))
    }

    /// Whether the output stored at `to` has to be rebuilt from `from`.
    ///
    /// See [`needs_recompile`](crate::needs_recompile) for the rules.
    pub async fn needs_recompile(&self, from: &Path, to: &Path) -> Result<bool> {
        let key = self.cache_key(to);
        decision::needs_recompile(self.destination.as_ref(), self.cache.as_ref(), &key, from, to, self.settings.force)
            .await
    }

    /// Convert `asset` (relative to `base_path`) and return the output path
    /// relative to the same base.
    ///
    /// Assets without a registered parser go to the fallback. Otherwise the
    /// output is only rebuilt when [`needs_recompile()`](Self::needs_recompile)
    /// says so, in which case the base directory is staged, converted,
    /// published and recorded as fresh. Calls sharing a base path are
    /// serialized.
    ///
    /// # Errors
    /// Store, staging and converter failures abort the call; the staging
    /// directory is removed either way and nothing is published unless the
    /// converter succeeded.
    #[instrument(skip_all, fields(asset = %asset.display(), base = %base_path.display()))]
    pub async fn convert(&self, asset: &Path, base_path: &Path) -> Result<Converted> {
        let Some((rule, target)) = self.resolve(asset, base_path)? else {
            let path = self.fallback.convert(asset, base_path).await.or_raise(|| ErrorKind::Fallback)?;
            tracing::trace!(path = %path.display(), "No parser registered; used fallback");
            return Ok(Converted::PassThrough(path));
        };

        let _guard = self.locks.lock(&target.base).await;
        if !self.needs_recompile(&target.from, &target.to).await? {
            return Ok(Converted::UpToDate(target.output));
        }

        let staging = Staging::acquire(&self.settings.scratch_dir, self.destination.as_ref(), &target.base).await?;
        staging.prepare_output(&target.output).await?;
        rule.dispatch(&staging, &target).await?;
        let published =
            staging.publish(self.destination.as_ref(), &target, self.settings.publish, self.settings.force).await?;
        staging.finish().await?;

        // The store already holds the output, so a lost marker only costs
        // another metadata check next time.
        let key = self.cache_key(&target.to);
        if let Err(e) = self.cache.set(key.as_str(), &target.output_str(), self.settings.cache_ttl).await {
            tracing::warn!(%key, error = ?e, "Failed to record freshness marker");
        }

        tracing::debug!(
            from = %target.asset.display(),
            to = %target.output.display(),
            published,
            "Converted asset"
        );
        Ok(Converted::Compiled {
            path: target.output,
            published,
        })
    }
}
