//! Turns configuration into the services a converter needs.

use kiln_cache::{CacheHandle, Database, MemoryCache, NullCache, SqliteCache};
use kiln_config::{BackendConfig, CacheBackendConfig, CacheConfig, Config, DestinationConfig};
use kiln_convert::{AssetConverter, Registry, Settings};
use kiln_storage::BackendHandle;
use kiln_storage::backend::LocalBackend;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::Path;
use std::sync::Arc;

/// Render an error tree for the terminal.
pub fn report<E>(error: exn::Exn<E>) -> miette::Report
where
    E: std::error::Error + Send + Sync + 'static,
{
    miette::miette!("{error:?}")
}

pub async fn converter(config: &Config) -> Result<AssetConverter> {
    let registry = Registry::from_config(config).map_err(report)?;
    Ok(AssetConverter::new(
        destination(&config.destination).await?,
        cache(&config.cache).await?,
        Settings::from(config),
        registry,
    ))
}

pub async fn destination(config: &DestinationConfig) -> Result<BackendHandle> {
    match &config.backend {
        BackendConfig::Local { root } => {
            let root = std::path::absolute(root).into_diagnostic()?;
            Ok(Arc::new(LocalBackend::new(&config.name, root).map_err(report)?))
        },
        #[cfg(feature = "s3")]
        BackendConfig::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            key_id,
            key_secret,
        } => {
            let (Some(region), Some(key_id), Some(key_secret)) = (region, key_id, key_secret) else {
                miette::bail!("S3 destination `{}` needs region, key_id and key_secret", config.name);
            };
            let backend = kiln_storage::backend::S3Backend::new(
                &config.name,
                bucket,
                prefix.clone(),
                region,
                endpoint.clone(),
                key_id,
                key_secret,
            )
            .await
            .map_err(report)?;
            Ok(Arc::new(backend))
        },
        #[cfg(not(feature = "s3"))]
        BackendConfig::S3 { .. } => {
            miette::bail!("destination `{}` is an S3 bucket, but kiln was built without the `s3` feature", config.name)
        },
    }
}

pub async fn cache(config: &CacheConfig) -> Result<CacheHandle> {
    match &config.backend {
        CacheBackendConfig::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackendConfig::None => Ok(Arc::new(NullCache)),
        CacheBackendConfig::Sqlite { path } => Ok(Arc::new(SqliteCache::from(&database(path).await?))),
    }
}

pub async fn database(path: &Path) -> Result<Database> {
    Database::connect(path)
        .await
        .map_err(report)
        .wrap_err_with(|| format!("opening cache database {}", path.display()))
}
