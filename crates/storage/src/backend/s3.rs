//! S3-compatible storage backend.
//!
//! Lets the destination store live in AWS S3, Backblaze B2, Tigris, MinIO or
//! any other S3-compatible service. Credentials are provided explicitly via
//! the configuration file.

use crate::{
    Entry, FileInfo, StorageBackend,
    error::{ErrorKind, Result},
    validate_path,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    primitives::{ByteStream, DateTime},
    types::Object,
};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible storage backend.
///
/// Stores files in an S3 bucket, optionally under a key prefix. All paths are
/// relative to the configured prefix (if any). Directories are emulated with
/// `/`-delimited listings.
///
/// # Examples
///
/// ```no_run
/// use kiln_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "public-assets",
///     "my-bucket",
///     Some("web/".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix
            .map(validate_path)
            .transpose()?
            .map(|p| p.to_str().map(|s| s.to_string()).ok_or_raise(|| ErrorKind::InvalidPath(p)))
            .transpose()?;
        let region = Region::new(region.into());
        let credentials = Credentials::new(key_id, key_secret, None, None, "kiln-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(region)
            // Exponential backoff: 1 initial attempt + 3 retries.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing works with every S3-compatible service.
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        let path_str = validated.to_str().ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?;
        Ok(join_key(self.prefix.as_deref(), path_str))
    }

    /// Strip the configured prefix from an S3 key to get relative path.
    fn relative_path(&self, key: &str) -> Result<PathBuf> {
        validate_path(strip_key(self.prefix.as_deref(), key))
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    fn network(err: impl std::error::Error) -> ErrorKind {
        ErrorKind::Network(DisplayErrorContext(err).to_string())
    }

    /// Convert a listed object into [`FileInfo`]. Objects with keys ending in
    /// `/` are directory markers created by some tools, and are skipped.
    fn object_info(&self, object: &Object) -> Result<Option<FileInfo>> {
        let Some(key) = object.key() else {
            return Ok(None);
        };
        if key.ends_with('/') {
            return Ok(None);
        }
        let modified = match object.last_modified() {
            Some(dt) => Self::parse_datetime(dt)?,
            None => OffsetDateTime::UNIX_EPOCH,
        };
        let size = object.size().unwrap_or_default().max(0) as u64;
        Ok(Some(FileInfo::new(self.relative_path(key)?, size, modified)))
    }
}

fn join_key(prefix: Option<&str>, path: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), path),
        None => path.to_string(),
    }
}

fn strip_key<'a>(prefix: Option<&str>, key: &'a str) -> &'a str {
    match prefix {
        Some(prefix) => key.strip_prefix(prefix.trim_end_matches('/')).and_then(|s| s.strip_prefix('/')).unwrap_or(key),
        None => key,
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn children(&self, dir: &Path) -> Result<Vec<Entry>> {
        let key_prefix = format!("{}/", self.full_key(dir)?);
        let mut children = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let _permit = self.acquire_permit().await?;
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(&key_prefix).delimiter("/");
            if let Some(token) = token.take() {
                request = request.continuation_token(token);
            }
            let output = request.send().await.map_err(Self::network)?;
            for object in output.contents() {
                if let Some(info) = self.object_info(object)? {
                    children.push(Entry::File(info));
                }
            }
            for common in output.common_prefixes() {
                if let Some(prefix) = common.prefix() {
                    children.push(Entry::Directory(self.relative_path(prefix.trim_end_matches('/'))?));
                }
            }
            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(children)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) => match err.into_service_error() {
                e if e.is_not_found() => Ok(false),
                e => exn::bail!(Self::network(e)),
            },
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) => match err.into_service_error() {
                e if e.is_no_such_key() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
                e => exn::bail!(Self::network(e)),
            },
        };
        let data = output.body.collect().await.map_err(Self::network)?;
        Ok(data.into_bytes().to_vec())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(Self::network)?;
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) => match err.into_service_error() {
                e if e.is_not_found() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
                e => exn::bail!(Self::network(e)),
            },
        };
        let modified = match output.last_modified() {
            Some(dt) => Self::parse_datetime(dt)?,
            None => OffsetDateTime::UNIX_EPOCH,
        };
        let size = output.content_length().unwrap_or_default().max(0) as u64;
        Ok(FileInfo::new(validate_path(path)?, size, modified))
    }
}
