//! Configuration for kiln.
//!
//! Settings are layered with [figment]: built-in defaults, then a
//! configuration file (`kiln.toml`, `kiln.yaml`, `kiln.yml` or `kiln.json`
//! in the working directory, or one given explicitly), then `KILN_`
//! environment variables with `__` separating nested keys
//! (`KILN_CACHE__TTL=60`).

pub mod error;
pub mod parsers;

use crate::error::{ErrorKind, Result};
pub use crate::parsers::{Options, ParserConfig, ParserOverride};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FILE_CANDIDATES: [&str; 4] = ["kiln.toml", "kiln.yaml", "kiln.yml", "kiln.json"];
const ENV_PREFIX: &str = "KILN_";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where source assets live and compiled outputs are published.
    pub destination: DestinationConfig,
    /// Local directory under which per-base staging directories are created.
    pub scratch_dir: PathBuf,
    /// Directory, relative to each base path, that receives compiled output.
    pub destination_dir: String,
    /// Recompile even when the output looks fresh.
    pub force: bool,
    pub cache: CacheConfig,
    pub publish: PublishPolicy,
    /// Enabled parsers, merged over [`parsers::default_parsers()`].
    pub parsers: BTreeMap<String, ParserOverride>,
    /// Command templates, merged over [`parsers::default_commands()`].
    pub commands: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: DestinationConfig::default(),
            scratch_dir: default_dir(ProjectDirs::cache_dir, "staging"),
            destination_dir: "compiled".to_string(),
            force: false,
            cache: CacheConfig::default(),
            publish: PublishPolicy::default(),
            parsers: BTreeMap::new(),
            commands: BTreeMap::new(),
        }
    }
}

/// Named destination store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub name: String,
    #[serde(flatten)]
    pub backend: BackendConfig,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            backend: BackendConfig::Local { root: PathBuf::from(".") },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        key_id: Option<String>,
        #[serde(default)]
        key_secret: Option<String>,
    },
}

/// Freshness cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prepended to every cache key.
    pub prefix: String,
    /// Lifetime of a freshness entry, in seconds.
    pub ttl: u64,
    pub backend: CacheBackendConfig,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "assets.".to_string(),
            ttl: 300,
            backend: CacheBackendConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheBackendConfig {
    /// Process-local cache; entries vanish when the process exits.
    Memory,
    /// SQLite database shared between runs.
    Sqlite { path: PathBuf },
    /// Never remember anything.
    None,
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_dir(ProjectDirs::cache_dir, "freshness.sqlite"),
        }
    }
}

/// When a compiled output replaces what the destination already holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishPolicy {
    /// Only publish when the destination has no output yet.
    IfAbsent,
    /// Also replace an output that is older than its source, and always
    /// replace on a forced run.
    #[default]
    IfAbsentOrStale,
}

impl Config {
    /// Load configuration from defaults, an optional file, and the
    /// environment.
    ///
    /// Without an explicit path the first of `kiln.toml`, `kiln.yaml`,
    /// `kiln.yml` and `kiln.json` found in the working directory is used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path)?;
            },
            None => {
                if let Some(found) = FILE_CANDIDATES.iter().map(Path::new).find(|p| p.is_file()) {
                    figment = merge_file(figment, found)?;
                }
            },
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Invalid)?;
        config.validate()?;
        tracing::debug!(destination = %config.destination.name, parsers = config.parsers.len(), "Loaded configuration");
        Ok(config)
    }

    /// Effective parser table: every enabled extension merged over its
    /// default.
    pub fn parsers(&self) -> Result<BTreeMap<String, ParserConfig>> {
        let defaults = parsers::default_parsers();
        self.parsers
            .iter()
            .map(|(extension, over)| -> Result<(String, ParserConfig)> {
                let extension = normalize_extension(extension);
                let merged = over.merge_over(&extension, defaults.get(&extension))?;
                Ok((extension, merged))
            })
            .collect()
    }

    /// Effective command table: configured templates merged over the
    /// defaults.
    pub fn commands(&self) -> BTreeMap<String, String> {
        let mut commands = parsers::default_commands();
        for (extension, command) in &self.commands {
            commands.insert(normalize_extension(extension), command.clone());
        }
        commands
    }

    /// Check that every enabled parser can actually run.
    pub fn validate(&self) -> Result<()> {
        let commands = self.commands();
        for (extension, parser) in self.parsers()? {
            if parser.as_command {
                if !commands.contains_key(&extension) {
                    exn::bail!(ErrorKind::MissingCommand(extension));
                }
            } else if parser.converter.is_none() {
                exn::bail!(ErrorKind::MissingConverter(extension));
            }
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let figment = match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(figment)
}

fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

fn default_dir(base: fn(&ProjectDirs) -> &Path, leaf: &str) -> PathBuf {
    match ProjectDirs::from("", "", "kiln") {
        Some(dirs) => base(&dirs).join(leaf),
        None => std::env::temp_dir().join("kiln").join(leaf),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;
    use std::io::Write;

    fn load_in_jail(file: Option<&str>) -> figment::error::Result<Config> {
        Config::load(file.map(Path::new)).map_err(|e| figment::Error::from(format!("{e:?}")))
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.prefix, "assets.");
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.publish, PublishPolicy::IfAbsentOrStale);
        assert!(config.parsers().unwrap().is_empty());
        assert!(config.scratch_dir.ends_with("staging"));
        config.validate().unwrap();
    }

    #[test]
    fn test_load_toml_from_working_directory() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "kiln.toml",
                r#"
                destination_dir = "build"
                publish = "if-absent"

                [destination]
                name = "assets"
                type = "local"
                root = "/srv/assets"

                [cache]
                ttl = 60
                backend = { type = "memory" }

                [parsers.scss]
                [parsers.txt]
                output = "html"
                converter = "copy"
                "#,
            )?;
            let config = load_in_jail(None)?;
            assert_eq!(config.destination_dir, "build");
            assert_eq!(config.publish, PublishPolicy::IfAbsent);
            assert_eq!(config.destination.name, "assets");
            assert_eq!(config.destination.backend, BackendConfig::Local { root: PathBuf::from("/srv/assets") });
            assert_eq!(config.cache.ttl, 60);
            assert_eq!(config.cache.prefix, "assets.");
            assert_eq!(config.cache.backend, CacheBackendConfig::Memory);

            let parsers = config.parsers().unwrap();
            assert_eq!(parsers.len(), 2);
            assert_eq!(parsers["scss"].output, "css");
            assert!(parsers["scss"].as_command);
            assert_eq!(parsers["txt"].converter.as_deref(), Some("copy"));
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("kiln.yaml", "force: false\ncache:\n  prefix: files.\n")?;
            jail.set_env("KILN_FORCE", "true");
            jail.set_env("KILN_CACHE__TTL", "5");
            let config = load_in_jail(None)?;
            assert!(config.force);
            assert_eq!(config.cache.prefix, "files.");
            assert_eq!(config.cache.ttl, 5);
            Ok(())
        });
    }

    #[test]
    fn test_explicit_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"destination": {{"name": "bucket", "type": "s3", "bucket": "static", "region": "eu-west-1"}}}}"#
        )
        .unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert!(matches!(
            config.destination.backend,
            BackendConfig::S3 { ref bucket, ref region, .. } if bucket == "static" && region.as_deref() == Some("eu-west-1")
        ));
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let err = Config::load(Some(Path::new("/nonexistent/kiln.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[rstest]
    #[case(".ini")]
    #[case(".conf")]
    fn test_unsupported_format(#[case] suffix: &str) {
        let file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn test_command_parser_without_command_is_rejected() {
        let mut config = Config::default();
        config.parsers.insert(
            "md".to_string(),
            ParserOverride {
                output: Some("html".to_string()),
                as_command: Some(true),
                ..Default::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingCommand(ext) if ext == "md"));

        config.commands.insert(".md".to_string(), "pandoc {from} -o {to}".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn test_in_process_parser_without_converter_is_rejected() {
        let mut config = Config::default();
        config.parsers.insert(
            "less".to_string(),
            ParserOverride {
                as_command: Some(false),
                ..Default::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingConverter(ext) if ext == "less"));
    }

    #[test]
    fn test_extensions_are_normalized() {
        let mut config = Config::default();
        config.parsers.insert(".SCSS".to_string(), ParserOverride::default());
        let parsers = config.parsers().unwrap();
        assert!(parsers.contains_key("scss"));
    }
}
