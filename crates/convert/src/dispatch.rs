//! Converter selection and invocation.
//!
//! A [`Registry`] is built once from the effective parser table and maps a
//! source extension to a [`Rule`]. Each rule either runs an in-process
//! [`Transform`] or an external [`CommandTemplate`]; nothing is looked up
//! by name after construction.

use crate::error::{ErrorKind, Result};
use crate::staging::Staging;
use crate::target::Target;
use exn::ResultExt;
use kiln_config::{Config, Options, ParserConfig};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

/// An in-process, single-file converter.
///
/// Transforms run on a blocking thread, so they are free to use synchronous
/// IO and CPU-heavy work.
pub trait Transform: Send + Sync {
    /// Identifier that parser configuration refers to.
    fn name(&self) -> &str;

    /// Read `input` and write the converted result to `output`.
    ///
    /// Both paths point into the staging directory and the output's parent
    /// directory already exists.
    fn transform(&self, input: &Path, output: &Path, options: &Options) -> Result<()>;
}

/// Copies the source unchanged, registered as `copy`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyTransform;

impl Transform for CopyTransform {
    fn name(&self) -> &str {
        "copy"
    }

    fn transform(&self, input: &Path, output: &Path, _options: &Options) -> Result<()> {
        std::fs::copy(input, output).or_raise(|| ErrorKind::Conversion)?;
        Ok(())
    }
}

/// Shell command with `{from}` and `{to}` placeholders.
///
/// Commands run through `sh -c` inside the staging directory, so
/// redirections work and relative imports resolve against the mirrored
/// tree. Placeholders are replaced by single-quoted paths relative to that
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    template: String,
}

// Words that `sh` handles itself rather than looking up on `PATH`.
const SHELL_BUILTINS: &[&str] = &[
    ".", "[", "case", "cd", "command", "eval", "exec", "export", "for", "if", "set", "source", "test", "until", "while",
];

impl CommandTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if template.trim().is_empty() {
            exn::bail!(ErrorKind::Config);
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// The program the command starts with, skipping leading environment
    /// assignments (`NODE_ENV=production tsc ...`).
    ///
    /// `None` when the command opens with shell syntax or a builtin
    /// (`cd sub && lessc ...`, `(lessc ...)`). Those commands aren't checked
    /// against `PATH` before running; a missing program then shows up as
    /// the shell's own non-zero exit.
    pub fn program(&self) -> Option<&str> {
        let word = self.template.split_whitespace().find(|word| !word.contains('='))?;
        let shell = word.starts_with(['(', '{', '!']) || SHELL_BUILTINS.contains(&word);
        (!shell).then_some(word)
    }

    /// The command line with placeholders substituted.
    pub fn render(&self, from: &Path, to: &Path) -> String {
        self.template.replace("{from}", &quote(from)).replace("{to}", &quote(to))
    }

    /// Run the command in `cwd`.
    ///
    /// Fails if the program isn't on `PATH` or the command exits with a
    /// non-zero status; in the latter case the error carries the exit code
    /// and whatever was written to stderr.
    pub async fn run(&self, cwd: &Path, from: &Path, to: &Path) -> Result<()> {
        if let Some(program) = self.program() {
            which::which_in(program, std::env::var_os("PATH"), cwd)
                .or_raise(|| ErrorKind::ProgramNotFound(program.to_string()))?;
        }
        let command = self.render(from, to);
        tracing::trace!(%command, cwd = %cwd.display(), "Running conversion command");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .or_raise(|| ErrorKind::Conversion)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            exn::bail!(ErrorKind::CommandFailed {
                command,
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        tracing::debug!(%command, stdout = %stdout.trim(), stderr = %stderr.trim(), "Conversion command finished");
        Ok(())
    }
}

/// Single-quote a path for `sh`.
fn quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// How a rule produces its output.
#[derive(Clone)]
pub enum Converter {
    SingleFile(Arc<dyn Transform>),
    External(CommandTemplate),
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleFile(transform) => f.debug_tuple("SingleFile").field(&transform.name()).finish(),
            Self::External(command) => f.debug_tuple("External").field(&command.as_str()).finish(),
        }
    }
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleFile(transform) => write!(f, "transform `{}`", transform.name()),
            Self::External(command) => write!(f, "command `{}`", command.as_str()),
        }
    }
}

/// Effective handling for one source extension.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Output extension, without the leading dot.
    pub output: String,
    pub options: Options,
    pub converter: Converter,
}

impl Rule {
    /// Produce the staged output for `target` from its staged source.
    pub async fn dispatch(&self, staging: &Staging, target: &Target) -> Result<()> {
        match &self.converter {
            Converter::External(command) => command.run(staging.dir(), &target.asset, &target.output).await,
            Converter::SingleFile(transform) => {
                let transform = Arc::clone(transform);
                let input = staging.path(&target.asset);
                let output = staging.path(&target.output);
                let options = self.options.clone();
                tokio::task::spawn_blocking(move || transform.transform(&input, &output, &options))
                    .await
                    .or_raise(|| ErrorKind::Conversion)?
                    .or_raise(|| ErrorKind::Conversion)
            },
        }
    }
}

/// Extension-to-rule table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    rules: BTreeMap<String, Rule>,
}

impl Registry {
    /// Start a registry with the built-in transforms available.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default().transform(Arc::new(CopyTransform))
    }

    /// Build a registry from configuration using only built-in transforms.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::builder().build(config)
    }

    /// Add or replace the rule for `extension`.
    pub fn insert(&mut self, extension: impl AsRef<str>, rule: Rule) {
        self.rules.insert(normalize(extension.as_ref()), rule);
    }

    /// Rule for a source extension (case-insensitive, leading dot optional).
    pub fn get(&self, extension: &str) -> Option<&Rule> {
        self.rules.get(&normalize(extension))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(extension, rule)| (extension.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Collects the transforms a registry may refer to.
#[derive(Default)]
pub struct RegistryBuilder {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl RegistryBuilder {
    /// Make a transform available under its [`name`](Transform::name).
    pub fn transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transforms.insert(transform.name().to_string(), transform);
        self
    }

    /// Resolve the effective parser and command tables of `config`.
    pub fn build(self, config: &Config) -> Result<Registry> {
        let parsers = config.parsers().or_raise(|| ErrorKind::Config)?;
        self.build_from(parsers, &config.commands())
    }

    /// Resolve already merged parser entries against a command table.
    pub fn build_from(
        self,
        parsers: impl IntoIterator<Item = (String, ParserConfig)>,
        commands: &BTreeMap<String, String>,
    ) -> Result<Registry> {
        let mut registry = Registry::default();
        for (extension, parser) in parsers {
            let extension = normalize(&extension);
            if parser.output.trim_matches('.').is_empty() {
                exn::bail!(ErrorKind::Config);
            }
            let converter = match parser.as_command {
                true => {
                    let Some(command) = commands.get(&extension) else {
                        exn::bail!(ErrorKind::Config);
                    };
                    Converter::External(CommandTemplate::new(command.as_str())?)
                },
                false => {
                    let Some(name) = parser.converter.as_deref() else {
                        exn::bail!(ErrorKind::Config);
                    };
                    let Some(transform) = self.transforms.get(name) else {
                        exn::bail!(ErrorKind::UnknownConverter(name.to_string()));
                    };
                    Converter::SingleFile(Arc::clone(transform))
                },
            };
            tracing::trace!(%extension, output = %parser.output, %converter, "Registered parser");
            registry.rules.insert(
                extension,
                Rule {
                    output: parser.output.trim_start_matches('.').to_string(),
                    options: parser.options,
                    converter,
                },
            );
        }
        Ok(registry)
    }
}

fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::ParserOverride;
    use rstest::rstest;
    use std::ops::Deref;
    use std::path::PathBuf;

    struct Upper;

    impl Transform for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn transform(&self, input: &Path, output: &Path, options: &Options) -> Result<()> {
            let source = std::fs::read_to_string(input).or_raise(|| ErrorKind::Conversion)?;
            let suffix = options.get("suffix").and_then(|v| v.as_str()).unwrap_or_default();
            std::fs::write(output, format!("{}{suffix}", source.to_uppercase())).or_raise(|| ErrorKind::Conversion)
        }
    }

    fn parser(output: &str, converter: Option<&str>, as_command: bool) -> ParserConfig {
        ParserConfig {
            output: output.to_string(),
            converter: converter.map(str::to_string),
            options: Options::new(),
            as_command,
        }
    }

    #[rstest]
    #[case("a.scss", "out/a.css", "sass 'a.scss' 'out/a.css'")]
    #[case("it's.scss", "a.css", r"sass 'it'\''s.scss' 'a.css'")]
    #[case("with space.scss", "a b.css", "sass 'with space.scss' 'a b.css'")]
    fn test_render_quotes_paths(#[case] from: &str, #[case] to: &str, #[case] expected: &str) {
        let command = CommandTemplate::new("sass {from} {to}").unwrap();
        assert_eq!(command.render(Path::new(from), Path::new(to)), expected);
    }

    #[rstest]
    #[case("lessc {from} {to}", Some("lessc"))]
    #[case("NODE_ENV=production tsc --outFile {to} {from}", Some("tsc"))]
    #[case("stylus < {from} > {to}", Some("stylus"))]
    #[case("cd styles && lessc {from} {to}", None)]
    #[case("(lessc {from} {to})", None)]
    #[case("{ lessc {from}; } > {to}", None)]
    #[case("X=1 exec lessc {from} {to}", None)]
    fn test_program(#[case] template: &str, #[case] expected: Option<&str>) {
        assert_eq!(CommandTemplate::new(template).unwrap().program(), expected);
    }

    #[test]
    fn test_empty_template_rejected() {
        let err = CommandTemplate::new("   ").unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Config));
    }

    #[test]
    fn test_build_from_config() {
        let mut config = Config::default();
        config.parsers.insert("scss".to_string(), ParserOverride::default());
        config.parsers.insert(
            "TXT".to_string(),
            ParserOverride {
                output: Some("html".to_string()),
                converter: Some("copy".to_string()),
                ..Default::default()
            },
        );
        let registry = Registry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 2);

        let scss = registry.get("scss").unwrap();
        assert_eq!(scss.output, "css");
        assert!(matches!(&scss.converter, Converter::External(c) if c.program() == Some("sass")));

        let txt = registry.get(".txt").unwrap();
        assert!(matches!(&txt.converter, Converter::SingleFile(t) if t.name() == "copy"));
        assert!(registry.get("less").is_none());
    }

    #[test]
    fn test_custom_transform() {
        let parsers = [("up".to_string(), parser("txt", Some("upper"), false))];
        let registry =
            Registry::builder().transform(Arc::new(Upper)).build_from(parsers, &BTreeMap::new()).unwrap();
        assert_eq!(registry.get("up").unwrap().converter.to_string(), "transform `upper`");
    }

    #[test]
    fn test_unknown_converter_rejected() {
        let parsers = [("less".to_string(), parser("css", Some("less"), false))];
        let err = Registry::builder().build_from(parsers, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::UnknownConverter(name) if name == "less"));
    }

    #[rstest]
    #[case::missing_command(parser("css", None, true))]
    #[case::missing_converter(parser("css", None, false))]
    #[case::empty_output(parser("", Some("copy"), false))]
    fn test_invalid_parser_rejected(#[case] parser: ParserConfig) {
        let parsers = [("less".to_string(), parser)];
        let err = Registry::builder().build_from(parsers, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Config));
    }

    async fn staged(files: &[(&str, &str)]) -> (tempfile::TempDir, Staging, Target) {
        let files: Vec<(String, Vec<u8>)> =
            files.iter().map(|(p, c)| (format!("web/{p}"), c.as_bytes().to_vec())).collect();
        let backend = kiln_storage::backend::MockBackend::with_files(files);
        let scratch = tempfile::tempdir().unwrap();
        let staging = Staging::acquire(scratch.path(), &backend, Path::new("web")).await.unwrap();
        let target = Target::resolve(Path::new("styles/a.up"), Path::new("web"), "compiled", "txt").unwrap();
        staging.prepare_output(&target.output).await.unwrap();
        (scratch, staging, target)
    }

    #[tokio::test]
    async fn test_dispatch_single_file() {
        let (_scratch, staging, target) = staged(&[("styles/a.up", "body")]).await;
        let mut options = Options::new();
        options.insert("suffix".to_string(), "!".into());
        let rule = Rule {
            output: "txt".to_string(),
            options,
            converter: Converter::SingleFile(Arc::new(Upper)),
        };
        rule.dispatch(&staging, &target).await.unwrap();
        assert_eq!(std::fs::read_to_string(staging.path(&target.output)).unwrap(), "BODY!");
    }

    #[tokio::test]
    async fn test_dispatch_single_file_error_is_conversion() {
        let (_scratch, staging, target) = staged(&[("styles/other.up", "body")]).await;
        let rule = Rule {
            output: "txt".to_string(),
            options: Options::new(),
            converter: Converter::SingleFile(Arc::new(CopyTransform)),
        };
        let err = rule.dispatch(&staging, &target).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Conversion));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dispatch_command_runs_in_staging() {
        let (_scratch, staging, target) = staged(&[("styles/a.up", "body"), ("styles/_inc.up", "import")]).await;
        let rule = Rule {
            output: "txt".to_string(),
            options: Options::new(),
            converter: Converter::External(CommandTemplate::new("cat {from} styles/_inc.up > {to}").unwrap()),
        };
        rule.dispatch(&staging, &target).await.unwrap();
        assert_eq!(std::fs::read_to_string(staging.path(&target.output)).unwrap(), "bodyimport");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_starting_with_builtin_runs() {
        let (_scratch, staging, target) = staged(&[("styles/a.up", "body")]).await;
        let command = CommandTemplate::new("cd styles && cd .. && cat {from} > {to}").unwrap();
        command.run(staging.dir(), &target.asset, &target.output).await.unwrap();
        assert_eq!(std::fs::read_to_string(staging.path(&target.output)).unwrap(), "body");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_carries_exit_code_and_stderr() {
        let (_scratch, staging, target) = staged(&[("styles/a.up", "body")]).await;
        let command = CommandTemplate::new("echo broken >&2; exit 3").unwrap();
        let err = command.run(staging.dir(), &target.asset, &target.output).await.unwrap_err();
        match err.deref() {
            ErrorKind::CommandFailed { code, stderr, .. } => {
                assert_eq!(*code, Some(3));
                assert_eq!(stderr, "broken");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let command = CommandTemplate::new("kiln-definitely-not-installed {from} {to}").unwrap();
        let cwd = tempfile::tempdir().unwrap();
        let err = command.run(cwd.path(), &PathBuf::from("a"), &PathBuf::from("b")).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::ProgramNotFound(p) if p == "kiln-definitely-not-installed"));
    }
}
