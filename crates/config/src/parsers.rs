//! Parser and command tables.
//!
//! Only extensions listed in the user's `parsers` section are converted.
//! Each of those entries is an override that gets merged, key by key, over
//! the built-in default for the same extension. The `options` bag is merged
//! recursively.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Free-form options handed to a converter.
pub type Options = Map<String, Value>;

/// Effective configuration for one source extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Output file extension, without the leading dot.
    pub output: String,
    /// Identifier of the in-process converter. Ignored for command parsers.
    pub converter: Option<String>,
    #[serde(default)]
    pub options: Options,
    /// Run the external command registered for the extension instead of an
    /// in-process converter.
    #[serde(default)]
    pub as_command: bool,
}

/// User-supplied parser entry. Every field falls back to the default table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOverride {
    pub output: Option<String>,
    pub converter: Option<String>,
    pub options: Options,
    pub as_command: Option<bool>,
}

impl ParserOverride {
    /// Merge this override over an optional default entry.
    ///
    /// Fields set in the override win. Options are merged recursively, with a
    /// `null` in the override removing the key entirely.
    pub fn merge_over(&self, extension: &str, default: Option<&ParserConfig>) -> Result<ParserConfig> {
        let output = self
            .output
            .clone()
            .or_else(|| default.map(|d| d.output.clone()))
            .ok_or_else(|| ErrorKind::MissingOutput(extension.to_string()))?;
        let converter = self.converter.clone().or_else(|| default.and_then(|d| d.converter.clone()));
        let as_command = self.as_command.or(default.map(|d| d.as_command)).unwrap_or(false);
        let mut options = default.map(|d| d.options.clone()).unwrap_or_default();
        merge_options(&mut options, &self.options);
        Ok(ParserConfig {
            output,
            converter,
            options,
            as_command,
        })
    }
}

/// Recursively merge `overlay` into `base`.
///
/// Nested objects merge key by key, anything else in the overlay replaces
/// the base value, and `null` removes the key.
pub fn merge_options(base: &mut Options, overlay: &Options) {
    for (key, value) in overlay {
        if value.is_null() {
            base.remove(key);
            continue;
        }
        if let Value::Object(nested) = value
            && let Some(Value::Object(existing)) = base.get_mut(key)
        {
            merge_options(existing, nested);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Built-in parser defaults, keyed by source extension.
///
/// All defaults run through the command table, so enabling an extension
/// with an empty entry is enough when the matching tool is installed.
pub fn default_parsers() -> BTreeMap<String, ParserConfig> {
    [
        ("less", "css"),
        ("sass", "css"),
        ("scss", "css"),
        ("styl", "css"),
        ("coffee", "js"),
        ("ts", "js"),
    ]
    .into_iter()
    .map(|(extension, output)| {
        let parser = ParserConfig {
            output: output.to_string(),
            converter: None,
            options: Options::new(),
            as_command: true,
        };
        (extension.to_string(), parser)
    })
    .collect()
}

/// Built-in command templates, keyed by source extension.
///
/// `{from}` and `{to}` are replaced by the shell-quoted paths of the staged
/// source and output files.
pub fn default_commands() -> BTreeMap<String, String> {
    [
        ("less", "lessc {from} {to} --no-color --source-map"),
        ("sass", "sass {from} {to} --source-map"),
        ("scss", "sass {from} {to} --source-map"),
        ("styl", "stylus < {from} > {to}"),
        ("coffee", "coffee -p {from} > {to}"),
        ("ts", "tsc --outFile {to} {from}"),
    ]
    .into_iter()
    .map(|(extension, command)| (extension.to_string(), command.to_string()))
    .collect()
}
