use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Convert Sass, Less, TypeScript and friends that live in a destination
/// store, publishing the results back to it.
#[derive(Debug, Parser)]
#[command(name = "kiln", version, about)]
pub struct Cli {
    /// Configuration file; defaults to kiln.{toml,yaml,yml,json} in the
    /// working directory.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Log debug output (overrides RUST_LOG).
    #[arg(long, global = true)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert assets and print the output path of each.
    Convert {
        /// Asset paths, relative to the base path.
        #[arg(required = true)]
        assets: Vec<PathBuf>,
        /// Directory in the destination store the assets live in.
        #[arg(short, long)]
        base: PathBuf,
        /// Recompile even if the output looks fresh.
        #[arg(short, long)]
        force: bool,
    },
    /// Report whether an asset would be recompiled.
    Check {
        asset: PathBuf,
        #[arg(short, long)]
        base: PathBuf,
    },
    /// List the enabled parsers.
    Parsers,
    /// Remove expired entries from the SQLite freshness cache.
    Purge,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from(["kiln", "--debug", "convert", "a.scss", "b.less", "--base", "web", "-f"]).unwrap();
        assert!(cli.debug);
        match cli.command {
            Command::Convert { assets, base, force } => {
                assert_eq!(assets, [PathBuf::from("a.scss"), PathBuf::from("b.less")]);
                assert_eq!(base, PathBuf::from("web"));
                assert!(force);
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_convert_requires_assets_and_base() {
        assert!(Cli::try_parse_from(["kiln", "convert", "--base", "web"]).is_err());
        assert!(Cli::try_parse_from(["kiln", "convert", "a.scss"]).is_err());
    }
}
