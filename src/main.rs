mod cli;
mod setup;

use crate::cli::{Cli, Command};
use crate::setup::report;
use clap::Parser;
use kiln_cache::SqliteCache;
use kiln_config::{CacheBackendConfig, Config};
use kiln_convert::{Converted, Registry};
use std::path::Path;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = Config::load(cli.config.as_deref()).map_err(report)?;
    match cli.command {
        Command::Convert { assets, base, force } => {
            config.force |= force;
            let converter = setup::converter(&config).await?;
            for asset in &assets {
                let converted = converter.convert(asset, &base).await.map_err(report)?;
                if let Converted::Compiled { published: false, .. } = converted {
                    tracing::info!(asset = %asset.display(), "Kept existing output");
                }
                println!("{}", converted.path().display());
            }
        },
        Command::Check { asset, base } => check(&config, &asset, &base).await?,
        Command::Parsers => {
            let registry = Registry::from_config(&config).map_err(report)?;
            if registry.is_empty() {
                println!("No parsers enabled.");
            }
            for (extension, rule) in registry.iter() {
                println!(".{extension} -> .{} ({})", rule.output, rule.converter);
            }
        },
        Command::Purge => match &config.cache.backend {
            CacheBackendConfig::Sqlite { path } => {
                let database = setup::database(path).await?;
                let purged = SqliteCache::from(&database).purge_expired().await.map_err(report)?;
                database.close().await;
                println!("Purged {purged} expired entries from {}", path.display());
            },
            _ => println!("Nothing to purge: the freshness cache is not persistent."),
        },
    }
    Ok(())
}

async fn check(config: &Config, asset: &Path, base: &Path) -> miette::Result<()> {
    let converter = setup::converter(config).await?;
    let Some((_, target)) = converter.resolve(asset, base).map_err(report)? else {
        println!("{}: no parser registered", asset.display());
        return Ok(());
    };
    let state = match converter.needs_recompile(&target.from, &target.to).await.map_err(report)? {
        true => "stale",
        false => "fresh",
    };
    println!("{} -> {}: {state}", target.from.display(), target.to.display());
    Ok(())
}

fn init_tracing(debug: bool) {
    let filter = match debug {
        true => EnvFilter::new("kiln=debug"),
        false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiln=info")),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
