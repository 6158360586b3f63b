//! Command implementations

mod catalogs;
mod composite;
mod config;
mod discover;

use crate::cli::{Cli, Commands};
use crate::config_loader;
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use opengeo_core::config::CliConfigOverrides;
use opengeo_engine::Session;
use std::path::Path;

/// Execute a CLI command
pub fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let overrides = CliConfigOverrides { catalog: cli.catalog.clone(), ..Default::default() };
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Catalogs => catalogs::list(&output),
        Commands::Catalog(args) => catalogs::show(args, &output),
        Commands::Collections => discover::collections(&open_session(config_path, overrides)?, &output),
        Commands::Items(args) => discover::items(args, &open_session(config_path, overrides)?, &output),
        Commands::Assets(args) => discover::assets(args, &open_session(config_path, overrides)?, &output),
        Commands::Item(args) => discover::item(args, &open_session(config_path, overrides)?, &output),
        Commands::Urls(args) => discover::urls(args, &open_session(config_path, overrides)?, &output),
        Commands::Composite(args) => composite::execute(args, config_path, overrides, &output),
        Commands::Config => config::execute(config_path, overrides, &output),
    }
}

/// Session for the configured catalog
fn open_session(config_path: Option<&Path>, overrides: CliConfigOverrides) -> Result<Session> {
    let config = config_loader::load_config_with_overrides(config_path, overrides)?;
    Session::from_config(&config).context("Failed to set up catalog session")
}
