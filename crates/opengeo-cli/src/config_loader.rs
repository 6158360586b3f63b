//! Configuration loading utilities for CLI commands

use anyhow::{Context, Result};
use opengeo_core::config::{CliConfigOverrides, LayeredConfig};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "opengeo.toml";

/// Load defaults, then the config file, then the environment.
///
/// An explicit `path` must exist; the default file is optional.
pub fn load_config(path: Option<&Path>) -> Result<LayeredConfig> {
    let mut config = LayeredConfig::with_defaults();

    let file = match path {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
    };
    if let Some(file) = file {
        config = config
            .load_from_file(&file)
            .with_context(|| format!("Failed to load configuration file {}", file.display()))?;
        tracing::debug!("Loaded configuration from {}", file.display());
    }

    Ok(config.load_from_env())
}

/// Load layered configuration with CLI overrides
pub fn load_config_with_overrides(path: Option<&Path>, overrides: CliConfigOverrides) -> Result<LayeredConfig> {
    let mut config = load_config(path)?;
    config.update_from_cli(overrides);
    Ok(config)
}
