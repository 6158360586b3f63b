use crate::catalogs::{self, CatalogEndpoint};
use crate::error::{OpengeoError, Result};
use crate::models::DEFAULT_MAX_PIXELS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Provided via CLI argument
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for OpenGeo
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// Catalog alias or root URL
    pub catalog: ConfigValue<String>,
    pub max_items: ConfigValue<usize>,
    pub request_timeout_secs: ConfigValue<u64>,
    pub max_retries: ConfigValue<u32>,
    /// Target CRS for stacking; `None` keeps the first item's native CRS
    pub epsg: ConfigValue<Option<u32>>,
    /// Target resolution for stacking; `None` keeps native resolution
    pub resolution: ConfigValue<Option<f64>>,
    /// Include boundary cells touched by a clip geometry
    pub all_touched: ConfigValue<bool>,
    /// Largest target grid, in pixels, a stack or region reduction may allocate
    pub max_pixels: ConfigValue<u64>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            catalog: ConfigValue::new("ELEMENT84".to_string(), ConfigSource::Default),
            max_items: ConfigValue::new(100, ConfigSource::Default),
            request_timeout_secs: ConfigValue::new(30, ConfigSource::Default),
            max_retries: ConfigValue::new(3, ConfigSource::Default),
            epsg: ConfigValue::new(None, ConfigSource::Default),
            resolution: ConfigValue::new(None, ConfigSource::Default),
            all_touched: ConfigValue::new(true, ConfigSource::Default),
            max_pixels: ConfigValue::new(DEFAULT_MAX_PIXELS, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| OpengeoError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| OpengeoError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(catalog) = file_config.catalog {
            self.catalog.update(catalog, ConfigSource::File);
        }

        if let Some(max_items) = file_config.max_items {
            self.max_items.update(max_items, ConfigSource::File);
        }

        if let Some(timeout) = file_config.request_timeout_secs {
            self.request_timeout_secs.update(timeout, ConfigSource::File);
        }

        if let Some(retries) = file_config.max_retries {
            self.max_retries.update(retries, ConfigSource::File);
        }

        if let Some(epsg) = file_config.epsg {
            self.epsg.update(Some(epsg), ConfigSource::File);
        }

        if let Some(resolution) = file_config.resolution {
            self.resolution.update(Some(resolution), ConfigSource::File);
        }

        if let Some(all_touched) = file_config.all_touched {
            self.all_touched.update(all_touched, ConfigSource::File);
        }

        if let Some(max_pixels) = file_config.max_pixels {
            if max_pixels == 0 {
                return Err(OpengeoError::ConfigInvalid {
                    key: "max_pixels".to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            self.max_pixels.update(max_pixels, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        // OPENGEO_CATALOG
        if let Ok(catalog) = env::var("OPENGEO_CATALOG") {
            if catalog.trim().is_empty() {
                tracing::warn!("Ignoring empty OPENGEO_CATALOG");
            } else {
                self.catalog.update(catalog, ConfigSource::Environment);
            }
        }

        // OPENGEO_MAX_ITEMS
        if let Ok(value) = env::var("OPENGEO_MAX_ITEMS") {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => self.max_items.update(n, ConfigSource::Environment),
                _ => tracing::warn!(
                    "Invalid OPENGEO_MAX_ITEMS value '{}': expected positive integer",
                    value
                ),
            }
        }

        // OPENGEO_TIMEOUT_SECS
        if let Ok(value) = env::var("OPENGEO_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => self.request_timeout_secs.update(secs, ConfigSource::Environment),
                Err(_) => {
                    tracing::warn!("Invalid OPENGEO_TIMEOUT_SECS value '{}': expected seconds", value)
                }
            }
        }

        // OPENGEO_MAX_RETRIES
        if let Ok(value) = env::var("OPENGEO_MAX_RETRIES") {
            match value.parse::<u32>() {
                Ok(n) => self.max_retries.update(n, ConfigSource::Environment),
                Err(_) => {
                    tracing::warn!("Invalid OPENGEO_MAX_RETRIES value '{}': expected integer", value)
                }
            }
        }

        // OPENGEO_EPSG
        if let Ok(value) = env::var("OPENGEO_EPSG") {
            match parse_epsg(&value) {
                Ok(epsg) => self.epsg.update(Some(epsg), ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid OPENGEO_EPSG value '{}': expected EPSG code such as 32633",
                    value
                ),
            }
        }

        // OPENGEO_RESOLUTION
        if let Ok(value) = env::var("OPENGEO_RESOLUTION") {
            match parse_resolution(&value) {
                Ok(res) => self.resolution.update(Some(res), ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid OPENGEO_RESOLUTION value '{}': expected positive number",
                    value
                ),
            }
        }

        // OPENGEO_ALL_TOUCHED
        if let Ok(value) = env::var("OPENGEO_ALL_TOUCHED") {
            match parse_bool(&value) {
                Ok(flag) => self.all_touched.update(flag, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid OPENGEO_ALL_TOUCHED value '{}': expected true or false",
                    value
                ),
            }
        }

        // OPENGEO_MAX_PIXELS
        if let Ok(value) = env::var("OPENGEO_MAX_PIXELS") {
            match value.parse::<u64>() {
                Ok(n) if n > 0 => self.max_pixels.update(n, ConfigSource::Environment),
                _ => tracing::warn!(
                    "Invalid OPENGEO_MAX_PIXELS value '{}': expected positive integer",
                    value
                ),
            }
        }

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        if let Some(catalog) = overrides.catalog {
            self.catalog.update(catalog, ConfigSource::Cli);
        }

        if let Some(max_items) = overrides.max_items {
            self.max_items.update(max_items, ConfigSource::Cli);
        }

        if let Some(epsg) = overrides.epsg {
            self.epsg.update(Some(epsg), ConfigSource::Cli);
        }

        if let Some(resolution) = overrides.resolution {
            self.resolution.update(Some(resolution), ConfigSource::Cli);
        }

        if let Some(all_touched) = overrides.all_touched {
            self.all_touched.update(all_touched, ConfigSource::Cli);
        }

        if let Some(max_pixels) = overrides.max_pixels {
            self.max_pixels.update(max_pixels, ConfigSource::Cli);
        }
    }

    /// Resolve the configured catalog into an endpoint
    pub fn endpoint(&self) -> Result<CatalogEndpoint> {
        catalogs::resolve(&self.catalog.value)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.value)
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert("catalog".to_string(), (self.catalog.value.clone(), self.catalog.source));

        map.insert(
            "max_items".to_string(),
            (self.max_items.value.to_string(), self.max_items.source),
        );

        map.insert(
            "request_timeout_secs".to_string(),
            (self.request_timeout_secs.value.to_string(), self.request_timeout_secs.source),
        );

        map.insert(
            "max_retries".to_string(),
            (self.max_retries.value.to_string(), self.max_retries.source),
        );

        map.insert(
            "epsg".to_string(),
            (
                self.epsg.value.map(|e| format!("EPSG:{}", e)).unwrap_or_else(|| "native".into()),
                self.epsg.source,
            ),
        );

        map.insert(
            "resolution".to_string(),
            (
                self.resolution.value.map(|r| r.to_string()).unwrap_or_else(|| "native".into()),
                self.resolution.source,
            ),
        );

        map.insert(
            "all_touched".to_string(),
            (self.all_touched.value.to_string(), self.all_touched.source),
        );

        map.insert(
            "max_pixels".to_string(),
            (self.max_pixels.value.to_string(), self.max_pixels.source),
        );

        map
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    catalog: Option<String>,
    max_items: Option<usize>,
    request_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    epsg: Option<u32>,
    resolution: Option<f64>,
    all_touched: Option<bool>,
    max_pixels: Option<u64>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub catalog: Option<String>,
    pub max_items: Option<usize>,
    pub epsg: Option<u32>,
    pub resolution: Option<f64>,
    pub all_touched: Option<bool>,
    pub max_pixels: Option<u64>,
}

/// Parse an EPSG code from `"32633"` or `"EPSG:32633"`
pub fn parse_epsg(s: &str) -> Result<u32> {
    let code = s.trim();
    let code = code
        .strip_prefix("EPSG:")
        .or_else(|| code.strip_prefix("epsg:"))
        .unwrap_or(code);
    code.parse::<u32>().map_err(|_| OpengeoError::ConfigInvalid {
        key: "epsg".to_string(),
        reason: format!("Invalid EPSG code: {}", s),
    })
}

/// Parse a positive resolution
pub fn parse_resolution(s: &str) -> Result<f64> {
    match s.trim().parse::<f64>() {
        Ok(res) if res > 0.0 && res.is_finite() => Ok(res),
        _ => Err(OpengeoError::ConfigInvalid {
            key: "resolution".to_string(),
            reason: format!("Invalid resolution: {}. Use a positive number", s),
        }),
    }
}

/// Parse a boolean flag
pub fn parse_bool(s: &str) -> Result<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(OpengeoError::ConfigInvalid {
            key: "all_touched".to_string(),
            reason: format!("Invalid boolean: {}. Use true or false", s),
        }),
    }
}
