//! Integration tests for layered configuration
//!
//! Precedence: CLI arguments > Environment variables > Config file > Defaults

use opengeo_core::catalogs::SigningMode;
use opengeo_core::config::{CliConfigOverrides, ConfigSource, LayeredConfig};
use serial_test::serial;
use std::env;
use std::fs;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

const ENV_VARS: &[&str] = &[
    "OPENGEO_CATALOG",
    "OPENGEO_MAX_ITEMS",
    "OPENGEO_TIMEOUT_SECS",
    "OPENGEO_MAX_RETRIES",
    "OPENGEO_EPSG",
    "OPENGEO_RESOLUTION",
    "OPENGEO_ALL_TOUCHED",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_file_overrides_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
catalog = "MICROSOFT"
max_retries = 5
request_timeout_secs = 10
"#
    )
    .unwrap();

    let config = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap();

    assert_eq!(config.catalog.value, "MICROSOFT");
    assert_eq!(config.catalog.source, ConfigSource::File);
    assert_eq!(config.max_retries.value, 5);
    assert_eq!(config.request_timeout().as_secs(), 10);

    let endpoint = config.endpoint().unwrap();
    assert_eq!(endpoint.signing, SigningMode::PlanetaryComputer);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    env::set_var("OPENGEO_CATALOG", "https://stac.example.com/v1");
    env::set_var("OPENGEO_EPSG", "EPSG:32633");
    env::set_var("OPENGEO_ALL_TOUCHED", "false");

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "catalog = \"ELEMENT84\"\nepsg = 4326\nmax_items = 7").unwrap();

    let config = LayeredConfig::with_defaults()
        .load_from_file(file.path())
        .unwrap()
        .load_from_env();

    assert_eq!(config.catalog.value, "https://stac.example.com/v1");
    assert_eq!(config.catalog.source, ConfigSource::Environment);
    assert_eq!(config.epsg.value, Some(32633));
    assert_eq!(config.epsg.source, ConfigSource::Environment);
    assert!(!config.all_touched.value);
    // Untouched by the environment
    assert_eq!(config.max_items.value, 7);
    assert_eq!(config.max_items.source, ConfigSource::File);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_environment_values_are_ignored() {
    clear_env();
    env::set_var("OPENGEO_MAX_ITEMS", "0");
    env::set_var("OPENGEO_RESOLUTION", "fine");
    env::set_var("OPENGEO_ALL_TOUCHED", "sometimes");

    let config = LayeredConfig::with_defaults().load_from_env();

    assert_eq!(config.max_items.value, 100);
    assert_eq!(config.max_items.source, ConfigSource::Default);
    assert_eq!(config.resolution.value, None);
    assert!(config.all_touched.value);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_all() {
    clear_env();
    env::set_var("OPENGEO_CATALOG", "MICROSOFT");
    env::set_var("OPENGEO_RESOLUTION", "30");

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("opengeo.toml");
    fs::write(&config_path, "catalog = \"ELEMENT84\"\nresolution = 60.0\n").unwrap();

    let mut config = LayeredConfig::with_defaults()
        .load_from_file(&config_path)
        .unwrap()
        .load_from_env();

    assert_eq!(config.resolution.value, Some(30.0));

    config.update_from_cli(CliConfigOverrides {
        catalog: Some("USGS".to_string()),
        resolution: Some(10.0),
        ..Default::default()
    });

    assert_eq!(config.catalog.value, "USGS");
    assert_eq!(config.catalog.source, ConfigSource::Cli);
    assert_eq!(config.resolution.value, Some(10.0));
    assert_eq!(config.resolution.source, ConfigSource::Cli);

    let map = config.to_inspection_map();
    assert_eq!(map["resolution"], ("10".to_string(), ConfigSource::Cli));
    assert_eq!(map["max_items"].1, ConfigSource::Default);

    clear_env();
}

#[test]
fn test_unknown_catalog_fails_resolution() {
    let mut config = LayeredConfig::with_defaults();
    config.update_from_cli(CliConfigOverrides {
        catalog: Some("NOT_A_CATALOG".to_string()),
        ..Default::default()
    });
    assert!(config.endpoint().is_err());
}

#[test]
fn test_missing_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let non_existent = temp_dir.path().join("does_not_exist.toml");

    let result = LayeredConfig::with_defaults().load_from_file(&non_existent);

    assert!(result.is_err());
}
