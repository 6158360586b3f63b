//! Show effective configuration

use crate::config_loader;
use crate::output::OutputWriter;
use crate::output_types::ConfigRow;
use anyhow::Result;
use opengeo_core::config::CliConfigOverrides;
use std::path::Path;

pub fn execute(config_path: Option<&Path>, overrides: CliConfigOverrides, output: &OutputWriter) -> Result<()> {
    let config = config_loader::load_config_with_overrides(config_path, overrides)?;

    let mut rows: Vec<ConfigRow> = config
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| ConfigRow { key, value, source: format!("{:?}", source) })
        .collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));

    output.table(rows)?;
    if !output.is_json() {
        match config.endpoint() {
            Ok(endpoint) => output.info(format!("Catalog resolves to {}", endpoint)),
            Err(e) => output.warning(format!("Catalog does not resolve: {}", e)),
        }
    }
    Ok(())
}
