//! Catalog registry commands; these never touch the network

use crate::cli::CatalogArgs;
use crate::output::OutputWriter;
use crate::output_types::CatalogRow;
use anyhow::{anyhow, Result};
use opengeo_core::catalogs::{self, CatalogEntry};

fn row(entry: &CatalogEntry) -> CatalogRow {
    CatalogRow {
        alias: entry.alias.to_string(),
        name: entry.name.to_string(),
        access: entry.access.to_string(),
        url: entry.url.to_string(),
    }
}

pub fn list(output: &OutputWriter) -> Result<()> {
    output.table(catalogs::all().iter().map(row).collect())
}

pub fn show(args: CatalogArgs, output: &OutputWriter) -> Result<()> {
    let entry = catalogs::lookup(&args.alias).ok_or_else(|| {
        anyhow!(
            "Unknown catalog alias '{}'. Known aliases: {}",
            args.alias,
            catalogs::all_aliases().join(", ")
        )
    })?;
    let endpoint = catalogs::resolve(entry.alias)?;

    if output.is_json() {
        return output.result(serde_json::json!({
            "catalog": entry,
            "requires_signing": endpoint.requires_signing(),
        }));
    }

    output.section(entry.name);
    output.kv("Alias", entry.alias);
    output.kv("URL", entry.url);
    output.kv("Access", entry.access);
    output.kv("Signed assets", if endpoint.requires_signing() { "yes" } else { "no" });
    output.kv("Description", entry.description);
    Ok(())
}
