//! Composite command: query, reduce, report and export

use crate::cli::CompositeArgs;
use crate::config_loader;
use crate::output::OutputWriter;
use crate::output_types::CompositeOutput;
use anyhow::{bail, Context, Result};
use opengeo_core::config::CliConfigOverrides;
use opengeo_engine::{
    AlignmentPolicy, Geometry, Palette, Session, SpatialReducer, TemporalReducer,
};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

pub fn execute(
    args: CompositeArgs,
    config_path: Option<&Path>,
    mut overrides: CliConfigOverrides,
    output: &OutputWriter,
) -> Result<()> {
    overrides.max_items = args.max_items;
    overrides.epsg = args.epsg;
    overrides.resolution = args.resolution;
    overrides.max_pixels = args.max_pixels;
    let config = config_loader::load_config_with_overrides(config_path, overrides)?;
    let session = Session::from_config(&config).context("Failed to set up catalog session")?;

    // Parse everything up front so bad arguments fail before any search
    let reducer: TemporalReducer = args.reducer.parse()?;
    let stats = args.stats.as_deref().map(str::parse::<SpatialReducer>).transpose()?;
    let palette = args.palette.as_deref().map(str::parse::<Palette>).transpose()?;
    let aoi = parse_aoi(&args)?;

    let mut options = session.stack_options();
    if args.strict {
        options = options.with_alignment(AlignmentPolicy::Strict);
    }
    let mut collection = session.image_collection(&args.collection).with_stack_options(options);
    if let (Some(start), Some(end)) = (&args.start, &args.end) {
        collection = collection.filter_date(start, end)?;
    }
    if let Some(aoi) = &aoi {
        collection = collection.filter_bounds(aoi)?;
    }
    if let Some(max_cloud) = args.max_cloud {
        collection = collection.filter([("query", json!({ "eo:cloud_cover": { "lt": max_cloud } }))])?;
    }
    if let Some(bands) = &args.bands {
        collection = collection.select(bands)?;
    }
    tracing::debug!("Running {}", collection);

    let mut image = collection
        .reduce(reducer)
        .with_context(|| format!("Failed to build {} composite of '{}'", reducer, args.collection))?;
    if image.dropped_items() > 0 {
        output.warning(format!("{} items could not be aligned and were skipped", image.dropped_items()));
    }
    if let Some(bands) = &args.normalized_difference {
        image = image.normalized_difference(bands)?;
    }

    let region_stats = match stats {
        Some(stats) => Some(image.reduce_region_capped(stats, aoi.as_ref(), args.scale, config.max_pixels.value)?),
        None => None,
    };

    if let Some(path) = &args.output {
        image
            .to_file(path, args.vmin, args.vmax, palette.as_ref())
            .with_context(|| format!("Failed to export composite to {}", path.display()))?;
    }

    let info = image.get_info();
    if output.is_json() {
        return output.result(CompositeOutput {
            collection: args.collection,
            catalog: session.endpoint().to_string(),
            reducer: reducer.to_string(),
            image: info,
            stats: region_stats,
            output: args.output.map(|p| p.display().to_string()),
        });
    }

    output.section("Composite");
    output.kv("Collection", &args.collection);
    output.kv("Catalog", session.endpoint());
    output.kv("Reducer", reducer);
    output.kv("Bands", info.bands.join(", "));
    output.kv("Shape", format!("{} x {} x {}", info.shape[0], info.shape[1], info.shape[2]));
    if let Some(crs) = &info.crs {
        output.kv("CRS", crs);
    }
    if let Some(region_stats) = &region_stats {
        output.section("Region statistics");
        for (band, value) in region_stats {
            output.kv(band, value.map(|v| format!("{:.6}", v)).unwrap_or_else(|| "no data".to_string()));
        }
    }
    if let Some(path) = &args.output {
        output.success(format!("Wrote {}", path.display()));
    }
    Ok(())
}

/// Area of interest from `--bbox` or `--geometry`
fn parse_aoi(args: &CompositeArgs) -> Result<Option<Geometry>> {
    if let Some(bbox) = &args.bbox {
        let [min_x, min_y, max_x, max_y] = bbox.as_slice() else {
            bail!("--bbox needs exactly four values");
        };
        return Ok(Some(Geometry::rectangle(*min_x, *min_y, *max_x, *max_y)?));
    }
    match &args.geometry {
        Some(geometry) => Ok(Some(parse_geometry(geometry)?)),
        None => Ok(None),
    }
}

/// Parse a GeoJSON geometry string, or read it from a file
fn parse_geometry(input: &str) -> Result<Geometry> {
    let text = if Path::new(input).is_file() {
        fs::read_to_string(input).with_context(|| format!("Failed to read geometry file {}", input))?
    } else {
        input.to_string()
    };
    let value: Value = serde_json::from_str(&text).context("Geometry is not valid JSON")?;
    Ok(Geometry::from_geojson(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_geometry_from_string_and_file() {
        let point = parse_geometry(r#"{"type":"Point","coordinates":[13.4,52.5]}"#).unwrap();
        assert_eq!(point.geometry_type(), "Point");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aoi.geojson");
        fs::write(
            &path,
            r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}"#,
        )
        .unwrap();
        let polygon = parse_geometry(path.to_str().unwrap()).unwrap();
        assert_eq!(polygon.geometry_type(), "Polygon");

        assert!(parse_geometry("not json").is_err());
    }
}
