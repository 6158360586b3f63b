//! Turning a [`FilterSpec`] into an aligned [`RasterStack`].

use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{Item, ItemExt};
use opengeo_core::ports::{CatalogClient, StackRequest};
use tracing::{debug, info, warn};

use crate::collection::FilterSpec;
use crate::session::{AlignmentPolicy, Session, StackOptions};
use crate::stack::RasterStack;

/// Executes searches and stacking for one session
pub struct Materializer<'a> {
    session: &'a Session,
    options: StackOptions,
}

impl<'a> Materializer<'a> {
    pub fn new(session: &'a Session, options: StackOptions) -> Self {
        Self { session, options }
    }

    fn open(&self) -> Result<Box<dyn CatalogClient>> {
        self.session.connector().open(self.session.endpoint())
    }

    /// Matching items, possibly none
    pub fn search(&self, spec: &FilterSpec, max_items: usize) -> Result<Vec<Item>> {
        let client = self.open()?;
        self.search_with(client.as_ref(), spec, max_items)
    }

    fn search_with(&self, client: &dyn CatalogClient, spec: &FilterSpec, max_items: usize) -> Result<Vec<Item>> {
        let request = spec.to_search_request(max_items)?;
        debug!("Searching {} with {:?}", self.session.endpoint(), request);
        let items = client.search(&request)?;
        info!(
            "Found {} items in {} matching {}",
            items.len(),
            spec.collection_id,
            spec.describe()
        );
        Ok(items)
    }

    /// Search, sign, stack and clip
    pub fn materialize(&self, spec: &FilterSpec, max_items: usize) -> Result<RasterStack> {
        let client = self.open()?;
        let items = self.search_with(client.as_ref(), spec, max_items)?;
        if items.is_empty() {
            return Err(OpengeoError::EmptyResult {
                collection: spec.collection_id.clone(),
                filters: spec.describe(),
            });
        }

        let assets = match &spec.asset_subset {
            Some(subset) => subset.clone(),
            None => default_assets(&items[0]),
        };
        if assets.is_empty() {
            return Err(OpengeoError::invalid_argument(
                "bands",
                format!("items in '{}' carry no assets to stack", spec.collection_id),
            ));
        }

        let items = self.sign(client.as_ref(), items, &assets)?;
        let request = StackRequest {
            bounds: spec.spatial_filter.as_ref().map(|g| g.bbox_wgs84()).transpose()?,
            epsg: self.options.epsg,
            resolution: self.options.resolution,
            max_pixels: self.options.max_pixels,
        };
        let output = self.session.stacker().stack(&items, &assets, &request)?;

        let total = items.len();
        if output.item_ids.is_empty() {
            return Err(OpengeoError::EmptyResult {
                collection: spec.collection_id.clone(),
                filters: format!("{} (none of {} items could be aligned)", spec.describe(), total),
            });
        }
        if output.dropped > 0 {
            match self.options.alignment {
                AlignmentPolicy::Strict => {
                    return Err(OpengeoError::AlignmentFailure {
                        collection: spec.collection_id.clone(),
                        dropped: output.dropped,
                        total,
                    })
                }
                AlignmentPolicy::Lenient => warn!(
                    "{} of {} items in {} could not be aligned and were skipped",
                    output.dropped, total, spec.collection_id
                ),
            }
        }

        let stack = RasterStack::from_output(spec.collection_id.clone(), output);
        match &spec.spatial_filter {
            Some(geometry) => stack.clip(geometry, &self.session.clip_options()),
            None => Ok(stack),
        }
    }

    /// Rewrite the stacked asset hrefs when the endpoint signs its URLs
    fn sign(&self, client: &dyn CatalogClient, mut items: Vec<Item>, assets: &[String]) -> Result<Vec<Item>> {
        if !self.session.endpoint().requires_signing() {
            return Ok(items);
        }
        let signer = client.signer().ok_or_else(|| OpengeoError::SigningRequired {
            url: self.session.endpoint().url.clone(),
        })?;
        for item in &mut items {
            for key in assets {
                if let Some(asset) = item.assets.get_mut(key) {
                    asset.href = signer.sign(&asset.href)?;
                }
            }
        }
        debug!("Signed {} asset kinds across {} items", assets.len(), items.len());
        Ok(items)
    }
}

/// Raster assets of `item`: GeoTIFF media types or the `data` role, falling
/// back to every asset
fn default_assets(item: &Item) -> Vec<String> {
    let rasters: Vec<String> = item
        .assets
        .iter()
        .filter(|(_, asset)| {
            asset.r#type.as_deref().is_some_and(|t| t.contains("tiff"))
                || asset.roles.iter().any(|r| r == "data")
        })
        .map(|(key, _)| key.clone())
        .collect();
    if rasters.is_empty() {
        item.asset_keys()
    } else {
        rasters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;
    use opengeo_core::catalogs::{CatalogEndpoint, SigningMode};
    use opengeo_core::models::{Asset, BBox, Crs, GeoTransform, ItemBuilder, SourceRaster};
    use opengeo_stac::{MemoryAssetReader, MemoryCatalog, MemoryConnector, TokenSigner};
    use std::sync::Arc;

    fn raster(value: f64) -> SourceRaster {
        SourceRaster::new(
            Array2::from_elem((2, 2), value),
            GeoTransform::new(0.0, 2.0, 1.0, -1.0),
            Some(Crs::wgs84()),
        )
    }

    fn fixture() -> (MemoryCatalog, MemoryAssetReader) {
        let catalog = MemoryCatalog::new();
        let reader = MemoryAssetReader::new();
        for day in 1..=2u32 {
            let href = format!("https://data.example.com/scene-{}/red.tif", day);
            let red = Asset {
                r#type: Some("image/tiff; application=geotiff".to_string()),
                ..Asset::new(href.clone())
            };
            catalog.add_item(
                ItemBuilder::new(format!("scene-{}", day))
                    .collection("demo")
                    .bbox(BBox::new(0.0, 0.0, 2.0, 2.0))
                    .datetime(Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap())
                    .asset("red", red)
                    .asset("thumbnail", Asset::new(format!("https://data.example.com/scene-{}/thumb.png", day)))
                    .build(),
            );
            reader.insert(href, raster(day as f64));
        }
        (catalog, reader)
    }

    #[test]
    fn test_default_assets_prefer_rasters() {
        let item = ItemBuilder::new("a")
            .asset("red", Asset { roles: vec!["data".to_string()], ..Asset::new("r.tif") })
            .asset("thumbnail", Asset::new("t.png"))
            .build();
        assert_eq!(default_assets(&item), vec!["red".to_string()]);
        let bare = ItemBuilder::new("b").asset("x", Asset::new("x.jp2")).build();
        assert_eq!(default_assets(&bare), vec!["x".to_string()]);
    }

    #[test]
    fn test_signing_required_without_signer() {
        let (catalog, reader) = fixture();
        let endpoint = CatalogEndpoint::new("https://example.com/stac").with_signing(SigningMode::PlanetaryComputer);
        let session = Session::with_reader(endpoint, Arc::new(MemoryConnector::new(catalog)), Arc::new(reader));
        let result = Materializer::new(&session, StackOptions::default()).materialize(&FilterSpec::new("demo"), 10);
        assert!(matches!(result, Err(OpengeoError::SigningRequired { .. })));
    }

    #[test]
    fn test_signed_hrefs_reach_the_reader() {
        let (catalog, reader) = fixture();
        for day in 1..=2 {
            reader.insert(format!("https://data.example.com/scene-{}/red.tif?sig=abc", day), raster(10.0));
        }
        let endpoint = CatalogEndpoint::new("https://example.com/stac").with_signing(SigningMode::PlanetaryComputer);
        let connector = MemoryConnector::new(catalog).with_signer(Arc::new(TokenSigner::new("sig=abc")));
        let session = Session::with_reader(endpoint, Arc::new(connector), Arc::new(reader.clone()));

        let stack = Materializer::new(&session, StackOptions::default())
            .materialize(&FilterSpec::new("demo"), 10)
            .unwrap();
        assert_eq!(stack.len(), 2);
        assert!(stack.data().iter().all(|v| *v == 10.0));
        let windows = reader.window_reads();
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|(href, _)| href.ends_with("?sig=abc")));
    }

    #[test]
    fn test_stack_cap_comes_from_options() {
        let (catalog, reader) = fixture();
        let session =
            Session::with_reader(CatalogEndpoint::default(), Arc::new(MemoryConnector::new(catalog)), Arc::new(reader));
        let options = StackOptions::default().with_resolution(0.01).with_max_pixels(100);
        let result = Materializer::new(&session, options).materialize(&FilterSpec::new("demo"), 10);
        assert!(matches!(result, Err(OpengeoError::InvalidArgument { ref name, .. }) if name == "max_pixels"));
    }

    #[test]
    fn test_search_may_be_empty() {
        let (catalog, reader) = fixture();
        let session =
            Session::with_reader(CatalogEndpoint::default(), Arc::new(MemoryConnector::new(catalog)), Arc::new(reader));
        let materializer = Materializer::new(&session, StackOptions::default());
        assert!(materializer.search(&FilterSpec::new("other"), 10).unwrap().is_empty());
        assert!(matches!(
            materializer.materialize(&FilterSpec::new("other"), 10),
            Err(OpengeoError::EmptyResult { .. })
        ));
    }
}
