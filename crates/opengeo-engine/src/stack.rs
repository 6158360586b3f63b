//! Aligned `(time, band, y, x)` stacks and the default warping stacker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::{Array2, Array3, Array4, Axis};
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{BBox, Crs, GeoTransform, GridSpec, Item, ItemExt, PixelWindow, RasterHeader, SourceRaster};
use opengeo_core::ports::{AssetReader, RasterStacker, StackOutput, StackRequest};
use opengeo_geo::transform::{transform_bbox, Transformer};
use opengeo_geo::Geometry;
use tracing::{debug, warn};

use crate::clip::{ClipOptions, ClipPlan};

/// Materialized stack. Every time step shares one grid and CRS; the band
/// axis is always named by asset key.
#[derive(Debug, Clone)]
pub struct RasterStack {
    data: Array4<f64>,
    item_ids: Vec<String>,
    times: Vec<Option<DateTime<Utc>>>,
    bands: Vec<String>,
    grid: GridSpec,
    dropped: usize,
    collection_id: String,
}

impl RasterStack {
    /// Build a stack from raw parts, checking that labels match the array shape
    pub fn new(
        collection_id: impl Into<String>,
        data: Array4<f64>,
        times: Vec<Option<DateTime<Utc>>>,
        bands: Vec<String>,
        grid: GridSpec,
    ) -> Result<Self> {
        let collection_id = collection_id.into();
        let shape = data.shape();
        if shape[0] != times.len() || shape[1] != bands.len() {
            return Err(OpengeoError::ShapeMismatch {
                left: format!("array {:?}", shape),
                right: format!("{} times x {} bands", times.len(), bands.len()),
            });
        }
        if shape[2] != grid.height || shape[3] != grid.width {
            return Err(OpengeoError::ShapeMismatch {
                left: format!("array {:?}", shape),
                right: format!("grid {}x{}", grid.height, grid.width),
            });
        }
        let item_ids = (0..times.len()).map(|i| format!("{}-{}", collection_id, i)).collect();
        Ok(Self { data, item_ids, times, bands, grid, dropped: 0, collection_id })
    }

    pub fn from_output(collection_id: impl Into<String>, output: StackOutput) -> Self {
        Self {
            data: output.data,
            item_ids: output.item_ids,
            times: output.times,
            bands: output.bands,
            grid: output.grid,
            dropped: output.dropped,
            collection_id: collection_id.into(),
        }
    }

    pub fn data(&self) -> &Array4<f64> {
        &self.data
    }

    pub fn item_ids(&self) -> &[String] {
        &self.item_ids
    }

    pub fn times(&self) -> &[Option<DateTime<Utc>>] {
        &self.times
    }

    pub fn bands(&self) -> &[String] {
        &self.bands
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Number of time steps
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Items excluded during alignment
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// One time step as a `(band, y, x)` array
    pub fn time_slice(&self, index: usize) -> Option<Array3<f64>> {
        (index < self.len()).then(|| self.data.index_axis(Axis(0), index).to_owned())
    }

    /// Crop to `geometry` and mask cells outside it
    pub fn clip(&self, geometry: &Geometry, options: &ClipOptions) -> Result<RasterStack> {
        let plan = ClipPlan::new(&self.grid, geometry, options)?;
        Ok(Self {
            data: plan.apply4(&self.data),
            grid: plan.grid(&self.grid),
            ..self.clone()
        })
    }
}

/// Default [`RasterStacker`]: reads asset headers first, fixes the target
/// grid, then decodes only the window of each asset that covers it and
/// nearest-neighbour warps it into place.
///
/// Items whose data is broken (undecodable rasters, footprints that do not
/// reproject, a missing band) are dropped and counted. Transport and signing
/// failures abort the whole stack.
pub struct WarpStacker {
    reader: Arc<dyn AssetReader>,
}

/// One requested asset of an item, resolved to its header
struct Band {
    href: String,
    header: RasterHeader,
}

impl WarpStacker {
    pub fn new(reader: Arc<dyn AssetReader>) -> Self {
        Self { reader }
    }

    fn headers(&self, item: &Item, assets: &[String]) -> Result<Vec<Band>> {
        assets
            .iter()
            .map(|key| {
                let asset = item.assets.get(key).ok_or_else(|| OpengeoError::BandNotFound {
                    band: key.clone(),
                    available: item.asset_keys(),
                })?;
                let href = asset.href.to_string();
                let header = self.reader.header(&href)?;
                Ok(Band { href, header })
            })
            .collect()
    }

    fn read_item(&self, item: &Item, bands: &[Band], target: &Crs, grid: &GridSpec) -> Result<Vec<Array2<f64>>> {
        bands
            .iter()
            .map(|band| {
                let crs = source_crs(&band.header, item, target);
                let needed = transform_bbox(&grid.bounds(), &grid.crs, &crs)?;
                match band.header.window_for(&needed) {
                    Some(window) => {
                        let raster = self.reader.read_window(&band.href, &pad(&window, &band.header))?;
                        warp(&raster, &crs, grid)
                    }
                    None => Ok(Array2::from_elem((grid.height, grid.width), f64::NAN)),
                }
            })
            .collect()
    }
}

/// `Ok(None)` for failures confined to `item`, which is then skipped
fn drop_item_local<T>(item: &Item, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_item_local() || matches!(e, OpengeoError::BandNotFound { .. }) => {
            warn!("Dropping item {}: {}", item.id, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Fails when some requested band is carried by none of `items`
fn check_bands(items: &[Item], assets: &[String]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    for key in assets {
        if !items.iter().any(|item| item.assets.contains_key(key)) {
            let mut available: Vec<String> = items.iter().flat_map(ItemExt::asset_keys).collect();
            available.sort();
            available.dedup();
            return Err(OpengeoError::BandNotFound { band: key.clone(), available });
        }
    }
    Ok(())
}

/// One pixel of margin so nearest-neighbour lookups at the window edge
/// still land on decoded samples
fn pad(window: &PixelWindow, header: &RasterHeader) -> PixelWindow {
    let col = window.col.saturating_sub(1);
    let row = window.row.saturating_sub(1);
    PixelWindow::new(col, row, window.col + window.width + 1 - col, window.row + window.height + 1 - row)
        .clamp_to(header.width, header.height)
}

/// CRS an asset's coordinates are in: its own tag, the item's projection
/// extension, or the target CRS as a last resort
fn source_crs(header: &RasterHeader, item: &Item, target: &Crs) -> Crs {
    header.crs.clone().or_else(|| item.native_crs()).unwrap_or_else(|| target.clone())
}

fn raster_extent(header: &RasterHeader, crs: &Crs) -> BBox {
    GridSpec::new(crs.clone(), header.transform, header.width, header.height).bounds()
}

/// Pixel size of an asset expressed in `target` units
fn native_resolution(header: &RasterHeader, crs: &Crs, target: &Crs) -> Result<f64> {
    if crs.epsg == target.epsg {
        return Ok(header.transform.resolution());
    }
    let extent = transform_bbox(&raster_extent(header, crs), crs, target)?;
    Ok(extent.width() / header.width.max(1) as f64)
}

/// Nearest-neighbour resample of `raster` onto `grid`
fn warp(raster: &SourceRaster, crs: &Crs, grid: &GridSpec) -> Result<Array2<f64>> {
    let transformer = Transformer::new(&grid.crs, crs)?;
    Ok(Array2::from_shape_fn((grid.height, grid.width), |(row, col)| {
        let (x, y) = grid.transform.pixel_center(col, row);
        match transformer.convert(x, y) {
            Ok((sx, sy)) => raster.sample(sx, sy),
            Err(_) => f64::NAN,
        }
    }))
}

impl RasterStacker for WarpStacker {
    fn stack(&self, items: &[Item], assets: &[String], request: &StackRequest) -> Result<StackOutput> {
        if assets.is_empty() {
            return Err(OpengeoError::invalid_argument("assets", "no assets to stack"));
        }
        check_bands(items, assets)?;
        let total = items.len();

        let mut planned = Vec::with_capacity(total);
        for item in items {
            if let Some(bands) = drop_item_local(item, self.headers(item, assets))? {
                planned.push((item, bands));
            }
        }

        let target = request
            .epsg
            .map(Crs::from_epsg)
            .or_else(|| planned.first().and_then(|(item, _)| item.native_crs()))
            .or_else(|| planned.first().and_then(|(_, bands)| bands[0].header.crs.clone()))
            .unwrap_or_else(Crs::wgs84);

        let Some((first_item, first_bands)) = planned.first() else {
            return Ok(StackOutput {
                data: Array4::zeros((0, assets.len(), 0, 0)),
                item_ids: Vec::new(),
                times: Vec::new(),
                bands: assets.to_vec(),
                grid: GridSpec::new(target, GeoTransform::new(0.0, 0.0, 1.0, -1.0), 0, 0),
                dropped: total,
            });
        };

        let resolution = match request.resolution {
            Some(resolution) => resolution,
            None => {
                let header = &first_bands[0].header;
                native_resolution(header, &source_crs(header, first_item, &target), &target)?
            }
        };

        let bounds = match request.bounds {
            Some(bounds) => transform_bbox(&bounds, &Crs::wgs84(), &target)?,
            None => {
                let mut union: Option<BBox> = None;
                for (item, bands) in &planned {
                    let extent = match item.footprint() {
                        Some(footprint) => transform_bbox(&footprint, &Crs::wgs84(), &target),
                        None => {
                            let crs = source_crs(&bands[0].header, item, &target);
                            transform_bbox(&raster_extent(&bands[0].header, &crs), &crs, &target)
                        }
                    };
                    match extent {
                        Ok(extent) => union = Some(union.map_or(extent, |u| u.union(&extent))),
                        Err(e) => warn!("Ignoring extent of item {}: {}", item.id, e),
                    }
                }
                union.ok_or_else(|| OpengeoError::InvalidGeometry {
                    reason: format!("no item extent could be projected to {}", target),
                })?
            }
        };

        let grid = GridSpec::from_bounds_capped(&bounds, resolution, target.clone(), request.max_pixels)?;
        debug!(
            "Stacking {} items onto {}x{} grid in {} at {}",
            planned.len(),
            grid.width,
            grid.height,
            grid.crs,
            resolution
        );

        let mut layers = Vec::with_capacity(planned.len());
        for (item, bands) in planned {
            if let Some(warped) = drop_item_local(item, self.read_item(item, &bands, &target, &grid))? {
                layers.push((item, warped));
            }
        }
        layers.sort_by_key(|(item, _)| {
            let acquired = item.acquired();
            (acquired.is_none(), acquired)
        });

        let mut data = Array4::from_elem((layers.len(), assets.len(), grid.height, grid.width), f64::NAN);
        for (t, (_, bands)) in layers.iter().enumerate() {
            for (b, band) in bands.iter().enumerate() {
                data.index_axis_mut(Axis(0), t).index_axis_mut(Axis(0), b).assign(band);
            }
        }

        let dropped = total - layers.len();
        if dropped > 0 {
            warn!("{} of {} items could not be aligned", dropped, total);
        }

        Ok(StackOutput {
            data,
            item_ids: layers.iter().map(|(item, _)| item.id.clone()).collect(),
            times: layers.iter().map(|(item, _)| item.acquired()).collect(),
            bands: assets.to_vec(),
            grid,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;
    use opengeo_core::models::{Asset, ItemBuilder};
    use opengeo_stac::MemoryAssetReader;

    fn raster(values: Array2<f64>) -> SourceRaster {
        SourceRaster::new(values, GeoTransform::new(0.0, 2.0, 1.0, -1.0), Some(Crs::wgs84()))
    }

    fn item(id: &str, day: u32) -> Item {
        ItemBuilder::new(id)
            .collection("test-col")
            .bbox(BBox::new(0.0, 0.0, 2.0, 2.0))
            .datetime(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap())
            .asset("b1", Asset::new(format!("mem://{}", id)))
            .build()
    }

    #[test]
    fn test_stack_orders_by_datetime_and_counts_drops() {
        let reader = MemoryAssetReader::new();
        reader.insert("mem://late", raster(array![[5.0, 6.0], [7.0, 8.0]]));
        reader.insert("mem://early", raster(array![[1.0, 2.0], [3.0, 4.0]]));
        reader.insert_corrupt("mem://broken");

        let stacker = WarpStacker::new(Arc::new(reader));
        let items = vec![item("late", 20), item("early", 2), item("broken", 10)];
        let output = stacker.stack(&items, &["b1".to_string()], &StackRequest::default()).unwrap();

        assert_eq!(output.item_ids, vec!["early", "late"]);
        assert_eq!(output.dropped, 1);
        assert_eq!(output.data.shape(), &[2, 1, 2, 2]);
        assert_eq!(output.data[[0, 0, 1, 1]], 4.0);
        assert_eq!(output.data[[1, 0, 0, 0]], 5.0);
        assert_eq!((output.grid.width, output.grid.height), (2, 2));
    }

    #[test]
    fn test_item_missing_a_band_is_dropped() {
        let reader = MemoryAssetReader::new();
        reader.insert("mem://a", raster(array![[1.0, 1.0], [1.0, 1.0]]));
        let stacker = WarpStacker::new(Arc::new(reader));
        let bare = ItemBuilder::new("bare")
            .collection("test-col")
            .bbox(BBox::new(0.0, 0.0, 2.0, 2.0))
            .asset("thumbnail", Asset::new("mem://thumb"))
            .build();

        let output = stacker.stack(&[item("a", 1), bare], &["b1".to_string()], &StackRequest::default()).unwrap();
        assert_eq!(output.item_ids, vec!["a"]);
        assert_eq!(output.dropped, 1);
    }

    #[test]
    fn test_band_absent_from_every_item() {
        let reader = MemoryAssetReader::new();
        reader.insert("mem://a", raster(array![[1.0, 1.0], [1.0, 1.0]]));
        let stacker = WarpStacker::new(Arc::new(reader.clone()));

        let err = stacker
            .stack(&[item("a", 1), item("b", 2)], &["b2".to_string()], &StackRequest::default())
            .unwrap_err();
        match err {
            OpengeoError::BandNotFound { band, available } => {
                assert_eq!(band, "b2");
                assert_eq!(available, vec!["b1".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(reader.window_reads().is_empty());
    }

    #[test]
    fn test_transport_failure_aborts_stack() {
        let reader = MemoryAssetReader::new();
        reader.insert("mem://a", raster(array![[1.0, 1.0], [1.0, 1.0]]));
        let stacker = WarpStacker::new(Arc::new(reader));

        let result = stacker.stack(&[item("a", 1), item("gone", 2)], &["b1".to_string()], &StackRequest::default());
        assert!(matches!(result, Err(OpengeoError::UpstreamUnavailable { .. })));
    }

    #[test]
    fn test_reads_only_the_covering_window() {
        let reader = MemoryAssetReader::new();
        let values = Array2::from_shape_fn((10, 10), |(row, col)| (row * 10 + col) as f64);
        reader.insert(
            "mem://big",
            SourceRaster::new(values, GeoTransform::new(0.0, 10.0, 1.0, -1.0), Some(Crs::wgs84())),
        );
        let stacker = WarpStacker::new(Arc::new(reader.clone()));
        let big = ItemBuilder::new("big")
            .bbox(BBox::new(0.0, 0.0, 10.0, 10.0))
            .asset("b1", Asset::new("mem://big"))
            .build();

        let request = StackRequest { bounds: Some(BBox::new(2.0, 2.0, 4.0, 4.0)), ..Default::default() };
        let output = stacker.stack(&[big], &["b1".to_string()], &request).unwrap();

        assert_eq!(output.data.shape(), &[1, 1, 2, 2]);
        assert_eq!(output.data[[0, 0, 0, 0]], 62.0);
        assert_eq!(output.data[[0, 0, 1, 1]], 73.0);
        assert!(reader.reads().is_empty());
        assert_eq!(reader.window_reads(), vec![("mem://big".to_string(), PixelWindow::new(1, 5, 4, 4))]);
    }

    #[test]
    fn test_item_outside_target_is_not_read() {
        let reader = MemoryAssetReader::new();
        reader.insert("mem://a", raster(array![[1.0, 2.0], [3.0, 4.0]]));
        let stacker = WarpStacker::new(Arc::new(reader.clone()));

        let request = StackRequest { bounds: Some(BBox::new(20.0, 20.0, 22.0, 22.0)), ..Default::default() };
        let output = stacker.stack(&[item("a", 1)], &["b1".to_string()], &request).unwrap();
        assert_eq!(output.item_ids, vec!["a"]);
        assert!(output.data.iter().all(|v| v.is_nan()));
        assert!(reader.window_reads().is_empty());
    }

    #[test]
    fn test_resolution_override_resamples() {
        let reader = MemoryAssetReader::new();
        reader.insert("mem://a", raster(array![[1.0, 2.0], [3.0, 4.0]]));
        let stacker = WarpStacker::new(Arc::new(reader));

        let request = StackRequest { resolution: Some(0.5), ..Default::default() };
        let output = stacker.stack(&[item("a", 1)], &["b1".to_string()], &request).unwrap();
        assert_eq!(output.data.shape(), &[1, 1, 4, 4]);
        assert_eq!(output.data[[0, 0, 0, 1]], 1.0);
        assert_eq!(output.data[[0, 0, 3, 3]], 4.0);
    }

    #[test]
    fn test_target_grid_is_capped() {
        let reader = MemoryAssetReader::new();
        reader.insert("mem://a", raster(array![[1.0, 2.0], [3.0, 4.0]]));
        let stacker = WarpStacker::new(Arc::new(reader.clone()));

        let request = StackRequest { resolution: Some(0.01), max_pixels: 1_000, ..Default::default() };
        let result = stacker.stack(&[item("a", 1)], &["b1".to_string()], &request);
        assert!(matches!(result, Err(OpengeoError::InvalidArgument { ref name, .. }) if name == "max_pixels"));
        assert!(reader.window_reads().is_empty());
    }

    #[test]
    fn test_clip_stack_crops_grid() {
        let grid = GridSpec::new(Crs::wgs84(), GeoTransform::new(0.0, 2.0, 1.0, -1.0), 2, 2);
        let stack = RasterStack::new(
            "test-col",
            Array4::from_elem((1, 1, 2, 2), 1.0),
            vec![None],
            vec!["b1".to_string()],
            grid,
        )
        .unwrap();

        let clipped = stack.clip(&Geometry::rectangle(0.2, 0.2, 0.8, 0.8).unwrap(), &ClipOptions::default()).unwrap();
        assert_eq!(clipped.data().shape(), &[1, 1, 1, 1]);
        assert_eq!(clipped.grid().transform.origin_y, 1.0);
    }

    #[test]
    fn test_new_checks_labels() {
        let grid = GridSpec::new(Crs::wgs84(), GeoTransform::new(0.0, 2.0, 1.0, -1.0), 2, 2);
        let result = RasterStack::new("c", Array4::zeros((2, 1, 2, 2)), vec![None], vec!["b1".into()], grid);
        assert!(matches!(result, Err(OpengeoError::ShapeMismatch { .. })));
    }
}
