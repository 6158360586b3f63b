use chrono::{DateTime, Utc};
use ndarray::Array4;

use crate::error::Result;
use crate::models::{BBox, GridSpec, Item, PixelWindow, RasterHeader, SourceRaster, DEFAULT_MAX_PIXELS};

/// Port for decoding a single asset into a raster
pub trait AssetReader: Send + Sync {
    /// Read the first band of the asset at `href`
    fn read(&self, href: &str) -> Result<SourceRaster>;

    /// Every page of the asset, one band per page. Single-page readers
    /// return the first band only.
    fn read_pages(&self, href: &str) -> Result<Vec<SourceRaster>> {
        Ok(vec![self.read(href)?])
    }

    /// Grid metadata of the asset. Readers that can parse headers without
    /// fetching pixel data should override this.
    fn header(&self, href: &str) -> Result<RasterHeader> {
        Ok(self.read(href)?.header())
    }

    /// Samples of the asset inside `window`. Readers backed by tiled or
    /// range-addressable storage should decode only the overlapping blocks.
    fn read_window(&self, href: &str, window: &PixelWindow) -> Result<SourceRaster> {
        Ok(self.read(href)?.window(window))
    }
}

/// Target of a stacking call
#[derive(Debug, Clone, PartialEq)]
pub struct StackRequest {
    /// WGS84 extent to cover; `None` means the union of the item footprints
    pub bounds: Option<BBox>,
    /// Target CRS; `None` means the native CRS of the first item
    pub epsg: Option<u32>,
    /// Target pixel size in CRS units; `None` means native resolution
    pub resolution: Option<f64>,
    /// Largest target grid in pixels
    pub max_pixels: u64,
}

impl Default for StackRequest {
    fn default() -> Self {
        Self { bounds: None, epsg: None, resolution: None, max_pixels: DEFAULT_MAX_PIXELS }
    }
}

/// Aligned stack produced by a [`RasterStacker`]
#[derive(Debug, Clone)]
pub struct StackOutput {
    /// Samples indexed `[time, band, y, x]`
    pub data: Array4<f64>,
    pub item_ids: Vec<String>,
    pub times: Vec<Option<DateTime<Utc>>>,
    pub bands: Vec<String>,
    pub grid: GridSpec,
    /// Items excluded because their data could not be decoded or reprojected
    pub dropped: usize,
}

/// Port for aligning item assets onto one grid
pub trait RasterStacker: Send + Sync {
    /// Stack `assets` of every item. Items whose rasters cannot be decoded
    /// or reprojected are excluded and counted in [`StackOutput::dropped`];
    /// transport and signing failures are returned as errors.
    fn stack(&self, items: &[Item], assets: &[String], request: &StackRequest)
        -> Result<StackOutput>;
}
