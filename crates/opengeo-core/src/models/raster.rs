//! Raster grid primitives shared by the stacker, the asset readers, and
//! the Image operations.

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use super::Crs;
use crate::error::{OpengeoError, Result};

/// Largest grid a single stack or region reduction may allocate
pub const DEFAULT_MAX_PIXELS: u64 = 1_000_000_000;

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Overlap of both boxes, `None` when they are disjoint
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let min_x = self.min_x.max(other.min_x);
        let min_y = self.min_y.max(other.min_y);
        let max_x = self.max_x.min(other.max_x);
        let max_y = self.max_y.min(other.max_y);
        if min_x > max_x || min_y > max_y {
            None
        } else {
            Some(BBox::new(min_x, min_y, max_x, max_y))
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// North-up affine transform from pixel to world coordinates.
///
/// `pixel_height` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self { origin_x, origin_y, pixel_width, pixel_height }
    }

    /// World coordinate of the centre of pixel `(col, row)`
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel position `(col, row)` of a world coordinate
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.origin_x) / self.pixel_width, (y - self.origin_y) / self.pixel_height)
    }

    pub fn resolution(&self) -> f64 {
        self.pixel_width.abs()
    }

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol = self.resolution().min(other.resolution()) * 1e-6;
        (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
            && (self.pixel_width - other.pixel_width).abs() <= tol
            && (self.pixel_height - other.pixel_height).abs() <= tol
    }
}

/// A pixel grid in a coordinate reference system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub crs: Crs,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl GridSpec {
    pub fn new(crs: Crs, transform: GeoTransform, width: usize, height: usize) -> Self {
        Self { crs, transform, width, height }
    }

    /// Grid covering `bounds` at `resolution`, with edges snapped outward to
    /// multiples of the resolution. Always at least one pixel wide and high.
    pub fn from_bounds(bounds: &BBox, resolution: f64, crs: Crs) -> Self {
        let min_x = (bounds.min_x / resolution).floor() * resolution;
        let max_x = (bounds.max_x / resolution).ceil() * resolution;
        let min_y = (bounds.min_y / resolution).floor() * resolution;
        let max_y = (bounds.max_y / resolution).ceil() * resolution;

        let width = (((max_x - min_x) / resolution).round() as usize).max(1);
        let height = (((max_y - min_y) / resolution).round() as usize).max(1);

        Self {
            crs,
            transform: GeoTransform::new(min_x, max_y, resolution, -resolution),
            width,
            height,
        }
    }

    /// Like [`GridSpec::from_bounds`], but refuses grids with more than
    /// `max_pixels` cells before anything is allocated.
    pub fn from_bounds_capped(
        bounds: &BBox,
        resolution: f64,
        crs: Crs,
        max_pixels: u64,
    ) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(OpengeoError::invalid_argument(
                "resolution",
                format!("must be positive, got {}", resolution),
            ));
        }
        let cols = ((bounds.max_x / resolution).ceil() - (bounds.min_x / resolution).floor()).max(1.0);
        let rows = ((bounds.max_y / resolution).ceil() - (bounds.min_y / resolution).floor()).max(1.0);
        let cells = cols * rows;
        if !cells.is_finite() || cells > max_pixels as f64 {
            return Err(OpengeoError::invalid_argument(
                "max_pixels",
                format!(
                    "target grid of {:.0} x {:.0} pixels exceeds the limit of {}; use a coarser resolution or a smaller region",
                    cols, rows, max_pixels
                ),
            ));
        }
        Ok(Self::from_bounds(bounds, resolution, crs))
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// World extent of the grid
    pub fn bounds(&self) -> BBox {
        let t = &self.transform;
        let x0 = t.origin_x;
        let x1 = t.origin_x + self.width as f64 * t.pixel_width;
        let y0 = t.origin_y;
        let y1 = t.origin_y + self.height as f64 * t.pixel_height;
        BBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Same CRS, origin, pixel size, and dimensions (within floating tolerance)
    pub fn aligned_with(&self, other: &GridSpec) -> bool {
        self.crs.epsg == other.crs.epsg
            && self.width == other.width
            && self.height == other.height
            && self.transform.approx_eq(&other.transform)
    }

    /// Sub-window starting at pixel `(col, row)`
    pub fn window(&self, col: usize, row: usize, width: usize, height: usize) -> GridSpec {
        let t = &self.transform;
        GridSpec {
            crs: self.crs.clone(),
            transform: GeoTransform::new(
                t.origin_x + col as f64 * t.pixel_width,
                t.origin_y + row as f64 * t.pixel_height,
                t.pixel_width,
                t.pixel_height,
            ),
            width,
            height,
        }
    }
}

/// Pixel rectangle inside a raster, in `(col, row)` order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col: usize, row: usize, width: usize, height: usize) -> Self {
        Self { col, row, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with a `width x height` raster
    pub fn clamp_to(&self, width: usize, height: usize) -> PixelWindow {
        let col = self.col.min(width);
        let row = self.row.min(height);
        PixelWindow {
            col,
            row,
            width: (self.col + self.width).min(width) - col,
            height: (self.row + self.height).min(height) - row,
        }
    }
}

/// Grid metadata of an asset, available before any samples are decoded
#[derive(Debug, Clone, PartialEq)]
pub struct RasterHeader {
    pub width: usize,
    pub height: usize,
    pub transform: GeoTransform,
    pub crs: Option<Crs>,
    pub nodata: Option<f64>,
}

impl RasterHeader {
    pub fn grid(&self) -> Option<GridSpec> {
        self.crs
            .as_ref()
            .map(|crs| GridSpec::new(crs.clone(), self.transform, self.width, self.height))
    }

    /// Pixels covering `bounds` (in the raster's CRS), snapped outward and
    /// clamped to the raster. `None` when the box misses the raster.
    pub fn window_for(&self, bounds: &BBox) -> Option<PixelWindow> {
        let (c0, r0) = self.transform.world_to_pixel(bounds.min_x, bounds.max_y);
        let (c1, r1) = self.transform.world_to_pixel(bounds.max_x, bounds.min_y);
        let (col_min, col_max) = (c0.min(c1), c0.max(c1));
        let (row_min, row_max) = (r0.min(r1), r0.max(r1));
        if ![col_min, col_max, row_min, row_max].iter().all(|v| v.is_finite()) {
            return None;
        }
        if col_max <= 0.0 || row_max <= 0.0 || col_min >= self.width as f64 || row_min >= self.height as f64 {
            return None;
        }

        let col = col_min.floor().max(0.0) as usize;
        let row = row_min.floor().max(0.0) as usize;
        let end_col = (col_max.ceil() as usize).min(self.width).max(col + 1);
        let end_row = (row_max.ceil() as usize).min(self.height).max(row + 1);
        let window = PixelWindow::new(col, row, end_col - col, end_row - row);
        Some(window.clamp_to(self.width, self.height))
    }
}

/// A decoded single-band asset in its native grid
#[derive(Debug, Clone)]
pub struct SourceRaster {
    /// Samples indexed `[row, col]`
    pub data: Array2<f64>,
    pub transform: GeoTransform,
    pub crs: Option<Crs>,
    pub nodata: Option<f64>,
}

impl SourceRaster {
    pub fn new(data: Array2<f64>, transform: GeoTransform, crs: Option<Crs>) -> Self {
        Self { data, transform, crs, nodata: None }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn grid(&self) -> Option<GridSpec> {
        self.crs
            .as_ref()
            .map(|crs| GridSpec::new(crs.clone(), self.transform, self.width(), self.height()))
    }

    pub fn header(&self) -> RasterHeader {
        RasterHeader {
            width: self.width(),
            height: self.height(),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    /// Copy of the samples inside `window`, with the transform shifted to
    /// the window origin. The window is clamped to the raster first.
    pub fn window(&self, window: &PixelWindow) -> SourceRaster {
        let w = window.clamp_to(self.width(), self.height());
        let t = &self.transform;
        let data = self
            .data
            .slice(s![w.row..w.row + w.height, w.col..w.col + w.width])
            .to_owned();
        SourceRaster {
            data,
            transform: GeoTransform::new(
                t.origin_x + w.col as f64 * t.pixel_width,
                t.origin_y + w.row as f64 * t.pixel_height,
                t.pixel_width,
                t.pixel_height,
            ),
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    /// Nearest-neighbour sample at a world coordinate in the raster's CRS.
    ///
    /// Outside the raster and nodata samples read as NaN.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let (col, row) = self.transform.world_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return f64::NAN;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        if col >= self.width() || row >= self.height() {
            return f64::NAN;
        }
        let value = self.data[[row, col]];
        match self.nodata {
            Some(nd) if value == nd || (nd.is_nan() && value.is_nan()) => f64::NAN,
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    #[test]
    fn test_grid_from_bounds_snaps_outward() {
        let grid = GridSpec::from_bounds(&BBox::new(0.5, 0.2, 9.5, 9.9), 1.0, Crs::wgs84());
        assert_eq!(grid.width, 10);
        assert_eq!(grid.height, 10);
        assert_eq!(grid.transform.origin_x, 0.0);
        assert_eq!(grid.transform.origin_y, 10.0);
        assert_eq!(grid.bounds(), BBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_degenerate_bounds_get_one_pixel() {
        let grid = GridSpec::from_bounds(&BBox::new(5.0, 5.0, 5.0, 5.0), 1.0, Crs::wgs84());
        assert_eq!((grid.width, grid.height), (1, 1));
    }

    #[test]
    fn test_pixel_roundtrip() {
        let t = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let (x, y) = t.pixel_center(2, 3);
        assert_eq!((x, y), (125.0, 165.0));
        let (col, row) = t.world_to_pixel(x, y);
        assert_eq!((col, row), (2.5, 3.5));
    }

    #[test]
    fn test_sample_nodata_and_outside() {
        let raster = SourceRaster::new(
            array![[1.0, 0.0], [3.0, 4.0]],
            GeoTransform::new(0.0, 2.0, 1.0, -1.0),
            Some(Crs::wgs84()),
        )
        .with_nodata(Some(0.0));

        assert_eq!(raster.sample(0.5, 1.5), 1.0);
        assert!(raster.sample(1.5, 1.5).is_nan());
        assert_eq!(raster.sample(1.5, 0.5), 4.0);
        assert!(raster.sample(-0.5, 0.5).is_nan());
        assert!(raster.sample(2.5, 0.5).is_nan());
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BBox::new(0.0, 0.0, 2.0, 2.0);
        assert_eq!(a.intersection(&BBox::new(1.0, 1.0, 3.0, 3.0)), Some(BBox::new(1.0, 1.0, 2.0, 2.0)));
        assert!(a.intersection(&BBox::new(5.0, 5.0, 6.0, 6.0)).is_none());
        assert_eq!(a.union(&BBox::new(-1.0, 1.0, 1.0, 4.0)), BBox::new(-1.0, 0.0, 2.0, 4.0));
    }

    #[test]
    fn test_window_and_alignment() {
        let grid = GridSpec::from_bounds(&BBox::new(0.0, 0.0, 4.0, 4.0), 1.0, Crs::wgs84());
        let window = grid.window(1, 2, 2, 2);
        assert_eq!(window.transform.origin_x, 1.0);
        assert_eq!(window.transform.origin_y, 2.0);
        assert!(grid.aligned_with(&grid.clone()));
        assert!(!grid.aligned_with(&window));
    }

    #[test]
    fn test_capped_grid_rejects_oversized_targets() {
        let bounds = BBox::new(0.0, 0.0, 100_000.0, 100_000.0);
        let err = GridSpec::from_bounds_capped(&bounds, 1.0, Crs::wgs84(), DEFAULT_MAX_PIXELS).unwrap_err();
        assert!(matches!(err, OpengeoError::InvalidArgument { ref name, .. } if name == "max_pixels"));

        let grid = GridSpec::from_bounds_capped(&bounds, 10.0, Crs::wgs84(), DEFAULT_MAX_PIXELS).unwrap();
        assert_eq!(grid.pixel_count(), 100_000_000);

        let tight = GridSpec::from_bounds_capped(&BBox::new(0.0, 0.0, 4.0, 4.0), 1.0, Crs::wgs84(), 16);
        assert!(tight.is_ok());
        let over = GridSpec::from_bounds_capped(&BBox::new(0.0, 0.0, 4.0, 4.0), 1.0, Crs::wgs84(), 15);
        assert!(over.is_err());
    }

    #[test]
    fn test_window_for_bounds() {
        let header = RasterHeader {
            width: 10,
            height: 10,
            transform: GeoTransform::new(0.0, 100.0, 10.0, -10.0),
            crs: Some(Crs::wgs84()),
            nodata: None,
        };

        // x 25..45 spans cols 2..5, y 55..75 spans rows 2..5
        let window = header.window_for(&BBox::new(25.0, 55.0, 45.0, 75.0)).unwrap();
        assert_eq!(window, PixelWindow::new(2, 2, 3, 3));

        let clamped = header.window_for(&BBox::new(-50.0, 90.0, 15.0, 200.0)).unwrap();
        assert_eq!(clamped, PixelWindow::new(0, 0, 2, 1));

        assert!(header.window_for(&BBox::new(200.0, 0.0, 300.0, 50.0)).is_none());
    }

    #[test]
    fn test_source_window_shifts_transform() {
        let raster = SourceRaster::new(
            Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f64),
            GeoTransform::new(0.0, 4.0, 1.0, -1.0),
            Some(Crs::wgs84()),
        );
        let window = raster.window(&PixelWindow::new(1, 2, 2, 5));
        assert_eq!(window.data, array![[9.0, 10.0], [13.0, 14.0]]);
        assert_eq!(window.transform.origin_x, 1.0);
        assert_eq!(window.transform.origin_y, 2.0);
        assert_eq!(window.sample(1.5, 1.5), raster.sample(1.5, 1.5));
    }

    proptest! {
        #[test]
        fn prop_grid_covers_bounds(
            x in -1.0e5f64..1.0e5,
            y in -1.0e5f64..1.0e5,
            w in 0.0f64..5.0e3,
            h in 0.0f64..5.0e3,
            resolution in 0.5f64..100.0,
        ) {
            let bounds = BBox::new(x, y, x + w, y + h);
            let grid = GridSpec::from_bounds(&bounds, resolution, Crs::wgs84());
            let covered = grid.bounds();
            let tol = resolution * 1e-6;
            prop_assert!(covered.min_x <= bounds.min_x + tol);
            prop_assert!(covered.min_y <= bounds.min_y + tol);
            prop_assert!(covered.max_x >= bounds.max_x - tol);
            prop_assert!(covered.max_y >= bounds.max_y - tol);
            prop_assert!(grid.width >= 1 && grid.height >= 1);
        }
    }
}
