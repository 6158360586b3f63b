//! Clipping rasters to a geometry.
//!
//! Cells fully outside the geometry are cropped away or masked to NaN. With
//! `all_touched` (the default) every cell sharing a non-zero area with the
//! geometry is kept, including partially covered boundary cells. Cells the
//! geometry meets only along an edge or at a corner are not kept.

use ndarray::{Array2, Array3, Array4};
use opengeo_core::error::Result;
use opengeo_core::models::{BBox, GridSpec};
use opengeo_geo::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipOptions {
    /// Keep every cell the geometry overlaps rather than only cells whose
    /// centre it covers
    pub all_touched: bool,
}

impl Default for ClipOptions {
    fn default() -> Self {
        Self { all_touched: true }
    }
}

/// Cells of a grid kept by a clip, and the window that bounds them
#[derive(Debug, Clone)]
pub struct ClipPlan {
    mask: Array2<bool>,
    row: usize,
    col: usize,
    height: usize,
    width: usize,
}

impl ClipPlan {
    /// Rasterize `geometry` onto `grid`. The geometry is reprojected into
    /// the grid CRS first.
    pub fn new(grid: &GridSpec, geometry: &Geometry, options: &ClipOptions) -> Result<Self> {
        let geometry = geometry.to_crs(&grid.crs)?;
        let t = &grid.transform;

        let mask = Array2::from_shape_fn((grid.height, grid.width), |(row, col)| {
            if options.all_touched {
                let x0 = t.origin_x + col as f64 * t.pixel_width;
                let y0 = t.origin_y + row as f64 * t.pixel_height;
                let (x1, y1) = (x0 + t.pixel_width, y0 + t.pixel_height);
                geometry.overlaps_cell(&BBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)))
            } else {
                let (x, y) = t.pixel_center(col, row);
                geometry.covers_point(x, y)
            }
        });

        let rows: Vec<usize> =
            mask.outer_iter().enumerate().filter(|(_, r)| r.iter().any(|&m| m)).map(|(i, _)| i).collect();
        let cols: Vec<usize> = mask
            .columns()
            .into_iter()
            .enumerate()
            .filter(|(_, c)| c.iter().any(|&m| m))
            .map(|(i, _)| i)
            .collect();

        let plan = match (rows.first(), rows.last(), cols.first(), cols.last()) {
            (Some(&r0), Some(&r1), Some(&c0), Some(&c1)) => {
                Self { mask, row: r0, col: c0, height: r1 - r0 + 1, width: c1 - c0 + 1 }
            }
            _ => Self { mask, row: 0, col: 0, height: 0, width: 0 },
        };
        tracing::debug!(
            "Clip window rows {}..{} cols {}..{}",
            plan.row,
            plan.row + plan.height,
            plan.col,
            plan.col + plan.width
        );
        Ok(plan)
    }

    /// Nothing of the grid is kept
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// Grid of the cropped window
    pub fn grid(&self, grid: &GridSpec) -> GridSpec {
        grid.window(self.col, self.row, self.width, self.height)
    }

    fn keeps(&self, row: usize, col: usize) -> bool {
        self.mask[[self.row + row, self.col + col]]
    }

    /// Crop and mask a `(band, y, x)` array
    pub fn apply3(&self, data: &Array3<f64>) -> Array3<f64> {
        Array3::from_shape_fn((data.len_of(ndarray::Axis(0)), self.height, self.width), |(b, r, c)| {
            if self.keeps(r, c) {
                data[[b, self.row + r, self.col + c]]
            } else {
                f64::NAN
            }
        })
    }

    /// Crop and mask a `(time, band, y, x)` array
    pub fn apply4(&self, data: &Array4<f64>) -> Array4<f64> {
        let (times, bands) = (data.len_of(ndarray::Axis(0)), data.len_of(ndarray::Axis(1)));
        Array4::from_shape_fn((times, bands, self.height, self.width), |(t, b, r, c)| {
            if self.keeps(r, c) {
                data[[t, b, self.row + r, self.col + c]]
            } else {
                f64::NAN
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opengeo_core::models::{Crs, GeoTransform};

    fn grid() -> GridSpec {
        GridSpec::new(Crs::wgs84(), GeoTransform::new(0.0, 4.0, 1.0, -1.0), 4, 4)
    }

    #[test]
    fn test_all_touched_keeps_partial_cells() {
        let triangle = Geometry::polygon(vec![(0.2, 0.2), (2.6, 0.2), (0.2, 2.6)]).unwrap();

        let touched = ClipPlan::new(&grid(), &triangle, &ClipOptions::default()).unwrap();
        let centres = ClipPlan::new(&grid(), &triangle, &ClipOptions { all_touched: false }).unwrap();

        let count = |plan: &ClipPlan| plan.mask.iter().filter(|&&m| m).count();
        assert_eq!(count(&centres), 3);
        assert_eq!(count(&touched), 6);
        assert_eq!((touched.height, touched.width), (3, 3));
        assert_eq!(touched.grid(&grid()).transform.origin_y, 3.0);
    }

    #[test]
    fn test_masking_and_crop() {
        let data = Array3::from_shape_fn((1, 4, 4), |(_, r, c)| (r * 4 + c) as f64);
        let square = Geometry::rectangle(1.2, 1.2, 2.8, 2.8).unwrap();
        let plan = ClipPlan::new(&grid(), &square, &ClipOptions::default()).unwrap();

        let clipped = plan.apply3(&data);
        assert_eq!(clipped.shape(), &[1, 2, 2]);
        assert_eq!(clipped[[0, 0, 0]], 5.0);
        assert_eq!(clipped[[0, 1, 1]], 10.0);
    }

    #[test]
    fn test_cell_sized_region_keeps_one_cell() {
        let cell = Geometry::rectangle(1.0, 1.0, 2.0, 2.0).unwrap();
        let plan = ClipPlan::new(&grid(), &cell, &ClipOptions::default()).unwrap();

        assert_eq!(plan.mask.iter().filter(|&&m| m).count(), 1);
        assert_eq!((plan.height, plan.width), (1, 1));
        let window = plan.grid(&grid());
        assert_eq!((window.transform.origin_x, window.transform.origin_y), (1.0, 2.0));

        let data = Array3::from_shape_fn((1, 4, 4), |(_, r, c)| (r * 4 + c) as f64);
        assert_eq!(plan.apply3(&data)[[0, 0, 0]], 9.0);
    }

    #[test]
    fn test_region_touching_grid_edge_is_empty() {
        let east = Geometry::rectangle(4.0, 0.0, 5.0, 4.0).unwrap();
        assert!(ClipPlan::new(&grid(), &east, &ClipOptions::default()).unwrap().is_empty());

        let corner = Geometry::rectangle(-1.0, -1.0, 0.0, 0.0).unwrap();
        assert!(ClipPlan::new(&grid(), &corner, &ClipOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_outside_geometry_is_empty() {
        let far = Geometry::rectangle(50.0, 50.0, 51.0, 51.0).unwrap();
        let plan = ClipPlan::new(&grid(), &far, &ClipOptions::default()).unwrap();
        assert!(plan.is_empty());

        let data = Array4::<f64>::zeros((2, 1, 4, 4));
        assert_eq!(plan.apply4(&data).shape(), &[2, 1, 0, 0]);
    }
}
