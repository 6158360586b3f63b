//! Spatial reducers for zonal statistics.

use std::fmt;
use std::str::FromStr;

use ndarray::Array3;
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{GeoTransform, GridSpec};

use crate::reduce::median;

/// Reduction over the two spatial axes of each band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialReducer {
    Mean,
    Min,
    Max,
    Sum,
    Count,
    Median,
}

impl SpatialReducer {
    pub fn name(&self) -> &'static str {
        match self {
            SpatialReducer::Mean => "mean",
            SpatialReducer::Min => "min",
            SpatialReducer::Max => "max",
            SpatialReducer::Sum => "sum",
            SpatialReducer::Count => "count",
            SpatialReducer::Median => "median",
        }
    }

    /// Reduce every band of a `(band, y, x)` array in one traversal.
    ///
    /// Non-finite samples are skipped. A band without valid samples yields
    /// `None`, except under `Count` which yields `Some(0.0)`.
    pub fn reduce_bands(&self, data: &Array3<f64>) -> Vec<Option<f64>> {
        let mut accumulators = vec![Accumulator::new(*self == SpatialReducer::Median); data.dim().0];
        for ((band, _, _), &value) in data.indexed_iter() {
            if value.is_finite() {
                accumulators[band].push(value);
            }
        }
        accumulators.into_iter().map(|acc| acc.finish(*self)).collect()
    }
}

#[derive(Debug, Clone)]
struct Accumulator {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    values: Option<Vec<f64>>,
}

impl Accumulator {
    fn new(keep_values: bool) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            values: keep_values.then(Vec::new),
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if let Some(values) = &mut self.values {
            values.push(value);
        }
    }

    fn finish(self, reducer: SpatialReducer) -> Option<f64> {
        if reducer == SpatialReducer::Count {
            return Some(self.count as f64);
        }
        if self.count == 0 {
            return None;
        }
        Some(match reducer {
            SpatialReducer::Mean => self.sum / self.count as f64,
            SpatialReducer::Min => self.min,
            SpatialReducer::Max => self.max,
            SpatialReducer::Sum => self.sum,
            SpatialReducer::Median => median(self.values.unwrap_or_default()),
            SpatialReducer::Count => self.count as f64,
        })
    }
}

/// Nearest-neighbour resample of a `(band, y, x)` array to pixel size
/// `scale`, keeping the grid origin. Targets above `max_pixels` cells are
/// refused before allocation.
pub fn resample(
    data: &Array3<f64>,
    grid: &GridSpec,
    scale: f64,
    max_pixels: u64,
) -> Result<(Array3<f64>, GridSpec)> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(OpengeoError::invalid_argument("scale", format!("must be positive, got {}", scale)));
    }
    let t = &grid.transform;
    let extent = grid.bounds();
    let (cols, rows) = ((extent.width() / scale).ceil(), (extent.height() / scale).ceil());
    check_pixels(cols * rows, max_pixels)?;
    let (width, height) = (cols as usize, rows as usize);
    let target = GridSpec::new(
        grid.crs.clone(),
        GeoTransform::new(t.origin_x, t.origin_y, scale.copysign(t.pixel_width), scale.copysign(t.pixel_height)),
        width,
        height,
    );

    let resampled = Array3::from_shape_fn((data.dim().0, height, width), |(band, row, col)| {
        let (x, y) = target.transform.pixel_center(col, row);
        let (c, r) = t.world_to_pixel(x, y);
        let (c, r) = (c.floor(), r.floor());
        if c < 0.0 || r < 0.0 || c as usize >= grid.width || r as usize >= grid.height {
            f64::NAN
        } else {
            data[[band, r as usize, c as usize]]
        }
    });
    Ok((resampled, target))
}

/// Refuse regions with more than `max_pixels` cells
pub fn check_pixels(pixels: f64, max_pixels: u64) -> Result<()> {
    if !pixels.is_finite() || pixels > max_pixels as f64 {
        return Err(OpengeoError::invalid_argument(
            "max_pixels",
            format!(
                "region has {:.0} pixels, more than the limit of {}; use a coarser scale or a smaller region",
                pixels, max_pixels
            ),
        ));
    }
    Ok(())
}

impl fmt::Display for SpatialReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SpatialReducer {
    type Err = OpengeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(SpatialReducer::Mean),
            "min" => Ok(SpatialReducer::Min),
            "max" => Ok(SpatialReducer::Max),
            "sum" => Ok(SpatialReducer::Sum),
            "count" => Ok(SpatialReducer::Count),
            "median" => Ok(SpatialReducer::Median),
            other => Err(OpengeoError::invalid_argument(
                "reducer",
                format!(
                    "unknown spatial reducer '{}' (expected mean, min, max, sum, count or median)",
                    other
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use opengeo_core::models::Crs;

    #[test]
    fn test_single_pass_per_band() {
        let data = array![[[1.0, 2.0], [3.0, f64::INFINITY]], [[f64::NAN, f64::NAN], [f64::NAN, f64::NAN]]];
        assert_eq!(SpatialReducer::Mean.reduce_bands(&data), vec![Some(2.0), None]);
        assert_eq!(SpatialReducer::Sum.reduce_bands(&data), vec![Some(6.0), None]);
        assert_eq!(SpatialReducer::Count.reduce_bands(&data), vec![Some(3.0), Some(0.0)]);
        assert_eq!(SpatialReducer::Median.reduce_bands(&data), vec![Some(2.0), None]);
        assert_eq!(SpatialReducer::Max.reduce_bands(&data), vec![Some(3.0), None]);
    }

    #[test]
    fn test_resample_coarser() {
        let grid = GridSpec::new(Crs::wgs84(), GeoTransform::new(0.0, 4.0, 1.0, -1.0), 4, 4);
        let data = Array3::from_shape_fn((1, 4, 4), |(_, r, c)| (r * 4 + c) as f64);
        let (coarse, target) = resample(&data, &grid, 2.0, 1_000).unwrap();
        assert_eq!((target.width, target.height), (2, 2));
        assert_eq!(target.transform.pixel_height, -2.0);
        assert_eq!(coarse[[0, 0, 0]], 5.0);
        assert_eq!(coarse[[0, 1, 1]], 15.0);
        assert!(resample(&data, &grid, 0.0, 1_000).is_err());
    }

    #[test]
    fn test_resample_refuses_oversized_target() {
        let grid = GridSpec::new(Crs::wgs84(), GeoTransform::new(0.0, 4.0, 1.0, -1.0), 4, 4);
        let data = Array3::zeros((1, 4, 4));
        // 0.001 scale over a 4x4 extent asks for 16 million cells
        let err = resample(&data, &grid, 0.001, 1_000_000).unwrap_err();
        assert!(matches!(err, OpengeoError::InvalidArgument { ref name, .. } if name == "max_pixels"));
        assert!(resample(&data, &grid, 1.0, 16).is_ok());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("SUM".parse::<SpatialReducer>().unwrap(), SpatialReducer::Sum);
        assert!("mode".parse::<SpatialReducer>().is_err());
    }
}
