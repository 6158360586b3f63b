//! Temporal reducers collapsing the time axis of a stack.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, Axis, Zip};
use opengeo_core::error::{OpengeoError, Result};

use crate::image::Image;
use crate::stack::RasterStack;

/// Per-pixel rule for [`TemporalReducer::Mosaic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MosaicPolicy {
    /// Highest observed value wins
    #[default]
    Max,
    /// Earliest non-missing observation
    First,
    /// Latest non-missing observation
    Last,
}

/// A reduction over the time axis. Missing (NaN) samples are skipped; a
/// pixel missing at every time step stays missing, except under `Count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalReducer {
    Mean,
    Median,
    Min,
    Max,
    /// Number of non-missing observations
    Count,
    /// The first time step, unchanged
    First,
    Mosaic(MosaicPolicy),
}

impl TemporalReducer {
    pub fn name(&self) -> &'static str {
        match self {
            TemporalReducer::Mean => "mean",
            TemporalReducer::Median => "median",
            TemporalReducer::Min => "min",
            TemporalReducer::Max => "max",
            TemporalReducer::Count => "count",
            TemporalReducer::First => "first",
            TemporalReducer::Mosaic(_) => "mosaic",
        }
    }

    /// Reduce `stack` into an image with the stack's bands and grid
    pub fn apply(&self, stack: &RasterStack) -> Result<Image> {
        if stack.is_empty() {
            return Err(OpengeoError::EmptyResult {
                collection: stack.collection_id().to_string(),
                filters: format!("{} reduction over an empty stack", self.name()),
            });
        }

        let data = stack.data();
        let reduced = match self {
            TemporalReducer::First => data.index_axis(Axis(0), 0).to_owned(),
            _ => {
                let (_, bands, height, width) = data.dim();
                let mut out = Array3::from_elem((bands, height, width), f64::NAN);
                Zip::from(&mut out)
                    .and(data.lanes(Axis(0)))
                    .for_each(|pixel, series| *pixel = self.reduce_series(series.iter().copied()));
                out
            }
        };

        tracing::debug!("Reduced {} time steps with {}", stack.len(), self);
        Image::from_reduction(reduced, stack.bands().to_vec(), stack.grid().clone(), stack.dropped())
    }

    fn reduce_series(&self, series: impl Iterator<Item = f64>) -> f64 {
        let mut valid = series.filter(|v| !v.is_nan());
        match self {
            TemporalReducer::Count => valid.count() as f64,
            TemporalReducer::First | TemporalReducer::Mosaic(MosaicPolicy::First) => {
                valid.next().unwrap_or(f64::NAN)
            }
            TemporalReducer::Mosaic(MosaicPolicy::Last) => valid.last().unwrap_or(f64::NAN),
            TemporalReducer::Min => valid.reduce(f64::min).unwrap_or(f64::NAN),
            TemporalReducer::Max | TemporalReducer::Mosaic(MosaicPolicy::Max) => {
                valid.reduce(f64::max).unwrap_or(f64::NAN)
            }
            TemporalReducer::Mean => {
                let (sum, n) = valid.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if n == 0 {
                    f64::NAN
                } else {
                    sum / n as f64
                }
            }
            TemporalReducer::Median => median(valid.collect()),
        }
    }
}

/// Median of the values; NaN when empty
pub(crate) fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

impl fmt::Display for TemporalReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalReducer::Mosaic(policy) => write!(f, "mosaic({:?})", policy),
            other => write!(f, "{}", other.name()),
        }
    }
}

impl FromStr for TemporalReducer {
    type Err = OpengeoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(TemporalReducer::Mean),
            "median" => Ok(TemporalReducer::Median),
            "min" => Ok(TemporalReducer::Min),
            "max" => Ok(TemporalReducer::Max),
            "count" => Ok(TemporalReducer::Count),
            "first" => Ok(TemporalReducer::First),
            "mosaic" => Ok(TemporalReducer::Mosaic(MosaicPolicy::default())),
            other => Err(OpengeoError::invalid_argument(
                "reducer",
                format!(
                    "unknown temporal reducer '{}' (expected mean, median, min, max, count, first or mosaic)",
                    other
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use opengeo_core::models::{Crs, GeoTransform, GridSpec};

    fn stack(series: &[f64]) -> RasterStack {
        let grid = GridSpec::new(Crs::wgs84(), GeoTransform::new(0.0, 1.0, 1.0, -1.0), 1, 1);
        let data = Array4::from_shape_vec((series.len(), 1, 1, 1), series.to_vec()).unwrap();
        RasterStack::new("c", data, vec![None; series.len()], vec!["b".into()], grid).unwrap()
    }

    fn reduce(reducer: TemporalReducer, series: &[f64]) -> f64 {
        reducer.apply(&stack(series)).unwrap().data()[[0, 0, 0]]
    }

    #[test]
    fn test_nan_skipping() {
        let series = [f64::NAN, 3.0, 1.0, 8.0];
        assert_eq!(reduce(TemporalReducer::Mean, &series), 4.0);
        assert_eq!(reduce(TemporalReducer::Median, &series), 3.0);
        assert_eq!(reduce(TemporalReducer::Min, &series), 1.0);
        assert_eq!(reduce(TemporalReducer::Max, &series), 8.0);
        assert_eq!(reduce(TemporalReducer::Count, &series), 3.0);
        assert!(reduce(TemporalReducer::First, &series).is_nan());
    }

    #[test]
    fn test_mosaic_policies() {
        let series = [f64::NAN, 3.0, 9.0, 1.0, f64::NAN];
        assert_eq!(reduce(TemporalReducer::Mosaic(MosaicPolicy::Max), &series), 9.0);
        assert_eq!(reduce(TemporalReducer::Mosaic(MosaicPolicy::First), &series), 3.0);
        assert_eq!(reduce(TemporalReducer::Mosaic(MosaicPolicy::Last), &series), 1.0);
    }

    #[test]
    fn test_all_missing() {
        let series = [f64::NAN, f64::NAN];
        assert!(reduce(TemporalReducer::Mean, &series).is_nan());
        assert!(reduce(TemporalReducer::Median, &series).is_nan());
        assert_eq!(reduce(TemporalReducer::Count, &series), 0.0);
    }

    #[test]
    fn test_even_median() {
        assert_eq!(reduce(TemporalReducer::Median, &[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Mean".parse::<TemporalReducer>().unwrap(), TemporalReducer::Mean);
        assert_eq!(
            "mosaic".parse::<TemporalReducer>().unwrap(),
            TemporalReducer::Mosaic(MosaicPolicy::Max)
        );
        let err = "average".parse::<TemporalReducer>().unwrap_err();
        assert!(matches!(err, OpengeoError::InvalidArgument { .. }));
        assert!(err.to_string().contains("average"));
    }

    #[test]
    fn test_reduced_image_keeps_labels() {
        let image = TemporalReducer::Max.apply(&stack(&[1.0, 2.0])).unwrap();
        assert_eq!(image.band_names(), vec!["b"]);
        assert!(image.grid().is_some());
    }
}
