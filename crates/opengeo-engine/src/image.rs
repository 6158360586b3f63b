//! Reduced rasters and their band algebra.
//!
//! Every operation returns a new [`Image`]; the underlying array is never
//! modified in place.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{concatenate, Array3, Axis};
use opengeo_core::config::LayeredConfig;
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{GeoTransform, GridSpec, SourceRaster, DEFAULT_MAX_PIXELS};
use opengeo_core::ports::AssetReader;
use opengeo_geo::Geometry;
use opengeo_stac::{geotiff, GeoTiffReader};
use serde::Serialize;

use crate::clip::{ClipOptions, ClipPlan};
use crate::export;
use crate::palette::Palette;
use crate::region::{check_pixels, resample, SpatialReducer};
use crate::stack::RasterStack;

/// Key reported by [`Image::reduce_region`] for bandless images
pub const CONSTANT_KEY: &str = "constant";

/// Where an image comes from. Each kind is validated when the image is built.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A stack with exactly one time step
    Stack(RasterStack),
    /// A `(band, y, x)` array; `bands: None` requires a single band
    Array { data: Array3<f64>, bands: Option<Vec<String>>, grid: Option<GridSpec> },
    /// The same value at every pixel
    Constant(f64),
    /// A local GeoTIFF
    Path(PathBuf),
    /// A remote GeoTIFF / COG, read through an [`AssetReader`]
    Url(String),
}

/// Right-hand side of an arithmetic operation
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Image(&'a Image),
    Scalar(f64),
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

impl<'a> From<&'a Image> for Operand<'a> {
    fn from(image: &'a Image) -> Self {
        Operand::Image(image)
    }
}

/// Read-only introspection snapshot returned by [`Image::get_info`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub bands: Vec<String>,
    pub dtype: &'static str,
    /// `[bands, height, width]`
    pub shape: [usize; 3],
    pub crs: Option<String>,
    pub transform: Option<GeoTransform>,
    pub dropped_items: usize,
}

/// A `(band, y, x)` raster with optional band names and georeferencing.
///
/// `bands: None` marks a bandless image (for example the result of
/// arithmetic between two differently named single-band images). `grid:
/// None` marks an image without georeferencing, such as a constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: Array3<f64>,
    bands: Option<Vec<String>>,
    grid: Option<GridSpec>,
    dropped_items: usize,
}

impl Image {
    /// Build an image from `source`. Remote sources are read with a
    /// [`GeoTiffReader`] configured from defaults and `OPENGEO_*`
    /// environment variables; use [`Image::from_source_with`] or
    /// `Session::image` to supply a configured reader instead.
    pub fn from_source(source: ImageSource) -> Result<Self> {
        match source {
            ImageSource::Url(url) => {
                let config = LayeredConfig::with_defaults().load_from_env();
                let reader = GeoTiffReader::from_config(&config)?;
                Self::from_source_with(ImageSource::Url(url), &reader)
            }
            other => Self::from_local(other),
        }
    }

    /// Build an image, reading remote sources through `reader`
    pub fn from_source_with(source: ImageSource, reader: &dyn AssetReader) -> Result<Self> {
        match source {
            ImageSource::Url(url) => Self::from_rasters(reader.read_pages(&url)?, &url),
            other => Self::from_local(other),
        }
    }

    fn from_local(source: ImageSource) -> Result<Self> {
        match source {
            ImageSource::Stack(stack) => {
                if stack.len() != 1 {
                    return Err(OpengeoError::invalid_argument(
                        "source",
                        format!("stack has {} time steps; reduce it to one first", stack.len()),
                    ));
                }
                let data = stack.data().index_axis(Axis(0), 0).to_owned();
                Self::from_reduction(data, stack.bands().to_vec(), stack.grid().clone(), stack.dropped())
            }
            ImageSource::Array { data, bands, grid } => Self::build(data, bands, grid, 0),
            ImageSource::Constant(value) => Ok(Self::constant(value)),
            ImageSource::Path(path) => {
                let href = path.display().to_string();
                Self::from_rasters(geotiff::read_path(&path)?, &href)
            }
            ImageSource::Url(url) => Err(OpengeoError::invalid_argument(
                "source",
                format!("{} needs an asset reader", url),
            )),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self { data: Array3::from_elem((1, 1, 1), value), bands: None, grid: None, dropped_items: 0 }
    }

    /// Image produced by reducing a stack
    pub(crate) fn from_reduction(
        data: Array3<f64>,
        bands: Vec<String>,
        grid: GridSpec,
        dropped_items: usize,
    ) -> Result<Self> {
        Self::build(data, Some(bands), Some(grid), dropped_items)
    }

    fn build(
        data: Array3<f64>,
        bands: Option<Vec<String>>,
        grid: Option<GridSpec>,
        dropped_items: usize,
    ) -> Result<Self> {
        let (count, height, width) = data.dim();
        match &bands {
            Some(names) => {
                if names.len() != count {
                    return Err(OpengeoError::ShapeMismatch {
                        left: format!("{} band names", names.len()),
                        right: format!("{} bands in array", count),
                    });
                }
                validate_names(names)?;
            }
            None if count != 1 => {
                return Err(OpengeoError::invalid_argument(
                    "bands",
                    format!("a bandless image has one band, array has {}", count),
                ))
            }
            None => {}
        }
        if let Some(grid) = &grid {
            if (grid.height, grid.width) != (height, width) {
                return Err(OpengeoError::ShapeMismatch {
                    left: format!("array {}x{}", height, width),
                    right: format!("grid {}x{}", grid.height, grid.width),
                });
            }
        }
        Ok(Self { data, bands, grid, dropped_items })
    }

    /// Image from decoded GeoTIFF pages, one band per page named `b1..bn`
    fn from_rasters(pages: Vec<SourceRaster>, href: &str) -> Result<Self> {
        let first = pages.first().ok_or_else(|| OpengeoError::RasterIo {
            href: href.to_string(),
            reason: "file contains no images".to_string(),
        })?;
        let grid = first.grid().ok_or_else(|| OpengeoError::RasterIo {
            href: href.to_string(),
            reason: "file carries no CRS".to_string(),
        })?;
        if pages.iter().any(|p| p.data.dim() != first.data.dim() || p.transform != first.transform) {
            return Err(OpengeoError::RasterIo {
                href: href.to_string(),
                reason: "pages do not share one grid".to_string(),
            });
        }

        let views: Vec<_> = pages.iter().map(|p| p.data.view().insert_axis(Axis(0))).collect();
        let data = concatenate(Axis(0), &views).map_err(|e| OpengeoError::RasterIo {
            href: href.to_string(),
            reason: e.to_string(),
        })?;
        let bands = (1..=pages.len()).map(|i| format!("b{}", i)).collect();
        Self::build(data, Some(bands), Some(grid), 0)
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn grid(&self) -> Option<&GridSpec> {
        self.grid.as_ref()
    }

    pub fn bands(&self) -> Option<&[String]> {
        self.bands.as_deref()
    }

    /// Band names; empty for a bandless image
    pub fn band_names(&self) -> Vec<String> {
        self.bands.clone().unwrap_or_default()
    }

    pub fn band_count(&self) -> usize {
        self.data.dim().0
    }

    /// Items excluded while stacking the source collection
    pub fn dropped_items(&self) -> usize {
        self.dropped_items
    }

    /// Single value without bands or georeferencing
    pub fn is_constant(&self) -> bool {
        self.bands.is_none() && self.grid.is_none() && self.data.dim() == (1, 1, 1)
    }

    fn describe(&self) -> String {
        let (_, height, width) = self.data.dim();
        let bands = match &self.bands {
            Some(names) => format!("[{}]", names.join(", ")),
            None => "bandless".to_string(),
        };
        match &self.grid {
            Some(grid) => format!("{} {}x{} on {}", bands, height, width, grid.crs),
            None => format!("{} {}x{}", bands, height, width),
        }
    }

    fn with_data(&self, data: Array3<f64>, bands: Option<Vec<String>>) -> Self {
        Self { data, bands, grid: self.grid.clone(), dropped_items: self.dropped_items }
    }

    /// Restrict to the named bands, in the order given
    pub fn select<S: AsRef<str>>(&self, bands: &[S]) -> Result<Image> {
        if bands.is_empty() {
            return Err(OpengeoError::invalid_argument("bands", "select needs at least one band name"));
        }
        let available = self.band_names();
        let mut names = Vec::with_capacity(bands.len());
        let mut indices = Vec::with_capacity(bands.len());
        for band in bands {
            let band = band.as_ref();
            let index = available.iter().position(|b| b == band).ok_or_else(|| {
                OpengeoError::BandNotFound { band: band.to_string(), available: available.clone() }
            })?;
            names.push(band.to_string());
            indices.push(index);
        }
        validate_names(&names)?;
        Ok(self.with_data(self.data.select(Axis(0), &indices), Some(names)))
    }

    /// Replace band names. A bandless image accepts exactly one name.
    pub fn rename<S: AsRef<str>>(&self, names: &[S]) -> Result<Image> {
        if names.len() != self.band_count() {
            return Err(OpengeoError::invalid_argument(
                "names",
                format!("expected {} names, got {}", self.band_count(), names.len()),
            ));
        }
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        validate_names(&names)?;
        Ok(self.with_data(self.data.clone(), Some(names)))
    }

    pub fn add<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Image> {
        self.binary(other.into(), |a, b| a + b)
    }

    pub fn subtract<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Image> {
        self.binary(other.into(), |a, b| a - b)
    }

    pub fn multiply<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Image> {
        self.binary(other.into(), |a, b| a * b)
    }

    /// Division follows IEEE semantics: dividing by zero yields an infinite
    /// or NaN pixel, never an error
    pub fn divide<'a>(&self, other: impl Into<Operand<'a>>) -> Result<Image> {
        self.binary(other.into(), |a, b| a / b)
    }

    fn check_aligned(&self, other: &Image) -> Result<()> {
        let mismatch = || OpengeoError::ShapeMismatch { left: self.describe(), right: other.describe() };
        if let (Some(a), Some(b)) = (&self.grid, &other.grid) {
            if !a.aligned_with(b) {
                return Err(mismatch());
            }
        }
        let (_, ha, wa) = self.data.dim();
        let (_, hb, wb) = other.data.dim();
        if (ha, wa) != (hb, wb) {
            return Err(mismatch());
        }
        Ok(())
    }

    /// Elementwise combination.
    ///
    /// Two single-band operands combine regardless of band names. Otherwise
    /// band lists must match, or one side has a single band that broadcasts
    /// across the other's bands. Constants broadcast everywhere.
    fn binary(&self, other: Operand<'_>, f: impl Fn(f64, f64) -> f64) -> Result<Image> {
        let other = match other {
            Operand::Scalar(value) => {
                return Ok(self.with_data(self.data.mapv(|v| f(v, value)), self.bands.clone()));
            }
            Operand::Image(other) if other.is_constant() => {
                let value = other.data[[0, 0, 0]];
                return Ok(self.with_data(self.data.mapv(|v| f(v, value)), self.bands.clone()));
            }
            Operand::Image(other) if self.is_constant() => {
                let value = self.data[[0, 0, 0]];
                return Ok(other.with_data(other.data.mapv(|v| f(value, v)), other.bands.clone()));
            }
            Operand::Image(other) => other,
        };

        self.check_aligned(other)?;
        let (na, nb) = (self.band_count(), other.band_count());
        let bands = if na == 1 && nb == 1 {
            match (&self.bands, &other.bands) {
                (Some(a), Some(b)) if a == b => Some(a.clone()),
                (Some(a), None) => Some(a.clone()),
                (None, Some(b)) => Some(b.clone()),
                _ => None,
            }
        } else if na == nb && self.bands == other.bands {
            self.bands.clone()
        } else if nb == 1 {
            self.bands.clone()
        } else if na == 1 {
            other.bands.clone()
        } else {
            return Err(OpengeoError::ShapeMismatch { left: self.describe(), right: other.describe() });
        };

        let (_, height, width) = self.data.dim();
        let data = Array3::from_shape_fn((na.max(nb), height, width), |(b, r, c)| {
            f(self.data[[b.min(na - 1), r, c]], other.data[[b.min(nb - 1), r, c]])
        });
        Ok(Image {
            data,
            bands,
            grid: self.grid.clone().or_else(|| other.grid.clone()),
            dropped_items: self.dropped_items.max(other.dropped_items),
        })
    }

    /// `(a - b) / (a + b)` of two named bands, as band `nd`
    pub fn normalized_difference<S: AsRef<str>>(&self, bands: &[S]) -> Result<Image> {
        let [a, b] = bands else {
            return Err(OpengeoError::invalid_argument(
                "bands",
                format!("normalized_difference needs exactly two band names, got {}", bands.len()),
            ));
        };
        let a = self.select(&[a.as_ref()])?;
        let b = self.select(&[b.as_ref()])?;
        a.subtract(&b)?.divide(&a.add(&b)?)?.rename(&["nd"])
    }

    /// 1 where a pixel holds a finite value, 0 where it is missing
    pub fn mask(&self) -> Image {
        self.with_data(self.data.mapv(|v| if v.is_finite() { 1.0 } else { 0.0 }), self.bands.clone())
    }

    /// Mark pixels missing wherever `mask` is zero or missing. A single-band
    /// mask applies to every band.
    pub fn update_mask(&self, mask: &Image) -> Result<Image> {
        let masked = |v: f64, m: f64| if m.is_finite() && m != 0.0 { v } else { f64::NAN };
        if mask.is_constant() {
            let m = mask.data[[0, 0, 0]];
            return Ok(self.with_data(self.data.mapv(|v| masked(v, m)), self.bands.clone()));
        }

        self.check_aligned(mask)?;
        let nm = mask.band_count();
        if nm != 1 && nm != self.band_count() {
            return Err(OpengeoError::ShapeMismatch { left: self.describe(), right: mask.describe() });
        }
        let data = Array3::from_shape_fn(self.data.dim(), |(b, r, c)| {
            masked(self.data[[b, r, c]], mask.data[[b.min(nm - 1), r, c]])
        });
        Ok(self.with_data(data, self.bands.clone()))
    }

    /// Append the bands of `other`, which must share this image's grid
    pub fn add_bands(&self, other: &Image) -> Result<Image> {
        let (Some(ours), Some(theirs)) = (&self.bands, &other.bands) else {
            return Err(OpengeoError::invalid_argument("bands", "rename bandless images before add_bands"));
        };
        self.check_aligned(other)?;
        let names: Vec<String> = ours.iter().chain(theirs).cloned().collect();
        validate_names(&names)?;

        let data = concatenate(Axis(0), &[self.data.view(), other.data.view()]).map_err(|e| {
            OpengeoError::ShapeMismatch { left: self.describe(), right: format!("{} ({})", other.describe(), e) }
        })?;
        Ok(Image {
            data,
            bands: Some(names),
            grid: self.grid.clone().or_else(|| other.grid.clone()),
            dropped_items: self.dropped_items.max(other.dropped_items),
        })
    }

    /// Crop to `geometry`, keeping every cell it touches
    pub fn clip(&self, geometry: &Geometry) -> Result<Image> {
        self.clip_with(geometry, &ClipOptions::default())
    }

    pub fn clip_with(&self, geometry: &Geometry, options: &ClipOptions) -> Result<Image> {
        let grid = self.grid.as_ref().ok_or_else(|| {
            OpengeoError::invalid_argument("geometry", "cannot clip an image without georeferencing")
        })?;
        let plan = ClipPlan::new(grid, geometry, options)?;
        Ok(Image {
            data: plan.apply3(&self.data),
            bands: self.bands.clone(),
            grid: Some(plan.grid(grid)),
            dropped_items: self.dropped_items,
        })
    }

    /// Zonal statistic per band, computed in a single pass over all bands.
    ///
    /// `geometry` clips first (all-touched); `scale` resamples to that pixel
    /// size before reducing. Bands without valid pixels map to `None`.
    /// Regions are limited to [`DEFAULT_MAX_PIXELS`] cells.
    pub fn reduce_region(
        &self,
        reducer: SpatialReducer,
        geometry: Option<&Geometry>,
        scale: Option<f64>,
    ) -> Result<BTreeMap<String, Option<f64>>> {
        self.reduce_region_capped(reducer, geometry, scale, DEFAULT_MAX_PIXELS)
    }

    /// [`Image::reduce_region`] with an explicit pixel limit
    pub fn reduce_region_capped(
        &self,
        reducer: SpatialReducer,
        geometry: Option<&Geometry>,
        scale: Option<f64>,
        max_pixels: u64,
    ) -> Result<BTreeMap<String, Option<f64>>> {
        let mut region = match (geometry, &self.grid) {
            (Some(geometry), Some(_)) => self.clip(geometry)?,
            (Some(_), None) if !self.is_constant() => {
                return Err(OpengeoError::invalid_argument(
                    "geometry",
                    "cannot reduce a region of an image without georeferencing",
                ))
            }
            _ => self.clone(),
        };
        if let Some(scale) = scale {
            if let Some(grid) = region.grid.clone() {
                let (data, grid) = resample(&region.data, &grid, scale, max_pixels)?;
                region = Image { data, grid: Some(grid), ..region };
            }
        }
        let (_, height, width) = region.data.dim();
        check_pixels(height as f64 * width as f64, max_pixels)?;

        let values = reducer.reduce_bands(&region.data);
        let keys = match &self.bands {
            Some(names) => names.clone(),
            None => vec![CONSTANT_KEY.to_string()],
        };
        tracing::debug!("reduce_region {} over {}", reducer, region.describe());
        Ok(keys.into_iter().zip(values).collect())
    }

    /// Write to `path`: GeoTIFF for `.tif` / `.tiff`, a colour-mapped render
    /// otherwise
    pub fn to_file(
        &self,
        path: impl AsRef<Path>,
        vmin: Option<f64>,
        vmax: Option<f64>,
        palette: Option<&Palette>,
    ) -> Result<()> {
        export::write(path.as_ref(), &self.data, self.grid.as_ref(), vmin, vmax, palette)
    }

    pub fn get_info(&self) -> ImageInfo {
        let (bands, height, width) = self.data.dim();
        ImageInfo {
            type_: "Image",
            bands: self.band_names(),
            dtype: "float64",
            shape: [bands, height, width],
            crs: self.grid.as_ref().map(|g| g.crs.to_string()),
            transform: self.grid.as_ref().map(|g| g.transform),
            dropped_items: self.dropped_items,
        }
    }
}

fn validate_names(names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(OpengeoError::invalid_argument("bands", "band names must not be empty"));
        }
        if !seen.insert(name.as_str()) {
            return Err(OpengeoError::invalid_argument("bands", format!("duplicate band name '{}'", name)));
        }
    }
    Ok(())
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({})", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use opengeo_core::models::Crs;

    fn grid(width: usize, height: usize) -> GridSpec {
        GridSpec::new(Crs::wgs84(), GeoTransform::new(0.0, height as f64, 1.0, -1.0), width, height)
    }

    fn image(data: Array3<f64>, bands: &[&str]) -> Image {
        let (_, h, w) = data.dim();
        Image::from_source(ImageSource::Array {
            data,
            bands: Some(bands.iter().map(|b| b.to_string()).collect()),
            grid: Some(grid(w, h)),
        })
        .unwrap()
    }

    #[test]
    fn test_select_unknown_band() {
        let img = image(array![[[1.0]], [[2.0]]], &["red", "nir"]);
        let err = img.select(&["swir"]).unwrap_err();
        assert!(matches!(err, OpengeoError::BandNotFound { ref band, .. } if band == "swir"));
        assert_eq!(img.select(&["nir", "red"]).unwrap().data()[[0, 0, 0]], 2.0);
    }

    #[test]
    fn test_single_band_arithmetic_ignores_names() {
        let img = image(array![[[4.0, 9.0]], [[2.0, 3.0]]], &["a", "b"]);
        let a = img.select(&["a"]).unwrap();
        let b = img.select(&["b"]).unwrap();
        let product = a.multiply(&b).unwrap();
        assert!(product.bands().is_none());
        assert_eq!(product.data(), &array![[[8.0, 27.0]]]);
        assert_eq!(a.subtract(&a).unwrap().band_names(), vec!["a"]);
    }

    #[test]
    fn test_broadcast_and_mismatch() {
        let img = image(array![[[1.0]], [[2.0]], [[3.0]]], &["r", "g", "b"]);
        let scaled = img.multiply(&img.select(&["g"]).unwrap()).unwrap();
        assert_eq!(scaled.data(), &array![[[2.0]], [[4.0]], [[6.0]]]);
        assert_eq!(scaled.band_names(), vec!["r", "g", "b"]);

        let two = img.select(&["r", "g"]).unwrap();
        assert!(matches!(img.add(&two), Err(OpengeoError::ShapeMismatch { .. })));

        let other_grid = Image::from_source(ImageSource::Array {
            data: array![[[1.0]]],
            bands: None,
            grid: Some(GridSpec::new(Crs::wgs84(), GeoTransform::new(5.0, 1.0, 1.0, -1.0), 1, 1)),
        })
        .unwrap();
        assert!(matches!(img.add(&other_grid), Err(OpengeoError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_scalar_and_constant_operands() {
        let img = image(array![[[1.0, 2.0]]], &["x"]);
        assert_eq!(img.add(1.0).unwrap().data(), &array![[[2.0, 3.0]]]);
        let constant = Image::constant(10.0);
        assert_eq!(constant.subtract(&img).unwrap().data(), &array![[[9.0, 8.0]]]);
        assert_eq!(constant.subtract(&img).unwrap().band_names(), vec!["x"]);
    }

    #[test]
    fn test_divide_by_zero_is_not_an_error() {
        let img = image(array![[[1.0, 0.0]]], &["x"]);
        let ratio = img.divide(0.0).unwrap();
        assert!(ratio.data()[[0, 0, 0]].is_infinite());
        assert!(ratio.data()[[0, 0, 1]].is_nan());
    }

    #[test]
    fn test_normalized_difference_arity() {
        let img = image(array![[[0.8, 0.2]], [[0.2, 0.2]]], &["nir", "red"]);
        let nd = img.normalized_difference(&["nir", "red"]).unwrap();
        assert_eq!(nd.band_names(), vec!["nd"]);
        assert!((nd.data()[[0, 0, 0]] - 0.6).abs() < 1e-12);
        assert_eq!(nd.data()[[0, 0, 1]], 0.0);

        let err = img.normalized_difference(&["nir"]).unwrap_err();
        assert!(matches!(err, OpengeoError::InvalidArgument { .. }));
    }

    #[test]
    fn test_mask_and_update_mask() {
        let img = image(array![[[1.0, f64::NAN, 3.0]], [[4.0, 5.0, 6.0]]], &["a", "b"]);
        let mask = img.select(&["a"]).unwrap().mask();
        assert_eq!(mask.data(), &array![[[1.0, 0.0, 1.0]]]);

        let masked = img.update_mask(&mask).unwrap();
        assert!(masked.data()[[1, 0, 1]].is_nan());
        assert_eq!(masked.data()[[1, 0, 2]], 6.0);
        assert_eq!(masked.band_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_rename_and_add_bands() {
        let img = image(array![[[1.0]]], &["a"]);
        let renamed = img.rename(&["z"]).unwrap();
        let both = img.add_bands(&renamed).unwrap();
        assert_eq!(both.band_names(), vec!["a", "z"]);
        assert!(img.add_bands(&img).is_err());
        assert!(img.rename(&["x", "y"]).is_err());
    }

    #[test]
    fn test_reduce_region_keys() {
        let img = image(array![[[1.0, 2.0], [3.0, f64::NAN]]], &["b1"]);
        let stats = img.reduce_region(SpatialReducer::Mean, None, None).unwrap();
        assert_eq!(stats["b1"], Some(2.0));

        let stats = Image::constant(3.0).reduce_region(SpatialReducer::Sum, None, None).unwrap();
        assert_eq!(stats[CONSTANT_KEY], Some(3.0));
    }

    #[test]
    fn test_reduce_region_with_scale() {
        let data = Array3::from_shape_fn((1, 4, 4), |(_, r, c)| (r * 4 + c) as f64);
        let img = image(data, &["v"]);
        let stats = img.reduce_region(SpatialReducer::Count, None, Some(2.0)).unwrap();
        assert_eq!(stats["v"], Some(4.0));
    }

    #[test]
    fn test_url_source_reads_through_given_reader() {
        let reader = opengeo_stac::MemoryAssetReader::new();
        let raster = SourceRaster::new(
            array![[1.0, 2.0], [3.0, 4.0]],
            GeoTransform::new(0.0, 2.0, 1.0, -1.0),
            Some(Crs::wgs84()),
        );
        reader.insert("https://data.example.com/b04.tif", raster);

        let img = Image::from_source_with(ImageSource::Url("https://data.example.com/b04.tif".into()), &reader)
            .unwrap();
        assert_eq!(img.band_names(), vec!["b1"]);
        assert_eq!(img.data()[[0, 1, 0]], 3.0);
        assert_eq!(reader.reads(), vec!["https://data.example.com/b04.tif"]);

        let missing = Image::from_source_with(ImageSource::Url("https://data.example.com/none.tif".into()), &reader);
        assert!(matches!(missing, Err(OpengeoError::UpstreamUnavailable { .. })));
    }

    #[test]
    fn test_reduce_region_pixel_limit() {
        let img = image(Array3::from_elem((1, 4, 4), 1.0), &["v"]);
        let err = img.reduce_region_capped(SpatialReducer::Sum, None, None, 15).unwrap_err();
        assert!(matches!(err, OpengeoError::InvalidArgument { ref name, .. } if name == "max_pixels"));

        let stats = img.reduce_region_capped(SpatialReducer::Sum, None, Some(2.0), 4).unwrap();
        assert_eq!(stats["v"], Some(4.0));
    }

    #[test]
    fn test_reduce_region_over_cell_edge_has_no_pixels() {
        let img = image(Array3::from_elem((1, 2, 2), 7.0), &["v"]);
        // Shares only the grid's east edge
        let east = Geometry::rectangle(2.0, 0.0, 3.0, 2.0).unwrap();
        let stats = img.reduce_region(SpatialReducer::Mean, Some(&east), None).unwrap();
        assert_eq!(stats["v"], None);

        let one_cell = Geometry::rectangle(1.0, 0.0, 2.0, 1.0).unwrap();
        let stats = img.reduce_region(SpatialReducer::Count, Some(&one_cell), None).unwrap();
        assert_eq!(stats["v"], Some(1.0));
    }

    #[test]
    fn test_stack_source_needs_one_step() {
        let stack = RasterStack::new(
            "c",
            ndarray::Array4::zeros((2, 1, 1, 1)),
            vec![None, None],
            vec!["b".into()],
            grid(1, 1),
        )
        .unwrap();
        assert!(Image::from_source(ImageSource::Stack(stack)).is_err());
    }

    #[test]
    fn test_get_info_snapshot() {
        let img = image(array![[[1.0, 2.0]]], &["x"]);
        let info = serde_json::to_value(img.get_info()).unwrap();
        assert_eq!(info["type"], "Image");
        assert_eq!(info["bands"], serde_json::json!(["x"]));
        assert_eq!(info["shape"], serde_json::json!([1, 1, 2]));
        assert_eq!(info["crs"], "EPSG:4326");
        assert_eq!(info["dtype"], "float64");
    }
}
