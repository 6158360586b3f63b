//! Writing images to disk.
//!
//! `.tif` / `.tiff` paths get a lossless Float32 GeoTIFF. PNG and JPEG paths
//! get a colour-mapped render for viewing only.

use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use ndarray::{Array2, Array3, Axis};
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::GridSpec;
use opengeo_stac::geotiff;

use crate::palette::Palette;

/// Linear stretch bounds for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stretch {
    pub min: f64,
    pub max: f64,
}

impl Stretch {
    /// Explicit bounds where given, the finite data range otherwise
    pub fn resolve(data: &Array3<f64>, vmin: Option<f64>, vmax: Option<f64>) -> Self {
        let (lo, hi) = data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let (lo, hi) = if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) };
        Self { min: vmin.unwrap_or(lo), max: vmax.unwrap_or(hi) }
    }

    /// Position of `value` in `[0, 1]`
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span.abs() < f64::EPSILON {
            0.0
        } else {
            ((value - self.min) / span).clamp(0.0, 1.0)
        }
    }
}

fn is_geotiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

fn export_error(path: &Path, reason: impl Into<String>) -> OpengeoError {
    OpengeoError::Export { path: path.to_path_buf(), reason: reason.into() }
}

/// Write `data` (`band, y, x`) to `path`, choosing the format by extension
pub fn write(
    path: &Path,
    data: &Array3<f64>,
    grid: Option<&GridSpec>,
    vmin: Option<f64>,
    vmax: Option<f64>,
    palette: Option<&Palette>,
) -> Result<()> {
    if is_geotiff(path) {
        let grid = grid.ok_or_else(|| export_error(path, "constant images have no grid to georeference"))?;
        let bands: Vec<Array2<f64>> = data.axis_iter(Axis(0)).map(|band| band.to_owned()).collect();
        geotiff::write_path(path, &bands, grid)?;
        tracing::info!("Wrote {} band GeoTIFF to {}", bands.len(), path.display());
        return Ok(());
    }

    let format = ImageFormat::from_path(path).map_err(|e| export_error(path, e.to_string()))?;
    let (bands, height, width) = data.dim();
    if height == 0 || width == 0 {
        return Err(export_error(path, "image has no pixels"));
    }

    let stretch = Stretch::resolve(data, vmin, vmax);
    let default_palette = Palette::default();
    let palette = palette.unwrap_or(&default_palette);

    let pixel = |row: usize, col: usize| -> Option<[u8; 3]> {
        match bands {
            1 => {
                let v = data[[0, row, col]];
                v.is_finite().then(|| palette.color_at(stretch.normalize(v)))
            }
            3 => {
                let rgb = [data[[0, row, col]], data[[1, row, col]], data[[2, row, col]]];
                rgb.iter()
                    .all(|v| v.is_finite())
                    .then(|| rgb.map(|v| (stretch.normalize(v) * 255.0).round() as u8))
            }
            _ => None,
        }
    };
    if bands != 1 && bands != 3 {
        return Err(OpengeoError::invalid_argument(
            "bands",
            format!("rendering needs 1 or 3 bands, image has {}", bands),
        ));
    }

    let (w, h) = (width as u32, height as u32);
    let saved = match format {
        ImageFormat::Png => RgbaImage::from_fn(w, h, |x, y| match pixel(y as usize, x as usize) {
            Some([r, g, b]) => Rgba([r, g, b, 255]),
            None => Rgba([0, 0, 0, 0]),
        })
        .save_with_format(path, format),
        ImageFormat::Jpeg => RgbImage::from_fn(w, h, |x, y| Rgb(pixel(y as usize, x as usize).unwrap_or([0, 0, 0])))
            .save_with_format(path, format),
        other => return Err(export_error(path, format!("unsupported image format {:?}", other))),
    };
    saved.map_err(|e| export_error(path, e.to_string()))?;

    tracing::info!(
        "Rendered {}x{} image to {} (stretch {}..{})",
        width,
        height,
        path.display(),
        stretch.min,
        stretch.max
    );
    Ok(())
}
