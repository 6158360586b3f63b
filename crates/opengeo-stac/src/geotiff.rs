//! Native GeoTIFF codec (without GDAL dependency)
//!
//! Decodes any page layout the `tiff` crate understands into [`SourceRaster`]s
//! and writes Float32 GeoTIFFs with one page per band. Windowed decoding
//! reads only the strips or tiles that overlap the requested pixels, so a
//! range-backed reader fetches a fraction of a large COG.

use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use ndarray::Array2;
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{Crs, GeoTransform, GridSpec, PixelWindow, RasterHeader, SourceRaster};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

// GeoKey ids
const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const USER_DEFINED: u16 = 32767;

fn io_err(href: &str, reason: impl std::fmt::Display) -> OpengeoError {
    OpengeoError::RasterIo { href: href.to_string(), reason: reason.to_string() }
}

/// Decode every page of a GeoTIFF
pub fn decode<R: Read + Seek>(reader: R, href: &str) -> Result<Vec<SourceRaster>> {
    let mut decoder = open(reader, href)?;

    let mut pages = vec![decode_page(&mut decoder, href)?];
    while decoder.more_images() {
        decoder.next_image().map_err(|e| io_err(href, format!("Cannot read next page: {}", e)))?;
        pages.push(decode_page(&mut decoder, href)?);
    }
    Ok(pages)
}

/// Decode only the first page
pub fn decode_first<R: Read + Seek>(reader: R, href: &str) -> Result<SourceRaster> {
    let mut decoder = open(reader, href)?;
    decode_page(&mut decoder, href)
}

/// Grid metadata of the first page, without decoding any samples
pub fn decode_header<R: Read + Seek>(reader: R, href: &str) -> Result<RasterHeader> {
    let mut decoder = open(reader, href)?;
    read_header(&mut decoder, href)
}

/// Decode the pixels of the first page inside `window`.
///
/// Only chunks overlapping the window are read. The window is clamped to
/// the image before decoding; an empty result is an error.
pub fn decode_window<R: Read + Seek>(
    reader: R,
    href: &str,
    window: &PixelWindow,
) -> Result<SourceRaster> {
    let mut decoder = open(reader, href)?;
    let header = read_header(&mut decoder, href)?;
    let window = window.clamp_to(header.width, header.height);
    if window.is_empty() {
        return Err(io_err(href, format!("Window {:?} lies outside the image", window)));
    }

    let (chunk_w, chunk_h) = decoder.chunk_dimensions();
    let (chunk_w, chunk_h) = (chunk_w as usize, chunk_h as usize);
    if chunk_w == 0 || chunk_h == 0 {
        return Err(io_err(href, "Invalid chunk dimensions"));
    }
    let across = header.width.div_ceil(chunk_w);
    let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1) == 2;

    let mut data = Array2::from_elem((window.height, window.width), f64::NAN);
    let chunk_cols = window.col / chunk_w..=(window.col + window.width - 1) / chunk_w;
    let chunk_rows = window.row / chunk_h..=(window.row + window.height - 1) / chunk_h;
    let mut chunks_read = 0usize;

    for chunk_row in chunk_rows {
        for chunk_col in chunk_cols.clone() {
            let index = (chunk_row * across + chunk_col) as u32;
            let result = decoder
                .read_chunk(index)
                .map_err(|e| io_err(href, format!("Cannot read chunk {}: {}", index, e)))?;
            let (data_w, data_h) = decoder.chunk_data_dimensions(index);
            let (data_w, data_h) = (data_w as usize, data_h as usize);
            let band = first_band(to_samples(result, href)?, data_w * data_h, planar, href)?;
            chunks_read += 1;

            let (x0, y0) = (chunk_col * chunk_w, chunk_row * chunk_h);
            let rows = y0.max(window.row)..(y0 + data_h).min(window.row + window.height);
            let cols = x0.max(window.col)..(x0 + data_w).min(window.col + window.width);
            for row in rows {
                for col in cols.clone() {
                    data[[row - window.row, col - window.col]] = band[(row - y0) * data_w + (col - x0)];
                }
            }
        }
    }
    tracing::debug!("Decoded {} chunks of {} for window {:?}", chunks_read, href, window);

    let t = &header.transform;
    let transform = GeoTransform::new(
        t.origin_x + window.col as f64 * t.pixel_width,
        t.origin_y + window.row as f64 * t.pixel_height,
        t.pixel_width,
        t.pixel_height,
    );
    Ok(SourceRaster::new(data, transform, header.crs).with_nodata(header.nodata))
}

fn open<R: Read + Seek>(reader: R, href: &str) -> Result<Decoder<R>> {
    Ok(Decoder::new(reader)
        .map_err(|e| io_err(href, format!("TIFF decode error: {}", e)))?
        .with_limits(Limits::unlimited()))
}

fn read_header<R: Read + Seek>(decoder: &mut Decoder<R>, href: &str) -> Result<RasterHeader> {
    let (width, height) = decoder
        .dimensions()
        .map_err(|e| io_err(href, format!("Cannot read dimensions: {}", e)))?;

    let transform = read_geotransform(decoder).unwrap_or(GeoTransform::new(0.0, 0.0, 1.0, -1.0));
    let crs = read_epsg(decoder).map(Crs::from_epsg);
    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').parse::<f64>().ok());

    Ok(RasterHeader { width: width as usize, height: height as usize, transform, crs, nodata })
}

fn to_samples(result: DecodingResult, href: &str) -> Result<Vec<f64>> {
    Ok(match result {
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I64(buf) => buf.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => return Err(io_err(href, "Unsupported TIFF pixel format")),
    })
}

/// First sample of every pixel
fn first_band(samples: Vec<f64>, pixels: usize, planar: bool, href: &str) -> Result<Vec<f64>> {
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(io_err(
            href,
            format!("Sample count {} does not match {} pixels", samples.len(), pixels),
        ));
    }
    let per_pixel = samples.len() / pixels;
    Ok(if per_pixel == 1 || planar {
        samples.into_iter().take(pixels).collect()
    } else {
        samples.into_iter().step_by(per_pixel).collect()
    })
}

fn decode_page<R: Read + Seek>(decoder: &mut Decoder<R>, href: &str) -> Result<SourceRaster> {
    let header = read_header(decoder, href)?;
    let (cols, rows) = (header.width, header.height);
    let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1) == 2;

    let result = decoder
        .read_image()
        .map_err(|e| io_err(href, format!("Cannot read image data: {}", e)))?;
    let band = first_band(to_samples(result, href)?, rows * cols, planar, href)?;

    let data = Array2::from_shape_vec((rows, cols), band)
        .map_err(|e| io_err(href, format!("Invalid raster shape: {}", e)))?;

    Ok(SourceRaster::new(data, header.transform, header.crs).with_nodata(header.nodata))
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, or ModelTransformation
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();

    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    let matrix = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).ok()?;
    if matrix.len() >= 16 {
        // Row-major 4x4; rotation terms are ignored (north-up only)
        return Some(GeoTransform::new(matrix[3], matrix[7], matrix[0], matrix[5]));
    }
    None
}

fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag).ok()?;
    parse_geokeys(&keys)
}

/// EPSG code from a GeoKeyDirectory, preferring the projected CRS key
fn parse_geokeys(keys: &[u16]) -> Option<u32> {
    let count = *keys.get(3)? as usize;
    let mut projected = None;
    let mut geographic = None;

    for entry in keys[4..].chunks_exact(4).take(count) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        // Only inline SHORT values carry codes
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            PROJECTED_CS_TYPE => projected = Some(value as u32),
            GEOGRAPHIC_TYPE => geographic = Some(value as u32),
            _ => {}
        }
    }

    projected.or(geographic)
}

fn geokeys_for(crs: &Crs) -> Vec<u16> {
    let model: u16 = if crs.is_geographic() { 2 } else { 1 };
    let mut keys: Vec<u16> = vec![
        1, 1, 0, 2, // Version 1.1.0, 2 keys
        GT_MODEL_TYPE, 0, 1, model,
        GT_RASTER_TYPE, 0, 1, 1, // RasterPixelIsArea
    ];
    if let Ok(code) = u16::try_from(crs.epsg) {
        let key = if crs.is_geographic() { GEOGRAPHIC_TYPE } else { PROJECTED_CS_TYPE };
        keys.extend_from_slice(&[key, 0, 1, code]);
        keys[3] = 3;
    }
    keys
}

/// Encode bands as a Float32 GeoTIFF, one page per band.
///
/// Missing samples are written as NaN and flagged with `GDAL_NODATA=nan`.
pub fn encode<W: Write + Seek>(writer: W, bands: &[Array2<f64>], grid: &GridSpec) -> Result<()> {
    let target = "<geotiff>";
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| io_err(target, format!("TIFF encoder error: {}", e)))?;

    let gt = &grid.transform;
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    let geokeys = geokeys_for(&grid.crs);

    for band in bands {
        let (rows, cols) = band.dim();
        let data: Vec<f32> = band.iter().map(|&v| v as f32).collect();

        let mut image = encoder
            .new_image::<Gray32Float>(cols as u32, rows as u32)
            .map_err(|e| io_err(target, format!("Cannot create TIFF image: {}", e)))?;

        image
            .encoder()
            .write_tag(Tag::ModelPixelScaleTag, &scale[..])
            .map_err(|e| io_err(target, format!("Cannot write scale tag: {}", e)))?;
        image
            .encoder()
            .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
            .map_err(|e| io_err(target, format!("Cannot write tiepoint tag: {}", e)))?;
        image
            .encoder()
            .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])
            .map_err(|e| io_err(target, format!("Cannot write geokey tag: {}", e)))?;
        image
            .encoder()
            .write_tag(Tag::GdalNodata, "nan")
            .map_err(|e| io_err(target, format!("Cannot write nodata tag: {}", e)))?;

        image
            .write_data(&data)
            .map_err(|e| io_err(target, format!("Cannot write image data: {}", e)))?;
    }

    Ok(())
}

/// Read every page of a GeoTIFF file
pub fn read_path(path: &Path) -> Result<Vec<SourceRaster>> {
    let href = path.display().to_string();
    let file = File::open(path).map_err(|e| io_err(&href, e))?;
    decode(file, &href)
}

/// Write bands to a GeoTIFF file
pub fn write_path(path: &Path, bands: &[Array2<f64>], grid: &GridSpec) -> Result<()> {
    let file = File::create(path)?;
    encode(BufWriter::new(file), bands, grid).map_err(|e| OpengeoError::Export {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
