use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use opengeo_core::config::LayeredConfig;
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{PixelWindow, RasterHeader, SourceRaster};
use opengeo_core::ports::AssetReader;

use crate::client::{http_client, runtime};
use crate::geotiff;
use crate::range::{HttpRange, RangeSource, DEFAULT_BLOCK_SIZE};

/// Reads GeoTIFF / COG assets from local paths, `file://` and `http(s)://` hrefs.
///
/// Remote assets are read through HTTP range requests, so windowed reads
/// transfer the header and the overlapping strips or tiles only. Headers are
/// cached per href. Transport failures surface as
/// [`OpengeoError::UpstreamUnavailable`]; bytes that do not decode as a TIFF
/// surface as [`OpengeoError::RasterIo`].
pub struct GeoTiffReader {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    max_retries: u32,
    block_size: u64,
    headers: Mutex<HashMap<String, RasterHeader>>,
}

impl GeoTiffReader {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            runtime: runtime()?,
            max_retries,
            block_size: DEFAULT_BLOCK_SIZE,
            headers: Mutex::new(HashMap::new()),
        })
    }

    /// Reader using the configured request timeout and retry budget
    pub fn from_config(config: &LayeredConfig) -> Result<Self> {
        Self::new(config.request_timeout(), config.max_retries.value)
    }

    /// Read every page of the asset
    pub fn read_all(&self, href: &str) -> Result<Vec<SourceRaster>> {
        match local_path(href) {
            Some(path) => geotiff::read_path(Path::new(path)),
            None => self.remote(href, |source| geotiff::decode(source, href)),
        }
    }

    fn open_local(href: &str, path: &str) -> Result<File> {
        File::open(path).map_err(|e| OpengeoError::RasterIo {
            href: href.to_string(),
            reason: e.to_string(),
        })
    }

    /// Run a decode over a range-backed view of a remote asset. A transport
    /// failure inside the decode wins over the decode error it caused.
    fn remote<T>(
        &self,
        href: &str,
        decode: impl FnOnce(&mut RangeSource<HttpRange<'_>>) -> Result<T>,
    ) -> Result<T> {
        let fetcher = HttpRange {
            client: &self.client,
            runtime: &self.runtime,
            href,
            max_retries: self.max_retries,
        };
        let mut source = RangeSource::open(fetcher, self.block_size)?;
        let result = decode(&mut source);
        tracing::debug!("Transferred {} of {} bytes for {}", source.fetched_bytes(), source.len(), href);
        match source.take_failure() {
            Some(failure) => Err(failure),
            None => result,
        }
    }

    fn cached_header(&self, href: &str) -> Option<RasterHeader> {
        self.headers.lock().ok().and_then(|cache| cache.get(href).cloned())
    }
}

/// Filesystem path of a local href, `None` for remote URLs
fn local_path(href: &str) -> Option<&str> {
    if let Some(path) = href.strip_prefix("file://") {
        return Some(path);
    }
    if href.contains("://") {
        None
    } else {
        Some(href)
    }
}

impl AssetReader for GeoTiffReader {
    fn read(&self, href: &str) -> Result<SourceRaster> {
        match local_path(href) {
            Some(path) => geotiff::decode_first(Self::open_local(href, path)?, href),
            None => self.remote(href, |source| geotiff::decode_first(source, href)),
        }
    }

    fn read_pages(&self, href: &str) -> Result<Vec<SourceRaster>> {
        self.read_all(href)
    }

    fn header(&self, href: &str) -> Result<RasterHeader> {
        if let Some(header) = self.cached_header(href) {
            return Ok(header);
        }
        let header = match local_path(href) {
            Some(path) => geotiff::decode_header(Self::open_local(href, path)?, href)?,
            None => self.remote(href, |source| geotiff::decode_header(source, href))?,
        };
        if let Ok(mut cache) = self.headers.lock() {
            cache.insert(href.to_string(), header.clone());
        }
        Ok(header)
    }

    fn read_window(&self, href: &str, window: &PixelWindow) -> Result<SourceRaster> {
        match local_path(href) {
            Some(path) => geotiff::decode_window(Self::open_local(href, path)?, href, window),
            None => self.remote(href, |source| geotiff::decode_window(source, href, window)),
        }
    }
}
