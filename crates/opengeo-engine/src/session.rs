//! Explicit catalog session shared by queries.
//!
//! A [`Session`] replaces process-wide "current catalog" state: every
//! [`ImageCollection`] holds the session it was created from, so queries
//! against different catalogs can coexist.

use std::fmt;
use std::sync::Arc;

use opengeo_core::catalogs::CatalogEndpoint;
use opengeo_core::config::LayeredConfig;
use opengeo_core::error::Result;
use opengeo_core::models::DEFAULT_MAX_PIXELS;
use opengeo_core::ports::{AssetReader, CatalogConnector, RasterStacker};
use opengeo_stac::{GeoTiffReader, StacConnector};

use crate::clip::ClipOptions;
use crate::collection::ImageCollection;
use crate::image::{Image, ImageSource};
use crate::stack::WarpStacker;

/// Default cap on items collected by one search
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// What to do when some items cannot be aligned onto the target grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentPolicy {
    /// Exclude them and record the count on the stack
    #[default]
    Lenient,
    /// Fail with `AlignmentFailure` when any item is excluded
    Strict,
}

/// Target grid and alignment settings for stacking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StackOptions {
    /// Target CRS; `None` keeps the first item's native CRS
    pub epsg: Option<u32>,
    /// Target pixel size in CRS units; `None` keeps the native resolution
    pub resolution: Option<f64>,
    pub alignment: AlignmentPolicy,
    /// Largest target grid in pixels
    pub max_pixels: u64,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            epsg: None,
            resolution: None,
            alignment: AlignmentPolicy::default(),
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

impl StackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_alignment(mut self, alignment: AlignmentPolicy) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }
}

/// Catalog endpoint plus the adapters used to reach it
#[derive(Clone)]
pub struct Session {
    endpoint: CatalogEndpoint,
    connector: Arc<dyn CatalogConnector>,
    stacker: Arc<dyn RasterStacker>,
    reader: Option<Arc<dyn AssetReader>>,
    stack_options: StackOptions,
    clip_options: ClipOptions,
    max_items: usize,
}

impl Session {
    pub fn new(
        endpoint: CatalogEndpoint,
        connector: Arc<dyn CatalogConnector>,
        stacker: Arc<dyn RasterStacker>,
    ) -> Self {
        Self {
            endpoint,
            connector,
            stacker,
            reader: None,
            stack_options: StackOptions::default(),
            clip_options: ClipOptions::default(),
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    /// Session over in-process adapters: a connector and an asset reader
    /// wrapped in a [`WarpStacker`]
    pub fn with_reader(
        endpoint: CatalogEndpoint,
        connector: Arc<dyn CatalogConnector>,
        reader: Arc<dyn AssetReader>,
    ) -> Self {
        Self {
            reader: Some(reader.clone()),
            ..Self::new(endpoint, connector, Arc::new(WarpStacker::new(reader)))
        }
    }

    /// HTTP session configured from layered configuration
    pub fn from_config(config: &LayeredConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let connector = StacConnector::from_config(config);
        let reader = GeoTiffReader::from_config(config)?;

        let stack_options = StackOptions {
            epsg: config.epsg.value,
            resolution: config.resolution.value,
            max_pixels: config.max_pixels.value,
            ..StackOptions::default()
        };

        tracing::debug!("Session for {} (max_items={})", endpoint, config.max_items.value);

        Ok(Self::with_reader(endpoint, Arc::new(connector), Arc::new(reader))
            .with_stack_options(stack_options)
            .with_clip_options(ClipOptions { all_touched: config.all_touched.value })
            .with_max_items(config.max_items.value))
    }

    pub fn with_stack_options(mut self, options: StackOptions) -> Self {
        self.stack_options = options;
        self
    }

    pub fn with_clip_options(mut self, options: ClipOptions) -> Self {
        self.clip_options = options;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Start a deferred query over a collection. Performs no I/O.
    pub fn image_collection(&self, collection_id: impl Into<String>) -> ImageCollection {
        ImageCollection::new(self.clone(), collection_id)
    }

    /// Build an image, reading URL sources through this session's asset
    /// reader when it has one
    pub fn image(&self, source: ImageSource) -> Result<Image> {
        match &self.reader {
            Some(reader) => Image::from_source_with(source, reader.as_ref()),
            None => Image::from_source(source),
        }
    }

    pub fn endpoint(&self) -> &CatalogEndpoint {
        &self.endpoint
    }

    pub fn connector(&self) -> &dyn CatalogConnector {
        self.connector.as_ref()
    }

    pub fn stacker(&self) -> &dyn RasterStacker {
        self.stacker.as_ref()
    }

    pub fn stack_options(&self) -> StackOptions {
        self.stack_options
    }

    pub fn clip_options(&self) -> ClipOptions {
        self.clip_options
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("stack_options", &self.stack_options)
            .field("clip_options", &self.clip_options)
            .field("max_items", &self.max_items)
            .finish()
    }
}
