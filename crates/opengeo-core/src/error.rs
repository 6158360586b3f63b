//! Error types for OpenGeo

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpengeoError {
    // Query errors
    #[error("No images found in collection '{collection}' with filters {filters}")]
    EmptyResult { collection: String, filters: String },

    #[error("Band '{band}' not found. Available bands: [{}]", available.join(", "))]
    BandNotFound { band: String, available: Vec<String> },

    #[error("Shape mismatch: {left} vs {right}")]
    ShapeMismatch { left: String, right: String },

    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("{dropped} of {total} items in collection '{collection}' could not be aligned onto the target grid")]
    AlignmentFailure {
        collection: String,
        dropped: usize,
        total: usize,
    },

    // Catalog errors
    #[error("Upstream unavailable at {url}: {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    #[error("Catalog {url} requires signed asset URLs but no signer is attached")]
    SigningRequired { url: String },

    #[error("Unknown catalog alias: {alias}")]
    CatalogNotFound { alias: String },

    // Geometry errors
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    // Raster IO errors
    #[error("Raster IO error for {href}: {reason}")]
    RasterIo { href: String, reason: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Export { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OpengeoError {
    /// Shorthand for an [`OpengeoError::InvalidArgument`]
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        OpengeoError::InvalidArgument { name: name.into(), reason: reason.into() }
    }

    /// Whether the failure belongs to one item's data rather than to the
    /// catalog or the host: undecodable rasters, footprints that cannot be
    /// reprojected, and unusable item CRS codes. Stacking drops such items
    /// and propagates everything else.
    pub fn is_item_local(&self) -> bool {
        matches!(
            self,
            OpengeoError::RasterIo { .. }
                | OpengeoError::InvalidGeometry { .. }
                | OpengeoError::ConfigInvalid { .. }
        )
    }
}

impl From<serde_json::Error> for OpengeoError {
    fn from(err: serde_json::Error) -> Self {
        OpengeoError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OpengeoError>;
