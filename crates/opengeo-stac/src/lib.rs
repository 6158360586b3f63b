//! OpenGeo STAC - catalog and raster adapters
//!
//! HTTP implementations of the catalog ports, Planetary Computer URL signing,
//! a native GeoTIFF codec with range-request COG access, and in-memory adapters for development and tests.

pub mod client;
pub mod connector;
pub mod geotiff;
pub mod memory;
pub mod range;
pub mod reader;
pub mod signing;
mod wire;

pub use client::{StacClient, StacClientOptions};
pub use connector::StacConnector;
pub use memory::{MemoryAssetReader, MemoryCatalog, MemoryConnector};
pub use reader::GeoTiffReader;
pub use signing::{PlanetaryComputerSigner, TokenSigner};
