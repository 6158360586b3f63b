//! Port trait definitions
//!
//! These traits define the interfaces that adapters must implement.

pub mod catalog;
pub mod raster;

pub use catalog::{CatalogClient, CatalogConnector, RequestSigner};
pub use raster::{AssetReader, RasterStacker, StackOutput, StackRequest};
