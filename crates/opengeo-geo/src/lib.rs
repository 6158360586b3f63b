//! OpenGeo Geo - Geometry value object, CRS transforms and validation
//!
//! Geometries are immutable: every operation returns a new value tagged with
//! its coordinate reference system.

pub mod geometry;
pub mod transform;
pub mod validation;

pub use geometry::Geometry;
pub use opengeo_core::models::Crs;
