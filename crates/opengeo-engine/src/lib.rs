//! OpenGeo Engine - deferred ImageCollection queries and Image algebra
//!
//! An [`ImageCollection`] accumulates filters without touching the network.
//! A terminal call (`mean()`, `first()`, ...) runs the catalog search through
//! the [`Materializer`], stacks the matching assets onto one grid, and reduces
//! the time axis into an [`Image`].

pub mod clip;
pub mod collection;
pub mod export;
pub mod image;
pub mod materialize;
pub mod palette;
pub mod reduce;
pub mod region;
pub mod session;
pub mod stack;

pub use clip::ClipOptions;
pub use collection::{FilterSpec, ImageCollection};
pub use crate::image::{Image, ImageInfo, ImageSource, Operand};
pub use materialize::Materializer;
pub use palette::Palette;
pub use reduce::{MosaicPolicy, TemporalReducer};
pub use region::SpatialReducer;
pub use session::{AlignmentPolicy, Session, StackOptions};
pub use stack::{RasterStack, WarpStacker};

pub use opengeo_core::{OpengeoError, Result};
pub use opengeo_geo::Geometry;
