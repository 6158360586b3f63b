pub mod crs;
pub mod item;
pub mod raster;
pub mod search;

pub use crs::Crs;
pub use item::{Asset, CollectionInfo, Item, ItemBuilder, ItemExt};
pub use raster::{
    BBox, GeoTransform, GridSpec, PixelWindow, RasterHeader, SourceRaster, DEFAULT_MAX_PIXELS,
};
pub use search::SearchRequest;
