use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// OpenGeo - Earth Engine style composites over STAC catalogs
#[derive(Parser, Debug)]
#[command(name = "opengeo")]
#[command(about = "Search STAC catalogs and build temporal composites", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Catalog alias (e.g. ELEMENT84, MICROSOFT) or STAC API root URL
    #[arg(long, global = true)]
    pub catalog: Option<String>,

    /// Configuration file (defaults to ./opengeo.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered catalogs
    Catalogs,

    /// Show one registered catalog
    Catalog(CatalogArgs),

    /// List the collections of the catalog
    Collections,

    /// List items of a collection
    Items(ItemsArgs),

    /// List the asset keys (bands) of a collection
    Assets(AssetsArgs),

    /// Show a single item as JSON
    Item(ItemArgs),

    /// Show the asset URLs of a single item
    Urls(ItemArgs),

    /// Search, stack and reduce a collection into one image
    Composite(CompositeArgs),

    /// Show the effective configuration and where each value comes from
    Config,
}

#[derive(Parser, Debug)]
pub struct CatalogArgs {
    /// Catalog alias
    pub alias: String,
}

#[derive(Parser, Debug)]
pub struct ItemsArgs {
    /// Collection id
    pub collection: String,

    /// Maximum number of items to list
    #[arg(long, short = 'n', default_value = "10")]
    pub limit: usize,
}

#[derive(Parser, Debug)]
pub struct AssetsArgs {
    /// Collection id
    pub collection: String,
}

#[derive(Parser, Debug)]
pub struct ItemArgs {
    /// Collection id
    pub collection: String,

    /// Item id
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct CompositeArgs {
    /// Collection id
    pub collection: String,

    /// Start date (YYYY-MM-DD or RFC 3339)
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// End date, inclusive
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Area of interest as min_x,min_y,max_x,max_y in WGS84
    #[arg(long, value_delimiter = ',', num_args = 4, allow_hyphen_values = true, conflicts_with = "geometry")]
    pub bbox: Option<Vec<f64>>,

    /// Area of interest as a GeoJSON geometry string or file
    #[arg(long, value_name = "GEOMETRY")]
    pub geometry: Option<String>,

    /// Bands to stack, comma separated
    #[arg(long, value_delimiter = ',')]
    pub bands: Option<Vec<String>>,

    /// Maximum cloud cover in percent (eo:cloud_cover)
    #[arg(long)]
    pub max_cloud: Option<f64>,

    /// Temporal reducer: mean, median, min, max, count, first or mosaic
    #[arg(long, short = 'r', default_value = "median")]
    pub reducer: String,

    /// Replace the composite with the normalized difference of two bands
    #[arg(long, value_delimiter = ',', num_args = 2, value_name = "A,B")]
    pub normalized_difference: Option<Vec<String>>,

    /// Compute a zonal statistic (mean, min, max, sum, count, median)
    #[arg(long)]
    pub stats: Option<String>,

    /// Pixel size to resample to before computing statistics
    #[arg(long, requires = "stats")]
    pub scale: Option<f64>,

    /// Maximum number of items to stack
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Target CRS EPSG code
    #[arg(long)]
    pub epsg: Option<u32>,

    /// Target pixel size in CRS units
    #[arg(long)]
    pub resolution: Option<f64>,

    /// Largest grid, in pixels, to stack or compute statistics over
    #[arg(long)]
    pub max_pixels: Option<u64>,

    /// Fail when any item cannot be aligned instead of skipping it
    #[arg(long)]
    pub strict: bool,

    /// Write the result (.tif, .png or .jpg)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Lower bound of the render stretch
    #[arg(long, allow_hyphen_values = true)]
    pub vmin: Option<f64>,

    /// Upper bound of the render stretch
    #[arg(long, allow_hyphen_values = true)]
    pub vmax: Option<f64>,

    /// Palette name or comma separated colours for rendered output
    #[arg(long)]
    pub palette: Option<String>,
}
