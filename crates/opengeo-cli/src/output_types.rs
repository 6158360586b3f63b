use std::collections::BTreeMap;

use opengeo_core::models::{CollectionInfo, Item, ItemExt};
use opengeo_engine::ImageInfo;
use serde::Serialize;
use tabled::Tabled;

/// Row of the catalogs listing
#[derive(Debug, Serialize, Tabled)]
pub struct CatalogRow {
    pub alias: String,
    pub name: String,
    pub access: String,
    pub url: String,
}

/// Row of the collections listing
#[derive(Debug, Serialize, Tabled)]
pub struct CollectionRow {
    pub id: String,
    pub title: String,
}

impl From<CollectionInfo> for CollectionRow {
    fn from(info: CollectionInfo) -> Self {
        Self { title: info.title.unwrap_or_default(), id: info.id }
    }
}

/// Row of the items listing
#[derive(Debug, Serialize, Tabled)]
pub struct ItemRow {
    pub id: String,
    pub datetime: String,
    #[tabled(rename = "cloud cover")]
    pub cloud_cover: String,
    pub assets: usize,
}

impl From<&Item> for ItemRow {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            datetime: item.acquired().map(|dt| dt.to_rfc3339()).unwrap_or_else(|| "-".to_string()),
            cloud_cover: item
                .property_value("eo:cloud_cover")
                .and_then(|v| v.as_f64())
                .map(|c| format!("{:.1}", c))
                .unwrap_or_else(|| "-".to_string()),
            assets: item.assets.len(),
        }
    }
}

/// Row of the assets listing
#[derive(Debug, Serialize, Tabled)]
pub struct BandRow {
    pub band: String,
}

/// Row of the URLs listing
#[derive(Debug, Serialize, Tabled)]
pub struct AssetRow {
    pub key: String,
    pub href: String,
}

/// Row of the config command
#[derive(Debug, Serialize, Tabled)]
pub struct ConfigRow {
    pub key: String,
    pub value: String,
    pub source: String,
}

/// Output for composite command
#[derive(Debug, Serialize)]
pub struct CompositeOutput {
    pub collection: String,
    pub catalog: String,
    pub reducer: String,
    pub image: ImageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<BTreeMap<String, Option<f64>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}
