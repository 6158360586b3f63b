//! STAC Item and Collection models.
//!
//! Items and assets are the `stac` crate's types, so search responses decode
//! with the full STAC schema and keep provider-specific fields in
//! `additional_fields`. [`ItemExt`] adds the accessors the engine needs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{BBox, Crs};

pub use stac::{Asset, Item};

/// Engine-facing accessors over [`stac::Item`]
pub trait ItemExt {
    /// Acquisition timestamp (`datetime`, falling back to `start_datetime`)
    fn acquired(&self) -> Option<DateTime<Utc>>;

    /// 2-D footprint bounding box; 3-D boxes drop their z range
    fn footprint(&self) -> Option<BBox>;

    /// Native CRS from the projection extension (`proj:epsg` or `proj:code`)
    fn native_crs(&self) -> Option<Crs>;

    /// A property by key, typed core fields included
    fn property_value(&self, key: &str) -> Option<Value>;

    /// Asset keys in document order
    fn asset_keys(&self) -> Vec<String>;

    /// Mapping from asset key to its access URL
    fn asset_urls(&self) -> BTreeMap<String, String>;
}

impl ItemExt for Item {
    fn acquired(&self) -> Option<DateTime<Utc>> {
        if let Some(datetime) = self.properties.datetime {
            return Some(datetime);
        }
        self.property_value("start_datetime")
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn footprint(&self) -> Option<BBox> {
        let values: Vec<f64> = serde_json::to_value(&self.bbox)
            .ok()?
            .as_array()?
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        match values.as_slice() {
            [min_x, min_y, max_x, max_y] => Some(BBox::new(*min_x, *min_y, *max_x, *max_y)),
            [min_x, min_y, _, max_x, max_y, _] => Some(BBox::new(*min_x, *min_y, *max_x, *max_y)),
            _ => None,
        }
    }

    fn native_crs(&self) -> Option<Crs> {
        if let Some(epsg) = self.property_value("proj:epsg").as_ref().and_then(Value::as_u64) {
            return Some(Crs::from_epsg(epsg as u32));
        }
        self.property_value("proj:code").as_ref().and_then(Value::as_str).and_then(Crs::parse)
    }

    fn property_value(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.properties.additional_fields.get(key) {
            return Some(value.clone());
        }
        match serde_json::to_value(&self.properties).ok()? {
            Value::Object(mut map) => map.remove(key).filter(|v| !v.is_null()),
            _ => None,
        }
    }

    fn asset_keys(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    fn asset_urls(&self) -> BTreeMap<String, String> {
        self.assets.iter().map(|(k, a)| (k.clone(), a.href.to_string())).collect()
    }
}

/// Builder for items assembled in code rather than decoded from a catalog
#[derive(Debug, Clone, Default)]
pub struct ItemBuilder {
    id: String,
    collection: Option<String>,
    bbox: Option<BBox>,
    datetime: Option<DateTime<Utc>>,
    properties: Map<String, Value>,
    assets: Vec<(String, Asset)>,
}

impl ItemBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn datetime(mut self, datetime: DateTime<Utc>) -> Self {
        self.datetime = Some(datetime);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn asset(mut self, key: impl Into<String>, asset: Asset) -> Self {
        self.assets.push((key.into(), asset));
        self
    }

    /// Items without an explicit datetime carry none
    pub fn build(self) -> Item {
        let mut item = Item::new(self.id);
        item.collection = self.collection;
        item.bbox = self.bbox.map(|b| stac::Bbox::new(b.min_x, b.min_y, b.max_x, b.max_y));
        item.properties.datetime = self.datetime;
        item.properties.additional_fields.extend(self.properties);
        item.assets.extend(self.assets);
        item
    }
}

/// Collection metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared per-item assets (item-assets extension)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_assets: Option<BTreeMap<String, Value>>,
}

impl CollectionInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), title: None, description: None, item_assets: None }
    }

    /// Asset keys declared by the item-assets extension, if any
    pub fn declared_assets(&self) -> Option<Vec<String>> {
        self.item_assets.as_ref().map(|assets| assets.keys().cloned().collect())
    }
}
