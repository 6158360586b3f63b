//! In-memory catalog and asset adapters for development and testing.
//!
//! These implementations use `RwLock::unwrap()` intentionally. Lock poisoning
//! only occurs when another thread panicked while holding the lock, which is
//! an unrecoverable state.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use opengeo_core::catalogs::CatalogEndpoint;
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{
    BBox, CollectionInfo, Item, ItemExt, PixelWindow, RasterHeader, SearchRequest, SourceRaster,
};
use opengeo_core::ports::{AssetReader, CatalogClient, CatalogConnector, RequestSigner};
use serde_json::Value;

/// In-memory implementation of CatalogClient
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    collections: Arc<RwLock<BTreeMap<String, CollectionInfo>>>,
    items: Arc<RwLock<Vec<Item>>>,
    searches: Arc<RwLock<Vec<SearchRequest>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_collection(&self, collection: CollectionInfo) {
        self.collections.write().unwrap().insert(collection.id.clone(), collection);
    }

    /// Add an item, registering its collection if unseen
    pub fn add_item(&self, item: Item) {
        if let Some(collection) = &item.collection {
            self.collections
                .write()
                .unwrap()
                .entry(collection.clone())
                .or_insert_with(|| CollectionInfo::new(collection.clone()));
        }
        self.items.write().unwrap().push(item);
    }

    /// Every search request received, oldest first
    pub fn searches(&self) -> Vec<SearchRequest> {
        self.searches.read().unwrap().clone()
    }

    fn matches(item: &Item, request: &SearchRequest) -> bool {
        if let Some(collections) = &request.collections {
            match &item.collection {
                Some(c) if collections.contains(c) => {}
                _ => return false,
            }
        }

        if let Some(range) = &request.datetime {
            match (item.acquired(), parse_range(range)) {
                (Some(dt), Some((start, end))) => {
                    if start.is_some_and(|s| dt < s) || end.is_some_and(|e| dt > e) {
                        return false;
                    }
                }
                _ => return false,
            }
        }

        let footprint = item.footprint();
        let search_boxes = [
            request.bbox.as_deref().and_then(bbox_from_slice),
            request.intersects.as_ref().and_then(geojson_bounds),
        ];
        for search_box in search_boxes.into_iter().flatten() {
            match footprint {
                Some(fp) if fp.intersection(&search_box).is_some() => {}
                _ => return false,
            }
        }

        if let Some(ids) = request.extra.get("ids").and_then(Value::as_array) {
            if !ids.iter().any(|id| id.as_str() == Some(item.id.as_str())) {
                return false;
            }
        }

        if let Some(query) = request.extra.get("query").and_then(Value::as_object) {
            for (property, ops) in query {
                if !matches_query(item.property_value(property).as_ref(), ops) {
                    return false;
                }
            }
        }

        true
    }
}

/// Parse `start/end` where either side may be open (`..` or empty)
fn parse_range(range: &str) -> Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let (start, end) = range.split_once('/').unwrap_or((range, range));
    Some((parse_bound(start, false)?, parse_bound(end, true)?))
}

fn parse_bound(s: &str, end_of_day: bool) -> Option<Option<DateTime<Utc>>> {
    let s = s.trim();
    if s.is_empty() || s == ".." {
        return Some(None);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(Some(dt.with_timezone(&Utc)));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let time = if end_of_day { date.and_hms_opt(23, 59, 59)? } else { date.and_hms_opt(0, 0, 0)? };
    Some(Some(time.and_utc()))
}

fn bbox_from_slice(values: &[f64]) -> Option<BBox> {
    match values {
        [a, b, c, d] => Some(BBox::new(*a, *b, *c, *d)),
        [a, b, _, d, e, _] => Some(BBox::new(*a, *b, *d, *e)),
        _ => None,
    }
}

/// Bounding box of a GeoJSON geometry by walking its coordinates
fn geojson_bounds(geometry: &Value) -> Option<BBox> {
    fn walk(value: &Value, acc: &mut Option<BBox>) {
        let Some(array) = value.as_array() else {
            return;
        };
        if let [Value::Number(x), Value::Number(y), ..] = array.as_slice() {
            if let (Some(x), Some(y)) = (x.as_f64(), y.as_f64()) {
                let point = BBox::new(x, y, x, y);
                *acc = Some(acc.map_or(point, |b| b.union(&point)));
            }
            return;
        }
        for child in array {
            walk(child, acc);
        }
    }

    let mut acc = None;
    if let Some(coords) = geometry.get("coordinates") {
        walk(coords, &mut acc);
    }
    if let Some(parts) = geometry.get("geometries").and_then(Value::as_array) {
        for part in parts {
            if let Some(b) = geojson_bounds(part) {
                acc = Some(acc.map_or(b, |a: BBox| a.union(&b)));
            }
        }
    }
    acc
}

/// STAC query extension operators: eq, neq, lt, lte, gt, gte, in
fn matches_query(value: Option<&Value>, ops: &Value) -> bool {
    let Some(ops) = ops.as_object() else {
        return value == Some(ops);
    };
    ops.iter().all(|(op, expected)| {
        let number = value.and_then(Value::as_f64);
        let bound = expected.as_f64();
        match op.as_str() {
            "eq" => value == Some(expected),
            "neq" => value != Some(expected),
            "lt" => matches!((number, bound), (Some(v), Some(b)) if v < b),
            "lte" => matches!((number, bound), (Some(v), Some(b)) if v <= b),
            "gt" => matches!((number, bound), (Some(v), Some(b)) if v > b),
            "gte" => matches!((number, bound), (Some(v), Some(b)) if v >= b),
            "in" => expected
                .as_array()
                .is_some_and(|options| value.is_some_and(|v| options.contains(v))),
            _ => false,
        }
    })
}

impl CatalogClient for MemoryCatalog {
    fn search(&self, request: &SearchRequest) -> Result<Vec<Item>> {
        self.searches.write().unwrap().push(request.clone());

        let items = self.items.read().unwrap();
        let mut matched: Vec<Item> =
            items.iter().filter(|item| Self::matches(item, request)).cloned().collect();

        if let Some(max) = request.max_items {
            matched.truncate(max);
        }
        Ok(matched)
    }

    fn collections(&self) -> Result<Vec<CollectionInfo>> {
        Ok(self.collections.read().unwrap().values().cloned().collect())
    }

    fn get_collection(&self, id: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.collections.read().unwrap().get(id).cloned())
    }

    fn get_item(&self, collection_id: &str, item_id: &str) -> Result<Option<Item>> {
        let items = self.items.read().unwrap();
        Ok(items
            .iter()
            .find(|item| item.id == item_id && item.collection.as_deref() == Some(collection_id))
            .cloned())
    }

    fn signer(&self) -> Option<&dyn RequestSigner> {
        None
    }
}

/// A [`MemoryCatalog`] handle with an optional signer attached
struct MemoryClient {
    catalog: MemoryCatalog,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl CatalogClient for MemoryClient {
    fn search(&self, request: &SearchRequest) -> Result<Vec<Item>> {
        self.catalog.search(request)
    }

    fn collections(&self) -> Result<Vec<CollectionInfo>> {
        self.catalog.collections()
    }

    fn get_collection(&self, id: &str) -> Result<Option<CollectionInfo>> {
        self.catalog.get_collection(id)
    }

    fn get_item(&self, collection_id: &str, item_id: &str) -> Result<Option<Item>> {
        self.catalog.get_item(collection_id, item_id)
    }

    fn signer(&self) -> Option<&dyn RequestSigner> {
        self.signer.as_deref()
    }
}

/// Connector serving one [`MemoryCatalog`] for every endpoint.
///
/// Counts how many times a client was opened, so callers can verify that
/// query construction stays offline.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    catalog: MemoryCatalog,
    signer: Option<Arc<dyn RequestSigner>>,
    opened: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self { catalog, signer: None, opened: Arc::new(AtomicUsize::new(0)) }
    }

    /// Attach `signer` to clients opened for endpoints that require signing
    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn catalog(&self) -> &MemoryCatalog {
        &self.catalog
    }

    /// Number of clients opened so far
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl CatalogConnector for MemoryConnector {
    fn open(&self, endpoint: &CatalogEndpoint) -> Result<Box<dyn CatalogClient>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let signer = if endpoint.requires_signing() { self.signer.clone() } else { None };
        if endpoint.requires_signing() && signer.is_none() {
            tracing::warn!("No URL signer available for {}", endpoint);
        }
        Ok(Box::new(MemoryClient { catalog: self.catalog.clone(), signer }))
    }
}

/// In-memory implementation of AssetReader keyed by href.
///
/// Unknown hrefs fail like an unreachable server; hrefs registered with
/// [`MemoryAssetReader::insert_corrupt`] fail like an undecodable file.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetReader {
    rasters: Arc<RwLock<HashMap<String, Option<SourceRaster>>>>,
    reads: Arc<RwLock<Vec<String>>>,
    windows: Arc<RwLock<Vec<(String, PixelWindow)>>>,
}

impl MemoryAssetReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, href: impl Into<String>, raster: SourceRaster) {
        self.rasters.write().unwrap().insert(href.into(), Some(raster));
    }

    /// Register an href whose bytes cannot be decoded
    pub fn insert_corrupt(&self, href: impl Into<String>) {
        self.rasters.write().unwrap().insert(href.into(), None);
    }

    /// Every href read in full so far, in order
    pub fn reads(&self) -> Vec<String> {
        self.reads.read().unwrap().clone()
    }

    /// Every windowed read so far, in order
    pub fn window_reads(&self) -> Vec<(String, PixelWindow)> {
        self.windows.read().unwrap().clone()
    }

    fn lookup(&self, href: &str) -> Result<SourceRaster> {
        match self.rasters.read().unwrap().get(href) {
            Some(Some(raster)) => Ok(raster.clone()),
            Some(None) => Err(OpengeoError::RasterIo {
                href: href.to_string(),
                reason: "not a TIFF file".to_string(),
            }),
            None => Err(OpengeoError::UpstreamUnavailable {
                url: href.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            }),
        }
    }
}

impl AssetReader for MemoryAssetReader {
    fn read(&self, href: &str) -> Result<SourceRaster> {
        self.reads.write().unwrap().push(href.to_string());
        self.lookup(href)
    }

    fn header(&self, href: &str) -> Result<RasterHeader> {
        Ok(self.lookup(href)?.header())
    }

    fn read_window(&self, href: &str, window: &PixelWindow) -> Result<SourceRaster> {
        self.windows.write().unwrap().push((href.to_string(), *window));
        Ok(self.lookup(href)?.window(window))
    }
}
