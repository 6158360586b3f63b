//! Deferred ImageCollection queries.
//!
//! Builder methods validate their input and return a new collection with an
//! updated [`FilterSpec`]. Nothing here talks to the catalog until a terminal
//! call such as [`ImageCollection::mean`] or [`ImageCollection::size`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{Crs, Item, SearchRequest};
use opengeo_geo::Geometry;
use serde_json::Value;

use crate::image::Image;
use crate::materialize::Materializer;
use crate::reduce::{MosaicPolicy, TemporalReducer};
use crate::session::{Session, StackOptions};
use crate::stack::RasterStack;

/// Everything a query constrains. Owned values only, so clones are
/// independent.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub collection_id: String,
    /// Normalized RFC 3339 `(start, end)`, both inclusive
    pub time_range: Option<(String, String)>,
    pub spatial_filter: Option<Geometry>,
    /// Raw search-body predicates; later `filter` calls override earlier keys
    pub extra_predicates: BTreeMap<String, Value>,
    pub asset_subset: Option<Vec<String>>,
}

impl FilterSpec {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            time_range: None,
            spatial_filter: None,
            extra_predicates: BTreeMap::new(),
            asset_subset: None,
        }
    }

    /// STAC `datetime` interval, `start/end`
    pub fn datetime(&self) -> Option<String> {
        self.time_range.as_ref().map(|(start, end)| format!("{}/{}", start, end))
    }

    /// Search body carrying only the fields that are set.
    ///
    /// Predicates named like a structured search field (`bbox`, `datetime`,
    /// `intersects`, `limit`, `max_items`, `collections`) are routed into that
    /// field and take precedence over the builder's own value.
    pub fn to_search_request(&self, max_items: usize) -> Result<SearchRequest> {
        let mut request = SearchRequest::new()
            .collections(vec![self.collection_id.clone()])
            .max_items(max_items);
        if let Some(datetime) = self.datetime() {
            request = request.datetime(datetime);
        }
        if let Some(geometry) = &self.spatial_filter {
            request = request.intersects(geometry.to_crs(&Crs::wgs84())?.to_geojson()?);
        }

        for (key, value) in &self.extra_predicates {
            let invalid = |expected: &str| {
                OpengeoError::invalid_argument(key.clone(), format!("expected {}, got {}", expected, value))
            };
            match key.as_str() {
                "bbox" => {
                    let bbox: Vec<f64> = serde_json::from_value(value.clone())
                        .map_err(|_| invalid("an array of numbers"))?;
                    request.bbox = Some(bbox);
                }
                "datetime" => {
                    request.datetime = Some(value.as_str().ok_or_else(|| invalid("a string"))?.to_string());
                }
                "intersects" => request.intersects = Some(value.clone()),
                "limit" => {
                    let limit = value.as_u64().ok_or_else(|| invalid("a positive integer"))?;
                    request.limit = Some(u32::try_from(limit).map_err(|_| invalid("a page size"))?);
                }
                "max_items" => {
                    let max = value.as_u64().ok_or_else(|| invalid("a positive integer"))?;
                    request.max_items = Some(max as usize);
                }
                "collections" => {
                    let collections: Vec<String> = serde_json::from_value(value.clone())
                        .map_err(|_| invalid("an array of strings"))?;
                    request.collections = Some(collections);
                }
                _ => {
                    request.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(request)
    }

    /// Human readable summary of the active filters
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(datetime) = self.datetime() {
            parts.push(format!("datetime={}", datetime));
        }
        if let Some(geometry) = &self.spatial_filter {
            parts.push(format!("intersects={}", geometry));
        }
        for (key, value) in &self.extra_predicates {
            parts.push(format!("{}={}", key, value));
        }
        if let Some(bands) = &self.asset_subset {
            parts.push(format!("bands=[{}]", bands.join(", ")));
        }
        if parts.is_empty() {
            "{}".to_string()
        } else {
            format!("{{{}}}", parts.join(", "))
        }
    }
}

/// Parse an ISO date or RFC 3339 timestamp into UTC. Date-only values mean
/// the start of the day, or its last second when `end_of_day` is set.
fn parse_instant(name: &str, value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        OpengeoError::invalid_argument(name, format!("'{}' is not a YYYY-MM-DD date or RFC 3339 timestamp", value))
    })?;
    let time = if end_of_day { date.and_hms_opt(23, 59, 59) } else { date.and_hms_opt(0, 0, 0) };
    time.map(|t| t.and_utc())
        .ok_or_else(|| OpengeoError::invalid_argument(name, format!("'{}' is out of range", value)))
}

/// A deferred query against one catalog collection
#[derive(Debug, Clone)]
pub struct ImageCollection {
    session: Session,
    spec: FilterSpec,
    options: StackOptions,
}

impl ImageCollection {
    pub fn new(session: Session, collection_id: impl Into<String>) -> Self {
        let options = session.stack_options();
        Self { session, spec: FilterSpec::new(collection_id), options }
    }

    fn with_spec(&self, spec: FilterSpec) -> Self {
        Self { session: self.session.clone(), spec, options: self.options }
    }

    pub fn filter_spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stack_options(&self) -> StackOptions {
        self.options
    }

    /// Restrict to acquisitions between `start` and `end`, both inclusive
    pub fn filter_date(&self, start: &str, end: &str) -> Result<Self> {
        let from = parse_instant("start", start, false)?;
        let to = parse_instant("end", end, true)?;
        if from > to {
            return Err(OpengeoError::invalid_argument(
                "end",
                format!("end {} is before start {}", end, start),
            ));
        }

        let mut spec = self.spec.clone();
        spec.time_range = Some((
            from.to_rfc3339_opts(SecondsFormat::Secs, true),
            to.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        tracing::debug!("filter_date {}: {:?}", self.spec.collection_id, spec.time_range);
        Ok(self.with_spec(spec))
    }

    /// Restrict to items intersecting `geometry`; stacks are clipped to it
    pub fn filter_bounds(&self, geometry: &Geometry) -> Result<Self> {
        geometry.is_valid().into_result()?;
        geometry.bbox()?;

        let mut spec = self.spec.clone();
        spec.spatial_filter = Some(geometry.clone());
        Ok(self.with_spec(spec))
    }

    /// Merge raw search predicates, such as `query` or `filter`
    pub fn filter<I, K>(&self, predicates: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut spec = self.spec.clone();
        for (key, value) in predicates {
            let key = key.into();
            if key.trim().is_empty() {
                return Err(OpengeoError::invalid_argument("predicate", "keys must not be empty"));
            }
            spec.extra_predicates.insert(key, value);
        }
        Ok(self.with_spec(spec))
    }

    /// Choose which assets become bands. Narrowing an existing selection
    /// requires the bands to be part of it.
    pub fn select<S: AsRef<str>>(&self, bands: &[S]) -> Result<Self> {
        if bands.is_empty() {
            return Err(OpengeoError::invalid_argument("bands", "select needs at least one band name"));
        }
        let mut selected: Vec<String> = Vec::with_capacity(bands.len());
        for band in bands {
            let band = band.as_ref().trim();
            if band.is_empty() {
                return Err(OpengeoError::invalid_argument("bands", "band names must not be empty"));
            }
            if let Some(current) = &self.spec.asset_subset {
                if !current.iter().any(|b| b == band) {
                    return Err(OpengeoError::BandNotFound {
                        band: band.to_string(),
                        available: current.clone(),
                    });
                }
            }
            if !selected.iter().any(|b| b == band) {
                selected.push(band.to_string());
            }
        }

        let mut spec = self.spec.clone();
        spec.asset_subset = Some(selected);
        Ok(self.with_spec(spec))
    }

    /// Use other stacking options for terminal calls
    pub fn with_stack_options(&self, options: StackOptions) -> Self {
        Self { session: self.session.clone(), spec: self.spec.clone(), options }
    }

    fn materializer(&self) -> Materializer<'_> {
        Materializer::new(&self.session, self.options)
    }

    /// Number of matching items
    pub fn size(&self) -> Result<usize> {
        Ok(self.materializer().search(&self.spec, self.session.max_items())?.len())
    }

    /// The matching items
    pub fn get_info(&self) -> Result<Vec<Item>> {
        self.materializer().search(&self.spec, self.session.max_items())
    }

    /// Search and stack without reducing
    pub fn materialize(&self) -> Result<RasterStack> {
        self.materializer().materialize(&self.spec, self.session.max_items())
    }

    pub fn reduce(&self, reducer: TemporalReducer) -> Result<Image> {
        reducer.apply(&self.materialize()?)
    }

    pub fn mean(&self) -> Result<Image> {
        self.reduce(TemporalReducer::Mean)
    }

    pub fn median(&self) -> Result<Image> {
        self.reduce(TemporalReducer::Median)
    }

    pub fn min(&self) -> Result<Image> {
        self.reduce(TemporalReducer::Min)
    }

    pub fn max(&self) -> Result<Image> {
        self.reduce(TemporalReducer::Max)
    }

    /// Non-missing observations per pixel
    pub fn count(&self) -> Result<Image> {
        self.reduce(TemporalReducer::Count)
    }

    /// Highest observed value per pixel
    pub fn mosaic(&self) -> Result<Image> {
        self.mosaic_with(MosaicPolicy::default())
    }

    pub fn mosaic_with(&self, policy: MosaicPolicy) -> Result<Image> {
        self.reduce(TemporalReducer::Mosaic(policy))
    }

    /// A single matching item, as returned first by the catalog
    pub fn first(&self) -> Result<Image> {
        TemporalReducer::First.apply(&self.materializer().materialize(&self.spec, 1)?)
    }
}

impl fmt::Display for ImageCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageCollection({}, {})", self.spec.collection_id, self.spec.describe())
    }
}
