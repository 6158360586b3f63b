use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a STAC Item Search (`POST /search`).
///
/// Fields left `None` are omitted from the request rather than sent as
/// wildcards. Provider-specific predicates (`query`, `filter`, `sortby`, ...)
/// are flattened into the body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    /// Page size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,

    /// Client-side cap on the total number of items collected across pages
    #[serde(skip)]
    pub max_items: Option<usize>,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collections(mut self, collections: Vec<String>) -> Self {
        self.collections = Some(collections);
        self
    }

    pub fn datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn intersects(mut self, geometry: Value) -> Self {
        self.intersects = Some(geometry);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Merge a predicate into the body, replacing any earlier value for the key
    pub fn predicate(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_fields_are_omitted() {
        let body = serde_json::to_value(SearchRequest::new().collections(vec!["c".into()])).unwrap();
        assert_eq!(body, json!({"collections": ["c"]}));
    }

    #[test]
    fn test_predicates_are_flattened() {
        let request = SearchRequest::new()
            .datetime("2023-01-01/2023-06-30")
            .predicate("query", json!({"platform": {"eq": "landsat-8"}}))
            .max_items(5);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["datetime"], "2023-01-01/2023-06-30");
        assert_eq!(body["query"]["platform"]["eq"], "landsat-8");
        assert!(body.get("max_items").is_none());
    }
}
