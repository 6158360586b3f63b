//! Integration tests for the in-memory catalog adapters

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use opengeo_core::catalogs;
use opengeo_core::models::{Asset, BBox, ItemBuilder, SearchRequest};
use opengeo_core::ports::{CatalogClient, CatalogConnector, RequestSigner};
use opengeo_stac::{MemoryCatalog, MemoryConnector, TokenSigner};
use serde_json::json;

fn landsat_catalog() -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    for day in 1..=4 {
        catalog.add_item(
            ItemBuilder::new(format!("LC09_{:02}", day))
                .collection("landsat-c2-l2")
                .bbox(BBox::new(-122.5, 37.5, -121.5, 38.5))
                .datetime(Utc.with_ymd_and_hms(2024, 6, day * 5, 18, 30, 0).unwrap())
                .property("eo:cloud_cover", json!(day as f64 * 10.0))
                .asset("red", Asset::new(format!("https://example.blob.core.windows.net/{}/red.tif", day)))
                .build(),
        );
    }
    catalog
}

#[test]
fn test_signing_endpoint_gets_connector_signer() {
    let signer: Arc<dyn RequestSigner> = Arc::new(TokenSigner::new("st=1&se=2&sig=abc"));
    let connector = MemoryConnector::new(landsat_catalog()).with_signer(signer);

    let client = connector.open(&catalogs::resolve("MICROSOFT").unwrap()).unwrap();
    let signer = client.signer().expect("signer attached");
    assert_eq!(
        signer.sign("https://example.blob.core.windows.net/1/red.tif").unwrap(),
        "https://example.blob.core.windows.net/1/red.tif?st=1&se=2&sig=abc"
    );

    let client = connector.open(&catalogs::resolve("ELEMENT84").unwrap()).unwrap();
    assert!(client.signer().is_none());
    assert_eq!(connector.open_count(), 2);
}

#[test]
fn test_combined_filters() {
    let connector = MemoryConnector::new(landsat_catalog());
    let client = connector.open(&catalogs::resolve("ELEMENT84").unwrap()).unwrap();

    let request = SearchRequest::new()
        .collections(vec!["landsat-c2-l2".into()])
        .datetime("2024-06-01T00:00:00Z/2024-06-15T23:59:59Z")
        .intersects(json!({"type": "Point", "coordinates": [-122.0, 38.0]}))
        .predicate("query", json!({"eo:cloud_cover": {"gte": 20, "lte": 30}}));

    let ids: Vec<String> = client.search(&request).unwrap().into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["LC09_02", "LC09_03"]);

    let searches = connector.catalog().searches();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0], request);
}

#[test]
fn test_disjoint_area_matches_nothing() {
    let catalog = landsat_catalog();
    let request = SearchRequest::new().intersects(json!({
        "type": "Polygon",
        "coordinates": [[[10.0, 10.0], [11.0, 10.0], [11.0, 11.0], [10.0, 10.0]]]
    }));
    let client: &dyn CatalogClient = &catalog;
    assert!(client.search(&request).unwrap().is_empty());
}
