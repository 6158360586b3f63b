//! End-to-end queries against in-memory catalog and raster adapters

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ndarray::{array, Array2};
use opengeo_core::catalogs::CatalogEndpoint;
use opengeo_core::models::{Asset, BBox, Crs, GeoTransform, ItemBuilder, SourceRaster};
use opengeo_engine::{
    AlignmentPolicy, Geometry, Image, ImageCollection, ImageSource, MosaicPolicy, OpengeoError, Session,
    SpatialReducer, StackOptions,
};
use opengeo_stac::{MemoryAssetReader, MemoryCatalog, MemoryConnector};
use serde_json::json;

struct Fixture {
    connector: MemoryConnector,
    reader: MemoryAssetReader,
}

impl Fixture {
    fn new() -> Self {
        Self { connector: MemoryConnector::new(MemoryCatalog::new()), reader: MemoryAssetReader::new() }
    }

    /// Add an item whose assets are 2x2 WGS84 rasters covering (0, 0)..(2, 2)
    fn add(&self, id: &str, day: u32, bands: &[(&str, Array2<f64>)]) {
        let mut item = ItemBuilder::new(id)
            .collection("landsat")
            .bbox(BBox::new(0.0, 0.0, 2.0, 2.0))
            .datetime(Utc.with_ymd_and_hms(2024, 6, day, 10, 0, 0).unwrap())
            .property("eo:cloud_cover", json!(day));
        for (band, values) in bands {
            let href = format!("https://data.example.com/{}/{}.tif", id, band);
            item = item.asset(*band, Asset::new(href.clone()));
            self.reader.insert(
                href,
                SourceRaster::new(values.clone(), GeoTransform::new(0.0, 2.0, 1.0, -1.0), Some(Crs::wgs84())),
            );
        }
        self.connector.catalog().add_item(item.build());
    }

    /// Add an item on day 4 whose single `red` asset is at `href`
    fn add_unregistered(&self, id: &str, href: &str) {
        self.connector.catalog().add_item(
            ItemBuilder::new(id)
                .collection("landsat")
                .bbox(BBox::new(0.0, 0.0, 2.0, 2.0))
                .datetime(Utc.with_ymd_and_hms(2024, 6, 4, 10, 0, 0).unwrap())
                .asset("red", Asset::new(href))
                .build(),
        );
    }

    fn session(&self) -> Session {
        Session::with_reader(
            CatalogEndpoint::default(),
            Arc::new(self.connector.clone()),
            Arc::new(self.reader.clone()),
        )
    }

    fn collection(&self) -> ImageCollection {
        self.session().image_collection("landsat")
    }
}

fn three_scenes() -> Fixture {
    let fixture = Fixture::new();
    fixture.add("t1", 1, &[("red", array![[1.0, 2.0], [3.0, 4.0]])]);
    fixture.add("t2", 2, &[("red", array![[2.0, 2.0], [2.0, 2.0]])]);
    fixture.add("t3", 3, &[("red", array![[3.0, 4.0], [5.0, 6.0]])]);
    fixture
}

fn assert_close(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-6, "expected {}, got {}", expected, actual);
}

#[test]
fn test_mean_and_max_over_time() {
    let fixture = three_scenes();
    let red = fixture.collection().filter_date("2024-06-01", "2024-06-30").unwrap().select(&["red"]).unwrap();

    let mean = red.mean().unwrap();
    assert_eq!(mean.band_names(), vec!["red".to_string()]);
    let expected = [[2.0, 8.0 / 3.0], [10.0 / 3.0, 4.0]];
    for (row, values) in expected.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            assert_close(mean.data()[[0, row, col]], *value);
        }
    }

    let max = red.max().unwrap();
    assert_eq!(max.data(), &array![[[3.0, 4.0], [5.0, 6.0]]]);
    assert_eq!(red.mosaic().unwrap(), max);
    assert_eq!(red.min().unwrap().data(), &array![[[1.0, 2.0], [2.0, 2.0]]]);
    assert_eq!(red.median().unwrap().data(), &array![[[2.0, 2.0], [3.0, 4.0]]]);
}

#[test]
fn test_mosaic_policies_and_first() {
    let fixture = three_scenes();
    let red = fixture.collection().select(&["red"]).unwrap();

    assert_eq!(red.mosaic_with(MosaicPolicy::First).unwrap().data(), &array![[[1.0, 2.0], [3.0, 4.0]]]);
    assert_eq!(red.mosaic_with(MosaicPolicy::Last).unwrap().data(), &array![[[3.0, 4.0], [5.0, 6.0]]]);

    let first = red.first().unwrap();
    assert_eq!(first.data(), &array![[[1.0, 2.0], [3.0, 4.0]]]);
    assert_eq!(fixture.connector.catalog().searches().last().unwrap().max_items, Some(1));
}

#[test]
fn test_count_over_time_skips_missing() {
    let fixture = three_scenes();
    fixture.add("t4", 4, &[("red", array![[f64::NAN, 1.0], [1.0, 1.0]])]);
    let count = fixture.collection().count().unwrap();
    assert_eq!(count.data(), &array![[[3.0, 4.0], [4.0, 4.0]]]);
}

#[test]
fn test_ndvi_from_a_single_scene() {
    let fixture = Fixture::new();
    fixture.add(
        "s1",
        1,
        &[("nir", array![[0.8, 0.5], [0.8, 0.5]]), ("red", array![[0.2, 0.5], [0.2, 0.5]])],
    );

    let composite = fixture.collection().select(&["nir", "red"]).unwrap().median().unwrap();
    let ndvi = composite.normalized_difference(&["nir", "red"]).unwrap();
    assert_eq!(ndvi.band_names(), vec!["nd".to_string()]);
    assert_close(ndvi.data()[[0, 0, 0]], 0.6);
    assert_close(ndvi.data()[[0, 0, 1]], 0.0);

    let manual = composite
        .select(&["nir"])
        .unwrap()
        .subtract(&composite.select(&["red"]).unwrap())
        .unwrap()
        .divide(&composite.select(&["nir"]).unwrap().add(&composite.select(&["red"]).unwrap()).unwrap())
        .unwrap();
    assert_close(manual.data()[[0, 1, 0]], 0.6);
}

#[test]
fn test_single_scene_reduction_is_identity() {
    let fixture = Fixture::new();
    let values = array![[7.0, 8.0], [9.0, 10.0]];
    fixture.add("only", 5, &[("red", values.clone())]);
    let collection = fixture.collection();
    for image in [collection.mean().unwrap(), collection.median().unwrap(), collection.first().unwrap()] {
        assert_eq!(image.data().index_axis(ndarray::Axis(0), 0), values);
    }
}

#[test]
fn test_divide_by_zero_pixels_are_skipped_in_region_mean() {
    let fixture = Fixture::new();
    fixture.add("s1", 1, &[("a", array![[2.0, 4.0], [6.0, 8.0]]), ("b", array![[1.0, 2.0], [0.0, 4.0]])]);
    let image = fixture.collection().first().unwrap();

    let ratio = image.select(&["a"]).unwrap().divide(&image.select(&["b"]).unwrap()).unwrap();
    assert!(!ratio.data()[[0, 1, 0]].is_finite());

    let stats = ratio.reduce_region(SpatialReducer::Mean, None, None).unwrap();
    assert_close(stats["constant"].unwrap(), 2.0);
    let count = ratio.reduce_region(SpatialReducer::Count, None, None).unwrap();
    assert_eq!(count["constant"], Some(3.0));
}

#[test]
fn test_region_outside_raster_reports_none() {
    let fixture = three_scenes();
    let image = fixture.collection().mean().unwrap();
    let far = Geometry::rectangle(40.0, 40.0, 41.0, 41.0).unwrap();

    let stats = image.reduce_region(SpatialReducer::Mean, Some(&far), None).unwrap();
    assert_eq!(stats.get("red"), Some(&None));

    let inside = Geometry::rectangle(0.1, 1.1, 0.9, 1.9).unwrap();
    let stats = image.reduce_region(SpatialReducer::Max, Some(&inside), None).unwrap();
    assert_eq!(stats["red"], Some(2.0));
}

#[test]
fn test_filter_bounds_clips_the_stack() {
    let fixture = three_scenes();
    let aoi = Geometry::rectangle(1.2, 0.2, 1.8, 0.8).unwrap();
    let image = fixture.collection().filter_bounds(&aoi).unwrap().max().unwrap();
    assert_eq!(image.data().shape(), &[1, 1, 1]);
    assert_eq!(image.data()[[0, 0, 0]], 6.0);
}

#[test]
fn test_empty_result_names_the_filters() {
    let fixture = three_scenes();
    let result = fixture.collection().filter_date("2023-01-01", "2023-01-31").unwrap().mean();
    match result {
        Err(OpengeoError::EmptyResult { collection, filters }) => {
            assert_eq!(collection, "landsat");
            assert!(filters.contains("2023-01-01"));
        }
        other => panic!("expected EmptyResult, got {:?}", other),
    }
    assert_eq!(fixture.collection().filter_date("2023-01-01", "2023-01-31").unwrap().size().unwrap(), 0);
}

#[test]
fn test_alignment_policies() {
    let fixture = three_scenes();
    fixture.add_unregistered("broken", "https://data.example.com/broken/red.tif");
    fixture.reader.insert_corrupt("https://data.example.com/broken/red.tif");
    let red = fixture.collection().filter_date("2024-06-02", "2024-06-04").unwrap().select(&["red"]).unwrap();

    let strict = red.with_stack_options(StackOptions::new().with_alignment(AlignmentPolicy::Strict));
    match strict.mean() {
        Err(OpengeoError::AlignmentFailure { dropped, total, .. }) => assert_eq!((dropped, total), (1, 3)),
        other => panic!("expected AlignmentFailure, got {:?}", other),
    }

    let lenient = red.mean().unwrap();
    assert_eq!(lenient.dropped_items(), 1);
    assert_eq!(lenient.get_info().dropped_items, 1);
}

#[test]
fn test_unreachable_asset_fails_under_either_policy() {
    let fixture = three_scenes();
    fixture.add_unregistered("offline", "https://data.example.com/offline/red.tif");
    let red = fixture.collection().filter_date("2024-06-02", "2024-06-04").unwrap().select(&["red"]).unwrap();

    assert!(matches!(red.mean(), Err(OpengeoError::UpstreamUnavailable { .. })));
    let strict = red.with_stack_options(StackOptions::new().with_alignment(AlignmentPolicy::Strict));
    assert!(matches!(strict.mean(), Err(OpengeoError::UpstreamUnavailable { .. })));
}

#[test]
fn test_building_a_query_does_no_io() {
    let fixture = three_scenes();
    let _query = fixture
        .collection()
        .filter_date("2024-06-01", "2024-06-30")
        .unwrap()
        .filter_bounds(&Geometry::point(1.0, 1.0).unwrap())
        .unwrap()
        .filter([("query", json!({"eo:cloud_cover": {"lt": 3}}))])
        .unwrap()
        .select(&["red"])
        .unwrap();
    assert_eq!(fixture.connector.open_count(), 0);
    assert!(fixture.reader.reads().is_empty());
    assert!(fixture.reader.window_reads().is_empty());
}

#[test]
fn test_query_predicates_reach_the_catalog() {
    let fixture = three_scenes();
    let cloudy = fixture.collection().filter([("query", json!({"eo:cloud_cover": {"lt": 3}}))]).unwrap();
    let ids: Vec<String> = cloudy.get_info().unwrap().into_iter().map(|item| item.id).collect();
    assert_eq!(ids, vec!["t1".to_string(), "t2".to_string()]);
    assert_eq!(cloudy.size().unwrap(), 2);
}

#[test]
fn test_band_missing_from_every_item() {
    let fixture = three_scenes();
    let result = fixture.collection().select(&["swir16"]).unwrap().mean();
    match result {
        Err(OpengeoError::BandNotFound { band, available }) => {
            assert_eq!(band, "swir16");
            assert!(available.contains(&"red".to_string()));
        }
        other => panic!("expected BandNotFound, got {:?}", other),
    }
}

#[test]
fn test_geotiff_roundtrip_through_image_source() {
    let fixture = three_scenes();
    let mean = fixture.collection().mean().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mean.tif");
    mean.to_file(&path, None, None, None).unwrap();

    let reread = Image::from_source(ImageSource::Path(path)).unwrap();
    assert_eq!(reread.band_names(), vec!["b1".to_string()]);
    assert_eq!(reread.grid().unwrap().width, 2);
    for (a, b) in reread.data().iter().zip(mean.data().iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_png_export_of_a_composite() {
    let fixture = three_scenes();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("max.png");
    fixture.collection().max().unwrap().to_file(&path, Some(0.0), Some(6.0), None).unwrap();
    assert!(path.exists());
}
