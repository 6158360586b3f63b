//! Property tests for geometry construction and set operations

use opengeo_core::models::BBox;
use opengeo_geo::Geometry;
use proptest::prelude::*;

fn rect_strategy() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (-170.0f64..170.0, -80.0f64..80.0, 0.01f64..10.0, 0.01f64..10.0)
        .prop_map(|(x, y, w, h)| (x, y, x + w, y + h))
}

proptest! {
    #[test]
    fn rectangle_bbox_matches_corners((x0, y0, x1, y1) in rect_strategy()) {
        let rect = Geometry::rectangle(x0, y0, x1, y1).unwrap();
        prop_assert_eq!(rect.bbox().unwrap(), BBox::new(x0, y0, x1, y1));
    }

    #[test]
    fn intersection_is_within_both_operands(a in rect_strategy(), b in rect_strategy()) {
        let ga = Geometry::rectangle(a.0, a.1, a.2, a.3).unwrap();
        let gb = Geometry::rectangle(b.0, b.1, b.2, b.3).unwrap();
        let before = ga.clone();

        let inter = ga.intersection(&gb).unwrap();
        if let Ok(bbox) = inter.bbox() {
            let eps = 1e-9;
            prop_assert!(bbox.min_x >= a.0.max(b.0) - eps);
            prop_assert!(bbox.max_x <= a.2.min(b.2) + eps);
            prop_assert!(bbox.min_y >= a.1.max(b.1) - eps);
            prop_assert!(bbox.max_y <= a.3.min(b.3) + eps);
        }

        // Operations never modify their inputs
        prop_assert_eq!(ga, before);
    }

    #[test]
    fn union_bbox_covers_both(a in rect_strategy(), b in rect_strategy()) {
        let ga = Geometry::rectangle(a.0, a.1, a.2, a.3).unwrap();
        let gb = Geometry::rectangle(b.0, b.1, b.2, b.3).unwrap();
        let union = ga.union(&gb).unwrap().bbox().unwrap();
        let expected = BBox::new(a.0, a.1, a.2, a.3).union(&BBox::new(b.0, b.1, b.2, b.3));
        let eps = 1e-9;
        prop_assert!((union.min_x - expected.min_x).abs() < eps);
        prop_assert!((union.max_y - expected.max_y).abs() < eps);
    }
}

#[test]
fn test_bounds_of_triangle_is_rectangle() {
    let triangle = Geometry::polygon(vec![(0.0, 0.0), (4.0, 0.0), (0.0, 2.0)]).unwrap();
    let bounds = triangle.bounds().unwrap();
    assert_eq!(bounds.bbox().unwrap(), BBox::new(0.0, 0.0, 4.0, 2.0));
    assert!(bounds.covers_point(3.9, 1.9));
    assert!(!triangle.covers_point(3.9, 1.9));
}
