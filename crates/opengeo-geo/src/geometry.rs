//! Immutable spatial shapes tagged with a coordinate reference system.

use std::fmt;

use geo::{Area, BoundingRect, BooleanOps, Buffer, Intersects, MultiPolygon, Polygon, Rect};
use geo::Geometry as GeoGeometry;
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{BBox, Crs};
use serde_json::Value;

use crate::transform::{self, Transformer};
use crate::validation::{self, ValidationResult};

/// A shape plus the CRS its coordinates are expressed in
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    shape: GeoGeometry<f64>,
    crs: Crs,
}

impl Geometry {
    /// Wrap an existing shape without validation
    pub fn new(shape: GeoGeometry<f64>, crs: Crs) -> Self {
        Self { shape, crs }
    }

    pub fn point(x: f64, y: f64) -> Result<Self> {
        Self::validated(GeoGeometry::Point(geo::Point::new(x, y)))
    }

    /// Polygon from its exterior ring; the ring is closed if needed
    pub fn polygon(exterior: Vec<(f64, f64)>) -> Result<Self> {
        let ring = geo::LineString::from(exterior);
        Self::validated(GeoGeometry::Polygon(Polygon::new(ring, vec![])))
    }

    /// Axis-aligned rectangle `[x_min, y_min, x_max, y_max]`
    pub fn rectangle(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Result<Self> {
        if x_min > x_max || y_min > y_max {
            return Err(OpengeoError::InvalidGeometry {
                reason: format!(
                    "Rectangle minimum ({}, {}) exceeds maximum ({}, {})",
                    x_min, y_min, x_max, y_max
                ),
            });
        }
        let rect = Rect::new(geo::coord! { x: x_min, y: y_min }, geo::coord! { x: x_max, y: y_max });
        Self::validated(GeoGeometry::Polygon(rect.to_polygon()))
    }

    pub fn line_string(coords: Vec<(f64, f64)>) -> Result<Self> {
        Self::validated(GeoGeometry::LineString(geo::LineString::from(coords)))
    }

    /// Parse a GeoJSON geometry object, or the geometry of a Feature
    pub fn from_geojson(value: &Value) -> Result<Self> {
        let parsed = geojson::GeoJson::from_json_value(value.clone()).map_err(|e| {
            OpengeoError::InvalidGeometry { reason: format!("Invalid GeoJSON: {}", e) }
        })?;

        let geometry = match parsed {
            geojson::GeoJson::Geometry(geometry) => geometry,
            geojson::GeoJson::Feature(feature) => {
                feature.geometry.ok_or_else(|| OpengeoError::InvalidGeometry {
                    reason: "Feature has no geometry".to_string(),
                })?
            }
            geojson::GeoJson::FeatureCollection(_) => {
                return Err(OpengeoError::InvalidGeometry {
                    reason: "Expected a Geometry or Feature, found a FeatureCollection".to_string(),
                })
            }
        };

        let shape = GeoGeometry::<f64>::try_from(geometry).map_err(|e| {
            OpengeoError::InvalidGeometry { reason: format!("Unsupported GeoJSON geometry: {}", e) }
        })?;

        Self::validated(shape)
    }

    fn validated(shape: GeoGeometry<f64>) -> Result<Self> {
        validation::validate_geometry(&shape).into_result()?;
        Ok(Self::new(shape, Crs::wgs84()))
    }

    /// Same shape with a different CRS tag; coordinates are not touched
    pub fn with_crs(&self, crs: Crs) -> Self {
        Self { shape: self.shape.clone(), crs }
    }

    pub fn shape(&self) -> &GeoGeometry<f64> {
        &self.shape
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn geometry_type(&self) -> &'static str {
        match &self.shape {
            GeoGeometry::Point(_) => "Point",
            GeoGeometry::Line(_) | GeoGeometry::LineString(_) => "LineString",
            GeoGeometry::Polygon(_) | GeoGeometry::Rect(_) | GeoGeometry::Triangle(_) => "Polygon",
            GeoGeometry::MultiPoint(_) => "MultiPoint",
            GeoGeometry::MultiLineString(_) => "MultiLineString",
            GeoGeometry::MultiPolygon(_) => "MultiPolygon",
            GeoGeometry::GeometryCollection(_) => "GeometryCollection",
        }
    }

    pub fn is_valid(&self) -> ValidationResult {
        validation::validate_geometry(&self.shape)
    }

    /// Bounding box in the geometry's own CRS
    pub fn bbox(&self) -> Result<BBox> {
        let rect = self.shape.bounding_rect().ok_or_else(|| OpengeoError::InvalidGeometry {
            reason: format!("{} is empty and has no bounds", self.geometry_type()),
        })?;
        Ok(BBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }

    /// Bounding box as a polygon
    pub fn bounds(&self) -> Result<Geometry> {
        let b = self.bbox()?;
        let rect = Rect::new(geo::coord! { x: b.min_x, y: b.min_y }, geo::coord! { x: b.max_x, y: b.max_y });
        Ok(Self::new(GeoGeometry::Polygon(rect.to_polygon()), self.crs.clone()))
    }

    /// Bounding box reprojected to WGS84 longitude/latitude
    pub fn bbox_wgs84(&self) -> Result<BBox> {
        transform::transform_bbox(&self.bbox()?, &self.crs, &Crs::wgs84())
    }

    /// Grow (or shrink, when negative) by `distance` in CRS units
    pub fn buffer(&self, distance: f64) -> Result<Geometry> {
        if !distance.is_finite() {
            return Err(OpengeoError::invalid_argument("distance", "buffer distance must be finite"));
        }
        let buffered = self.shape.buffer(distance);
        Ok(Self::new(simplify_multi(buffered), self.crs.clone()))
    }

    /// Areal intersection; `other` is reprojected into this geometry's CRS
    pub fn intersection(&self, other: &Geometry) -> Result<Geometry> {
        let (a, b) = self.areal_pair(other)?;
        Ok(Self::new(simplify_multi(a.intersection(&b)), self.crs.clone()))
    }

    /// Areal union; `other` is reprojected into this geometry's CRS
    pub fn union(&self, other: &Geometry) -> Result<Geometry> {
        let (a, b) = self.areal_pair(other)?;
        Ok(Self::new(simplify_multi(a.union(&b)), self.crs.clone()))
    }

    fn areal_pair(&self, other: &Geometry) -> Result<(MultiPolygon<f64>, MultiPolygon<f64>)> {
        let other = other.to_crs(&self.crs)?;
        Ok((areal(&self.shape)?, areal(&other.shape)?))
    }

    /// Reproject into another CRS
    pub fn to_crs(&self, crs: &Crs) -> Result<Geometry> {
        if transform::crs_match(&self.crs, crs) {
            return Ok(self.clone());
        }
        let shape = Transformer::new(&self.crs, crs)?.convert_geometry(&self.shape)?;
        Ok(Self::new(shape, crs.clone()))
    }

    /// Whether the geometry touches an axis-aligned box (boundary included)
    pub fn intersects_bbox(&self, bbox: &BBox) -> bool {
        let rect = Rect::new(
            geo::coord! { x: bbox.min_x, y: bbox.min_y },
            geo::coord! { x: bbox.max_x, y: bbox.max_y },
        );
        self.shape.intersects(&rect)
    }

    /// Whether the geometry shares a non-zero area with a grid cell.
    ///
    /// Polygons that meet the cell only along its edges or at a corner do
    /// not overlap it. Points and lines have no area, so for them any
    /// contact counts.
    pub fn overlaps_cell(&self, cell: &BBox) -> bool {
        if !self.intersects_bbox(cell) {
            return false;
        }
        let Ok(shape) = areal(&self.shape) else {
            return true;
        };
        let (cx, cy) = ((cell.min_x + cell.max_x) / 2.0, (cell.min_y + cell.max_y) / 2.0);
        if self.covers_point(cx, cy) {
            return true;
        }
        let rect = Rect::new(
            geo::coord! { x: cell.min_x, y: cell.min_y },
            geo::coord! { x: cell.max_x, y: cell.max_y },
        );
        let overlap = shape.intersection(&MultiPolygon::new(vec![rect.to_polygon()])).unsigned_area();
        overlap > cell.width() * cell.height() * 1e-9
    }

    /// Whether a coordinate lies inside or on the geometry
    pub fn covers_point(&self, x: f64, y: f64) -> bool {
        self.shape.intersects(&geo::coord! { x: x, y: y })
    }

    /// GeoJSON geometry object
    pub fn to_geojson(&self) -> Result<Value> {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.shape));
        Ok(serde_json::to_value(&geometry)?)
    }

    /// Introspection snapshot; same as [`Geometry::to_geojson`]
    pub fn get_info(&self) -> Result<Value> {
        self.to_geojson()
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bbox() {
            Ok(b) => write!(
                f,
                "Geometry({}, {}, bbox=[{}, {}, {}, {}])",
                self.geometry_type(),
                self.crs,
                b.min_x,
                b.min_y,
                b.max_x,
                b.max_y
            ),
            Err(_) => write!(f, "Geometry({}, {}, empty)", self.geometry_type(), self.crs),
        }
    }
}

fn areal(shape: &GeoGeometry<f64>) -> Result<MultiPolygon<f64>> {
    match shape {
        GeoGeometry::Polygon(p) => Ok(MultiPolygon::new(vec![p.clone()])),
        GeoGeometry::MultiPolygon(mp) => Ok(mp.clone()),
        GeoGeometry::Rect(r) => Ok(MultiPolygon::new(vec![r.to_polygon()])),
        GeoGeometry::Triangle(t) => Ok(MultiPolygon::new(vec![t.to_polygon()])),
        _ => Err(OpengeoError::InvalidGeometry {
            reason: "Boolean operations require Polygon or MultiPolygon operands".to_string(),
        }),
    }
}

/// A one-part multipolygon collapses to a plain polygon
fn simplify_multi(mut mp: MultiPolygon<f64>) -> GeoGeometry<f64> {
    if mp.0.len() == 1 {
        if let Some(poly) = mp.0.pop() {
            return GeoGeometry::Polygon(poly);
        }
    }
    GeoGeometry::MultiPolygon(mp)
}
