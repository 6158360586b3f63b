//! Structural geometry checks used at API boundaries.

use geo::Geometry as GeoGeometry;
use opengeo_core::error::{OpengeoError, Result};

/// Validation result with details
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Validation error with location details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub location: String,
    pub reason: String,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self { is_valid: true, errors: Vec::new() }
    }

    pub fn add_error(&mut self, location: String, reason: String) {
        self.is_valid = false;
        self.errors.push(ValidationError { location, reason });
    }

    fn absorb(&mut self, prefix: &str, other: ValidationResult) {
        for error in other.errors {
            self.add_error(format!("{}.{}", prefix, error.location), error.reason);
        }
    }

    /// Convert into an error carrying the first problem found
    pub fn into_result(self) -> Result<()> {
        if self.is_valid {
            return Ok(());
        }
        let reason = self
            .errors
            .first()
            .map(|e| format!("{}: {}", e.location, e.reason))
            .unwrap_or_else(|| "Invalid geometry".to_string());
        Err(OpengeoError::InvalidGeometry { reason })
    }
}

/// Validate a geometry
pub fn validate_geometry(geometry: &GeoGeometry<f64>) -> ValidationResult {
    match geometry {
        GeoGeometry::Point(p) => validate_coords("Point", std::iter::once(p.0)),
        GeoGeometry::Line(l) => validate_coords("Line", [l.start, l.end].into_iter()),
        GeoGeometry::LineString(ls) => validate_linestring(ls),
        GeoGeometry::Polygon(poly) => validate_polygon(poly),
        GeoGeometry::MultiPoint(mp) => {
            let mut result = ValidationResult::valid();
            if mp.0.is_empty() {
                result.add_error("MultiPoint".to_string(), "Geometry is empty".to_string());
            }
            result.absorb("MultiPoint", validate_coords("points", mp.0.iter().map(|p| p.0)));
            result
        }
        GeoGeometry::MultiLineString(mls) => {
            let mut result = ValidationResult::valid();
            if mls.0.is_empty() {
                result.add_error("MultiLineString".to_string(), "Geometry is empty".to_string());
            }
            for (i, ls) in mls.0.iter().enumerate() {
                result.absorb(&format!("MultiLineString[{}]", i), validate_linestring(ls));
            }
            result
        }
        GeoGeometry::MultiPolygon(mp) => {
            let mut result = ValidationResult::valid();
            if mp.0.is_empty() {
                result.add_error("MultiPolygon".to_string(), "Geometry is empty".to_string());
            }
            for (i, poly) in mp.0.iter().enumerate() {
                result.absorb(&format!("MultiPolygon[{}]", i), validate_polygon(poly));
            }
            result
        }
        GeoGeometry::GeometryCollection(gc) => {
            let mut result = ValidationResult::valid();
            if gc.0.is_empty() {
                result.add_error("GeometryCollection".to_string(), "Geometry is empty".to_string());
            }
            for (i, g) in gc.0.iter().enumerate() {
                result.absorb(&format!("GeometryCollection[{}]", i), validate_geometry(g));
            }
            result
        }
        GeoGeometry::Rect(r) => {
            let mut result = validate_coords("Rect", [r.min(), r.max()].into_iter());
            if r.width() <= 0.0 || r.height() <= 0.0 {
                result.add_error("Rect".to_string(), "Rectangle has zero area".to_string());
            }
            result
        }
        GeoGeometry::Triangle(t) => validate_coords("Triangle", t.to_array().into_iter()),
    }
}

fn validate_coords(location: &str, coords: impl Iterator<Item = geo::Coord<f64>>) -> ValidationResult {
    let mut result = ValidationResult::valid();
    for (i, coord) in coords.enumerate() {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            result.add_error(format!("{}[{}]", location, i), "Coordinates must be finite".to_string());
        }
    }
    result
}

fn validate_linestring(linestring: &geo::LineString<f64>) -> ValidationResult {
    let mut result = ValidationResult::valid();

    // LineString must have at least 2 points
    if linestring.0.len() < 2 {
        result.add_error(
            "LineString".to_string(),
            format!("LineString must have at least 2 points, found {}", linestring.0.len()),
        );
        return result;
    }

    result.absorb("LineString", validate_coords("coords", linestring.0.iter().copied()));
    result
}

fn validate_ring(location: &str, ring: &geo::LineString<f64>) -> ValidationResult {
    let mut result = ValidationResult::valid();

    if ring.0.len() < 4 {
        result.add_error(
            location.to_string(),
            format!("Ring must have at least 4 points, found {}", ring.0.len()),
        );
    }

    if let (Some(first), Some(last)) = (ring.0.first(), ring.0.last()) {
        if first != last {
            result.add_error(
                location.to_string(),
                "Ring must be closed (first point == last point)".to_string(),
            );
        }
    }

    result.absorb(location, validate_coords("coords", ring.0.iter().copied()));
    result
}

fn validate_polygon(polygon: &geo::Polygon<f64>) -> ValidationResult {
    let mut result = validate_ring("Polygon exterior", polygon.exterior());

    for (i, interior) in polygon.interiors().iter().enumerate() {
        let ring = validate_ring(&format!("Polygon interior[{}]", i), interior);
        result.errors.extend(ring.errors);
    }
    result.is_valid = result.errors.is_empty();

    result
}
