//! CRS transformation via PROJ

use geo::MapCoords;
use opengeo_core::error::{OpengeoError, Result};
use opengeo_core::models::{BBox, Crs};
use proj::Proj;

/// Points sampled along each bbox edge when transforming extents
const EDGE_SAMPLES: usize = 21;

/// Check if two CRS are the same
pub fn crs_match(crs1: &Crs, crs2: &Crs) -> bool {
    crs1.epsg == crs2.epsg
}

/// A reusable coordinate transformation between two CRSs.
///
/// Matching CRSs skip PROJ entirely.
pub struct Transformer {
    proj: Option<Proj>,
    from: Crs,
    to: Crs,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer").field("from", &self.from).field("to", &self.to).finish()
    }
}

impl Transformer {
    pub fn new(from: &Crs, to: &Crs) -> Result<Self> {
        if crs_match(from, to) {
            return Ok(Self { proj: None, from: from.clone(), to: to.clone() });
        }

        let from_proj = from.code();
        let to_proj = to.code();

        let proj = Proj::new_known_crs(&from_proj, &to_proj, None).map_err(|e| {
            OpengeoError::ConfigInvalid {
                key: "crs".to_string(),
                reason: format!(
                    "Failed to create projection from {} to {}: {}",
                    from_proj, to_proj, e
                ),
            }
        })?;

        tracing::debug!("Built transformation {} -> {}", from_proj, to_proj);
        Ok(Self { proj: Some(proj), from: from.clone(), to: to.clone() })
    }

    pub fn is_identity(&self) -> bool {
        self.proj.is_none()
    }

    pub fn source(&self) -> &Crs {
        &self.from
    }

    pub fn target(&self) -> &Crs {
        &self.to
    }

    /// Transform a single coordinate
    pub fn convert(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match &self.proj {
            None => Ok((x, y)),
            Some(proj) => proj.convert((x, y)).map_err(|e| OpengeoError::InvalidGeometry {
                reason: format!("Projection failed for ({}, {}): {}", x, y, e),
            }),
        }
    }

    /// Transform every coordinate of a geometry
    pub fn convert_geometry(&self, shape: &geo::Geometry<f64>) -> Result<geo::Geometry<f64>> {
        if self.is_identity() {
            return Ok(shape.clone());
        }
        shape.try_map_coords(|coord| {
            self.convert(coord.x, coord.y).map(|(x, y)| geo::Coord { x, y })
        })
    }

    /// Transform an extent by densifying its edges.
    ///
    /// Samples that fail to project are skipped; the call fails only when
    /// none succeed.
    pub fn convert_bbox(&self, bbox: &BBox) -> Result<BBox> {
        if self.is_identity() {
            return Ok(*bbox);
        }

        let mut out: Option<BBox> = None;
        let last = (EDGE_SAMPLES - 1) as f64;
        for i in 0..EDGE_SAMPLES {
            let t = i as f64 / last;
            let x = bbox.min_x + t * bbox.width();
            let y = bbox.min_y + t * bbox.height();
            for (px, py) in [(x, bbox.min_y), (x, bbox.max_y), (bbox.min_x, y), (bbox.max_x, y)] {
                let Ok((tx, ty)) = self.convert(px, py) else {
                    continue;
                };
                if !tx.is_finite() || !ty.is_finite() {
                    continue;
                }
                let point = BBox::new(tx, ty, tx, ty);
                out = Some(match out {
                    Some(acc) => acc.union(&point),
                    None => point,
                });
            }
        }

        out.ok_or_else(|| OpengeoError::InvalidGeometry {
            reason: format!("Extent could not be projected from {} to {}", self.from, self.to),
        })
    }
}

/// Reproject a geometry from one CRS to another
pub fn reproject_geometry(
    shape: &geo::Geometry<f64>,
    from_crs: &Crs,
    to_crs: &Crs,
) -> Result<geo::Geometry<f64>> {
    Transformer::new(from_crs, to_crs)?.convert_geometry(shape)
}

/// Reproject an extent from one CRS to another
pub fn transform_bbox(bbox: &BBox, from_crs: &Crs, to_crs: &Crs) -> Result<BBox> {
    Transformer::new(from_crs, to_crs)?.convert_bbox(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = Transformer::new(&Crs::wgs84(), &Crs::wgs84()).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.convert(13.4, 52.5).unwrap(), (13.4, 52.5));

        let bbox = BBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(t.convert_bbox(&bbox).unwrap(), bbox);
    }

    #[test]
    fn test_wgs84_to_web_mercator() {
        let t = Transformer::new(&Crs::wgs84(), &Crs::web_mercator()).unwrap();
        let (x, y) = t.convert(0.0, 0.0).unwrap();
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);

        let (x, _) = t.convert(180.0, 0.0).unwrap();
        assert!((x - 20_037_508.342789244).abs() < 1e-3);
    }

    #[test]
    fn test_bbox_roundtrip_to_utm() {
        let bbox = BBox::new(12.0, 52.0, 13.0, 53.0);
        let utm = transform_bbox(&bbox, &Crs::wgs84(), &Crs::from_epsg(32633)).unwrap();
        assert!(utm.min_x > 200_000.0 && utm.max_x < 500_000.0);
        assert!(utm.min_y > 5_700_000.0 && utm.max_y < 5_900_000.0);

        let back = transform_bbox(&utm, &Crs::from_epsg(32633), &Crs::wgs84()).unwrap();
        // The projected box is a superset of the original
        assert!(back.min_x <= 12.0 + 1e-9 && back.max_x >= 13.0 - 1e-9);
    }

    #[test]
    fn test_reproject_polygon() {
        let poly: geo::Geometry<f64> = geo::Geometry::Polygon(geo::Polygon::new(
            geo::LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        ));
        let projected = reproject_geometry(&poly, &Crs::wgs84(), &Crs::web_mercator()).unwrap();
        match projected {
            geo::Geometry::Polygon(p) => {
                assert_eq!(p.exterior().0.len(), 4);
                assert!((p.exterior().0[1].x - 111_319.49).abs() < 1.0);
            }
            other => panic!("unexpected geometry {:?}", other),
        }
    }
}
