//! Land-mask cache built from land polygons clipped to an AOI.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use eo_common::Bbox;

use crate::clip::{clip_ring, point_in_ring, Point, NEAR_ZERO_TOL};

/// Outcome of testing a footprint against the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskCheck {
    /// The footprint touches or contains land.
    Intersects,
    /// The footprint is entirely at sea.
    Clear,
    /// The check could not be performed (empty mask or footprint);
    /// callers treat this as a pass.
    Unchecked,
}

#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("Failed to read land polygon file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse land polygon file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported geometry type: {0}")]
    UnsupportedGeometry(String),
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
    #[serde(other)]
    Other,
}

/// Land polygons clipped to one scenario's area of interest.
///
/// Only WGS84 (lon/lat degree) coordinates are supported.
pub struct LandMask {
    rings: Vec<Vec<Point>>,
}

impl LandMask {
    /// Build the mask from a GeoJSON FeatureCollection of land polygons.
    ///
    /// Polygons whose envelope falls outside `aoi` are discarded before
    /// clipping. Inner holes are ignored; only outer rings are kept.
    pub fn from_geojson(path: &Path, aoi: &Bbox) -> Result<Self, MaskError> {
        let raw = std::fs::read_to_string(path)?;
        let fc: FeatureCollection = serde_json::from_str(&raw)?;

        let mut rings = Vec::new();
        let mut n_rejected = 0usize;

        for feature in fc.features {
            let Some(geometry) = feature.geometry else {
                continue;
            };
            let outer_rings: Vec<Vec<[f64; 2]>> = match geometry {
                Geometry::Polygon { mut coordinates } => {
                    if coordinates.is_empty() {
                        continue;
                    }
                    vec![coordinates.swap_remove(0)]
                }
                Geometry::MultiPolygon { coordinates } => coordinates
                    .into_iter()
                    .filter_map(|mut poly| {
                        if poly.is_empty() {
                            None
                        } else {
                            Some(poly.swap_remove(0))
                        }
                    })
                    .collect(),
                Geometry::Other => continue,
            };

            for coords in outer_rings {
                let ring: Vec<Point> =
                    coords.iter().map(|c| Point::new(c[0], c[1])).collect();
                if ring.len() < 3 {
                    continue;
                }

                if !envelope(&ring).overlaps(aoi) {
                    n_rejected += 1;
                    continue;
                }

                let clipped = clip_ring(aoi, &ring);
                if clipped.len() >= 3 {
                    rings.push(clipped);
                }
            }
        }

        debug!(
            kept = rings.len(),
            rejected = n_rejected,
            "Built coastline mask"
        );

        if rings.is_empty() {
            warn!("Coastline mask for AOI is empty; footprints will not be checked");
        }

        Ok(Self { rings })
    }

    /// Build directly from pre-clipped rings (used in tests).
    pub fn from_rings(rings: Vec<Vec<Point>>) -> Self {
        Self { rings }
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Test a product footprint against the mask.
    pub fn check(&self, footprint: &[Point]) -> MaskCheck {
        if self.rings.is_empty() {
            warn!("Empty coastline mask; footprint not checked");
            return MaskCheck::Unchecked;
        }
        if footprint.len() < 3 {
            warn!("Degenerate footprint; coastline not checked");
            return MaskCheck::Unchecked;
        }

        for ring in &self.rings {
            if rings_touch(ring, footprint) {
                return MaskCheck::Intersects;
            }
        }
        MaskCheck::Clear
    }
}

fn envelope(ring: &[Point]) -> Bbox {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in ring {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Bbox::new(min_x, min_y, max_x, max_y)
}

/// True when the rings intersect, or either contains the other.
fn rings_touch(a: &[Point], b: &[Point]) -> bool {
    // Any boundary crossing.
    for i in 0..a.len().saturating_sub(1) {
        for j in 0..b.len().saturating_sub(1) {
            if segments_intersect(a[i], a[i + 1], b[j], b[j + 1]) {
                return true;
            }
        }
    }

    // Containment either way: one vertex inside is enough once no
    // boundary crossing exists.
    point_in_ring(a, b[0]) || point_in_ring(b, a[0])
}

fn orient(p: Point, q: Point, r: Point) -> f64 {
    (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
}

fn on_segment(p: Point, q: Point, r: Point) -> bool {
    r.x >= p.x.min(q.x) - NEAR_ZERO_TOL
        && r.x <= p.x.max(q.x) + NEAR_ZERO_TOL
        && r.y >= p.y.min(q.y) - NEAR_ZERO_TOL
        && r.y <= p.y.max(q.y) + NEAR_ZERO_TOL
}

fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    // Collinear touch cases.
    (d1.abs() < NEAR_ZERO_TOL && on_segment(q1, q2, p1))
        || (d2.abs() < NEAR_ZERO_TOL && on_segment(q1, q2, p2))
        || (d3.abs() < NEAR_ZERO_TOL && on_segment(p1, p2, q1))
        || (d4.abs() < NEAR_ZERO_TOL && on_segment(p1, p2, q2))
}
