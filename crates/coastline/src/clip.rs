//! Polygon/rectangle clipping.
//!
//! Sutherland-Hodgman-style walk of a polygon's outer ring against an
//! axis-aligned bounding box. Edges crossing the box contribute their
//! boundary intersections; an intersection that only meets the extension
//! of a boundary line beyond the box instead nominates the nearest box
//! corner, which is kept when it lies inside the original polygon. This
//! recovers corners fully enclosed by a polygon that never crosses the
//! box sides near them.

use eo_common::Bbox;

/// Tolerance for degenerate (near axis-parallel) segments.
pub const NEAR_ZERO_TOL: f64 = 2.0e-9;

/// A 2D point, x = easting (lon), y = northing (lat).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn dist2(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// An intersection of a polygon edge with one of the four boundary lines.
///
/// `on_bound` is true when the point lies on the actual box side, false
/// when it only lies on the infinite extension of that side.
#[derive(Debug, Clone, Copy)]
struct Isection {
    pt: Point,
    on_bound: bool,
}

/// The x coordinate where segment (p0,p1) crosses the horizontal line y=yi.
/// Assumes the crossing exists; near-horizontal segments use the midpoint.
fn x_at(p0: Point, p1: Point, yi: f64) -> f64 {
    let dy = p1.y - p0.y;
    if dy.abs() < NEAR_ZERO_TOL {
        (p1.x + p0.x) / 2.0
    } else {
        let r = (p1.x - p0.x) / dy;
        p0.x + (yi - p0.y) * r
    }
}

/// The y coordinate where segment (p0,p1) crosses the vertical line x=xi.
fn y_at(p0: Point, p1: Point, xi: f64) -> f64 {
    let dx = p1.x - p0.x;
    if dx.abs() < NEAR_ZERO_TOL {
        (p1.y + p0.y) / 2.0
    } else {
        let s = (p1.y - p0.y) / dx;
        p0.y + (xi - p0.x) * s
    }
}

/// Find the intersections of segment (p0,p1) with the four boundary lines
/// of the bbox, ordered by increasing distance from p0 (stable for ties).
/// Up to four intersections, of which at most two can be on-bound.
fn find_intersections(bb: &Bbox, p0: Point, p1: Point) -> Vec<Isection> {
    let mut ipoints: Vec<Isection> = Vec::with_capacity(4);

    let mut crossing_y = |yi: f64| {
        if (p0.y < yi && p1.y > yi) || (p0.y > yi && p1.y < yi) {
            let xi = x_at(p0, p1, yi);
            ipoints.push(Isection {
                pt: Point::new(xi, yi),
                on_bound: xi >= bb.min_x && xi <= bb.max_x,
            });
        }
    };
    crossing_y(bb.min_y);
    crossing_y(bb.max_y);

    let mut crossing_x = |xi: f64| {
        if (p0.x < xi && p1.x > xi) || (p0.x > xi && p1.x < xi) {
            let yi = y_at(p0, p1, xi);
            ipoints.push(Isection {
                pt: Point::new(xi, yi),
                on_bound: yi >= bb.min_y && yi <= bb.max_y,
            });
        }
    };
    crossing_x(bb.min_x);
    crossing_x(bb.max_x);

    ipoints.sort_by(|a, b| {
        p0.dist2(&a.pt)
            .partial_cmp(&p0.dist2(&b.pt))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    ipoints
}

/// The bbox corner nearest to the given point.
fn nearest_corner(bb: &Bbox, pt: Point) -> Point {
    let closest = |v: f64, lo: f64, hi: f64| {
        if (v - lo).abs() < (v - hi).abs() {
            lo
        } else {
            hi
        }
    };
    Point::new(
        closest(pt.x, bb.min_x, bb.max_x),
        closest(pt.y, bb.min_y, bb.max_y),
    )
}

/// Ray-cast point-in-ring test. The ring need not be explicitly closed.
/// Points exactly on the boundary are not considered inside.
pub fn point_in_ring(ring: &[Point], pt: Point) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = ring[i];
        let pj = ring[j];
        if (pi.y > pt.y) != (pj.y > pt.y) {
            let dy = pj.y - pi.y;
            if dy.abs() > NEAR_ZERO_TOL {
                let x_cross = pi.x + (pt.y - pi.y) * (pj.x - pi.x) / dy;
                if pt.x < x_cross {
                    inside = !inside;
                }
            }
        }
        j = i;
    }
    inside
}

fn same_point(a: Point, b: Point) -> bool {
    a.x == b.x && a.y == b.y
}

/// Clip a polygon's outer ring against a bounding box.
///
/// Returns the clipped ring, closed when it has more than one point. The
/// result is empty when the ring does not intersect the bbox, and is the
/// four bbox corners when the ring encloses the whole bbox.
pub fn clip_ring(bb: &Bbox, ring: &[Point]) -> Vec<Point> {
    let mut clipped: Vec<Point> = Vec::new();
    if ring.is_empty() {
        return clipped;
    }

    let mut p0 = ring[0];
    let mut p0_inside = bb.contains_point(p0.x, p0.y);
    if p0_inside {
        clipped.push(p0);
    }

    for &p1 in &ring[1..] {
        let p1_inside = bb.contains_point(p1.x, p1.y);

        if p0_inside && p1_inside {
            clipped.push(p1);
        } else {
            for ipt in find_intersections(bb, p0, p1) {
                if ipt.on_bound {
                    clipped.push(ipt.pt);
                } else {
                    // Intersection beyond the box side: the nearest corner
                    // joins the ring when the original polygon encloses it.
                    let corner = nearest_corner(bb, ipt.pt);
                    if point_in_ring(ring, corner)
                        && clipped.last().map_or(true, |last| !same_point(*last, corner))
                    {
                        clipped.push(corner);
                    }
                }
            }
        }

        p0 = p1;
        p0_inside = p1_inside;
    }

    if clipped.len() > 1 && !same_point(clipped[0], clipped[clipped.len() - 1]) {
        clipped.push(clipped[0]);
    }

    clipped
}
