//! Structural checks for geometric descriptions.
//!
//! Only shape is checked here: ring closure, vertex uniqueness and edge
//! crossings. Projection, area and winding are left to consumers.

use serde_json::Value as JsonValue;
use thiserror::Error;

/// A 2D coordinate pair.
pub type Point = (f64, f64);

/// Minimum number of points in a polygon ring, closing point included.
pub const MIN_POLYGON_POINTS: usize = 4;

/// Reasons a geometry document is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("geometry document has no 'coordinates' field")]
    MissingCoordinates,

    #[error("coordinate at position {index} is not an [x, y] pair of numbers")]
    BadCoordinate { index: usize },

    #[error(
        "polygon must have at least {min} points including the closing point, found {found}",
        min = MIN_POLYGON_POINTS
    )]
    TooFewPoints { found: usize },

    #[error("polygon must be closed: first and last point differ")]
    NotClosed,

    #[error("polygon repeats the point ({x}, {y})")]
    RepeatedPoint { x: f64, y: f64 },

    #[error("polygon edges {first} and {second} intersect")]
    SelfIntersection { first: usize, second: usize },
}

/// Read `[x, y]` from a JSON value.
fn parse_point(value: &JsonValue, index: usize) -> Result<Point, GeometryError> {
    match value.as_array().map(Vec::as_slice) {
        Some([x, y]) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => Err(GeometryError::BadCoordinate { index }),
        },
        _ => Err(GeometryError::BadCoordinate { index }),
    }
}

fn coordinates(document: &JsonValue) -> Result<&JsonValue, GeometryError> {
    document
        .get("coordinates")
        .ok_or(GeometryError::MissingCoordinates)
}

/// Parse and check `{"coordinates": [x, y]}`.
pub fn parse_point_document(document: &JsonValue) -> Result<Point, GeometryError> {
    parse_point(coordinates(document)?, 0)
}

/// Parse `{"coordinates": [[x, y], ...]}` into a ring without checking it.
pub fn parse_ring(document: &JsonValue) -> Result<Vec<Point>, GeometryError> {
    let points = coordinates(document)?
        .as_array()
        .ok_or(GeometryError::BadCoordinate { index: 0 })?;

    points
        .iter()
        .enumerate()
        .map(|(index, value)| parse_point(value, index))
        .collect()
}

/// Parse and check a polygon document.
pub fn parse_polygon_document(document: &JsonValue) -> Result<Vec<Point>, GeometryError> {
    let ring = parse_ring(document)?;
    check_polygon(&ring)?;
    Ok(ring)
}

/// Check that a ring is a simple, closed polygon.
pub fn check_polygon(ring: &[Point]) -> Result<(), GeometryError> {
    if ring.len() < MIN_POLYGON_POINTS {
        return Err(GeometryError::TooFewPoints { found: ring.len() });
    }

    if ring.first() != ring.last() {
        return Err(GeometryError::NotClosed);
    }

    // The closing point is the only allowed repeat.
    let open = &ring[..ring.len() - 1];
    for (i, a) in open.iter().enumerate() {
        if open[i + 1..].contains(a) {
            return Err(GeometryError::RepeatedPoint { x: a.0, y: a.1 });
        }
    }

    if let Some((first, second)) = find_self_intersection(ring) {
        return Err(GeometryError::SelfIntersection { first, second });
    }

    Ok(())
}

/// Find the first pair of non-adjacent edges that touch or cross.
///
/// Edge `i` runs from `ring[i]` to `ring[i + 1]`. Adjacent edges share a
/// vertex and are skipped, as are the first and last edge of a closed ring.
pub fn find_self_intersection(ring: &[Point]) -> Option<(usize, usize)> {
    let edges = ring.len().checked_sub(1)?;
    let closed = ring.first() == ring.last();

    for i in 0..edges {
        for j in (i + 2)..edges {
            if closed && i == 0 && j == edges - 1 {
                continue;
            }
            if segments_intersect(ring[i], ring[i + 1], ring[j], ring[j + 1]) {
                return Some((i, j));
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Collinear,
    Clockwise,
    CounterClockwise,
}

fn orientation(p: Point, q: Point, r: Point) -> Orientation {
    let val = (q.1 - p.1) * (r.0 - q.0) - (q.0 - p.0) * (r.1 - q.1);
    if val == 0.0 {
        Orientation::Collinear
    } else if val > 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::CounterClockwise
    }
}

/// Whether `q` lies on segment `pr`, given the three are collinear.
fn on_segment(p: Point, q: Point, r: Point) -> bool {
    q.0 <= p.0.max(r.0) && q.0 >= p.0.min(r.0) && q.1 <= p.1.max(r.1) && q.1 >= p.1.min(r.1)
}

/// Whether segments `p1q1` and `p2q2` share at least one point.
pub fn segments_intersect(p1: Point, q1: Point, p2: Point, q2: Point) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == Orientation::Collinear && on_segment(p1, p2, q1))
        || (o2 == Orientation::Collinear && on_segment(p1, q2, q1))
        || (o3 == Orientation::Collinear && on_segment(p2, p1, q2))
        || (o4 == Orientation::Collinear && on_segment(p2, q1, q2))
}
