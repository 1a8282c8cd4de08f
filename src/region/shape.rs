//! Region shapes and the overlap ratio between them.
//!
//! Coordinates are planar lon/lat (x = longitude, y = latitude); areas and
//! lengths are in squared degrees and degrees, which is fine for the ratios
//! computed here.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    Area, BooleanOps, Centroid, ConvexHull, Coord, Intersects, Line, LineString, MultiLineString,
    MultiPoint, Point, Polygon,
};
use serde::{Deserialize, Serialize};

use crate::geo_utils::coord_distance;

/// Hulls with a smaller area (squared degrees) are treated as collinear.
const DEGENERATE_AREA: f64 = 1e-18;

/// Overlap lengths/areas below this are treated as touching.
const TOUCH_EPSILON: f64 = 1e-15;

/// Planar tolerance (degrees) for shared lines and coincident touch points.
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// Kind tag of a [`Shape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Point,
    LineString,
    Polygon,
}

/// Geometry of a region.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// All constituent fixes start and end at the same spot.
    Point(Point),
    /// Ordered path for walks/moves, or a collinear stop.
    LineString(LineString),
    /// Convex hull of a stop.
    Polygon(Polygon),
}

impl Shape {
    /// Build the shape of a set of coordinates.
    ///
    /// A zero-length first-to-last span yields a point. Otherwise `hull`
    /// selects the convex hull (stops) over the ordered path (walks/moves).
    /// Callers guarantee `coords` is non-empty.
    pub fn from_coords(coords: &[Coord], hull: bool) -> Shape {
        let first = coords[0];
        let last = coords[coords.len() - 1];

        if coord_distance(first, last) == 0.0 {
            return Shape::Point(Point::from(first));
        }
        if !hull {
            return Shape::LineString(LineString::new(coords.to_vec()));
        }

        let points: MultiPoint = coords.iter().map(|c| Point::from(*c)).collect();
        let polygon = points.convex_hull();
        let distinct = polygon.exterior().0.len().saturating_sub(1);

        if distinct < 3 || polygon.unsigned_area() < DEGENERATE_AREA {
            let (a, b) = extreme_pair(coords);
            return Shape::LineString(LineString::new(vec![a, b]));
        }
        Shape::Polygon(polygon)
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Point(_) => ShapeKind::Point,
            Shape::LineString(_) => ShapeKind::LineString,
            Shape::Polygon(_) => ShapeKind::Polygon,
        }
    }

    /// Geometric centroid.
    pub fn centroid(&self) -> Coord {
        match self {
            Shape::Point(p) => p.0,
            Shape::LineString(ls) => ls
                .centroid()
                .map(|p| p.0)
                .unwrap_or_else(|| ls.0.first().copied().unwrap_or_default()),
            Shape::Polygon(poly) => poly
                .centroid()
                .map(|p| p.0)
                .unwrap_or_else(|| poly.exterior().0.first().copied().unwrap_or_default()),
        }
    }

    /// Planar area, zero for points and paths.
    pub fn area(&self) -> f64 {
        match self {
            Shape::Polygon(poly) => poly.unsigned_area(),
            _ => 0.0,
        }
    }

    /// Planar length: path length, or perimeter for polygons.
    pub fn length(&self) -> f64 {
        match self {
            Shape::Point(_) => 0.0,
            Shape::LineString(ls) => line_length(ls),
            Shape::Polygon(poly) => line_length(poly.exterior()),
        }
    }

    /// Boundary vertices in order; polygons drop the closing vertex.
    pub fn vertices(&self) -> Vec<Coord> {
        match self {
            Shape::Point(p) => vec![p.0],
            Shape::LineString(ls) => ls.0.clone(),
            Shape::Polygon(poly) => {
                let ring = &poly.exterior().0;
                ring[..ring.len().saturating_sub(1)].to_vec()
            }
        }
    }

    /// Bounding box as `(min, max)` corners.
    pub fn bounds(&self) -> (Coord, Coord) {
        let vertices = self.vertices();
        let mut min = vertices[0];
        let mut max = vertices[0];
        for c in &vertices[1..] {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        (min, max)
    }

    fn intersects_point(&self, point: &Point) -> bool {
        match self {
            Shape::Point(p) => p == point,
            Shape::LineString(ls) => ls.intersects(point),
            Shape::Polygon(poly) => poly.intersects(point),
        }
    }
}

/// What the intersection of two shapes looks like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Overlap {
    Empty,
    /// A single shared point.
    Point,
    /// Several isolated points, no length or area.
    Points,
    /// Shared path of the given planar length.
    Lines(f64),
    /// Shared area of the given planar size.
    Area(f64),
}

/// Classify the intersection of two shapes.
pub fn overlap(a: &Shape, b: &Shape) -> Overlap {
    match (a, b) {
        (Shape::Point(p), other) | (other, Shape::Point(p)) => {
            if other.intersects_point(p) {
                Overlap::Point
            } else {
                Overlap::Empty
            }
        }
        (Shape::LineString(la), Shape::LineString(lb)) => line_overlap(la, lb),
        (Shape::LineString(ls), Shape::Polygon(poly))
        | (Shape::Polygon(poly), Shape::LineString(ls)) => {
            let clipped = poly.clip(&MultiLineString::new(vec![ls.clone()]), false);
            let length: f64 = clipped.0.iter().map(line_length).sum();
            if length > TOUCH_EPSILON {
                Overlap::Lines(length)
            } else {
                // No interior run: the path can only follow or touch the boundary
                line_overlap(ls, poly.exterior())
            }
        }
        (Shape::Polygon(pa), Shape::Polygon(pb)) => {
            let area = pa.intersection(pb).unsigned_area();
            if area > TOUCH_EPSILON * TOUCH_EPSILON {
                Overlap::Area(area)
            } else {
                line_overlap(pa.exterior(), pb.exterior())
            }
        }
    }
}

/// Fraction of overlap between two shapes, in `[0, 1]`.
///
/// - shared area: intersection area over the smaller area
/// - shared path: intersection length over the shorter linear operand's
///   length (the smaller perimeter when both operands are polygons)
/// - one shared point: 1.0; several isolated points: 0.0
pub fn percent_intersection(a: &Shape, b: &Shape) -> f64 {
    let ratio = match overlap(a, b) {
        Overlap::Empty | Overlap::Points => 0.0,
        Overlap::Point => 1.0,
        Overlap::Lines(length) => {
            let linear: Vec<f64> = [a, b]
                .iter()
                .filter(|s| s.kind() == ShapeKind::LineString)
                .map(|s| s.length())
                .collect();
            let denominator = if linear.is_empty() {
                a.length().min(b.length())
            } else {
                linear.iter().copied().fold(f64::INFINITY, f64::min)
            };
            length / denominator.max(f64::MIN_POSITIVE)
        }
        Overlap::Area(area) => area / a.area().min(b.area()).max(f64::MIN_POSITIVE),
    };
    ratio.clamp(0.0, 1.0)
}

fn line_overlap(a: &LineString, b: &LineString) -> Overlap {
    let mut pieces: Vec<Line> = Vec::new();
    let mut points: Vec<Coord> = Vec::new();

    for sa in a.lines() {
        for sb in b.lines() {
            match line_intersection(sa, sb) {
                Some(LineIntersection::Collinear { intersection }) => pieces.push(intersection),
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    if !points.iter().any(|p| same_coord(*p, intersection)) {
                        points.push(intersection);
                    }
                }
                None => {}
            }
        }
    }

    let length = union_length(&pieces);
    if length > TOUCH_EPSILON {
        Overlap::Lines(length)
    } else {
        match points.len() {
            0 => Overlap::Empty,
            1 => Overlap::Point,
            _ => Overlap::Points,
        }
    }
}

/// Length covered by a set of segments, counting shared stretches once.
///
/// Segments are grouped by their supporting line, projected onto it and the
/// resulting intervals coalesced.
fn union_length(pieces: &[Line]) -> f64 {
    let mut groups: Vec<(Coord, f64, Vec<(f64, f64)>)> = Vec::new();

    for piece in pieces {
        let length = segment_length(piece);
        if length <= TOUCH_EPSILON {
            continue;
        }
        let mut dir = Coord {
            x: piece.dx() / length,
            y: piece.dy() / length,
        };
        if dir.x < 0.0 || (dir.x == 0.0 && dir.y < 0.0) {
            dir = Coord { x: -dir.x, y: -dir.y };
        }
        let offset = dir.x * piece.start.y - dir.y * piece.start.x;
        let from = dir.x * piece.start.x + dir.y * piece.start.y;
        let to = dir.x * piece.end.x + dir.y * piece.end.y;
        let interval = (from.min(to), from.max(to));

        let group = groups.iter_mut().find(|(d, o, _)| {
            (d.x - dir.x).abs() < COLLINEAR_TOLERANCE
                && (d.y - dir.y).abs() < COLLINEAR_TOLERANCE
                && (o - offset).abs() < COLLINEAR_TOLERANCE
        });
        match group {
            Some((_, _, intervals)) => intervals.push(interval),
            None => groups.push((dir, offset, vec![interval])),
        }
    }

    groups
        .into_iter()
        .map(|(_, _, mut intervals)| {
            intervals.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut total = 0.0;
            let mut current: Option<(f64, f64)> = None;
            for (start, end) in intervals {
                current = match current {
                    Some((s, e)) if start <= e => Some((s, e.max(end))),
                    Some((s, e)) => {
                        total += e - s;
                        Some((start, end))
                    }
                    None => Some((start, end)),
                };
            }
            total + current.map_or(0.0, |(s, e)| e - s)
        })
        .sum()
}

fn same_coord(a: Coord, b: Coord) -> bool {
    (a.x - b.x).abs() < COLLINEAR_TOLERANCE && (a.y - b.y).abs() < COLLINEAR_TOLERANCE
}

fn segment_length(line: &Line) -> f64 {
    line.dx().hypot(line.dy())
}

fn line_length(ls: &LineString) -> f64 {
    ls.lines().map(|l| segment_length(&l)).sum()
}

/// The two coordinates furthest apart along the dominant axis.
fn extreme_pair(coords: &[Coord]) -> (Coord, Coord) {
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (coords[0], coords[0], coords[0], coords[0]);
    for c in coords {
        if c.x < min_x.x {
            min_x = *c;
        }
        if c.x > max_x.x {
            max_x = *c;
        }
        if c.y < min_y.y {
            min_y = *c;
        }
        if c.y > max_y.y {
            max_y = *c;
        }
    }
    if max_x.x - min_x.x >= max_y.y - min_y.y {
        (min_x, max_x)
    } else {
        (min_y, max_y)
    }
}
