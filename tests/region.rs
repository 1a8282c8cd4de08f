//! Tests for region module

use std::sync::Arc;

use geo::Coord;
use placemine::region::shape::percent_intersection;
use placemine::region::{boundary_distance, overlap, Overlap};
use placemine::{PlaceError, PositionFix, Region, RegionKind, Shape, ShapeKind, Trajectory};

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

fn c(x: f64, y: f64) -> Coord {
    Coord { x, y }
}

/// Fixes on a small square around a spot, `accuracy` 10 m, 60 s apart.
fn square_fixes(lat: f64, lon: f64, start: f64) -> Vec<PositionFix> {
    let d = 0.0001;
    [(0.0, 0.0), (d, 0.0), (d, d), (0.0, d), (d / 2.0, d / 2.0)]
        .iter()
        .enumerate()
        .map(|(i, (dlat, dlon))| PositionFix::new(lat + dlat, lon + dlon, start + 60.0 * i as f64, 10.0, 0.0))
        .collect()
}

fn shared(fixes: Vec<PositionFix>) -> Arc<Trajectory> {
    Arc::new(Trajectory::from_fixes(fixes).unwrap())
}

#[test]
fn test_point_shape_when_ends_coincide() {
    let fixes: Vec<PositionFix> = (0..4)
        .map(|i| PositionFix::new(46.5, 6.6, 60.0 * i as f64, 10.0, 0.0))
        .collect();
    let region = Region::new(shared(fixes), 0..4, RegionKind::Stop).unwrap();
    assert_eq!(region.shape().kind(), ShapeKind::Point);
    assert!(approx_eq(region.centroid().y, 46.5, 1e-12));
}

#[test]
fn test_stop_is_hull_and_walk_is_path() {
    let traj = shared(square_fixes(46.5, 6.6, 0.0));
    let stop = Region::new(Arc::clone(&traj), 0..5, RegionKind::Stop).unwrap();
    let walk = Region::new(Arc::clone(&traj), 0..5, RegionKind::Walk).unwrap();

    assert_eq!(stop.shape().kind(), ShapeKind::Polygon);
    assert_eq!(stop.shape().vertices().len(), 4);
    assert_eq!(walk.shape().kind(), ShapeKind::LineString);
    assert_eq!(walk.shape().vertices().len(), 5);
}

#[test]
fn test_collinear_stop_degrades_to_line() {
    let fixes: Vec<PositionFix> = (0..4)
        .map(|i| PositionFix::new(46.5 + 0.0001 * i as f64, 6.6, 60.0 * i as f64, 10.0, 0.0))
        .collect();
    let region = Region::new(shared(fixes), 0..4, RegionKind::Stop).unwrap();
    assert_eq!(region.shape().kind(), ShapeKind::LineString);
    assert_eq!(region.shape().vertices().len(), 2);
}

#[test]
fn test_inaccurate_fixes_left_out_of_shape() {
    let mut fixes = square_fixes(46.5, 6.6, 0.0);
    fixes.push(PositionFix::new(46.6, 6.7, 400.0, 200.0, 0.0));
    let traj = shared(fixes);

    let region = Region::new(Arc::clone(&traj), 0..6, RegionKind::Stop).unwrap();
    let (_, max) = region.shape().bounds();
    assert!(max.y < 46.501);

    // Only inaccurate fixes: they are used anyway
    let outlier_only = Region::new(traj, 5..6, RegionKind::Stop).unwrap();
    assert_eq!(outlier_only.shape().kind(), ShapeKind::Point);
}

#[test]
fn test_invalid_ranges_rejected() {
    let traj = shared(square_fixes(46.5, 6.6, 0.0));
    assert!(matches!(
        Region::new(Arc::clone(&traj), 3..3, RegionKind::Stop),
        Err(PlaceError::InvalidArgument { .. })
    ));
    assert!(matches!(
        Region::new(Arc::clone(&traj), 2..9, RegionKind::Stop),
        Err(PlaceError::InvalidArgument { .. })
    ));
    assert!(Region::from_ranges(traj, vec![], RegionKind::Stop).is_err());
}

#[test]
fn test_entry_and_exit_times() {
    let traj = shared(square_fixes(46.5, 6.6, 0.0));
    let region = Region::from_ranges(traj, vec![3..5, 0..2], RegionKind::Stop).unwrap();
    assert_eq!(region.stays(), &[0..2, 3..5]);
    assert_eq!(region.entry_times(), vec![0.0, 180.0]);
    assert_eq!(region.exit_times(), vec![60.0, 240.0]);
    assert_eq!(region.span(), 240.0);
    assert_eq!(region.longest_stay(), 60.0);
}

#[test]
fn test_union_sorts_stays_and_grows_hull() {
    let mut fixes = square_fixes(46.5, 6.6, 0.0);
    fixes.extend(square_fixes(46.50005, 6.60005, 1000.0));
    fixes.extend(square_fixes(46.5001, 6.6001, 2000.0));
    let traj = shared(fixes);

    let a = Region::new(Arc::clone(&traj), 0..5, RegionKind::Stop).unwrap();
    let b = Region::new(Arc::clone(&traj), 5..10, RegionKind::Stop).unwrap();
    let c3 = Region::new(Arc::clone(&traj), 10..15, RegionKind::Stop).unwrap();

    // (c ∪ a) ∪ b
    let mut left = c3.clone();
    left.union(&a, RegionKind::Stop).unwrap();
    left.union(&b, RegionKind::Stop).unwrap();

    // a ∪ (b ∪ c)
    let mut bc = b.clone();
    bc.union(&c3, RegionKind::Stop).unwrap();
    let mut right = a.clone();
    right.union(&bc, RegionKind::Stop).unwrap();

    assert_eq!(left.stays(), right.stays());
    assert_eq!(left.stays(), &[0..5, 5..10, 10..15]);
    assert_eq!(left.entry_times(), vec![0.0, 1000.0, 2000.0]);

    let largest = a.shape().area().max(b.shape().area()).max(c3.shape().area());
    assert!(left.shape().area() >= largest);
}

#[test]
fn test_union_requires_same_trajectory() {
    let mut a = Region::new(shared(square_fixes(46.5, 6.6, 0.0)), 0..5, RegionKind::Stop).unwrap();
    let b = Region::new(shared(square_fixes(46.5, 6.6, 0.0)), 0..5, RegionKind::Stop).unwrap();
    assert!(matches!(
        a.union(&b, RegionKind::Stop),
        Err(PlaceError::InvalidArgument { .. })
    ));
}

#[test]
fn test_union_coalesces_overlapping_ranges() {
    let traj = shared(square_fixes(46.5, 6.6, 0.0));
    let mut a = Region::new(Arc::clone(&traj), 0..3, RegionKind::Stop).unwrap();
    let b = Region::new(traj, 2..5, RegionKind::Walk).unwrap();
    a.union(&b, RegionKind::Stop).unwrap();
    assert_eq!(a.stays(), &[0..5]);
    assert_eq!(a.members(), &[0..5]);
    assert_eq!(a.kind(), RegionKind::Stop);
}

#[test]
fn test_percent_intersection_with_itself() {
    let traj = shared(square_fixes(46.5, 6.6, 0.0));
    let stop = Region::new(Arc::clone(&traj), 0..5, RegionKind::Stop).unwrap();
    let walk = Region::new(traj, 0..5, RegionKind::Walk).unwrap();
    assert!(approx_eq(stop.percent_intersection(&stop), 1.0, 1e-9));
    assert!(approx_eq(walk.percent_intersection(&walk), 1.0, 1e-9));
}

#[test]
fn test_percent_intersection_cases() {
    let square = Shape::from_coords(&[c(0.0, 0.0), c(2.0, 0.0), c(2.0, 2.0), c(0.0, 2.0)], true);
    let inner = Shape::from_coords(&[c(1.0, 1.0), c(3.0, 1.0), c(3.0, 3.0), c(1.0, 3.0)], true);
    let far = Shape::from_coords(&[c(10.0, 10.0), c(11.0, 10.0), c(11.0, 11.0)], true);

    // Quarter of either square overlaps
    assert!(approx_eq(percent_intersection(&square, &inner), 0.25, 1e-9));
    assert_eq!(percent_intersection(&square, &far), 0.0);

    // Point inside the square
    let point = Shape::from_coords(&[c(0.5, 0.5)], true);
    assert_eq!(percent_intersection(&square, &point), 1.0);

    // Collinear paths sharing one unit: divided by the shorter path
    let long = Shape::from_coords(&[c(0.0, 5.0), c(4.0, 5.0)], false);
    let short = Shape::from_coords(&[c(3.0, 5.0), c(5.0, 5.0)], false);
    assert!(approx_eq(percent_intersection(&long, &short), 0.5, 1e-9));
    assert!(approx_eq(percent_intersection(&short, &long), 0.5, 1e-9));

    // Crossing once counts as full overlap, crossing twice as none
    let vertical = Shape::from_coords(&[c(1.0, 4.0), c(1.0, 6.0)], false);
    assert_eq!(overlap(&long, &vertical), Overlap::Point);
    assert_eq!(percent_intersection(&long, &vertical), 1.0);

    let zig = Shape::from_coords(&[c(1.0, 4.0), c(1.5, 6.0), c(2.0, 4.0)], false);
    assert_eq!(overlap(&long, &zig), Overlap::Points);
    assert_eq!(percent_intersection(&long, &zig), 0.0);
}

#[test]
fn test_path_through_polygon() {
    let square = Shape::from_coords(&[c(0.0, 0.0), c(2.0, 0.0), c(2.0, 2.0), c(0.0, 2.0)], true);
    let path = Shape::from_coords(&[c(-1.0, 1.0), c(3.0, 1.0)], false);
    // Half of the path lies inside the square
    assert!(approx_eq(percent_intersection(&square, &path), 0.5, 1e-9));
}

#[test]
fn test_path_grazing_polygon_corners() {
    let square = Shape::from_coords(&[c(0.0, 0.0), c(2.0, 0.0), c(2.0, 2.0), c(0.0, 2.0)], true);
    let grazing = Shape::from_coords(&[c(0.0, 2.0), c(1.0, 3.0), c(2.0, 2.0)], false);
    assert_eq!(overlap(&square, &grazing), Overlap::Points);
    assert_eq!(percent_intersection(&square, &grazing), 0.0);
    assert_eq!(percent_intersection(&grazing, &square), 0.0);

    let corner = Shape::from_coords(&[c(2.0, 2.0), c(3.0, 3.0)], false);
    assert_eq!(overlap(&square, &corner), Overlap::Point);
    assert_eq!(percent_intersection(&square, &corner), 1.0);
}

#[test]
fn test_path_along_polygon_edge() {
    let square = Shape::from_coords(&[c(0.0, 0.0), c(2.0, 0.0), c(2.0, 2.0), c(0.0, 2.0)], true);
    let along = Shape::from_coords(&[c(1.0, 0.0), c(3.0, 0.0)], false);
    assert!(approx_eq(percent_intersection(&square, &along), 0.5, 1e-9));
}

#[test]
fn test_polygons_sharing_an_edge() {
    let left = Shape::from_coords(&[c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0)], true);
    let right = Shape::from_coords(&[c(1.0, 0.0), c(2.0, 0.0), c(2.0, 1.0), c(1.0, 1.0)], true);

    match overlap(&left, &right) {
        Overlap::Lines(length) => assert!(approx_eq(length, 1.0, 1e-9)),
        other => panic!("expected a shared edge, got {:?}", other),
    }
    // Shared edge over the smaller perimeter
    assert!(approx_eq(percent_intersection(&left, &right), 0.25, 1e-9));

    let diagonal = Shape::from_coords(&[c(1.0, 1.0), c(2.0, 1.0), c(2.0, 2.0), c(1.0, 2.0)], true);
    assert_eq!(overlap(&left, &diagonal), Overlap::Point);
}

#[test]
fn test_path_doubling_back_counts_once() {
    let stop = Shape::from_coords(&[c(0.0, 0.0), c(4.0, 0.0)], false);
    let walk = Shape::from_coords(&[c(1.0, 0.0), c(3.0, 0.0), c(1.0, 0.0), c(3.0, 0.0)], false);

    match overlap(&stop, &walk) {
        Overlap::Lines(length) => assert!(approx_eq(length, 2.0, 1e-9)),
        other => panic!("expected a shared path, got {:?}", other),
    }
    assert!(approx_eq(percent_intersection(&stop, &walk), 0.5, 1e-9));
    assert!(approx_eq(percent_intersection(&walk, &stop), 0.5, 1e-9));
}

#[test]
fn test_boundary_distance_is_vertex_pair_distance() {
    let a = Shape::from_coords(
        &[c(6.6, 46.5), c(6.6001, 46.5), c(6.6001, 46.5001), c(6.6, 46.5001)],
        true,
    );
    let b = Shape::from_coords(
        &[c(6.6002, 46.5), c(6.6003, 46.5), c(6.6003, 46.5001), c(6.6002, 46.5001)],
        true,
    );
    let dist = boundary_distance(&a, a.centroid(), &b, b.centroid(), 200.0);

    let mut true_min = f64::INFINITY;
    for va in a.vertices() {
        for vb in b.vertices() {
            true_min = true_min.min(placemine::geo_utils::coord_distance(va, vb));
        }
    }
    let first = placemine::geo_utils::coord_distance(a.vertices()[0], b.vertices()[0]);
    assert!(dist >= true_min - 1e-9);
    assert!(dist <= first + 1e-9);
}

#[test]
fn test_boundary_distance_far_apart_uses_centroids() {
    let a = Shape::from_coords(&[c(6.6, 46.5)], true);
    let b = Shape::from_coords(&[c(6.7, 46.5)], true);
    let dist = boundary_distance(&a, a.centroid(), &b, b.centroid(), 200.0);
    assert!(approx_eq(
        dist,
        placemine::geo_utils::coord_distance(a.centroid(), b.centroid()),
        1e-9
    ));

    // Within the threshold, two points are their own vertices
    let near = boundary_distance(&a, a.centroid(), &b, b.centroid(), 1e9);
    assert!(approx_eq(near, dist, 1e-9));
}

#[test]
fn test_stay_time_extends_over_signal_gaps() {
    let fixes = vec![
        PositionFix::new(46.5, 6.6, 0.0, 10.0, 1.0),
        PositionFix::new(46.5001, 6.6, 1000.0, 10.0, 0.0),
        PositionFix::new(46.5001, 6.6, 1100.0, 10.0, 0.0),
        PositionFix::new(46.5003, 6.6, 1500.0, 10.0, 2.0),
    ];
    let traj = shared(fixes);
    let region = Region::new(Arc::clone(&traj), 1..3, RegionKind::Stop).unwrap();

    // ~11 m at 1 m/s explains 11 s of the 1000 s gap before entry,
    // ~22 m at 2 m/s explains 11 s of the 400 s gap after exit
    let (start, stop) = region.stay_time();
    let before = traj[1].distance;
    let after = traj[3].distance / 2.0;
    assert!(approx_eq(start, before, 1e-6));
    assert!(approx_eq(stop, 1500.0 - after, 1e-6));
    assert!(region.longer_than(1400.0));
    assert!(!region.longer_than(1500.0));
}

#[test]
fn test_stay_time_guards_zero_speed() {
    let fixes = vec![
        PositionFix::new(46.5, 6.6, 0.0, 10.0, 0.0),
        PositionFix::new(46.5001, 6.6, 1000.0, 10.0, 0.0),
        PositionFix::new(46.5001, 6.6, 1100.0, 10.0, 0.0),
    ];
    let region = Region::new(shared(fixes), 1..3, RegionKind::Stop).unwrap();
    let (start, stop) = region.stay_time();
    assert_eq!(start, 1000.0);
    assert_eq!(stop, 1100.0);
}

#[test]
fn test_summary_serializes() {
    let traj = shared(square_fixes(46.5, 6.6, 0.0));
    let region = Region::new(traj, 0..5, RegionKind::Stop).unwrap();
    let summary = region.to_summary();
    assert_eq!(summary.member_count, 5);
    assert_eq!(summary.stays.len(), 1);

    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"kind\":\"stop\""));
    assert!(json.contains("\"shape_kind\":\"polygon\""));
}
