//! Tests for trajectory module

use chrono::NaiveDate;
use placemine::trajectory::label_runs;
use placemine::{IngestConfig, MotionLabel, PlaceError, PositionFix, Trajectory};

/// 2024-06-01 00:00:00 UTC
const JUNE_1: f64 = 1_717_200_000.0;

fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

fn fix(lat: f64, lon: f64, time: f64, accuracy: f64, speed: f64) -> PositionFix {
    PositionFix::new(lat, lon, time, accuracy, speed)
}

#[test]
fn test_ingest_annotates_distance_and_time() {
    let fixes = vec![
        fix(46.5, 6.6, JUNE_1, 10.0, 0.0),
        fix(46.501, 6.6, JUNE_1 + 30.0, 10.0, 0.0),
        fix(46.502, 6.6, JUNE_1 + 90.0, 10.0, 0.0),
    ];
    let traj = Trajectory::ingest(fixes, &IngestConfig::default()).unwrap();

    assert_eq!(traj[0].distance, 0.0);
    assert_eq!(traj[0].time_diff, 0.0);
    assert!(approx_eq(traj[1].distance, 111.3, 0.5));
    assert_eq!(traj[1].time_diff, 30.0);
    assert_eq!(traj[2].time_diff, 60.0);
}

#[test]
fn test_ingest_drops_consecutive_duplicates() {
    let a = fix(46.5, 6.6, JUNE_1, 10.0, 0.0);
    let b = fix(46.5, 6.6, JUNE_1 + 10.0, 10.0, 0.0);
    let traj = Trajectory::ingest(vec![a, a, b, b, b, a], &IngestConfig::default());
    // The trailing `a` is earlier than `b` and must be rejected
    assert!(matches!(traj, Err(PlaceError::InvalidArgument { .. })));

    let traj = Trajectory::ingest(vec![a, a, b, b, b], &IngestConfig::default()).unwrap();
    assert_eq!(traj.len(), 2);

    let keep_all = IngestConfig {
        remove_duplicates: false,
        ..IngestConfig::default()
    };
    let traj = Trajectory::ingest(vec![a, a, b], &keep_all).unwrap();
    assert_eq!(traj.len(), 3);
}

#[test]
fn test_ingest_accuracy_filter() {
    let fixes = vec![
        fix(46.5, 6.6, JUNE_1, 10.0, 0.0),
        fix(46.5, 6.6, JUNE_1 + 10.0, 150.0, 0.0),
        fix(46.5, 6.6, JUNE_1 + 20.0, 80.0, 0.0),
    ];
    let config = IngestConfig {
        accuracy_threshold: Some(80.0),
        ..IngestConfig::default()
    };
    let traj = Trajectory::ingest(fixes, &config).unwrap();
    assert_eq!(traj.len(), 2);
    assert_eq!(traj[1].time_diff, 20.0);
}

#[test]
fn test_ingest_drops_invalid_fixes() {
    let fixes = vec![
        fix(46.5, 6.6, JUNE_1, 10.0, 0.0),
        fix(f64::NAN, 6.6, JUNE_1 + 10.0, 10.0, 0.0),
        fix(95.0, 6.6, JUNE_1 + 20.0, 10.0, 0.0),
        fix(46.5, 6.6, f64::INFINITY, 10.0, 0.0),
        fix(46.5, 6.6001, JUNE_1 + 30.0, 10.0, 0.0),
    ];
    let traj = Trajectory::ingest(fixes, &IngestConfig::default()).unwrap();
    assert_eq!(traj.len(), 2);
    assert_eq!(traj[1].time_diff, 30.0);
    assert!(traj.iter().all(|f| f.is_valid()));
}

#[test]
fn test_filter_by_date_is_inclusive() {
    let fixes = vec![
        fix(46.5, 6.6, JUNE_1 - 1.0, 10.0, 0.0),
        fix(46.5, 6.6, JUNE_1, 10.0, 0.0),
        fix(46.5, 6.6, JUNE_1 + 86_399.0, 10.0, 0.0),
        fix(46.5, 6.6, JUNE_1 + 86_400.0, 10.0, 0.0),
    ];
    let traj = Trajectory::from_fixes(fixes).unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let day = traj.filter_by_date(date);

    assert_eq!(day.len(), 2);
    assert_eq!(day[0].time, JUNE_1);
    assert_eq!(day[0].time_diff, 0.0);
    assert_eq!(day[1].time_diff, 86_399.0);
}

#[test]
fn test_date_range_and_split_by_day() {
    let fixes = vec![
        fix(46.5, 6.6, JUNE_1 + 100.0, 10.0, 0.0),
        fix(46.5, 6.6, JUNE_1 + 200.0, 10.0, 0.0),
        fix(46.5, 6.6, JUNE_1 + 2.0 * 86_400.0 + 5.0, 10.0, 0.0),
    ];
    let traj = Trajectory::from_fixes(fixes).unwrap();

    let (first, last) = traj.date_range().unwrap();
    assert_eq!(first, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    assert_eq!(last, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());

    let days = traj.split_by_day();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].1.len(), 2);
    assert_eq!(days[1].0, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    assert_eq!(days[1].1[0].time_diff, 0.0);

    assert!(Trajectory::default().date_range().is_none());
}

#[test]
fn test_label_runs() {
    let labels = [1, 1, 0, 1, 2, 2, 1];
    assert_eq!(label_runs(&labels, &1), vec![0..2, 3..4, 6..7]);
    assert_eq!(label_runs(&labels, &2), vec![4..6]);
    assert!(label_runs(&labels, &5).is_empty());
}

#[test]
fn test_subtrajectories_require_aligned_labels() {
    let fixes: Vec<PositionFix> = (0..4)
        .map(|i| fix(46.5, 6.6 + 0.001 * i as f64, JUNE_1 + i as f64, 10.0, 0.0))
        .collect();
    let traj = Trajectory::from_fixes(fixes).unwrap();

    let subs = traj
        .subtrajectories(&[MotionLabel::Move, MotionLabel::Stop, MotionLabel::Stop, MotionLabel::Move], &MotionLabel::Stop)
        .unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].1, 1..3);
    assert_eq!(subs[0].0.len(), 2);

    let result = traj.label_runs(&[MotionLabel::Stop], &MotionLabel::Stop);
    assert!(matches!(result, Err(PlaceError::InvalidArgument { .. })));
}

#[test]
fn test_speed_labels_use_reported_and_derived_speed() {
    let fixes = vec![
        fix(46.5, 6.6, JUNE_1, 10.0, 0.2),
        // Fast reported speed, but barely moved in 60 s
        fix(46.50001, 6.6, JUNE_1 + 60.0, 10.0, 3.0),
        // Fast on both counts
        fix(46.51, 6.6, JUNE_1 + 120.0, 10.0, 3.0),
    ];
    let traj = Trajectory::from_fixes(fixes).unwrap();

    let labels = traj.speed_labels(0.5, Some(0.25));
    assert_eq!(labels, vec![MotionLabel::Stop, MotionLabel::Stop, MotionLabel::Move]);

    let reported_only = traj.speed_labels(0.5, None);
    assert_eq!(reported_only[1], MotionLabel::Move);
}

#[test]
fn test_split_stop_runs_on_jumps() {
    let fixes = vec![
        fix(46.5, 6.6, JUNE_1, 10.0, 0.0),
        fix(46.5, 6.6001, JUNE_1 + 60.0, 10.0, 0.0),
        // ~1.1 km jump, beyond 10 + 10 + 30 m
        fix(46.51, 6.6001, JUNE_1 + 120.0, 10.0, 0.0),
        fix(46.51, 6.6002, JUNE_1 + 180.0, 10.0, 0.0),
    ];
    let traj = Trajectory::from_fixes(fixes).unwrap();
    let labels = vec![MotionLabel::Stop; 4];

    let runs = traj.split_stop_runs(&labels, 500.0, 30.0).unwrap();
    assert_eq!(runs, vec![0..2, 2..4]);
}

#[test]
fn test_decreasing_time_rejected() {
    let fixes = vec![fix(46.5, 6.6, JUNE_1 + 10.0, 10.0, 0.0), fix(46.5, 6.6, JUNE_1, 10.0, 0.0)];
    assert!(matches!(
        Trajectory::from_fixes(fixes),
        Err(PlaceError::InvalidArgument { .. })
    ));
}
