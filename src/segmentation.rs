//! # Speed-Threshold Segmentation
//!
//! Stop/walk/move labeling driven directly by reported speed, followed by
//! the region and merge machinery shared with label propagation.
//!
//! ## Stages
//! 1. Fixes slower than the walk speed are "slow"; a synthetic fix is
//!    inserted at every slow/fast transition, dated by the travel time the
//!    adjacent speed implies.
//! 2. Every fix is labeled stop, walk or move from its speed.
//! 3. Stop runs shorter than a time (and optionally point) budget become walks.
//! 4. Stop runs become stop regions, merged on overlap or boundary proximity.
//! 5. Walk runs overlapping a stop region become stops, the others moves.
//! 6. The final stop runs are rebuilt and merged. Optionally, short stops
//!    are folded into the nearest stop or move region in time, their fixes
//!    taking that region's label. Places are pruned by extended stay time.

use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{require_points, Result};
use crate::geo_utils::haversine_distance;
use crate::merge::{recursive_merge, Proximity};
use crate::region::{Region, RegionKind, DEFAULT_CENTROID_THRESHOLD};
use crate::stays::{classify_walks_by_intersection, merge_short_stops};
use crate::{MotionLabel, PositionFix, SpeedConfig, StopConfig, Trajectory};

/// Speeds are clamped to at least this (m/s) before dividing.
const MIN_SPEED: f64 = 1e-6;

/// Minimum number of fixes for [`segment_trajectory`].
pub const MIN_SEGMENTATION_POINTS: usize = 4;

/// Output of the speed-threshold variant.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Input trajectory with the synthetic transition fixes inserted
    pub trajectory: Arc<Trajectory>,
    /// Final label per fix of `trajectory`
    pub labels: Vec<MotionLabel>,
    /// Significant places
    pub places: Vec<Region>,
    /// Move segments, one per move run, holding any short stops folded into them
    pub moves: Vec<Region>,
}

/// Per-label fix counts of a segmentation, for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub moves: usize,
    pub stops: usize,
    pub walks: usize,
}

impl Segmentation {
    pub fn label_counts(&self) -> LabelCounts {
        let mut counts = LabelCounts::default();
        for label in &self.labels {
            match label {
                MotionLabel::Move => counts.moves += 1,
                MotionLabel::Stop => counts.stops += 1,
                MotionLabel::Walk => counts.walks += 1,
            }
        }
        counts
    }
}

/// Stop below `stop_speed`, walk below `walk_speed`, move otherwise.
pub fn motion_labels(trajectory: &Trajectory, stop_speed: f64, walk_speed: f64) -> Vec<MotionLabel> {
    trajectory
        .iter()
        .map(|fix| {
            if fix.speed < stop_speed {
                MotionLabel::Stop
            } else if fix.speed < walk_speed {
                MotionLabel::Walk
            } else {
                MotionLabel::Move
            }
        })
        .collect()
}

/// Insert a synthetic fix at every slow/fast transition.
///
/// Entering a slow run, the first slow fix is copied and dated
/// `t_fast + d / v_fast`, when the device would have arrived at the fast
/// speed. Leaving one, the last slow fix is copied and dated
/// `t_fast - d / v_fast`. Dates are clamped into the gap between the two
/// fixes so ordering holds; derived fields are recomputed.
pub fn interpolate_edges(trajectory: &Trajectory, slow: &[bool]) -> Result<Trajectory> {
    trajectory.check_aligned(slow.len())?;

    let fixes = trajectory.fixes();
    let mut out: Vec<PositionFix> = Vec::with_capacity(fixes.len() * 2);

    for i in 0..fixes.len() {
        out.push(fixes[i]);
        if i + 1 == fixes.len() || slow[i] == slow[i + 1] {
            continue;
        }

        let (end, start) = (&fixes[i], &fixes[i + 1]);
        let dist = haversine_distance(end, start);
        let mut edge = if slow[i] {
            let mut fix = *end;
            fix.time = start.time - dist / start.speed.max(MIN_SPEED);
            fix
        } else {
            let mut fix = *start;
            fix.time = end.time + dist / end.speed.max(MIN_SPEED);
            fix
        };
        edge.time = edge.time.clamp(end.time, start.time);
        out.push(edge);
    }

    debug!(
        "[Segmentation] Inserted {} transition fixes",
        out.len() - fixes.len()
    );
    Trajectory::from_fixes(out)
}

/// Relabel runs of `from` lasting less than `time_threshold` seconds as `to`.
///
/// With `point_threshold`, a run is relabeled only if it also has fewer fixes.
pub fn remove_short_runs(
    trajectory: &Trajectory,
    labels: &[MotionLabel],
    from: MotionLabel,
    to: MotionLabel,
    time_threshold: f64,
    point_threshold: Option<usize>,
) -> Result<Vec<MotionLabel>> {
    let mut relabeled = labels.to_vec();
    for run in trajectory.label_runs(labels, &from)? {
        let duration = trajectory[run.end - 1].time - trajectory[run.start].time;
        let few_points = point_threshold.map_or(true, |limit| run.len() < limit);
        if duration < time_threshold && few_points {
            relabeled[run].fill(to);
        }
    }
    Ok(relabeled)
}

/// Regions of `kind` for every run of `label`.
pub fn regions_for_label(
    trajectory: &Arc<Trajectory>,
    labels: &[MotionLabel],
    label: MotionLabel,
    kind: RegionKind,
) -> Result<Vec<Region>> {
    trajectory
        .label_runs(labels, &label)?
        .into_iter()
        .map(|run| Region::new(Arc::clone(trajectory), run, kind))
        .collect()
}

/// [`segment_trajectory`] over raw fixes.
pub fn segment_by_speed(fixes: Vec<PositionFix>, config: &SpeedConfig) -> Result<Segmentation> {
    let trajectory = Trajectory::from_fixes(fixes)?;
    segment_trajectory(&trajectory, config)
}

/// Run the speed-threshold variant on one trajectory.
///
/// Fails with `InsufficientData` for fewer than 4 fixes.
pub fn segment_trajectory(trajectory: &Trajectory, config: &SpeedConfig) -> Result<Segmentation> {
    require_points("segment_by_speed", trajectory.len(), MIN_SEGMENTATION_POINTS)?;

    let slow: Vec<bool> = trajectory.iter().map(|f| f.speed < config.walk_speed).collect();
    let trajectory = Arc::new(interpolate_edges(trajectory, &slow)?);

    let labels = motion_labels(&trajectory, config.stop_speed, config.walk_speed);
    let labels = remove_short_runs(
        &trajectory,
        &labels,
        MotionLabel::Stop,
        MotionLabel::Walk,
        config.short_stop_time,
        config.short_stop_points,
    )?;

    let proximity = Some(Proximity::Boundary {
        threshold: config.merge_distance,
        centroid_threshold: config.centroid_threshold,
    });

    let stops = regions_for_label(&trajectory, &labels, MotionLabel::Stop, RegionKind::Stop)?;
    let stops = recursive_merge(stops, 0.0, proximity)?;
    let labels = classify_walks_by_intersection(&stops, &trajectory, &labels, config.walk_overlap)?;

    let places = regions_for_label(&trajectory, &labels, MotionLabel::Stop, RegionKind::Stop)?;
    let mut places = recursive_merge(places, 0.0, proximity)?;
    let mut moves = regions_for_label(&trajectory, &labels, MotionLabel::Move, RegionKind::Move)?;
    let mut labels = labels;

    if let Some(short) = &config.short_stop_merge {
        let mut regions = places;
        regions.append(&mut moves);
        let regions = merge_short_stops(regions, short.duration_threshold, short.merge_threshold);
        let (stops, others): (Vec<Region>, Vec<Region>) =
            regions.into_iter().partition(|r| r.kind() == RegionKind::Stop);
        for stay in others.iter().flat_map(|r| r.stays()) {
            labels[stay.clone()].fill(MotionLabel::Move);
        }
        places = stops;
        moves = others;
    }

    let candidates = places.len();
    places.retain(|p| p.longer_than(config.min_duration));

    info!(
        "[Segmentation] {} fixes -> {} places ({} candidates), {} moves",
        trajectory.len(),
        places.len(),
        candidates,
        moves.len()
    );

    Ok(Segmentation {
        trajectory,
        labels,
        places,
        moves,
    })
}

/// Stop regions from reported and derived speed alone.
///
/// Stop runs are split where consecutive fixes jump further than their
/// accuracy allows, merged on overlap or boundary proximity, and kept when
/// their extended stay lasts at least `min_duration`.
pub fn detect_stops(trajectory: &Trajectory, config: &StopConfig) -> Result<Vec<Region>> {
    require_points("detect_stops", trajectory.len(), 2)?;

    let trajectory = Arc::new(trajectory.clone());
    let labels = trajectory.speed_labels(config.stop_speed, config.calculated_speed);
    let stops = trajectory
        .split_stop_runs(&labels, config.split_distance, config.accuracy_error)?
        .into_iter()
        .map(|run| Region::new(Arc::clone(&trajectory), run, RegionKind::Stop))
        .collect::<Result<Vec<_>>>()?;

    let candidates = stops.len();
    let mut stops = recursive_merge(
        stops,
        0.0,
        Some(Proximity::Boundary {
            threshold: config.merge_distance,
            centroid_threshold: DEFAULT_CENTROID_THRESHOLD,
        }),
    )?;
    stops.retain(|s| s.longer_than(config.min_duration));

    info!(
        "[Segmentation] {} stop runs -> {} stops",
        candidates,
        stops.len()
    );
    Ok(stops)
}
