//! # Region Model
//!
//! A region is a cluster of fixes believed to be one significant place or
//! one continuous walk/move segment. Regions do not copy fixes: they hold a
//! shared [`Trajectory`] and index ranges into it.
//!
//! Two range lists are kept:
//! - **members**: the fixes the shape is built from
//! - **stays**: the `[entry, exit)` visits reported for the place
//!
//! Both start out equal. [`Region::union`] extends both; the stay-time
//! consolidation passes in [`crate::stays`] only edit stays, so the shape
//! keeps reflecting the geometric evidence.

mod boundary;
pub mod shape;

use std::ops::Range;
use std::sync::Arc;

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::error::{PlaceError, Result};
use crate::geo_utils::coord_distance;
use crate::{PositionFix, Trajectory};

pub use boundary::boundary_distance;
pub use shape::{overlap, Overlap, Shape, ShapeKind};

/// Fixes less accurate than this (meters) are left out of shapes, unless
/// nothing would remain.
pub const OUTLIER_ACCURACY: f64 = 60.0;

/// Default centroid distance (meters) beyond which the boundary walk is skipped.
pub const DEFAULT_CENTROID_THRESHOLD: f64 = 200.0;

/// Speeds are clamped to at least this (m/s) before dividing.
const MIN_SPEED: f64 = 1e-6;

/// What a region represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    /// A place where the device stayed.
    Stop,
    /// Slow movement, kept as a path.
    Walk,
    /// Transit, kept as a path.
    Move,
    /// A label propagation cluster, shaped like a stop.
    Cluster,
}

impl RegionKind {
    /// Whether the shape is a convex hull rather than an ordered path.
    pub fn is_hull(self) -> bool {
        matches!(self, RegionKind::Stop | RegionKind::Cluster)
    }
}

/// One visit to a region, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StayInterval {
    pub entry: f64,
    pub exit: f64,
}

impl StayInterval {
    pub fn duration(&self) -> f64 {
        self.exit - self.entry
    }
}

/// Serializable snapshot of a region for reporting collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub kind: RegionKind,
    pub shape_kind: ShapeKind,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    /// Boundary vertices as `[lat, lon]`
    pub vertices: Vec<[f64; 2]>,
    pub stays: Vec<StayInterval>,
    pub member_count: usize,
}

/// A cluster of fixes from one shared trajectory.
#[derive(Debug, Clone)]
pub struct Region {
    trajectory: Arc<Trajectory>,
    members: Vec<Range<usize>>,
    stays: Vec<Range<usize>>,
    kind: RegionKind,
    shape: Shape,
    centroid: Coord,
}

impl Region {
    /// Region covering one contiguous run of fixes.
    pub fn new(trajectory: Arc<Trajectory>, range: Range<usize>, kind: RegionKind) -> Result<Self> {
        Self::from_ranges(trajectory, vec![range], kind)
    }

    /// Region covering several runs of fixes.
    ///
    /// Ranges are sorted and overlapping ones coalesced. Fails with
    /// `InvalidArgument` for an empty or out-of-bounds range, or when no
    /// range is given.
    pub fn from_ranges(
        trajectory: Arc<Trajectory>,
        ranges: Vec<Range<usize>>,
        kind: RegionKind,
    ) -> Result<Self> {
        if ranges.is_empty() {
            return Err(PlaceError::invalid("region ranges", "[]", "at least one range"));
        }
        if let Some(bad) = ranges
            .iter()
            .find(|r| r.start >= r.end || r.end > trajectory.len())
        {
            return Err(PlaceError::invalid(
                "region range",
                format!("{:?} of {} fixes", bad, trajectory.len()),
                "a non-empty range within the trajectory",
            ));
        }

        let members = normalize_ranges(ranges);
        let stays = members.clone();
        let (shape, centroid) = define_shape(&trajectory, &members, kind);

        Ok(Self {
            trajectory,
            members,
            stays,
            kind,
            shape,
            centroid,
        })
    }

    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    pub fn trajectory(&self) -> &Arc<Trajectory> {
        &self.trajectory
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Shape centroid (x = longitude, y = latitude).
    pub fn centroid(&self) -> Coord {
        self.centroid
    }

    /// Index ranges the shape is built from.
    pub fn members(&self) -> &[Range<usize>] {
        &self.members
    }

    /// Index ranges of the visits, sorted and disjoint.
    pub fn stays(&self) -> &[Range<usize>] {
        &self.stays
    }

    /// All member fixes in index order.
    pub fn member_fixes(&self) -> Vec<PositionFix> {
        self.members
            .iter()
            .flat_map(|r| self.trajectory.fixes()[r.clone()].iter().copied())
            .collect()
    }

    pub fn entry_times(&self) -> Vec<f64> {
        self.stays.iter().map(|r| self.trajectory[r.start].time).collect()
    }

    pub fn exit_times(&self) -> Vec<f64> {
        self.stays.iter().map(|r| self.trajectory[r.end - 1].time).collect()
    }

    pub fn stay_intervals(&self) -> Vec<StayInterval> {
        self.stays.iter().map(|r| self.interval(r)).collect()
    }

    /// Entry time of the first stay.
    pub fn first_entry(&self) -> f64 {
        self.trajectory[self.stays[0].start].time
    }

    /// Exit time of the last stay.
    pub fn last_exit(&self) -> f64 {
        self.trajectory[self.stays[self.stays.len() - 1].end - 1].time
    }

    /// Time between the first entry and the last exit.
    pub fn span(&self) -> f64 {
        self.last_exit() - self.first_entry()
    }

    /// Longest single stay, in seconds.
    pub fn longest_stay(&self) -> f64 {
        self.stay_intervals()
            .iter()
            .map(StayInterval::duration)
            .fold(0.0, f64::max)
    }

    /// Absorb `other`, taking on `kind`.
    ///
    /// Member and stay ranges are concatenated and re-sorted, then the shape
    /// and centroid are rebuilt. Fails with `InvalidArgument` if the regions
    /// belong to different trajectories.
    pub fn union(&mut self, other: &Region, kind: RegionKind) -> Result<()> {
        self.check_same_trajectory(other)?;

        let mut members = std::mem::take(&mut self.members);
        members.extend(other.members.iter().cloned());
        self.members = normalize_ranges(members);

        let mut stays = std::mem::take(&mut self.stays);
        stays.extend(other.stays.iter().cloned());
        self.stays = normalize_ranges(stays);

        self.kind = kind;
        let (shape, centroid) = define_shape(&self.trajectory, &self.members, kind);
        self.shape = shape;
        self.centroid = centroid;
        Ok(())
    }

    /// Overlap ratio with another region, see [`shape::percent_intersection`].
    pub fn percent_intersection(&self, other: &Region) -> f64 {
        shape::percent_intersection(&self.shape, &other.shape)
    }

    /// Approximate boundary distance in meters, see [`boundary_distance`].
    pub fn boundary_distance(&self, other: &Region, centroid_threshold: f64) -> f64 {
        boundary_distance(
            &self.shape,
            self.centroid,
            &other.shape,
            other.centroid,
            centroid_threshold,
        )
    }

    /// Haversine distance between centroids in meters.
    pub fn centroid_distance(&self, other: &Region) -> f64 {
        coord_distance(self.centroid, other.centroid)
    }

    /// First entry and last exit, extended over the adjacent gaps.
    ///
    /// Signal is often lost inside buildings, so the fix before the first
    /// entry and the fix after the last exit can be far apart in time. The
    /// part of each gap not explained by traveling the gap's distance at the
    /// outside fix's speed is credited to the stay.
    pub fn stay_time(&self) -> (f64, f64) {
        let traj = &self.trajectory;
        let first = self.stays[0].start;
        let last = self.stays[self.stays.len() - 1].end;

        let mut start = traj[first].time;
        let mut stop = traj[last - 1].time;

        if first > 0 {
            let expected = traj[first].distance / traj[first - 1].speed.max(MIN_SPEED);
            let gap = start - traj[first - 1].time;
            start -= (gap - expected).max(0.0);
        }
        if last < traj.len() {
            let expected = traj[last].distance / traj[last].speed.max(MIN_SPEED);
            let gap = traj[last].time - stop;
            stop += (gap - expected).max(0.0);
        }

        (start, stop)
    }

    /// Whether the extended stay lasts at least `duration` seconds.
    pub fn longer_than(&self, duration: f64) -> bool {
        let (start, stop) = self.stay_time();
        stop - start >= duration
    }

    /// Serializable snapshot.
    pub fn to_summary(&self) -> RegionSummary {
        RegionSummary {
            kind: self.kind,
            shape_kind: self.shape.kind(),
            centroid_lat: self.centroid.y,
            centroid_lon: self.centroid.x,
            vertices: self.shape.vertices().iter().map(|c| [c.y, c.x]).collect(),
            stays: self.stay_intervals(),
            member_count: self.members.iter().map(|r| r.len()).sum(),
        }
    }

    /// Replace the stay ranges, keeping them sorted and disjoint.
    pub(crate) fn set_stays(&mut self, stays: Vec<Range<usize>>) {
        self.stays = normalize_ranges(stays);
    }

    /// Add a stay without touching the shape.
    pub(crate) fn push_stay(&mut self, stay: Range<usize>) {
        let mut stays = std::mem::take(&mut self.stays);
        stays.push(stay);
        self.stays = normalize_ranges(stays);
    }

    pub(crate) fn check_same_trajectory(&self, other: &Region) -> Result<()> {
        if !Arc::ptr_eq(&self.trajectory, &other.trajectory) {
            return Err(PlaceError::invalid(
                "region pair",
                "regions of different trajectories",
                "regions sharing one trajectory",
            ));
        }
        Ok(())
    }

    fn interval(&self, range: &Range<usize>) -> StayInterval {
        StayInterval {
            entry: self.trajectory[range.start].time,
            exit: self.trajectory[range.end - 1].time,
        }
    }
}

/// Sort ranges by start and coalesce overlapping ones.
fn normalize_ranges(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    ranges.retain(|r| r.start < r.end);
    ranges.sort_by_key(|r| (r.start, r.end));

    let mut out: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match out.last_mut() {
            Some(last) if r.start < last.end => last.end = last.end.max(r.end),
            _ => out.push(r),
        }
    }
    out
}

/// Shape and centroid from the member fixes, after outlier rejection.
fn define_shape(trajectory: &Trajectory, members: &[Range<usize>], kind: RegionKind) -> (Shape, Coord) {
    let fixes = members
        .iter()
        .flat_map(|r| trajectory.fixes()[r.clone()].iter());

    let all: Vec<&PositionFix> = fixes.collect();
    let accurate: Vec<Coord> = all
        .iter()
        .filter(|f| f.accuracy <= OUTLIER_ACCURACY)
        .map(|f| f.coord())
        .collect();
    let coords = if accurate.is_empty() {
        all.iter().map(|f| f.coord()).collect()
    } else {
        accurate
    };

    let shape = Shape::from_coords(&coords, kind.is_hull());
    let centroid = shape.centroid();
    (shape, centroid)
}
