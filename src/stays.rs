//! # Stay-Time Consolidation
//!
//! After geometric merging a place may carry many short visits that are
//! really one stay interrupted by noise. The passes here edit stay ranges
//! only; the shape keeps reflecting the member fixes.
//!
//! - [`merge_stay_times`]: join consecutive visits no other place interrupts
//! - [`merge_nearby_stays`]: join visits a few characteristic points apart
//! - [`merge_short_stops`]: fold short single-visit stops into the nearest region in time
//! - [`prune_short_regions`]: drop places with a short overall span
//! - [`classify_walks_by_intersection`]: walks inside a stop become stops

use std::ops::Range;
use std::sync::Arc;

use log::{debug, info};

use crate::error::Result;
use crate::region::{Region, RegionKind};
use crate::{MotionLabel, Trajectory};

/// Join consecutive stays of each region unless another region was entered in between.
///
/// Regions whose longest stay is shorter than `min_time` are dropped, and the
/// pass repeats while that removes regions. A lone region collapses to a
/// single stay from its first entry to its last exit. Finally, stays no
/// longer than `min_time / 2` are discarded, along with regions left without
/// any stay.
pub fn merge_stay_times(regions: Vec<Region>, min_time: f64) -> Vec<Region> {
    let mut regions = regions;

    loop {
        if regions.len() == 1 {
            let region = &mut regions[0];
            let first = region.stays()[0].start;
            let last = region.stays()[region.stays().len() - 1].end;
            region.set_stays(vec![first..last]);
            return regions;
        }

        let count = regions.len();
        for i in 0..regions.len() {
            let other_entries: Vec<f64> = regions
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, r)| r.entry_times())
                .collect();
            let joined = join_stays(&regions[i], |exit, entry| {
                !other_entries.iter().any(|&t| t > exit && t < entry)
            });
            regions[i].set_stays(joined);
        }

        regions.retain(|r| r.longest_stay() >= min_time);
        if regions.len() == count {
            break;
        }
        debug!(
            "[Stays] Dropped {} regions below {}s, repeating",
            count - regions.len(),
            min_time
        );
    }

    for region in &mut regions {
        let kept: Vec<Range<usize>> = region
            .stays()
            .iter()
            .zip(region.stay_intervals())
            .filter(|(_, interval)| interval.duration() > min_time / 2.0)
            .map(|(range, _)| range.clone())
            .collect();
        region.set_stays(kept);
    }
    regions.retain(|r| !r.stays().is_empty());
    regions
}

/// Join consecutive stays whose exit and next entry lie within
/// `index_threshold` characteristic points of each other.
///
/// `cp_indices` must be the ascending characteristic fix indices the regions
/// were mined from.
pub fn merge_nearby_stays(regions: &mut [Region], cp_indices: &[usize], index_threshold: usize) {
    let cp_position = |fix: usize| cp_indices.partition_point(|&c| c < fix);

    for region in regions.iter_mut() {
        let before = region.stays().len();
        let joined = join_stays_by_index(region, |exit, entry| {
            cp_position(entry).saturating_sub(cp_position(exit)) <= index_threshold
        });
        region.set_stays(joined);
        if region.stays().len() != before {
            debug!(
                "[Stays] Joined {} nearby stays",
                before - region.stays().len()
            );
        }
    }
}

/// Fold short single-stay stops into their nearest neighbor in time.
///
/// A [`RegionKind::Stop`] region with exactly one stay shorter than
/// `duration_threshold` seconds hands that stay to the region, of any kind,
/// owning the nearest other stay, measured by
/// the strictly positive gap between the two, if that gap is at most
/// `merge_threshold` seconds. The earlier neighbor wins ties. Absorbed
/// regions are removed and are no longer candidates for later stops.
pub fn merge_short_stops(
    regions: Vec<Region>,
    duration_threshold: f64,
    merge_threshold: f64,
) -> Vec<Region> {
    let mut regions = regions;
    let mut absorbed = vec![false; regions.len()];

    for i in 0..regions.len() {
        if regions[i].kind() != RegionKind::Stop || regions[i].stays().len() != 1 {
            continue;
        }
        let interval = regions[i].stay_intervals()[0];
        if interval.duration() >= duration_threshold {
            continue;
        }

        let mut before: Option<(usize, f64)> = None;
        let mut after: Option<(usize, f64)> = None;
        for (j, other) in regions.iter().enumerate() {
            if j == i || absorbed[j] {
                continue;
            }
            for stay in other.stay_intervals() {
                let gap_before = interval.entry - stay.exit;
                if gap_before > 0.0 && before.map_or(true, |(_, g)| gap_before < g) {
                    before = Some((j, gap_before));
                }
                let gap_after = stay.entry - interval.exit;
                if gap_after > 0.0 && after.map_or(true, |(_, g)| gap_after < g) {
                    after = Some((j, gap_after));
                }
            }
        }

        let target = match (before, after) {
            (Some(b), Some(a)) => {
                if b.1 <= a.1 {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => continue,
        };
        if target.1 > merge_threshold {
            continue;
        }

        let stay = regions[i].stays()[0].clone();
        regions[target.0].push_stay(stay);
        absorbed[i] = true;
    }

    let folded = absorbed.iter().filter(|a| **a).count();
    if folded > 0 {
        info!("[Stays] Folded {} short stops into neighbors", folded);
    }

    regions
        .into_iter()
        .zip(absorbed)
        .filter(|(_, gone)| !gone)
        .map(|(region, _)| region)
        .collect()
}

/// Keep regions whose span from first entry to last exit is at least `min_duration`.
pub fn prune_short_regions(regions: Vec<Region>, min_duration: f64) -> Vec<Region> {
    let before = regions.len();
    let kept: Vec<Region> = regions
        .into_iter()
        .filter(|r| r.span() >= min_duration)
        .collect();
    if kept.len() != before {
        debug!(
            "[Stays] Pruned {} regions shorter than {}s",
            before - kept.len(),
            min_duration
        );
    }
    kept
}

/// Relabel every walk run as a stop or a move.
///
/// A walk run whose path overlaps any stop region by more than `threshold`
/// becomes a stop, all others become moves. Other labels are copied.
pub fn classify_walks_by_intersection(
    stops: &[Region],
    trajectory: &Arc<Trajectory>,
    labels: &[MotionLabel],
    threshold: f64,
) -> Result<Vec<MotionLabel>> {
    let mut relabeled = labels.to_vec();
    let mut promoted = 0;

    for run in trajectory.label_runs(labels, &MotionLabel::Walk)? {
        let walk = Region::new(Arc::clone(trajectory), run.clone(), RegionKind::Walk)?;
        let inside = stops
            .iter()
            .any(|stop| stop.percent_intersection(&walk) > threshold);
        let label = if inside {
            promoted += 1;
            MotionLabel::Stop
        } else {
            MotionLabel::Move
        };
        relabeled[run].fill(label);
    }

    debug!("[Stays] {} walk runs reclassified as stops", promoted);
    Ok(relabeled)
}

/// Fold a region's stays, joining neighbors for which `join(exit_time, entry_time)` holds.
fn join_stays<F>(region: &Region, join: F) -> Vec<Range<usize>>
where
    F: Fn(f64, f64) -> bool,
{
    let trajectory = region.trajectory();
    join_ranges(region.stays(), |prev, next| {
        join(trajectory[prev.end - 1].time, trajectory[next.start].time)
    })
}

/// Like [`join_stays`] but with the exit and entry fix indices.
fn join_stays_by_index<F>(region: &Region, join: F) -> Vec<Range<usize>>
where
    F: Fn(usize, usize) -> bool,
{
    join_ranges(region.stays(), |prev, next| join(prev.end - 1, next.start))
}

fn join_ranges<F>(stays: &[Range<usize>], join: F) -> Vec<Range<usize>>
where
    F: Fn(&Range<usize>, &Range<usize>) -> bool,
{
    let mut out: Vec<Range<usize>> = Vec::with_capacity(stays.len());
    for stay in stays {
        match out.last_mut() {
            Some(last) if join(last, stay) => last.end = stay.end,
            _ => out.push(stay.clone()),
        }
    }
    out
}
