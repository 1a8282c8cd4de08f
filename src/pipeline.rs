//! # Place Detection Pipeline
//!
//! Label propagation end to end: smoothing, characteristic points, mining,
//! merging and stay consolidation, plus a per-day batch driver.
//!
//! Days are independent, so the batch driver can fan out over rayon with
//! the `parallel` feature.

use std::ops::Range;
use std::sync::Arc;

use chrono::NaiveDate;
use log::{debug, info};

use crate::characteristic::characteristic_points;
use crate::error::{require_points, Result};
use crate::mining::significant_place_mining;
use crate::region::Region;
use crate::smoothing::smooth_trajectory;
use crate::{PlaceConfig, Trajectory};

/// Minimum number of fixes for [`detect_places`]; shorter days are skipped.
pub const MIN_DETECTION_POINTS: usize = 4;

/// Output of the label propagation pipeline.
#[derive(Debug, Clone)]
pub struct PlaceDetection {
    /// Smoothed trajectory the places index into
    pub trajectory: Arc<Trajectory>,
    /// Ascending characteristic fix indices
    pub characteristic_indices: Vec<usize>,
    /// Per fix, the index of the place whose stays cover it
    pub labels: Vec<Option<usize>>,
    /// Significant places
    pub places: Vec<Region>,
}

/// Places detected on one UTC day.
#[derive(Debug, Clone)]
pub struct DayResult {
    pub date: NaiveDate,
    pub detection: PlaceDetection,
}

/// Detect significant places in one trajectory.
///
/// Fails with `InsufficientData` for fewer than 4 fixes and with
/// `InvalidArgument` for invalid configuration values.
pub fn detect_places(trajectory: &Trajectory, config: &PlaceConfig) -> Result<PlaceDetection> {
    require_points("detect_places", trajectory.len(), MIN_DETECTION_POINTS)?;

    let smoothed = Arc::new(smooth_trajectory(trajectory, &config.smoothing)?);
    let characteristic_indices = characteristic_points(&smoothed, &config.characteristic)?;
    let places = significant_place_mining(Arc::clone(&smoothed), &characteristic_indices, &config.mining)?;
    let labels = place_labels(smoothed.len(), &places);

    info!(
        "[Pipeline] {} fixes, {} characteristic points, {} places",
        smoothed.len(),
        characteristic_indices.len(),
        places.len()
    );

    Ok(PlaceDetection {
        trajectory: smoothed,
        characteristic_indices,
        labels,
        places,
    })
}

/// Run [`detect_places`] on every UTC day of a trajectory, in date order.
///
/// Days with fewer than 4 fixes are skipped; any other failure aborts.
pub fn detect_places_by_day(trajectory: &Trajectory, config: &PlaceConfig) -> Result<Vec<DayResult>> {
    let days = trajectory.split_by_day();
    let results = days
        .iter()
        .map(|(date, day)| detect_day(*date, day, config))
        .collect::<Result<Vec<_>>>()?;
    Ok(finish(days.len(), results))
}

/// Parallel version of [`detect_places_by_day`], one rayon task per day.
#[cfg(feature = "parallel")]
pub fn detect_places_by_day_parallel(
    trajectory: &Trajectory,
    config: &PlaceConfig,
) -> Result<Vec<DayResult>> {
    use rayon::prelude::*;

    let days = trajectory.split_by_day();
    let results = days
        .par_iter()
        .map(|(date, day)| detect_day(*date, day, config))
        .collect::<Result<Vec<_>>>()?;
    Ok(finish(days.len(), results))
}

fn detect_day(date: NaiveDate, day: &Trajectory, config: &PlaceConfig) -> Result<Option<DayResult>> {
    if day.len() < MIN_DETECTION_POINTS {
        debug!("[Pipeline] Skipping {}: only {} fixes", date, day.len());
        return Ok(None);
    }
    let detection = detect_places(day, config)?;
    Ok(Some(DayResult { date, detection }))
}

fn finish(day_count: usize, results: Vec<Option<DayResult>>) -> Vec<DayResult> {
    let results: Vec<DayResult> = results.into_iter().flatten().collect();
    info!(
        "[Pipeline] Processed {} of {} days",
        results.len(),
        day_count
    );
    results
}

/// Per-fix place index from the places' stay ranges.
///
/// Joined stays may span a visit to another place. Stays are applied in
/// order of their first fix, so the later-starting (nested) visit wins.
fn place_labels(len: usize, places: &[Region]) -> Vec<Option<usize>> {
    let mut stays: Vec<(Range<usize>, usize)> = places
        .iter()
        .enumerate()
        .flat_map(|(index, place)| place.stays().iter().map(move |stay| (stay.clone(), index)))
        .collect();
    stays.sort_by_key(|(stay, _)| stay.start);

    let mut labels = vec![None; len];
    for (stay, index) in stays {
        labels[stay].fill(Some(index));
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionKind;
    use crate::PositionFix;

    fn place(trajectory: &Arc<Trajectory>, members: Vec<Range<usize>>, stays: Vec<Range<usize>>) -> Region {
        let mut region = Region::from_ranges(Arc::clone(trajectory), members, RegionKind::Cluster).unwrap();
        region.set_stays(stays);
        region
    }

    #[test]
    fn test_nested_visit_keeps_its_label() {
        let fixes = (0..10)
            .map(|i| PositionFix::new(46.5, 6.6 + 0.001 * (i / 4) as f64, 60.0 * i as f64, 10.0, 0.0))
            .collect();
        let trajectory = Arc::new(Trajectory::from_fixes(fixes).unwrap());

        let inner = place(&trajectory, vec![4..6], vec![4..6]);
        let outer = place(&trajectory, vec![0..3, 7..10], vec![0..10]);

        let labels = place_labels(10, &[inner.clone(), outer.clone()]);
        assert_eq!(labels[3], Some(1));
        assert_eq!(&labels[4..6], &[Some(0); 2]);
        assert_eq!(labels[6], Some(1));

        let labels = place_labels(10, &[outer, inner]);
        assert_eq!(&labels[4..6], &[Some(1); 2]);
        assert_eq!(labels[9], Some(0));
    }
}
