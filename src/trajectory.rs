//! Time-ordered trajectory of position fixes for one device.
//!
//! Provides ingestion (deduplication, accuracy filtering, derived
//! distance/time annotation), calendar-day filtering, and label-based
//! sub-sequencing used by every detection stage.

use std::ops::{Index, Range};

use chrono::{DateTime, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{PlaceError, Result};
use crate::geo_utils::haversine_distance;
use crate::{IngestConfig, MotionLabel, PositionFix};

/// Seconds in one UTC day.
const SECONDS_PER_DAY: i64 = 86_400;

/// An owned, time-ordered sequence of fixes for one analysis window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    fixes: Vec<PositionFix>,
}

impl Trajectory {
    /// Build a trajectory from raw fixes.
    ///
    /// Drops fixes with non-finite or out-of-range values, applies
    /// deduplication and accuracy filtering from `config`, then fills
    /// `distance` and `time_diff` relative to the previous retained fix.
    /// Fails with `InvalidArgument` if timestamps decrease.
    pub fn ingest(fixes: Vec<PositionFix>, config: &IngestConfig) -> Result<Self> {
        let total = fixes.len();
        let mut retained: Vec<PositionFix> = Vec::with_capacity(total);
        let mut invalid = 0;

        for fix in fixes {
            if !fix.is_valid() {
                invalid += 1;
                continue;
            }
            if config.remove_duplicates && retained.last() == Some(&fix) {
                continue;
            }
            if let Some(threshold) = config.accuracy_threshold {
                if fix.accuracy > threshold {
                    continue;
                }
            }
            retained.push(fix);
        }

        if invalid > 0 {
            debug!("[Trajectory] Dropped {} of {} invalid fixes", invalid, total);
        }
        Self::from_fixes(retained)
    }

    /// Build a trajectory from fixes that need no filtering.
    ///
    /// Derived fields are recomputed. Fails with `InvalidArgument` if
    /// timestamps decrease.
    pub fn from_fixes(mut fixes: Vec<PositionFix>) -> Result<Self> {
        if let Some(pos) = fixes.windows(2).position(|w| w[1].time < w[0].time) {
            return Err(PlaceError::invalid(
                "fix order",
                format!("time {} after {}", fixes[pos + 1].time, fixes[pos].time),
                "non-decreasing timestamps",
            ));
        }
        annotate(&mut fixes);
        Ok(Self { fixes })
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn fixes(&self) -> &[PositionFix] {
        &self.fixes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PositionFix> {
        self.fixes.iter()
    }

    pub fn into_fixes(self) -> Vec<PositionFix> {
        self.fixes
    }

    /// Timestamps of all fixes.
    pub fn times(&self) -> Vec<f64> {
        self.fixes.iter().map(|f| f.time).collect()
    }

    /// Fixes whose timestamp falls within the given UTC calendar day
    /// (00:00:00 to 23:59:59 inclusive).
    pub fn filter_by_date(&self, date: NaiveDate) -> Trajectory {
        let (start, end) = day_bounds(date);
        let fixes: Vec<PositionFix> = self
            .fixes
            .iter()
            .filter(|f| f.time >= start && f.time <= end)
            .copied()
            .collect();

        let mut filtered = Trajectory { fixes };
        annotate(&mut filtered.fixes);
        filtered
    }

    /// UTC dates of the first and last fix.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.fixes.first()?;
        let last = self.fixes.last()?;
        Some((utc_date(first.time)?, utc_date(last.time)?))
    }

    /// Split into one trajectory per UTC calendar day that has fixes.
    pub fn split_by_day(&self) -> Vec<(NaiveDate, Trajectory)> {
        let mut days: Vec<(NaiveDate, Trajectory)> = Vec::new();
        let mut current: Option<(i64, Vec<PositionFix>)> = None;

        for fix in &self.fixes {
            let day = (fix.time.floor() as i64).div_euclid(SECONDS_PER_DAY);
            match current.as_mut() {
                Some((d, fixes)) if *d == day => fixes.push(*fix),
                _ => {
                    if let Some((d, fixes)) = current.take() {
                        push_day(&mut days, d, fixes);
                    }
                    current = Some((day, vec![*fix]));
                }
            }
        }
        if let Some((d, fixes)) = current {
            push_day(&mut days, d, fixes);
        }

        days
    }

    /// Maximal runs of consecutive fixes carrying `label`, as `[start, end)` ranges.
    ///
    /// Fails with `InvalidArgument` if `labels` is not aligned with the trajectory.
    pub fn label_runs<T: PartialEq>(&self, labels: &[T], label: &T) -> Result<Vec<Range<usize>>> {
        self.check_aligned(labels.len())?;
        Ok(label_runs(labels, label))
    }

    /// Sub-trajectories carrying `label`, each with its index bounds.
    pub fn subtrajectories<T: PartialEq>(
        &self,
        labels: &[T],
        label: &T,
    ) -> Result<Vec<(&[PositionFix], Range<usize>)>> {
        Ok(self
            .label_runs(labels, label)?
            .into_iter()
            .map(|r| (&self.fixes[r.clone()], r))
            .collect())
    }

    /// Stop/move labels from reported speed, optionally backed by derived speed.
    ///
    /// Reported speed alone misses stops when the signal is lost indoors
    /// (speed never drops), derived speed alone misses them when indoor
    /// noise inflates distance. A fix is a stop if its reported speed is
    /// below `stop_threshold` or, when given, its derived speed is below the
    /// (more conservative) `calculated_threshold`.
    pub fn speed_labels(
        &self,
        stop_threshold: f64,
        calculated_threshold: Option<f64>,
    ) -> Vec<MotionLabel> {
        self.fixes
            .iter()
            .map(|fix| {
                let reported_stop = fix.speed < stop_threshold;
                let derived_stop = match (calculated_threshold, fix.derived_speed()) {
                    (Some(threshold), Some(speed)) => speed < threshold,
                    _ => false,
                };
                if reported_stop || derived_stop {
                    MotionLabel::Stop
                } else {
                    MotionLabel::Move
                }
            })
            .collect()
    }

    /// Stop runs, split wherever consecutive fixes jump further than their
    /// combined accuracy allows.
    ///
    /// A run is cut before fix `j + 1` when its distance to fix `j` exceeds
    /// `min(split_distance, acc_j + acc_{j+1} + accuracy_error)`.
    pub fn split_stop_runs(
        &self,
        labels: &[MotionLabel],
        split_distance: f64,
        accuracy_error: f64,
    ) -> Result<Vec<Range<usize>>> {
        let mut runs = Vec::new();

        for run in self.label_runs(labels, &MotionLabel::Stop)? {
            let mut start = run.start;
            for j in run.start..run.end - 1 {
                let pair_accuracy = self.fixes[j].accuracy + self.fixes[j + 1].accuracy;
                let threshold = split_distance.min(pair_accuracy + accuracy_error);
                if self.fixes[j + 1].distance > threshold {
                    runs.push(start..j + 1);
                    start = j + 1;
                }
            }
            runs.push(start..run.end);
        }

        Ok(runs)
    }

    pub(crate) fn check_aligned(&self, label_count: usize) -> Result<()> {
        if label_count != self.fixes.len() {
            return Err(PlaceError::invalid(
                "label array",
                format!("{} labels for {} fixes", label_count, self.fixes.len()),
                "one label per fix",
            ));
        }
        Ok(())
    }
}

impl Index<usize> for Trajectory {
    type Output = PositionFix;

    fn index(&self, index: usize) -> &Self::Output {
        &self.fixes[index]
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a PositionFix;
    type IntoIter = std::slice::Iter<'a, PositionFix>;

    fn into_iter(self) -> Self::IntoIter {
        self.fixes.iter()
    }
}

/// Maximal runs of `label` in `labels`, as `[start, end)` ranges.
pub fn label_runs<T: PartialEq>(labels: &[T], label: &T) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;

    for (i, l) in labels.iter().enumerate() {
        match (l == label, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(s..labels.len());
    }

    runs
}

/// Fill `distance` and `time_diff` relative to the previous fix.
fn annotate(fixes: &mut [PositionFix]) {
    if let Some(first) = fixes.first_mut() {
        first.distance = 0.0;
        first.time_diff = 0.0;
    }
    for i in 1..fixes.len() {
        let prev = fixes[i - 1];
        let fix = &mut fixes[i];
        fix.distance = haversine_distance(&prev, fix);
        fix.time_diff = fix.time - prev.time;
    }
}

fn utc_date(timestamp: f64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp.floor() as i64, 0).map(|dt| dt.date_naive())
}

/// Unix timestamps of 00:00:00 and 23:59:59 UTC on `date`.
fn day_bounds(date: NaiveDate) -> (f64, f64) {
    let start = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default();
    (start as f64, (start + SECONDS_PER_DAY - 1) as f64)
}

fn push_day(days: &mut Vec<(NaiveDate, Trajectory)>, day: i64, mut fixes: Vec<PositionFix>) {
    let Some(date) = DateTime::from_timestamp(day * SECONDS_PER_DAY, 0).map(|dt| dt.date_naive())
    else {
        return;
    };
    annotate(&mut fixes);
    days.push((date, Trajectory { fixes }));
}
