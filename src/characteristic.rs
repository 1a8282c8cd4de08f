//! Neighborhood velocity and characteristic point extraction.
//!
//! For a half-window `r`, every fix gets the time span covered by its ±r
//! window (edge padded) and the path length traveled inside it. Fixes whose
//! neighborhood velocity stays at or below a threshold are "characteristic":
//! candidates for belonging to a significant place.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{require_points, PlaceError, Result};
use crate::geo_utils::{distance_between_points, DistanceUnit};
use crate::{CharacteristicConfig, PositionFix, Trajectory};

/// Unit of neighborhood stay times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    #[serde(rename = "sec")]
    Seconds,
    #[serde(rename = "min")]
    Minutes,
    #[serde(rename = "hr")]
    Hours,
}

impl TimeUnit {
    pub fn from_seconds(self, seconds: f64) -> f64 {
        match self {
            TimeUnit::Seconds => seconds,
            TimeUnit::Minutes => seconds / 60.0,
            TimeUnit::Hours => seconds / 3600.0,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = PlaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sec" => Ok(TimeUnit::Seconds),
            "min" => Ok(TimeUnit::Minutes),
            "hr" => Ok(TimeUnit::Hours),
            other => Err(PlaceError::invalid("time unit", other, "sec, min or hr")),
        }
    }
}

/// Unit of neighborhood velocities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityUnit {
    /// Kilometers per hour
    Kph,
    /// Meters per second
    Mps,
}

impl VelocityUnit {
    /// Distance and time units composing this velocity unit.
    pub fn parts(self) -> (DistanceUnit, TimeUnit) {
        match self {
            VelocityUnit::Kph => (DistanceUnit::Kilometers, TimeUnit::Hours),
            VelocityUnit::Mps => (DistanceUnit::Meters, TimeUnit::Seconds),
        }
    }
}

impl FromStr for VelocityUnit {
    type Err = PlaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kph" => Ok(VelocityUnit::Kph),
            "mps" => Ok(VelocityUnit::Mps),
            other => Err(PlaceError::invalid("velocity unit", other, "kph or mps")),
        }
    }
}

/// Time covered by the ±r window around each timestamp, edge padded.
///
/// Entry `i` is `times[min(i + r, n - 1)] - times[max(i - r, 0)]`.
pub fn neighborhood_stay_times(times: &[f64], r: usize, unit: TimeUnit) -> Vec<f64> {
    let n = times.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(r);
            let hi = (i + r).min(n - 1);
            unit.from_seconds(times[hi] - times[lo])
        })
        .collect()
}

/// Path length inside the ±r window divided by its stay time.
///
/// A window with no elapsed time has velocity 0 when nothing moved and
/// infinity otherwise.
pub fn neighborhood_velocities(
    fixes: &[PositionFix],
    r: usize,
    unit: VelocityUnit,
) -> Result<Vec<f64>> {
    check_radius(r)?;
    require_points("neighborhood_velocities", fixes.len(), 2)?;

    let (distance_unit, time_unit) = unit.parts();
    let distances = distance_between_points(fixes, distance_unit)?;

    let mut prefix = Vec::with_capacity(distances.len() + 1);
    prefix.push(0.0);
    for d in &distances {
        prefix.push(prefix[prefix.len() - 1] + d);
    }

    let times: Vec<f64> = fixes.iter().map(|f| f.time).collect();
    let stay_times = neighborhood_stay_times(&times, r, time_unit);

    let n = fixes.len();
    Ok((0..n)
        .map(|i| {
            let lo = i.saturating_sub(r);
            let hi = (i + r).min(n - 1);
            let traveled = prefix[hi] - prefix[lo];
            let stay = stay_times[i];
            if stay > 0.0 {
                traveled / stay
            } else if traveled == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        })
        .collect())
}

/// Ascending indices of fixes whose neighborhood velocity is at most `max_velocity`.
pub fn characteristic_indices(
    trajectory: &Trajectory,
    r: usize,
    max_velocity: f64,
    unit: VelocityUnit,
) -> Result<Vec<usize>> {
    let velocities = neighborhood_velocities(trajectory.fixes(), r, unit)?;
    Ok(velocities
        .iter()
        .enumerate()
        .filter(|(_, v)| **v <= max_velocity)
        .map(|(i, _)| i)
        .collect())
}

/// [`characteristic_indices`] driven by a config struct.
pub fn characteristic_points(
    trajectory: &Trajectory,
    config: &CharacteristicConfig,
) -> Result<Vec<usize>> {
    characteristic_indices(trajectory, config.radius, config.max_velocity, config.unit)
}

pub(crate) fn check_radius(r: usize) -> Result<()> {
    if r == 0 {
        return Err(PlaceError::invalid("neighborhood radius", r, "a radius of at least 1"));
    }
    Ok(())
}
