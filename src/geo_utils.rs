//! Geographic utilities: haversine distances, unit conversion and small
//! statistics helpers shared by the detection stages.

use std::str::FromStr;

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::error::{require_points, PlaceError, Result};
use crate::PositionFix;

/// Equatorial Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Meters per degree of latitude (approximately constant).
pub const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Unit for reported distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceUnit {
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "km")]
    Kilometers,
    #[serde(rename = "ft")]
    Feet,
}

impl DistanceUnit {
    /// Multiplier converting meters into this unit.
    pub fn per_meter(self) -> f64 {
        match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Kilometers => 1e-3,
            DistanceUnit::Feet => 3.28084,
        }
    }

    /// Convert a value in meters into this unit.
    pub fn from_meters(self, meters: f64) -> f64 {
        meters * self.per_meter()
    }
}

impl FromStr for DistanceUnit {
    type Err = PlaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "m" => Ok(DistanceUnit::Meters),
            "km" => Ok(DistanceUnit::Kilometers),
            "ft" => Ok(DistanceUnit::Feet),
            other => Err(PlaceError::invalid("distance unit", other, "'m', 'km' or 'ft'")),
        }
    }
}

/// Great-circle distance in meters between two latitude/longitude pairs.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Haversine distance in meters between two fixes.
pub fn haversine_distance(a: &PositionFix, b: &PositionFix) -> f64 {
    haversine(a.lat, a.lon, b.lat, b.lon)
}

/// Haversine distance in meters between two geometry coordinates (x = lon, y = lat).
pub fn coord_distance(a: Coord, b: Coord) -> f64 {
    haversine(a.y, a.x, b.y, b.x)
}

/// Distances between consecutive fixes, converted to `unit`.
///
/// The result has one entry fewer than the input. Fails with
/// `InsufficientData` when fewer than two fixes are given.
pub fn distance_between_points(points: &[PositionFix], unit: DistanceUnit) -> Result<Vec<f64>> {
    require_points("distance_between_points", points.len(), 2)?;
    Ok(points
        .windows(2)
        .map(|w| unit.from_meters(haversine_distance(&w[0], &w[1])))
        .collect())
}

/// Distances between paired fixes of two equally long slices, converted to `unit`.
pub fn distance_between_arrays(
    first: &[PositionFix],
    second: &[PositionFix],
    unit: DistanceUnit,
) -> Result<Vec<f64>> {
    if first.len() != second.len() {
        return Err(PlaceError::invalid(
            "array length",
            format!("{} vs {}", first.len(), second.len()),
            "arrays of equal length",
        ));
    }
    Ok(first
        .iter()
        .zip(second)
        .map(|(a, b)| unit.from_meters(haversine_distance(a, b)))
        .collect())
}

/// Convert a distance in meters to approximate degrees at a given latitude.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let meters_per_deg_lng = METERS_PER_DEG_LAT * latitude.to_radians().cos();
    if meters_per_deg_lng.abs() < 1e-10 {
        return meters / METERS_PER_DEG_LAT;
    }
    meters / meters_per_deg_lng
}

/// Arithmetic mean, `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation, `0.0` for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
