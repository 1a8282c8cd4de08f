//! # Place Miner
//!
//! Significant place detection from noisy GPS trajectories.
//!
//! This library provides:
//! - Trajectory preprocessing (deduplication, accuracy/date filtering, spline smoothing)
//! - Characteristic (low-mobility) point extraction
//! - Label propagation over characteristic points (significant place mining)
//! - A speed-threshold stop/walk/move segmentation variant
//! - Region shapes (point, convex hull, path) with overlap and boundary distance metrics
//! - Fixed-point region merging and stay-time consolidation
//!
//! ## Features
//!
//! - **`parallel`** - Process independent days in parallel with rayon
//! - **`synthetic`** - Seeded synthetic day generator for benchmarks and tests
//!
//! ## Quick Start
//!
//! ```rust
//! use placemine::{segment_by_speed, PositionFix, SpeedConfig};
//!
//! // Ten minutes parked in one spot, reported every two minutes
//! let fixes: Vec<PositionFix> = (0..6)
//!     .map(|i| PositionFix::new(46.5197, 6.6323, 1_700_000_000.0 + 120.0 * i as f64, 8.0, 0.0))
//!     .collect();
//!
//! let segmentation = segment_by_speed(fixes, &SpeedConfig::default()).unwrap();
//! assert_eq!(segmentation.places.len(), 1);
//! ```

use geo::Coord;
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, PlaceError, Result};

// Geographic utilities (haversine, units, statistics)
pub mod geo_utils;

// Trajectory container, ingestion and label runs
pub mod trajectory;
pub use trajectory::Trajectory;

// Accuracy-weighted spline smoothing
pub mod smoothing;
pub use smoothing::{smooth_trajectory, WeightScheme};

// Neighborhood velocity and characteristic points
pub mod characteristic;
pub use characteristic::{characteristic_indices, TimeUnit, VelocityUnit};

// Label propagation over characteristic points
pub mod mining;
pub use mining::{significant_place_mining, PropagationOutcome};

// Region model: shapes, overlap and boundary distance
pub mod region;
pub use region::{Region, RegionKind, RegionSummary, Shape, ShapeKind, StayInterval};

// Fixed-point region merging
pub mod merge;
pub use merge::{merge_regions, recursive_merge, Proximity};

// Stay-time consolidation and pruning
pub mod stays;

// Speed-threshold segmentation variant
pub mod segmentation;
pub use segmentation::{detect_stops, segment_by_speed, Segmentation};

// End-to-end label propagation pipeline and per-day driver
pub mod pipeline;
pub use pipeline::{detect_places, detect_places_by_day, DayResult, PlaceDetection};
#[cfg(feature = "parallel")]
pub use pipeline::detect_places_by_day_parallel;

// Synthetic day generator for benchmarks and tests
#[cfg(feature = "synthetic")]
pub mod synthetic;

// ============================================================================
// Core Types
// ============================================================================

/// One GPS sample with its ingestion-derived fields.
///
/// `distance` and `time_diff` are relative to the previous retained fix and
/// are filled by [`Trajectory::ingest`]; the first fix carries zeros.
///
/// # Example
/// ```
/// use placemine::PositionFix;
/// let fix = PositionFix::new(46.5197, 6.6323, 1_700_000_000.0, 12.0, 0.4);
/// assert!(fix.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub lat: f64,
    pub lon: f64,
    /// Unix timestamp in seconds
    pub time: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    /// Reported speed in m/s
    pub speed: f64,
    /// Meters to the previous retained fix
    #[serde(default)]
    pub distance: f64,
    /// Seconds since the previous retained fix
    #[serde(default)]
    pub time_diff: f64,
}

impl PositionFix {
    /// Create a fix with empty derived fields.
    pub fn new(lat: f64, lon: f64, time: f64, accuracy: f64, speed: f64) -> Self {
        Self {
            lat,
            lon,
            time,
            accuracy,
            speed,
            distance: 0.0,
            time_diff: 0.0,
        }
    }

    /// Check if the fix has valid coordinates and timestamp.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.time.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lon >= -180.0
            && self.lon <= 180.0
    }

    /// Geometry coordinate of this fix (x = longitude, y = latitude).
    pub fn coord(&self) -> Coord {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }

    /// Speed derived from the distance and time to the previous fix.
    ///
    /// Returns `None` for the first fix or when no time elapsed.
    pub fn derived_speed(&self) -> Option<f64> {
        if self.time_diff > 0.0 {
            Some(self.distance / self.time_diff)
        } else {
            None
        }
    }
}

/// Per-fix motion state used by the speed-threshold variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionLabel {
    Move = 0,
    Stop = 1,
    Walk = 2,
}

impl MotionLabel {
    /// Integer code of the label (move 0, stop 1, walk 2).
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse an integer code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(MotionLabel::Move),
            1 => Ok(MotionLabel::Stop),
            2 => Ok(MotionLabel::Walk),
            other => Err(PlaceError::invalid("motion label", other, "0, 1 or 2")),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Ingestion options applied by [`Trajectory::ingest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Drop a fix equal in every field to the last retained one.
    /// Default: true
    pub remove_duplicates: bool,

    /// Drop fixes whose accuracy radius exceeds this many meters.
    /// Default: None (keep all)
    pub accuracy_threshold: Option<f64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            accuracy_threshold: None,
        }
    }
}

/// Options for spline smoothing of latitude and longitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Per-fix weighting derived from accuracy.
    /// Default: inverse
    pub scheme: WeightScheme,

    /// Half-window used by the `neighbor` scheme.
    /// Default: 1
    pub neighbor_radius: usize,

    /// Explicit smoothing strength. When unset, the scheme's empirical
    /// per-fix factor is multiplied by the trajectory length.
    /// Default: None
    pub smoothing: Option<f64>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            scheme: WeightScheme::Inverse,
            neighbor_radius: 1,
            smoothing: None,
        }
    }
}

/// Options for characteristic point extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacteristicConfig {
    /// Half-window (in fixes) of the velocity neighborhood.
    /// Default: 4
    pub radius: usize,

    /// Points at or below this neighborhood velocity are characteristic.
    /// Default: 1.0 (in `unit`)
    pub max_velocity: f64,

    /// Unit of `max_velocity`.
    /// Default: kph
    pub unit: VelocityUnit,
}

impl Default for CharacteristicConfig {
    fn default() -> Self {
        Self {
            radius: 4,
            max_velocity: 1.0,
            unit: VelocityUnit::Kph,
        }
    }
}

/// Options for label propagation and the clustering that follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Candidate-neighbor half-window, in characteristic point indices.
    /// Default: 3
    pub radius: usize,

    /// A point prefers itself when its best neighbor is further than this
    /// (kilometers) and also further apart in time than `max_time`.
    /// Default: 0.25
    pub max_distance_km: f64,

    /// Time gap (seconds) paired with `max_distance_km`.
    /// Default: 120.0
    pub max_time: f64,

    /// Multiplier applied to kilometer distances in the decay terms.
    /// Default: 60.0
    pub distance_multiplier: f64,

    /// Cap on label propagation passes.
    /// Default: 15
    pub max_iterations: usize,

    /// Clusters whose centroids are closer than this (meters) are merged.
    /// Default: 50.0
    pub merge_distance: f64,

    /// Stays of one place separated by at most this many characteristic
    /// points are joined.
    /// Default: 3
    pub stay_index_threshold: usize,

    /// Places spanning less than this many seconds are dropped.
    /// Default: 300.0
    pub min_duration: f64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            radius: 3,
            max_distance_km: 0.25,
            max_time: 120.0,
            distance_multiplier: 60.0,
            max_iterations: 15,
            merge_distance: 50.0,
            stay_index_threshold: 3,
            min_duration: 300.0,
        }
    }
}

/// Options for folding short stops into their temporal neighbors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortStopConfig {
    /// Single-stay regions shorter than this (seconds) are candidates.
    /// Default: 300.0
    pub duration_threshold: f64,

    /// A candidate is folded only when another stay is within this many seconds.
    /// Default: 600.0
    pub merge_threshold: f64,
}

impl Default for ShortStopConfig {
    fn default() -> Self {
        Self {
            duration_threshold: 300.0,
            merge_threshold: 600.0,
        }
    }
}

/// Options for the speed-threshold segmentation variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Fixes slower than this (m/s) are stops.
    /// Default: 0.5
    pub stop_speed: f64,

    /// Fixes slower than this (m/s), but not stops, are walks.
    /// Default: 1.5
    pub walk_speed: f64,

    /// Stop runs shorter than this (seconds) are relabeled as walks.
    /// Default: 120.0
    pub short_stop_time: f64,

    /// When set, a short stop run is relabeled only if it also has fewer fixes.
    /// Default: None
    pub short_stop_points: Option<usize>,

    /// Stop regions closer than this boundary distance (meters) are merged.
    /// Default: 5.0
    pub merge_distance: f64,

    /// Centroid distance (meters) above which the boundary walk is skipped.
    /// Default: 200.0
    pub centroid_threshold: f64,

    /// Walk runs overlapping a stop region above this ratio become stops.
    /// Default: 0.9
    pub walk_overlap: f64,

    /// Places whose extended stay is shorter than this (seconds) are dropped.
    /// Default: 300.0
    pub min_duration: f64,

    /// Fold short stops into their temporal neighbors before pruning.
    /// Default: None
    pub short_stop_merge: Option<ShortStopConfig>,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            stop_speed: 0.5,
            walk_speed: 1.5,
            short_stop_time: 120.0,
            short_stop_points: None,
            merge_distance: 5.0,
            centroid_threshold: 200.0,
            walk_overlap: 0.9,
            min_duration: 300.0,
            short_stop_merge: None,
        }
    }
}

/// Options for stop detection from reported/derived speed alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Fixes reporting a speed below this (m/s) are stops.
    /// Default: 0.5
    pub stop_speed: f64,

    /// Fixes whose derived speed is below this (m/s) are also stops.
    /// Default: Some(0.25)
    pub calculated_speed: Option<f64>,

    /// Upper bound (meters) on the jump that splits a stop run.
    /// Default: 500.0
    pub split_distance: f64,

    /// Slack (meters) added to the pair accuracy when splitting stop runs.
    /// Default: 30.0
    pub accuracy_error: f64,

    /// Stop regions closer than this boundary distance (meters) are merged.
    /// Default: 10.0
    pub merge_distance: f64,

    /// Stops whose extended stay is shorter than this (seconds) are dropped.
    /// Default: 300.0
    pub min_duration: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            stop_speed: 0.5,
            calculated_speed: Some(0.25),
            split_distance: 500.0,
            accuracy_error: 30.0,
            merge_distance: 10.0,
            min_duration: 300.0,
        }
    }
}

/// Options for the label propagation pipeline, one group per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceConfig {
    pub smoothing: SmoothingConfig,
    pub characteristic: CharacteristicConfig,
    pub mining: MiningConfig,
}
