//! Synthetic GPS day generator for benchmarking and tests.
//!
//! Produces one device's day as a sequence of visits to known places joined
//! by straight trips, sampled at a fixed interval with Gaussian position
//! noise. The visits double as ground truth for detection tests.
//!
//! Feature-gated behind `synthetic`.
//!
//! # Example
//!
//! ```rust
//! use placemine::synthetic::{SyntheticDay, VisitConfig};
//!
//! let day = SyntheticDay {
//!     visits: vec![
//!         VisitConfig { east_meters: 0.0, north_meters: 0.0, duration_secs: 3600.0 },
//!         VisitConfig { east_meters: 2000.0, north_meters: 500.0, duration_secs: 1800.0 },
//!     ],
//!     ..SyntheticDay::default()
//! };
//!
//! let trace = day.generate();
//! assert_eq!(trace.expected.len(), 2);
//! assert!(trace.fixes.windows(2).all(|w| w[0].time <= w[1].time));
//! ```

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geo_utils::{meters_to_degrees, METERS_PER_DEG_LAT};
use crate::PositionFix;

/// One place the device stays at.
#[derive(Debug, Clone, Copy)]
pub struct VisitConfig {
    /// Offset of the place from the origin, eastwards
    pub east_meters: f64,
    /// Offset of the place from the origin, northwards
    pub north_meters: f64,
    /// Time spent at the place
    pub duration_secs: f64,
}

/// Scenario for one synthetic day.
#[derive(Debug, Clone)]
pub struct SyntheticDay {
    /// Origin as `(lat, lon)`
    pub origin: (f64, f64),
    /// Unix time of the first fix
    pub start_time: f64,
    /// Places in visiting order
    pub visits: Vec<VisitConfig>,
    /// Seconds between fixes
    pub sample_interval: f64,
    /// Speed of the trips between places (m/s)
    pub travel_speed: f64,
    /// Position noise standard deviation in meters
    pub gps_noise_sigma_meters: f64,
    /// Reported accuracy radius in meters
    pub accuracy: f64,
    /// RNG seed for deterministic reproduction
    pub seed: u64,
}

impl Default for SyntheticDay {
    fn default() -> Self {
        Self {
            origin: (46.5197, 6.6323),
            start_time: 1_717_200_000.0,
            visits: Vec::new(),
            sample_interval: 30.0,
            travel_speed: 10.0,
            gps_noise_sigma_meters: 3.0,
            accuracy: 10.0,
            seed: 42,
        }
    }
}

/// Ground truth for one generated visit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedVisit {
    pub lat: f64,
    pub lon: f64,
    pub entry: f64,
    pub exit: f64,
}

/// Generated fixes with their ground truth.
#[derive(Debug, Clone)]
pub struct SyntheticTrace {
    pub fixes: Vec<PositionFix>,
    pub expected: Vec<ExpectedVisit>,
}

impl SyntheticDay {
    /// Generate the day. The same seed always yields the same trace.
    pub fn generate(&self) -> SyntheticTrace {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut fixes = Vec::new();
        let mut expected = Vec::with_capacity(self.visits.len());
        let mut time = self.start_time;
        let mut previous: Option<(f64, f64)> = None;

        for visit in &self.visits {
            let place = self.place(visit);

            if let Some(from) = previous {
                time = self.push_trip(&mut fixes, from, place, time, &mut rng);
            }

            let entry = time;
            let exit = entry + visit.duration_secs;
            while time <= exit {
                fixes.push(self.noisy_fix(place, time, 0.0, &mut rng));
                time += self.sample_interval;
            }
            expected.push(ExpectedVisit {
                lat: place.0,
                lon: place.1,
                entry,
                exit,
            });
            previous = Some(place);
        }

        SyntheticTrace { fixes, expected }
    }

    fn place(&self, visit: &VisitConfig) -> (f64, f64) {
        let lat = self.origin.0 + visit.north_meters / METERS_PER_DEG_LAT;
        let lon = self.origin.1 + meters_to_degrees(visit.east_meters, lat);
        (lat, lon)
    }

    /// Sample a straight trip; returns the arrival time.
    fn push_trip(
        &self,
        fixes: &mut Vec<PositionFix>,
        from: (f64, f64),
        to: (f64, f64),
        departure: f64,
        rng: &mut StdRng,
    ) -> f64 {
        let north = (to.0 - from.0) * METERS_PER_DEG_LAT;
        let east = (to.1 - from.1) / meters_to_degrees(1.0, from.0);
        let length = north.hypot(east);
        let duration = length / self.travel_speed.max(1e-6);

        let mut time = departure;
        while time - departure < duration {
            let t = (time - departure) / duration;
            let position = (from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t);
            fixes.push(self.noisy_fix(position, time, self.travel_speed, rng));
            time += self.sample_interval;
        }
        time
    }

    fn noisy_fix(&self, (lat, lon): (f64, f64), time: f64, speed: f64, rng: &mut StdRng) -> PositionFix {
        let (dn, de) = gaussian_pair(rng, self.gps_noise_sigma_meters);
        let lat = lat + dn / METERS_PER_DEG_LAT;
        let lon = lon + meters_to_degrees(de, lat);
        let reported = (speed + rng.gen_range(-0.1..0.1)).max(0.0);
        PositionFix::new(lat, lon, time, self.accuracy, reported)
    }
}

/// Two independent normal samples (Box-Muller).
fn gaussian_pair(rng: &mut StdRng, sigma: f64) -> (f64, f64) {
    if sigma <= 0.0 {
        return (0.0, 0.0);
    }
    let u1: f64 = rng.gen_range(0.0001..1.0);
    let u2: f64 = rng.r#gen();
    let radius = sigma * (-2.0 * u1.ln()).sqrt();
    let angle = 2.0 * PI * u2;
    (radius * angle.cos(), radius * angle.sin())
}
