//! # Region Merging
//!
//! Greedy clustering of regions by geometric overlap, with an optional
//! proximity fallback, re-applied until the region count stops shrinking.
//!
//! ## Algorithm
//! 1. Regions are visited left to right and tested against every region
//!    already kept; the first one overlapping by more than the threshold
//!    absorbs it.
//! 2. Failing that, with a [`Proximity`] rule the nearest kept region absorbs
//!    it when closer than the rule's threshold.
//! 3. Otherwise it is kept as a new region.
//!
//! Bounding boxes are compared first; regions whose boxes are disjoint cannot
//! overlap, so the exact intersection is skipped for them.

use log::{debug, info};
use rstar::{Envelope, AABB};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::region::Region;

/// Distance rule used when two regions do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Proximity {
    /// Approximate boundary distance in meters below `threshold`.
    Boundary {
        threshold: f64,
        /// Centroid distance beyond which the boundary walk is skipped
        centroid_threshold: f64,
    },
    /// Centroid distance in meters below `threshold`.
    Centroid { threshold: f64 },
}

impl Proximity {
    fn threshold(&self) -> f64 {
        match self {
            Proximity::Boundary { threshold, .. } | Proximity::Centroid { threshold } => *threshold,
        }
    }

    fn distance(&self, a: &Region, b: &Region) -> f64 {
        match self {
            Proximity::Boundary {
                centroid_threshold, ..
            } => a.boundary_distance(b, *centroid_threshold),
            Proximity::Centroid { .. } => a.centroid_distance(b),
        }
    }
}

/// Planar bounding box of a region's shape.
fn envelope(region: &Region) -> AABB<[f64; 2]> {
    let (min, max) = region.shape().bounds();
    AABB::from_corners([min.x, min.y], [max.x, max.y])
}

/// One greedy merge pass.
///
/// Absorbing regions keep their own kind. Fails with `InvalidArgument` when
/// regions of different trajectories would be merged.
pub fn merge_regions(
    regions: Vec<Region>,
    overlap_threshold: f64,
    proximity: Option<Proximity>,
) -> Result<Vec<Region>> {
    let mut merged: Vec<Region> = Vec::with_capacity(regions.len());
    let mut envelopes: Vec<AABB<[f64; 2]>> = Vec::with_capacity(regions.len());

    for region in regions {
        let region_env = envelope(&region);
        let mut target = None;
        let mut nearest: Option<(usize, f64)> = None;

        for (i, kept) in merged.iter().enumerate() {
            let ratio = if envelopes[i].intersects(&region_env) {
                region.percent_intersection(kept)
            } else {
                0.0
            };
            if ratio > overlap_threshold {
                target = Some(i);
                break;
            }
            if let Some(rule) = &proximity {
                let dist = rule.distance(&region, kept);
                if nearest.map_or(true, |(_, best)| dist < best) {
                    nearest = Some((i, dist));
                }
            }
        }

        if target.is_none() {
            if let (Some(rule), Some((i, dist))) = (&proximity, nearest) {
                if dist < rule.threshold() {
                    target = Some(i);
                }
            }
        }

        match target {
            Some(i) => {
                let kind = merged[i].kind();
                merged[i].union(&region, kind)?;
                envelopes[i] = envelope(&merged[i]);
            }
            None => {
                envelopes.push(region_env);
                merged.push(region);
            }
        }
    }

    Ok(merged)
}

/// Repeat [`merge_regions`] until a pass no longer reduces the count.
///
/// The result is a fixed point: merging it again returns it unchanged.
pub fn recursive_merge(
    regions: Vec<Region>,
    overlap_threshold: f64,
    proximity: Option<Proximity>,
) -> Result<Vec<Region>> {
    let initial = regions.len();
    let mut current = regions;
    let mut passes = 0;

    loop {
        let before = current.len();
        current = merge_regions(current, overlap_threshold, proximity)?;
        passes += 1;
        debug!("[Merge] Pass {}: {} -> {} regions", passes, before, current.len());
        if current.len() == before {
            break;
        }
    }

    info!(
        "[Merge] {} regions merged into {} in {} passes",
        initial,
        current.len(),
        passes
    );
    Ok(current)
}
