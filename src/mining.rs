//! # Significant Place Mining
//!
//! Label propagation over characteristic points.
//!
//! ## Algorithm
//! 1. Every characteristic point gets a **potential**: the sum of
//!    `exp(-d / σ)` over the consecutive trajectory distances around it, σ
//!    being the standard deviation of all consecutive distances. Anchored
//!    points score high.
//! 2. Each point is weighted against its next `r` characteristic points by
//!    `mean stay time × |Δ potential| × exp(-distance × multiplier)`. Only
//!    this forward half is stored; backward weights are read from the
//!    earlier point's row.
//! 3. Each point prefers its maximum-weight neighbor, unless that neighbor is
//!    both too far away and too far apart in time.
//! 4. Labels start as each point's own index and repeatedly copy the
//!    preferred neighbor's label, visiting points by descending potential,
//!    until nothing changes or the pass cap is reached.
//! 5. Points sharing a final label form one cluster region.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::characteristic::{check_radius, neighborhood_stay_times, TimeUnit};
use crate::error::{PlaceError, Result};
use crate::geo_utils::{distance_between_points, haversine_distance, std_dev, DistanceUnit};
use crate::merge::{recursive_merge, Proximity};
use crate::region::{Region, RegionKind};
use crate::stays::{merge_nearby_stays, prune_short_regions};
use crate::{MiningConfig, Trajectory};

/// Result of label propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationOutcome {
    /// Final label per characteristic point
    pub labels: Vec<usize>,
    /// Passes performed
    pub iterations: usize,
    /// Whether the last pass changed nothing
    pub converged: bool,
}

impl PropagationOutcome {
    /// Characteristic point positions grouped by label, ordered by first position.
    pub fn clusters(&self) -> Vec<Vec<usize>> {
        let mut slots: HashMap<usize, usize> = HashMap::new();
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for (position, label) in self.labels.iter().enumerate() {
            let slot = *slots.entry(*label).or_insert_with(|| {
                clusters.push(Vec::new());
                clusters.len() - 1
            });
            clusters[slot].push(position);
        }
        clusters
    }
}

/// Potential of each characteristic point.
///
/// For the point at position `i` (fix `c`), sums `exp(-d / σ)` over the
/// consecutive distances `[c - min(r, i), c + min(r, m - i + 1))`, clamped to
/// the distance array. Distances are in kilometers times `multiplier`; a
/// zero σ is replaced by 1.
pub fn characteristic_point_potentials(
    trajectory: &Trajectory,
    cp_indices: &[usize],
    r: usize,
    multiplier: f64,
) -> Result<Vec<f64>> {
    let distances: Vec<f64> = distance_between_points(trajectory.fixes(), DistanceUnit::Kilometers)?
        .into_iter()
        .map(|d| d * multiplier)
        .collect();

    let sigma = match std_dev(&distances) {
        s if s > 0.0 => s,
        _ => 1.0,
    };

    let m = cp_indices.len();
    Ok(cp_indices
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let start = c.saturating_sub(r.min(i)).min(distances.len());
            let end = (c + r.min(m - i + 1)).min(distances.len());
            distances[start..end]
                .iter()
                .map(|d| (-d / sigma).exp())
                .sum()
        })
        .collect())
}

/// Forward half of the weight matrix.
///
/// Row `i` holds the weights towards positions `i + 1 ..= i + min(r, m - 1 - i)`.
pub fn forward_weights(
    trajectory: &Trajectory,
    cp_indices: &[usize],
    potentials: &[f64],
    stay_times: &[f64],
    r: usize,
    multiplier: f64,
) -> Vec<Vec<f64>> {
    let m = cp_indices.len();
    (0..m)
        .map(|i| {
            let reach = r.min(m - 1 - i);
            (0..reach)
                .map(|j| {
                    let k = i + j + 1;
                    let mutual_stay = (stay_times[i] + stay_times[k]) / 2.0;
                    let relative_potential = (potentials[i] - potentials[k]).abs();
                    let dist_km =
                        haversine_distance(&trajectory[cp_indices[i]], &trajectory[cp_indices[k]])
                            / 1000.0;
                    mutual_stay * relative_potential * (-dist_km * multiplier).exp()
                })
                .collect()
        })
        .collect()
}

/// Preferred neighbor position of every characteristic point.
///
/// Candidates are scanned as earlier neighbors (farthest first) followed by
/// later neighbors (nearest first); the first maximum wins. A point prefers
/// itself when it has no neighbor, or when its choice is both more than
/// `max_distance_km` away and more than `max_time` seconds apart.
pub fn preferred_neighbors(
    trajectory: &Trajectory,
    cp_indices: &[usize],
    weights: &[Vec<f64>],
    r: usize,
    max_distance_km: f64,
    max_time: f64,
) -> Vec<usize> {
    let m = cp_indices.len();
    (0..m)
        .map(|i| {
            let earlier = (i.saturating_sub(r)..i).map(|k| (k, weights[k][i - k - 1]));
            let later = weights[i].iter().enumerate().map(|(j, &w)| (i + j + 1, w));

            let mut best: Option<(usize, f64)> = None;
            for (k, w) in earlier.chain(later) {
                if best.map_or(true, |(_, bw)| w > bw) {
                    best = Some((k, w));
                }
            }

            match best {
                Some((k, _)) => {
                    let a = &trajectory[cp_indices[i]];
                    let b = &trajectory[cp_indices[k]];
                    let far = haversine_distance(a, b) / 1000.0 > max_distance_km;
                    let late = (a.time - b.time).abs() > max_time;
                    if far && late {
                        i
                    } else {
                        k
                    }
                }
                None => i,
            }
        })
        .collect()
}

/// Visit order by descending potential; ties keep position order.
pub fn potential_order(potentials: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..potentials.len()).collect();
    order.sort_by(|&a, &b| {
        potentials[b]
            .partial_cmp(&potentials[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Propagate labels along preferred neighbors, visiting points in `order`.
///
/// Stops after a pass without changes or after `max_iterations` passes; a
/// capped run keeps its partial labeling.
pub fn propagate_labels(preferred: &[usize], order: &[usize], max_iterations: usize) -> PropagationOutcome {
    let mut labels: Vec<usize> = (0..preferred.len()).collect();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;
        let mut changed = false;
        for &i in order {
            let target = labels[preferred[i]];
            if labels[i] != target {
                labels[i] = target;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            "[Mining] Label propagation stopped at the {} pass cap without converging",
            max_iterations
        );
    }

    PropagationOutcome {
        labels,
        iterations,
        converged,
    }
}

/// Full label propagation over the characteristic points of a trajectory.
///
/// Fails with `InvalidArgument` for a zero radius or unsorted/out-of-range
/// indices, and with `InsufficientData` for fewer than 2 fixes.
pub fn label_propagation(
    trajectory: &Trajectory,
    cp_indices: &[usize],
    config: &MiningConfig,
) -> Result<PropagationOutcome> {
    check_radius(config.radius)?;
    check_indices(trajectory, cp_indices)?;

    let r = config.radius;
    let potentials =
        characteristic_point_potentials(trajectory, cp_indices, r, config.distance_multiplier)?;
    let cp_times: Vec<f64> = cp_indices.iter().map(|&c| trajectory[c].time).collect();
    let stay_times = neighborhood_stay_times(&cp_times, r, TimeUnit::Seconds);
    let weights = forward_weights(
        trajectory,
        cp_indices,
        &potentials,
        &stay_times,
        r,
        config.distance_multiplier,
    );
    let preferred = preferred_neighbors(
        trajectory,
        cp_indices,
        &weights,
        r,
        config.max_distance_km,
        config.max_time,
    );

    let order = potential_order(&potentials);
    let outcome = propagate_labels(&preferred, &order, config.max_iterations);
    debug!(
        "[Mining] {} characteristic points, {} passes, converged: {}",
        cp_indices.len(),
        outcome.iterations,
        outcome.converged
    );
    Ok(outcome)
}

/// One [`RegionKind::Cluster`] region per label.
///
/// Member ranges are the runs of consecutive fix indices among the cluster's
/// characteristic points.
pub fn cluster_regions(
    trajectory: &Arc<Trajectory>,
    cp_indices: &[usize],
    outcome: &PropagationOutcome,
) -> Result<Vec<Region>> {
    if outcome.labels.len() != cp_indices.len() {
        return Err(PlaceError::invalid(
            "propagation labels",
            format!("{} labels for {} points", outcome.labels.len(), cp_indices.len()),
            "one label per characteristic point",
        ));
    }

    outcome
        .clusters()
        .into_iter()
        .map(|positions| {
            let fixes: Vec<usize> = positions.iter().map(|&p| cp_indices[p]).collect();
            Region::from_ranges(Arc::clone(trajectory), consecutive_runs(&fixes), RegionKind::Cluster)
        })
        .collect()
}

/// Significant places of a trajectory from its characteristic points.
///
/// Clusters are merged on overlap or when their centroids are closer than
/// `merge_distance`, stays a few characteristic points apart are joined, and
/// places spanning less than `min_duration` are dropped.
pub fn significant_place_mining(
    trajectory: Arc<Trajectory>,
    cp_indices: &[usize],
    config: &MiningConfig,
) -> Result<Vec<Region>> {
    if cp_indices.is_empty() {
        check_radius(config.radius)?;
        return Ok(Vec::new());
    }

    let outcome = label_propagation(&trajectory, cp_indices, config)?;
    let clusters = cluster_regions(&trajectory, cp_indices, &outcome)?;
    let cluster_count = clusters.len();

    let mut places = recursive_merge(
        clusters,
        0.0,
        Some(Proximity::Centroid {
            threshold: config.merge_distance,
        }),
    )?;
    merge_nearby_stays(&mut places, cp_indices, config.stay_index_threshold);
    let places = prune_short_regions(places, config.min_duration);

    info!(
        "[Mining] {} characteristic points -> {} clusters -> {} places",
        cp_indices.len(),
        cluster_count,
        places.len()
    );
    Ok(places)
}

/// Split ascending indices into runs of consecutive values.
fn consecutive_runs(indices: &[usize]) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for &index in indices {
        match runs.last_mut() {
            Some(run) if run.end == index => run.end += 1,
            _ => runs.push(index..index + 1),
        }
    }
    runs
}

fn check_indices(trajectory: &Trajectory, cp_indices: &[usize]) -> Result<()> {
    let ascending = cp_indices.windows(2).all(|w| w[0] < w[1]);
    let in_range = cp_indices.last().map_or(true, |&c| c < trajectory.len());
    if !ascending || !in_range {
        return Err(PlaceError::invalid(
            "characteristic indices",
            format!("{} indices over {} fixes", cp_indices.len(), trajectory.len()),
            "strictly ascending indices within the trajectory",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_runs() {
        assert_eq!(consecutive_runs(&[3, 4, 5, 9, 10, 12]), vec![3..6, 9..11, 12..13]);
        assert!(consecutive_runs(&[]).is_empty());
    }

    #[test]
    fn test_clusters_order_by_first_position() {
        let outcome = PropagationOutcome {
            labels: vec![4, 4, 1, 4, 1],
            iterations: 1,
            converged: true,
        };
        assert_eq!(outcome.clusters(), vec![vec![0, 1, 3], vec![2, 4]]);
    }
}
