//! Accuracy-weighted spline smoothing of latitude and longitude.
//!
//! Each coordinate is fitted independently as a function of time with a
//! cubic smoothing spline: the curve with the least roughness `∫ f''²`
//! whose weighted residual `Σ (w_i (y_i - f(t_i)))²` does not exceed the
//! smoothing strength `s`. The penalized problem is solved in banded form
//! (Reinsch): for a given penalty `λ`
//!
//! ```text
//! (R + λ Qᵀ W⁻¹ Q) γ = Qᵀ y,    f = y - λ W⁻¹ Q γ
//! ```
//!
//! and `λ` is searched in log space until the residual meets `s`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{require_points, OptionExt, PlaceError, Result};
use crate::{PositionFix, SmoothingConfig, Trajectory};

/// Accuracy values are clamped to at least this many meters before weighting.
const MIN_ACCURACY: f64 = 1e-3;

/// Floor for `exp` weights so very poor fixes keep a finite inverse weight.
const MIN_EXP_WEIGHT: f64 = 1e-100;

/// Fewest fixes a cubic fit accepts.
const MIN_SMOOTHING_POINTS: usize = 4;

/// Decades searched on either side of the starting penalty.
const MAX_BRACKET_STEPS: usize = 80;

/// Bisection steps on log(λ).
const MAX_BISECTION_STEPS: usize = 100;

/// Per-fix weighting applied to the spline fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    /// `1 / accuracy`
    Inverse,
    /// `1 / accuracy²`
    Square,
    /// `exp(-accuracy)`
    Exp,
    /// `1 / Σ accuracy` over the ±r window (edge padded)
    Neighbor,
    /// `1`
    Uniform,
}

impl WeightScheme {
    /// Per-fix weights for the given fixes.
    pub fn weights(self, fixes: &[PositionFix], neighbor_radius: usize) -> Vec<f64> {
        let accuracies: Vec<f64> = fixes.iter().map(|f| f.accuracy.max(MIN_ACCURACY)).collect();

        match self {
            WeightScheme::Inverse => accuracies.iter().map(|a| 1.0 / a).collect(),
            WeightScheme::Square => accuracies.iter().map(|a| 1.0 / (a * a)).collect(),
            WeightScheme::Exp => accuracies
                .iter()
                .map(|a| (-a).exp().max(MIN_EXP_WEIGHT))
                .collect(),
            WeightScheme::Uniform => vec![1.0; accuracies.len()],
            WeightScheme::Neighbor => {
                let n = accuracies.len();
                let r = neighbor_radius as isize;
                (0..n as isize)
                    .map(|i| {
                        let total: f64 = (i - r..=i + r)
                            .map(|j| accuracies[j.clamp(0, n as isize - 1) as usize])
                            .sum();
                        1.0 / total
                    })
                    .collect()
            }
        }
    }

    /// Empirical smoothing strength per fix, tuned for degree-valued
    /// coordinates and meter accuracies.
    pub fn smoothing_factor(self, neighbor_radius: usize) -> f64 {
        match self {
            WeightScheme::Inverse => 5e-11,
            WeightScheme::Square => 5e-13,
            WeightScheme::Exp => 1e-17,
            WeightScheme::Neighbor => 5e-11 / (2 * neighbor_radius + 1) as f64,
            WeightScheme::Uniform => 5e-9,
        }
    }
}

impl FromStr for WeightScheme {
    type Err = PlaceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inverse" => Ok(WeightScheme::Inverse),
            "square" => Ok(WeightScheme::Square),
            "exp" => Ok(WeightScheme::Exp),
            "neighbor" => Ok(WeightScheme::Neighbor),
            "uniform" => Ok(WeightScheme::Uniform),
            other => Err(PlaceError::invalid(
                "weighting scheme",
                other,
                "inverse, square, exp, neighbor or uniform",
            )),
        }
    }
}

/// Smooth latitude and longitude of a trajectory.
///
/// The result has the same length and timestamps; `lat`/`lon` are replaced
/// by the fitted curves and the derived fields are recomputed. Fails with
/// `InsufficientData` for fewer than four fixes.
pub fn smooth_trajectory(trajectory: &Trajectory, config: &SmoothingConfig) -> Result<Trajectory> {
    require_points("smooth_trajectory", trajectory.len(), MIN_SMOOTHING_POINTS)?;

    let fixes = trajectory.fixes();
    let weights = config.scheme.weights(fixes, config.neighbor_radius);
    let s = config.smoothing.unwrap_or_else(|| {
        config.scheme.smoothing_factor(config.neighbor_radius) * fixes.len() as f64
    });

    let times = trajectory.times();
    let lats: Vec<f64> = fixes.iter().map(|f| f.lat).collect();
    let lons: Vec<f64> = fixes.iter().map(|f| f.lon).collect();

    let smoothed_lats = smoothing_spline(&times, &lats, &weights, s)?;
    let smoothed_lons = smoothing_spline(&times, &lons, &weights, s)?;

    let smoothed: Vec<PositionFix> = fixes
        .iter()
        .zip(smoothed_lats.into_iter().zip(smoothed_lons))
        .map(|(fix, (lat, lon))| PositionFix { lat, lon, ..*fix })
        .collect();

    Trajectory::from_fixes(smoothed)
}

/// Fit a cubic smoothing spline and evaluate it at the input times.
///
/// `times` must be non-decreasing; observations sharing a timestamp are
/// combined into one weighted observation. `s = 0` interpolates; an `s` at
/// least as large as the weighted straight-line residual returns that line.
pub fn smoothing_spline(times: &[f64], values: &[f64], weights: &[f64], s: f64) -> Result<Vec<f64>> {
    let n = times.len();
    if values.len() != n || weights.len() != n {
        return Err(PlaceError::invalid(
            "spline input",
            format!("{} times, {} values, {} weights", n, values.len(), weights.len()),
            "equally long arrays",
        ));
    }
    if s < 0.0 || !s.is_finite() {
        return Err(PlaceError::invalid("smoothing strength", s, "a finite value >= 0"));
    }

    let groups = group_observations(times, values, weights);
    let fitted = fit_groups(&groups, s)?;

    let mut out = Vec::with_capacity(n);
    for (group, value) in groups.iter().zip(fitted) {
        out.extend(std::iter::repeat(value).take(group.count));
    }
    Ok(out)
}

/// Observations collapsed onto one timestamp.
struct Group {
    time: f64,
    value: f64,
    /// Sum of squared weights
    weight: f64,
    /// Residual contributed by the spread within the group
    spread: f64,
    count: usize,
}

fn group_observations(times: &[f64], values: &[f64], weights: &[f64]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut i = 0;
    while i < times.len() {
        let mut j = i;
        while j + 1 < times.len() && times[j + 1] == times[i] {
            j += 1;
        }
        let members = i..=j;
        let weight: f64 = members.clone().map(|k| weights[k] * weights[k]).sum();
        let weight = weight.max(f64::MIN_POSITIVE);
        let value = members
            .clone()
            .map(|k| weights[k] * weights[k] * values[k])
            .sum::<f64>()
            / weight;
        let spread = members
            .clone()
            .map(|k| weights[k] * weights[k] * (values[k] - value).powi(2))
            .sum();
        groups.push(Group {
            time: times[i],
            value,
            weight,
            spread,
            count: j - i + 1,
        });
        i = j + 1;
    }
    groups
}

fn fit_groups(groups: &[Group], s: f64) -> Result<Vec<f64>> {
    let t0 = groups
        .first()
        .ok_or_insufficient_data("smoothing_spline", 0, 1)?
        .time;
    let m = groups.len();
    let raw: Vec<f64> = groups.iter().map(|g| g.value).collect();
    let budget = s - groups.iter().map(|g| g.spread).sum::<f64>();

    // Two points or fewer: the least rough curve passes through them
    if m < 3 || budget <= 0.0 {
        return Ok(raw);
    }

    let span = groups[m - 1].time - t0;
    let x: Vec<f64> = groups.iter().map(|g| (g.time - t0) / span).collect();
    let w: Vec<f64> = groups.iter().map(|g| g.weight).collect();

    let total_w: f64 = w.iter().sum();
    let offset = w.iter().zip(&raw).map(|(wi, yi)| wi * yi).sum::<f64>() / total_w;
    let y: Vec<f64> = raw.iter().map(|v| v - offset).collect();

    let (line, line_rss) = weighted_line(&x, &y, &w);
    if line_rss <= budget {
        return Ok(line.into_iter().map(|v| v + offset).collect());
    }

    let system = SplineSystem::new(&x, &y, &w);

    let mut lo = 1.0_f64;
    let mut hi = 1.0_f64;
    for _ in 0..MAX_BRACKET_STEPS {
        if system.solve(hi).1 >= budget {
            break;
        }
        hi *= 10.0;
    }
    for _ in 0..MAX_BRACKET_STEPS {
        if system.solve(lo).1 <= budget {
            break;
        }
        lo /= 10.0;
    }

    let mut best = system.solve(lo).0;
    for _ in 0..MAX_BISECTION_STEPS {
        let mid = (lo.ln() + hi.ln()) / 2.0;
        let lambda = mid.exp();
        let (fitted, rss) = system.solve(lambda);
        if rss <= budget {
            lo = lambda;
            best = fitted;
        } else {
            hi = lambda;
        }
        if (hi / lo).ln() < 1e-9 || (budget - rss).abs() <= 1e-9 * budget {
            break;
        }
    }

    Ok(best.into_iter().map(|v| v + offset).collect())
}

/// Weighted least-squares line, and its weighted residual.
fn weighted_line(x: &[f64], y: &[f64], w: &[f64]) -> (Vec<f64>, f64) {
    let sw: f64 = w.iter().sum();
    let mx = w.iter().zip(x).map(|(wi, xi)| wi * xi).sum::<f64>() / sw;
    let my = w.iter().zip(y).map(|(wi, yi)| wi * yi).sum::<f64>() / sw;
    let sxx: f64 = w.iter().zip(x).map(|(wi, xi)| wi * (xi - mx).powi(2)).sum();
    let sxy: f64 = w
        .iter()
        .zip(x.iter().zip(y))
        .map(|(wi, (xi, yi))| wi * (xi - mx) * (yi - my))
        .sum();
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };

    let line: Vec<f64> = x.iter().map(|xi| my + slope * (xi - mx)).collect();
    let rss = w
        .iter()
        .zip(y.iter().zip(&line))
        .map(|(wi, (yi, li))| wi * (yi - li).powi(2))
        .sum();
    (line, rss)
}

/// Pentadiagonal system of the penalized spline fit.
struct SplineSystem<'a> {
    y: &'a [f64],
    /// Inverse weights (W⁻¹ diagonal)
    inv_w: Vec<f64>,
    /// Q columns: (1/h_c, -(1/h_c + 1/h_{c+1}), 1/h_{c+1})
    q: Vec<[f64; 3]>,
    r_diag: Vec<f64>,
    r_off: Vec<f64>,
    /// Qᵀ y
    rhs: Vec<f64>,
}

impl<'a> SplineSystem<'a> {
    fn new(x: &[f64], y: &'a [f64], w: &[f64]) -> Self {
        let m = x.len();
        let k = m - 2;
        let h: Vec<f64> = x.windows(2).map(|p| p[1] - p[0]).collect();

        let q: Vec<[f64; 3]> = (0..k)
            .map(|c| [1.0 / h[c], -(1.0 / h[c] + 1.0 / h[c + 1]), 1.0 / h[c + 1]])
            .collect();
        let r_diag: Vec<f64> = (0..k).map(|c| (h[c] + h[c + 1]) / 3.0).collect();
        let r_off: Vec<f64> = (0..k.saturating_sub(1)).map(|c| h[c + 1] / 6.0).collect();
        let rhs: Vec<f64> = (0..k)
            .map(|c| (y[c + 2] - y[c + 1]) / h[c + 1] - (y[c + 1] - y[c]) / h[c])
            .collect();

        Self {
            y,
            inv_w: w.iter().map(|wi| 1.0 / wi).collect(),
            q,
            r_diag,
            r_off,
            rhs,
        }
    }

    /// Fitted values and weighted residual for penalty `lambda`.
    fn solve(&self, lambda: f64) -> (Vec<f64>, f64) {
        let k = self.q.len();
        let d = &self.inv_w;
        let q = &self.q;

        let diag: Vec<f64> = (0..k)
            .map(|c| {
                self.r_diag[c]
                    + lambda
                        * (q[c][0].powi(2) * d[c]
                            + q[c][1].powi(2) * d[c + 1]
                            + q[c][2].powi(2) * d[c + 2])
            })
            .collect();
        let off1: Vec<f64> = (0..k.saturating_sub(1))
            .map(|c| {
                self.r_off[c]
                    + lambda * (q[c][1] * q[c + 1][0] * d[c + 1] + q[c][2] * q[c + 1][1] * d[c + 2])
            })
            .collect();
        let off2: Vec<f64> = (0..k.saturating_sub(2))
            .map(|c| lambda * q[c][2] * q[c + 2][0] * d[c + 2])
            .collect();

        let gamma = solve_pentadiagonal(&diag, &off1, &off2, &self.rhs);

        let m = self.y.len();
        let mut fitted = Vec::with_capacity(m);
        let mut rss = 0.0;
        for i in 0..m {
            let mut q_gamma = 0.0;
            if i < k {
                q_gamma += q[i][0] * gamma[i];
            }
            if i >= 1 && i - 1 < k {
                q_gamma += q[i - 1][1] * gamma[i - 1];
            }
            if i >= 2 && i - 2 < k {
                q_gamma += q[i - 2][2] * gamma[i - 2];
            }
            let correction = lambda * d[i] * q_gamma;
            fitted.push(self.y[i] - correction);
            rss += correction * correction / d[i];
        }
        (fitted, rss)
    }
}

/// Solve a symmetric positive definite pentadiagonal system by LDLᵀ.
fn solve_pentadiagonal(diag: &[f64], off1: &[f64], off2: &[f64], rhs: &[f64]) -> Vec<f64> {
    let k = diag.len();
    let mut d = vec![0.0; k];
    let mut l1 = vec![0.0; k];
    let mut l2 = vec![0.0; k];

    for i in 0..k {
        if i >= 2 {
            l2[i] = off2[i - 2] / d[i - 2];
        }
        if i >= 1 {
            let coupling = if i >= 2 { l2[i] * d[i - 2] * l1[i - 1] } else { 0.0 };
            l1[i] = (off1[i - 1] - coupling) / d[i - 1];
        }
        let mut di = diag[i];
        if i >= 1 {
            di -= l1[i] * l1[i] * d[i - 1];
        }
        if i >= 2 {
            di -= l2[i] * l2[i] * d[i - 2];
        }
        d[i] = di.max(f64::MIN_POSITIVE);
    }

    let mut z = rhs.to_vec();
    for i in 0..k {
        if i >= 1 {
            z[i] -= l1[i] * z[i - 1];
        }
        if i >= 2 {
            z[i] -= l2[i] * z[i - 2];
        }
    }
    for i in 0..k {
        z[i] /= d[i];
    }
    for i in (0..k).rev() {
        if i + 1 < k {
            z[i] -= l1[i + 1] * z[i + 1];
        }
        if i + 2 < k {
            z[i] -= l2[i + 2] * z[i + 2];
        }
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pentadiagonal_matches_dense_solution() {
        // A = [[4,1,0.5,0],[1,5,1,0.5],[0.5,1,6,1],[0,0.5,1,7]], x = [1,2,3,4]
        let diag = [4.0, 5.0, 6.0, 7.0];
        let off1 = [1.0, 1.0, 1.0];
        let off2 = [0.5, 0.5];
        let rhs = [7.5, 16.0, 24.5, 32.0];
        let x = solve_pentadiagonal(&diag, &off1, &off2, &rhs);
        for (xi, expected) in x.iter().zip([1.0, 2.0, 3.0, 4.0]) {
            assert!((xi - expected).abs() < 1e-9, "{xi} vs {expected}");
        }
    }

    #[test]
    fn test_groups_combine_shared_timestamps() {
        let groups = group_observations(&[0.0, 1.0, 1.0, 2.0], &[0.0, 1.0, 3.0, 0.0], &[1.0; 4]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].count, 2);
        assert!((groups[1].value - 2.0).abs() < 1e-12);
        assert!((groups[1].weight - 2.0).abs() < 1e-12);
        assert!((groups[1].spread - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_residual_meets_budget() {
        let times: Vec<f64> = (0..30).map(|i| i as f64 * 10.0).collect();
        let values: Vec<f64> = (0..30)
            .map(|i| (i as f64 * 0.4).sin() + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let weights = vec![1.0; 30];
        let s = 0.2;

        let fitted = smoothing_spline(&times, &values, &weights, s).unwrap();
        let rss: f64 = fitted.iter().zip(&values).map(|(f, v)| (f - v).powi(2)).sum();
        assert!(rss <= s * (1.0 + 1e-6), "rss {rss} above budget");
        assert!(rss > s * 0.9, "rss {rss} far below budget");
    }
}
