// Two-component univariate Gaussian mixture fitted by EM
//
// Initialisation is deterministic: 1-D k-means seeded at the 25th and 75th
// percentiles. Every variance carries `reg_covar` so a component collapsing
// onto a single value keeps a finite density. EM stops when the per-sample
// mean log-likelihood changes by less than `tol`.

use crate::config::CutoffOptions;
use crate::error::{AnalysisError, Result};
use serde::Serialize;
use statrs::distribution::{Continuous, Normal};

/// Lloyd iterations for the k-means seed
const KMEANS_MAX_ITER: usize = 100;

/// Added to component mass to avoid dividing by an empty responsibility sum
const MASS_EPS: f64 = 10.0 * f64::EPSILON;

/// One Gaussian component
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MixtureComponent {
    pub weight: f64,
    pub mean: f64,
    pub variance: f64,
}

impl MixtureComponent {
    fn log_density(&self, x: f64) -> f64 {
        let d = x - self.mean;
        -0.5 * ((2.0 * std::f64::consts::PI * self.variance).ln() + d * d / self.variance)
    }

    /// Unweighted normal density
    pub fn pdf(&self, x: f64) -> f64 {
        Normal::new(self.mean, self.variance.sqrt())
            .map(|n| n.pdf(x))
            .unwrap_or(f64::NAN)
    }
}

/// Fitted two-component mixture, components ordered by mean
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaussianMixture {
    /// `[negative, positive]`: lower mean first
    pub components: [MixtureComponent; 2],
    pub converged: bool,
    pub n_iter: usize,
    /// Mean log-likelihood per sample at the last iteration
    pub log_likelihood: f64,
}

/// Component densities sampled on an even grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DensityCurve {
    pub grid: Vec<f64>,
    pub negative: Vec<f64>,
    pub positive: Vec<f64>,
}

impl GaussianMixture {
    pub fn negative(&self) -> &MixtureComponent {
        &self.components[0]
    }

    pub fn positive(&self) -> &MixtureComponent {
        &self.components[1]
    }

    /// Sample both component densities on `points` evenly spaced values in `[lo, hi]`
    pub fn density_curve(&self, lo: f64, hi: f64, points: usize) -> DensityCurve {
        let grid: Vec<f64> = match points {
            0 => Vec::new(),
            1 => vec![lo],
            _ => {
                let step = (hi - lo) / (points - 1) as f64;
                (0..points).map(|k| lo + step * k as f64).collect()
            }
        };
        let negative = grid.iter().map(|&x| self.negative().pdf(x)).collect();
        let positive = grid.iter().map(|&x| self.positive().pdf(x)).collect();
        DensityCurve {
            grid,
            negative,
            positive,
        }
    }
}

/// Linear-interpolated quantile of sorted data
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

/// Seed two components with 1-D k-means
fn kmeans_init(data: &[f64], reg_covar: f64) -> [MixtureComponent; 2] {
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut centers = [quantile_sorted(&sorted, 0.25), quantile_sorted(&sorted, 0.75)];
    let mut labels = vec![0usize; data.len()];

    for iter in 0..KMEANS_MAX_ITER {
        let mut changed = iter == 0;
        for (label, &x) in labels.iter_mut().zip(data) {
            let nearest = usize::from((x - centers[1]).abs() < (x - centers[0]).abs());
            if *label != nearest {
                *label = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        for (k, center) in centers.iter_mut().enumerate() {
            let (sum, count) = labels
                .iter()
                .zip(data)
                .filter(|(l, _)| **l == k)
                .fold((0.0, 0usize), |(s, c), (_, x)| (s + x, c + 1));
            if count > 0 {
                *center = sum / count as f64;
            }
        }
    }

    let (overall_mean, overall_var) = mean_and_variance(data);
    let members: [Vec<f64>; 2] = [0, 1].map(|k| {
        labels
            .iter()
            .zip(data)
            .filter(|(l, _)| **l == k)
            .map(|(_, x)| *x)
            .collect()
    });

    if members.iter().any(|m| m.is_empty()) {
        // Degenerate split: start both components from the pooled moments
        let start = MixtureComponent {
            weight: 0.5,
            mean: overall_mean,
            variance: overall_var + reg_covar,
        };
        return [start, start];
    }

    let n = data.len() as f64;
    members.map(|m| {
        let (mean, var) = mean_and_variance(&m);
        MixtureComponent {
            weight: m.len() as f64 / n,
            mean,
            variance: var + reg_covar,
        }
    })
}

/// E-step: responsibilities of the second component, plus mean log-likelihood
fn expectation(data: &[f64], components: &[MixtureComponent; 2], resp: &mut [f64]) -> f64 {
    let mut total = 0.0;
    for (r, &x) in resp.iter_mut().zip(data) {
        let l0 = components[0].weight.ln() + components[0].log_density(x);
        let l1 = components[1].weight.ln() + components[1].log_density(x);
        let top = l0.max(l1);
        let log_norm = top + ((l0 - top).exp() + (l1 - top).exp()).ln();
        // Logistic form keeps r at exactly 0.5 for coincident components
        *r = 1.0 / (1.0 + (l0 - l1).exp());
        total += log_norm;
    }
    total / data.len() as f64
}

/// M-step: re-estimate weights, means and variances
fn maximization(data: &[f64], resp: &[f64], reg_covar: f64) -> [MixtureComponent; 2] {
    let n = data.len() as f64;
    [0usize, 1].map(|k| {
        let weight_of = |r: f64| if k == 1 { r } else { 1.0 - r };
        let mass = resp.iter().map(|&r| weight_of(r)).sum::<f64>() + MASS_EPS;
        let mean = resp
            .iter()
            .zip(data)
            .map(|(&r, &x)| weight_of(r) * x)
            .sum::<f64>()
            / mass;
        let variance = resp
            .iter()
            .zip(data)
            .map(|(&r, &x)| weight_of(r) * (x - mean).powi(2))
            .sum::<f64>()
            / mass
            + reg_covar;
        MixtureComponent {
            weight: mass / n,
            mean,
            variance,
        }
    })
}

/// Fit a two-component mixture to `scores`
///
/// Non-convergence is reported through `converged`, not as an error.
///
/// # Errors
/// `InsufficientData` when `scores` holds fewer finite values than
/// `options.min_observations` (never fewer than 2).
pub fn fit_gaussian_mixture(scores: &[f64], options: &CutoffOptions) -> Result<GaussianMixture> {
    let data: Vec<f64> = scores.iter().copied().filter(|v| v.is_finite()).collect();
    let required = options.min_observations.max(2);
    if data.len() < required {
        return Err(AnalysisError::insufficient(
            "gaussian mixture scores",
            required,
            data.len(),
        ));
    }

    let mut components = kmeans_init(&data, options.reg_covar);
    let mut resp = vec![0.0; data.len()];
    let mut log_likelihood = f64::NEG_INFINITY;
    let mut converged = false;
    let mut n_iter = 0;

    for iter in 1..=options.max_iter {
        n_iter = iter;
        let current = expectation(&data, &components, &mut resp);
        components = maximization(&data, &resp, options.reg_covar);
        let change = current - log_likelihood;
        log_likelihood = current;
        if change.abs() < options.tol {
            converged = true;
            break;
        }
    }

    if components[1].mean < components[0].mean {
        components.swap(0, 1);
    }

    Ok(GaussianMixture {
        components,
        converged,
        n_iter,
        log_likelihood,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bimodal() -> Vec<f64> {
        let mut scores = Vec::new();
        for k in 0..40 {
            scores.push(1.0 + 0.05 * ((k as f64) * 0.7).sin());
        }
        for k in 0..20 {
            scores.push(2.0 + 0.08 * ((k as f64) * 1.3).cos());
        }
        scores
    }

    #[test]
    fn test_recovers_separated_components() {
        let gmm = fit_gaussian_mixture(&bimodal(), &CutoffOptions::default()).unwrap();
        assert!(gmm.converged);
        assert!((gmm.negative().mean - 1.0).abs() < 0.05);
        assert!((gmm.positive().mean - 2.0).abs() < 0.05);
        assert!((gmm.negative().weight - 2.0 / 3.0).abs() < 0.02);
        let total = gmm.negative().weight + gmm.positive().weight;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_components_sorted_by_mean() {
        let mut scores = bimodal();
        scores.reverse();
        let gmm = fit_gaussian_mixture(&scores, &CutoffOptions::default()).unwrap();
        assert!(gmm.negative().mean < gmm.positive().mean);
    }

    #[test]
    fn test_too_few_points() {
        let err = fit_gaussian_mixture(&[1.0], &CutoffOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { got: 1, .. }));
    }

    #[test]
    fn test_identical_scores_give_identical_components() {
        let gmm = fit_gaussian_mixture(&[10.0; 8], &CutoffOptions::default()).unwrap();
        assert_eq!(gmm.negative().mean, gmm.positive().mean);
        assert_eq!(gmm.negative().variance, gmm.positive().variance);
    }

    #[test]
    fn test_density_curve_grid() {
        let gmm = fit_gaussian_mixture(&bimodal(), &CutoffOptions::default()).unwrap();
        let curve = gmm.density_curve(0.0, 3.0, 1000);
        assert_eq!(curve.grid.len(), 1000);
        assert_eq!(curve.grid[0], 0.0);
        assert!((curve.grid[999] - 3.0).abs() < 1e-12);
        assert!(curve.negative.iter().all(|d| *d >= 0.0));
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile_sorted(&sorted, 0.25), 2.0);
        assert_eq!(quantile_sorted(&sorted, 0.5), 3.0);
        assert!((quantile_sorted(&[1.0, 2.0], 0.75) - 1.75).abs() < 1e-12);
    }
}
