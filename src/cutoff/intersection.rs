// Intersection of two normal densities
//
// Equating N(m1, v1) and N(m2, v2) densities and taking logs gives
// a·x² + b·x + c = 0 with
//   a = 1/(2·v1) − 1/(2·v2)
//   b = m2/v2 − m1/v1
//   c = m1²/(2·v1) − m2²/(2·v2) − ln(√(v2/v1))
// Equal variances make the equation linear; equal components make it vanish.

use crate::config::{CutoffOptions, RootPolicy};
use crate::cutoff::gmm::{fit_gaussian_mixture, GaussianMixture};
use crate::error::{AnalysisError, Result};

/// Real roots of `a·x² + b·x + c`, larger magnitude first
///
/// Leading zero coefficients are dropped before solving. The order matches
/// the eigenvalue order of a companion-matrix polynomial solver.
fn real_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a == 0.0 {
        if b == 0.0 {
            return Vec::new();
        }
        return vec![-c / b];
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 || !disc.is_finite() {
        return Vec::new();
    }
    // Cancellation-free form of the quadratic formula
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    if q == 0.0 {
        return vec![0.0, 0.0];
    }
    vec![q / a, c / q]
}

/// Point where the two component densities are equal
///
/// `m1`/`v1` describe the lower-mean component. Returns `None` when the
/// densities never cross.
///
/// # Example
/// ```
/// use pathostat::config::RootPolicy;
/// use pathostat::cutoff::density_intersection;
///
/// // Equal variances cross halfway between the means
/// let x = density_intersection(1.0, 0.04, 2.0, 0.04, RootPolicy::FirstRoot).unwrap();
/// assert!((x - 1.5).abs() < 1e-12);
/// ```
pub fn density_intersection(
    m1: f64,
    v1: f64,
    m2: f64,
    v2: f64,
    policy: RootPolicy,
) -> Option<f64> {
    let a = 1.0 / (2.0 * v1) - 1.0 / (2.0 * v2);
    let b = m2 / v2 - m1 / v1;
    let c = m1 * m1 / (2.0 * v1) - m2 * m2 / (2.0 * v2) - (v2 / v1).sqrt().ln();

    let roots = real_roots(a, b, c);
    match policy {
        RootPolicy::FirstRoot => roots.first().copied(),
        RootPolicy::BetweenMeans => {
            let (lo, hi) = (m1.min(m2), m1.max(m2));
            let midpoint = 0.5 * (m1 + m2);
            roots
                .iter()
                .copied()
                .find(|r| (lo..=hi).contains(r))
                .or_else(|| {
                    roots
                        .iter()
                        .copied()
                        .min_by(|x, y| (x - midpoint).abs().total_cmp(&(y - midpoint).abs()))
                })
        }
    }
}

/// Mixture-based positivity cutoff for `scores`
///
/// Fits two Gaussian components and returns the crossing of their densities,
/// or `Ok(None)` when they do not cross.
///
/// # Errors
/// `InsufficientData` when there are too few scores or EM does not converge
/// within `options.max_iter` iterations.
pub fn fit_gaussian_mixture_cutoff(
    scores: &[f64],
    options: &CutoffOptions,
) -> Result<Option<f64>> {
    let mixture = fit_gaussian_mixture(scores, options)?;
    mixture_crossing(&mixture, options)
}

/// Crossing of a fitted mixture's components; unconverged fits are rejected
pub(crate) fn mixture_crossing(
    mixture: &GaussianMixture,
    options: &CutoffOptions,
) -> Result<Option<f64>> {
    if !mixture.converged {
        return Err(AnalysisError::insufficient(
            "gaussian mixture EM iterations before convergence",
            options.max_iter + 1,
            mixture.n_iter,
        ));
    }
    let (neg, pos) = (mixture.negative(), mixture.positive());
    Ok(density_intersection(
        neg.mean,
        neg.variance,
        pos.mean,
        pos.variance,
        options.root_policy,
    ))
}
