// Multiple-comparisons correction over a batch of raw p-values
//
// Correction runs over the valid tests only. Non-finite or out-of-range
// p-values are left out of the family and come back as NaN in the same
// position, so callers keep a 1:1 addressable structure.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// Correction method, named with the statsmodels identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FdrMethod {
    /// Benjamini-Hochberg step-up (controls FDR)
    #[default]
    #[serde(rename = "fdr_bh")]
    BenjaminiHochberg,

    /// Benjamini-Yekutieli (FDR under arbitrary dependence)
    #[serde(rename = "fdr_by")]
    BenjaminiYekutieli,

    /// Bonferroni (controls FWER)
    #[serde(rename = "bonferroni")]
    Bonferroni,

    /// Holm step-down (controls FWER)
    #[serde(rename = "holm")]
    Holm,
}

impl FdrMethod {
    pub fn identifier(&self) -> &'static str {
        match self {
            Self::BenjaminiHochberg => "fdr_bh",
            Self::BenjaminiYekutieli => "fdr_by",
            Self::Bonferroni => "bonferroni",
            Self::Holm => "holm",
        }
    }
}

impl fmt::Display for FdrMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for FdrMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fdr_bh" | "bh" | "benjamini-hochberg" => Ok(Self::BenjaminiHochberg),
            "fdr_by" | "by" | "benjamini-yekutieli" => Ok(Self::BenjaminiYekutieli),
            "bonferroni" => Ok(Self::Bonferroni),
            "holm" => Ok(Self::Holm),
            other => Err(AnalysisError::UnknownMethod(other.to_string())),
        }
    }
}

/// Corrected p-values and reject decisions in the caller's key space
#[derive(Debug, Clone)]
pub struct FdrCorrection<K> {
    pub corrected: HashMap<K, f64>,
    pub rejected: HashMap<K, bool>,
    pub method: FdrMethod,
    pub alpha: f64,
}

fn is_valid_pvalue(p: f64) -> bool {
    p.is_finite() && (0.0..=1.0).contains(&p)
}

/// Correct a slice of p-values jointly, preserving positions
///
/// Invalid entries (NaN, infinite, outside `[0, 1]`) are excluded from the
/// family size and come back as NaN.
///
/// # Example
/// ```
/// use pathostat::compare::{correct_pvalues, FdrMethod};
///
/// let adjusted = correct_pvalues(&[0.01, f64::NAN, 0.02, 0.5], FdrMethod::BenjaminiHochberg);
/// assert!((adjusted[0] - 0.03).abs() < 1e-12);
/// assert!(adjusted[1].is_nan());
/// assert!((adjusted[3] - 0.5).abs() < 1e-12);
/// ```
pub fn correct_pvalues(pvalues: &[f64], method: FdrMethod) -> Vec<f64> {
    let mut adjusted = vec![f64::NAN; pvalues.len()];

    let mut order: Vec<usize> = (0..pvalues.len())
        .filter(|&i| is_valid_pvalue(pvalues[i]))
        .collect();
    if order.is_empty() {
        return adjusted;
    }
    order.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));

    let m = order.len() as f64;

    match method {
        FdrMethod::Bonferroni => {
            for &idx in &order {
                adjusted[idx] = (pvalues[idx] * m).min(1.0);
            }
        }
        FdrMethod::Holm => {
            // Step-down: running maximum of (m - rank + 1) * p from the smallest p
            let mut running = 0.0_f64;
            for (rank0, &idx) in order.iter().enumerate() {
                let factor = m - rank0 as f64;
                running = running.max((pvalues[idx] * factor).min(1.0));
                adjusted[idx] = running;
            }
        }
        FdrMethod::BenjaminiHochberg | FdrMethod::BenjaminiYekutieli => {
            let dependence = if method == FdrMethod::BenjaminiYekutieli {
                (1..=order.len()).map(|k| 1.0 / k as f64).sum::<f64>()
            } else {
                1.0
            };

            // Step-up: running minimum of p * m / rank from the largest p
            let mut running = f64::INFINITY;
            for (rank0, &idx) in order.iter().enumerate().rev() {
                let rank = (rank0 + 1) as f64;
                let raw = (pvalues[idx] * m * dependence / rank).min(1.0);
                running = running.min(raw);
                adjusted[idx] = running;
            }
        }
    }

    adjusted
}

/// Correct a keyed batch of p-values jointly
///
/// Keys whose p-value is invalid map to NaN in `corrected` and `false` in
/// `rejected`; every input key is present in both outputs.
pub fn apply_fdr_correction<K>(
    pvalue_mapping: &HashMap<K, f64>,
    alpha: f64,
    method: FdrMethod,
) -> FdrCorrection<K>
where
    K: Clone + Eq + Hash,
{
    let keys: Vec<&K> = pvalue_mapping.keys().collect();
    let raw: Vec<f64> = keys.iter().map(|k| pvalue_mapping[*k]).collect();
    let adjusted = correct_pvalues(&raw, method);

    let mut corrected = HashMap::with_capacity(keys.len());
    let mut rejected = HashMap::with_capacity(keys.len());
    for (key, q) in keys.into_iter().zip(adjusted) {
        rejected.insert(key.clone(), q.is_finite() && q <= alpha);
        corrected.insert(key.clone(), q);
    }

    FdrCorrection {
        corrected,
        rejected,
        method,
        alpha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_bh_known_values() {
        // Sorted: 0.005, 0.01, 0.03, 0.04 -> raw 0.02, 0.02, 0.04, 0.04
        let adj = correct_pvalues(&[0.01, 0.04, 0.03, 0.005], FdrMethod::BenjaminiHochberg);
        assert!((adj[0] - 0.02).abs() < TOL);
        assert!((adj[1] - 0.04).abs() < TOL);
        assert!((adj[2] - 0.04).abs() < TOL);
        assert!((adj[3] - 0.02).abs() < TOL);
    }

    #[test]
    fn test_bh_step_up_monotone_adjustment() {
        let adj = correct_pvalues(&[0.01, 0.02, 0.5], FdrMethod::BenjaminiHochberg);
        assert!((adj[0] - 0.03).abs() < TOL);
        assert!((adj[1] - 0.03).abs() < TOL);
        assert!((adj[2] - 0.5).abs() < TOL);
    }

    #[test]
    fn test_by_is_more_conservative_than_bh() {
        let p = [0.001, 0.01, 0.02, 0.04];
        let bh = correct_pvalues(&p, FdrMethod::BenjaminiHochberg);
        let by = correct_pvalues(&p, FdrMethod::BenjaminiYekutieli);
        for (a, b) in bh.iter().zip(&by) {
            assert!(b >= a);
        }
        // c(4) = 1 + 1/2 + 1/3 + 1/4
        let c: f64 = 25.0 / 12.0;
        assert!((by[0] - (0.001 * 4.0 * c / 1.0).min(by[1])).abs() < TOL);
    }

    #[test]
    fn test_bonferroni_clamps() {
        let adj = correct_pvalues(&[0.01, 0.4, 0.9], FdrMethod::Bonferroni);
        assert!((adj[0] - 0.03).abs() < TOL);
        assert_eq!(adj[1], 1.0);
        assert_eq!(adj[2], 1.0);
    }

    #[test]
    fn test_holm_step_down() {
        // Sorted 0.01, 0.02, 0.03 -> 0.03, 0.04, 0.04 (running max)
        let adj = correct_pvalues(&[0.03, 0.01, 0.02], FdrMethod::Holm);
        assert!((adj[1] - 0.03).abs() < TOL);
        assert!((adj[2] - 0.04).abs() < TOL);
        assert!((adj[0] - 0.04).abs() < TOL);
    }

    #[test]
    fn test_invalid_entries_excluded_from_family() {
        let adj = correct_pvalues(&[f64::NAN, 0.02, 1.5, 0.04], FdrMethod::Bonferroni);
        assert!(adj[0].is_nan());
        assert!(adj[2].is_nan());
        // m = 2, not 4
        assert!((adj[1] - 0.04).abs() < TOL);
        assert!((adj[3] - 0.08).abs() < TOL);
    }

    #[test]
    fn test_all_invalid_gives_all_nan() {
        let adj = correct_pvalues(&[f64::NAN, f64::INFINITY], FdrMethod::BenjaminiHochberg);
        assert!(adj.iter().all(|q| q.is_nan()));
        assert!(correct_pvalues(&[], FdrMethod::Holm).is_empty());
    }

    #[test]
    fn test_apply_keeps_every_key() {
        let mut raw = HashMap::new();
        raw.insert("a", 0.001);
        raw.insert("b", f64::NAN);
        raw.insert("c", 0.2);

        let out = apply_fdr_correction(&raw, 0.05, FdrMethod::BenjaminiHochberg);
        assert_eq!(out.corrected.len(), 3);
        assert!(out.corrected["b"].is_nan());
        assert!(!out.rejected["b"]);
        assert!(out.rejected["a"]);
        assert!(!out.rejected["c"]);
        assert!((out.corrected["a"] - 0.002).abs() < TOL);
    }

    #[test]
    fn test_method_identifiers_round_trip() {
        for method in [
            FdrMethod::BenjaminiHochberg,
            FdrMethod::BenjaminiYekutieli,
            FdrMethod::Bonferroni,
            FdrMethod::Holm,
        ] {
            assert_eq!(method.identifier().parse::<FdrMethod>().unwrap(), method);
        }
        assert!(matches!(
            "sidak".parse::<FdrMethod>(),
            Err(AnalysisError::UnknownMethod(_))
        ));
    }
}
