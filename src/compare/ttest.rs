// Unadjusted two-sample comparisons
//
// Uses aprender's independent t-test with pooled variance, the classic
// Student test, and feeds the batch through the same joint correction and
// keying as the OLS comparator.

use crate::compare::fdr::FdrMethod;
use crate::compare::pair_key::PairKey;
use crate::compare::pairwise::{finalize_pairs, resolve_comparisons, PairFit, PairFailure, PairwiseResults};
use crate::error::{AnalysisError, Result};
use std::collections::HashMap;

/// Student's t-test for every requested pair, corrected jointly
///
/// Non-finite values are dropped per group. Pairs with fewer than two
/// observations in a group are recorded as failures. The test runs in
/// `f32` on values centred by the pooled `f64` mean, so large offsets
/// (e.g. 1e6 + small differences) keep their resolution.
///
/// # Example
/// ```
/// use pathostat::compare::{ttest_comparison, FdrMethod};
/// use std::collections::HashMap;
///
/// let mut data = HashMap::new();
/// data.insert("tau+".to_string(), vec![2.0, 2.2, 2.4, 2.1, 2.3]);
/// data.insert("tau-".to_string(), vec![1.0, 1.2, 1.1, 1.3, 1.0]);
///
/// let results = ttest_comparison(&data, &[("tau+", "tau-")], FdrMethod::BenjaminiHochberg, 0.05);
/// assert!(results.get("tau-", "tau+").unwrap().p_value < 0.001);
/// ```
pub fn ttest_comparison<S: AsRef<str>>(
    group_values: &HashMap<String, Vec<f64>>,
    comparisons: &[(S, S)],
    method: FdrMethod,
    alpha: f64,
) -> PairwiseResults {
    let mut failures = Vec::new();
    let keys = resolve_comparisons(comparisons, &mut failures);

    let mut fits = Vec::with_capacity(keys.len());
    for key in keys {
        match ttest_pair(&key, group_values) {
            Ok(fit) => fits.push((key, fit)),
            Err(e) => {
                tracing::warn!("t-test {} failed: {}", key, e);
                failures.push(PairFailure {
                    focal: key.focal().to_string(),
                    reference: key.reference().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    finalize_pairs(fits, failures, method, alpha)
}

fn finite_samples(group_values: &HashMap<String, Vec<f64>>, label: &str) -> Result<Vec<f64>> {
    let values = group_values
        .get(label)
        .ok_or_else(|| AnalysisError::UnknownGroup {
            label: label.to_string(),
        })?;
    let samples: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if samples.len() < 2 {
        return Err(AnalysisError::insufficient(
            format!("t-test group '{}'", label),
            2,
            samples.len(),
        ));
    }
    Ok(samples)
}

/// Shift both groups by their pooled mean and narrow to `f32`
///
/// The t statistic is shift-invariant, and centring in `f64` keeps the
/// `f32` samples near zero where their resolution is finest.
fn centred_f32(focal: &[f64], reference: &[f64]) -> (Vec<f32>, Vec<f32>) {
    let n = (focal.len() + reference.len()) as f64;
    let mean = focal.iter().chain(reference).sum::<f64>() / n;
    let narrow = |values: &[f64]| -> Vec<f32> {
        values.iter().map(|&v| (v - mean) as f32).collect()
    };
    (narrow(focal), narrow(reference))
}

fn ttest_pair(key: &PairKey, group_values: &HashMap<String, Vec<f64>>) -> Result<PairFit> {
    let focal = finite_samples(group_values, key.focal())?;
    let reference = finite_samples(group_values, key.reference())?;
    let (focal_f32, reference_f32) = centred_f32(&focal, &reference);

    let result = aprender::stats::hypothesis::ttest_ind(&focal_f32, &reference_f32, true)
        .map_err(|e| AnalysisError::model_fit(format!("t-test: {}", e)))?;

    let t_statistic = f64::from(result.statistic);
    let p_value = f64::from(result.pvalue);
    if !t_statistic.is_finite() || !p_value.is_finite() {
        return Err(AnalysisError::model_fit(
            "t-test produced a non-finite statistic (zero pooled variance)",
        ));
    }

    Ok(PairFit {
        t_statistic,
        p_value,
        n_focal: focal.len(),
        n_reference: reference.len(),
        df_resid: focal.len() + reference.len() - 2,
    })
}
