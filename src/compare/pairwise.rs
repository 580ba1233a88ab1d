// Pairwise group comparison with covariate-adjusted OLS
//
// For each requested pair the two groups are stacked (focal group first),
// a binary indicator codes the focal group as 1, and the indicator's
// coefficient test is reported. Raw p-values of all successful pairs are
// then corrected jointly.

use crate::compare::fdr::{apply_fdr_correction, FdrMethod};
use crate::compare::ols::fit_ols;
use crate::compare::pair_key::PairKey;
use crate::compare::table::{
    assemble_design, indicator_column, stack_covariates, zscore_in_place, CovariateTable,
};
use crate::config::ComparisonConfig;
use crate::error::{AnalysisError, Result};
use ndarray::Array1;
use serde::Serialize;
use std::collections::HashMap;

/// Group-effect statistics for one comparison
#[derive(Debug, Clone, Serialize)]
pub struct PairwiseComparison {
    pub key: PairKey,
    pub t_statistic: f64,
    pub p_value: f64,
    pub p_corrected: f64,
    pub n_focal: usize,
    pub n_reference: usize,
    pub df_resid: usize,
}

/// A comparison that could not be fitted
#[derive(Debug, Clone, Serialize)]
pub struct PairFailure {
    pub focal: String,
    pub reference: String,
    pub reason: String,
}

/// Results of a batch of pairwise comparisons
///
/// Lookups accept either label order.
#[derive(Debug, Clone, Serialize)]
pub struct PairwiseResults {
    pub comparisons: Vec<PairwiseComparison>,
    pub failures: Vec<PairFailure>,
    pub method: FdrMethod,
    pub alpha: f64,
    #[serde(skip)]
    index: HashMap<PairKey, usize>,
}

impl PairwiseResults {
    /// Look up a comparison by its two labels, in either order
    pub fn get(&self, a: &str, b: &str) -> Option<&PairwiseComparison> {
        let key = PairKey::new(a, b)?;
        self.index.get(&key).map(|&idx| &self.comparisons[idx])
    }

    pub fn len(&self) -> usize {
        self.comparisons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }

    pub fn t_statistics(&self) -> HashMap<PairKey, f64> {
        self.collect(|c| c.t_statistic)
    }

    pub fn raw_pvalues(&self) -> HashMap<PairKey, f64> {
        self.collect(|c| c.p_value)
    }

    pub fn corrected_pvalues(&self) -> HashMap<PairKey, f64> {
        self.collect(|c| c.p_corrected)
    }

    fn collect(&self, f: impl Fn(&PairwiseComparison) -> f64) -> HashMap<PairKey, f64> {
        self.comparisons
            .iter()
            .map(|c| (c.key.clone(), f(c)))
            .collect()
    }
}

/// Raw fit of one pair, before correction
#[derive(Debug, Clone)]
pub(crate) struct PairFit {
    pub t_statistic: f64,
    pub p_value: f64,
    pub n_focal: usize,
    pub n_reference: usize,
    pub df_resid: usize,
}

/// Apply joint correction and build the keyed result set
pub(crate) fn finalize_pairs(
    fits: Vec<(PairKey, PairFit)>,
    failures: Vec<PairFailure>,
    method: FdrMethod,
    alpha: f64,
) -> PairwiseResults {
    let raw: HashMap<PairKey, f64> = fits
        .iter()
        .map(|(key, fit)| (key.clone(), fit.p_value))
        .collect();
    let correction = apply_fdr_correction(&raw, alpha, method);

    let mut comparisons = Vec::with_capacity(fits.len());
    let mut index = HashMap::with_capacity(fits.len());
    for (key, fit) in fits {
        let p_corrected = correction
            .corrected
            .get(&key)
            .copied()
            .unwrap_or(f64::NAN);
        index.insert(key.clone(), comparisons.len());
        comparisons.push(PairwiseComparison {
            key,
            t_statistic: fit.t_statistic,
            p_value: fit.p_value,
            p_corrected,
            n_focal: fit.n_focal,
            n_reference: fit.n_reference,
            df_resid: fit.df_resid,
        });
    }

    PairwiseResults {
        comparisons,
        failures,
        method,
        alpha,
        index,
    }
}

/// Resolve requested label pairs into keys, recording unusable ones
pub(crate) fn resolve_comparisons<S: AsRef<str>>(
    comparisons: &[(S, S)],
    failures: &mut Vec<PairFailure>,
) -> Vec<PairKey> {
    let mut keys: Vec<PairKey> = Vec::with_capacity(comparisons.len());
    for (a, b) in comparisons {
        let (a, b) = (a.as_ref(), b.as_ref());
        match PairKey::new(a, b) {
            Some(key) if keys.contains(&key) => {
                tracing::warn!("Duplicate comparison {} ignored", key);
            }
            Some(key) => keys.push(key),
            None => failures.push(PairFailure {
                focal: a.to_string(),
                reference: b.to_string(),
                reason: "a comparison needs two distinct groups".to_string(),
            }),
        }
    }
    keys
}

/// Compare groups pairwise with `outcome ~ covariates + group`
///
/// # Arguments
/// * `group_values` - Map of group label → outcome per subject
/// * `group_covariates` - Map of group label → covariates aligned with `group_values`
/// * `comparisons` - Label pairs; the first label of each pair is coded 1
/// * `config` - Covariate names, standardization, correction method and alpha
///
/// # Errors
/// A missing value with `config.standardize` set aborts the whole call with
/// `AnalysisError::Standardization`. Every other per-pair problem is recorded
/// in `failures` and the remaining pairs continue.
///
/// # Example
/// ```
/// use pathostat::compare::compare_groups;
/// use pathostat::config::ComparisonConfig;
/// use std::collections::HashMap;
///
/// let mut values = HashMap::new();
/// values.insert("AD".to_string(), vec![2.1, 2.4, 1.9, 2.6, 2.2]);
/// values.insert("CN".to_string(), vec![1.1, 1.3, 1.0, 1.2, 1.4]);
///
/// let config = ComparisonConfig { standardize: false, ..ComparisonConfig::default() };
/// let results = compare_groups(&values, &HashMap::new(), &[("AD", "CN")], &config).unwrap();
/// let ad_cn = results.get("CN", "AD").unwrap();
/// assert!(ad_cn.t_statistic > 0.0);
/// assert!(ad_cn.p_value < 0.05);
/// ```
pub fn compare_groups<S: AsRef<str>>(
    group_values: &HashMap<String, Vec<f64>>,
    group_covariates: &HashMap<String, CovariateTable>,
    comparisons: &[(S, S)],
    config: &ComparisonConfig,
) -> Result<PairwiseResults> {
    let mut failures = Vec::new();
    let keys = resolve_comparisons(comparisons, &mut failures);

    let mut fits = Vec::with_capacity(keys.len());
    for key in keys {
        match fit_pair(&key, group_values, group_covariates, config) {
            Ok(fit) => {
                tracing::debug!(
                    "{}: t={:.4} p={:.4} (n={}+{})",
                    key,
                    fit.t_statistic,
                    fit.p_value,
                    fit.n_focal,
                    fit.n_reference
                );
                fits.push((key, fit));
            }
            Err(e @ AnalysisError::Standardization { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!("Comparison {} failed: {}", key, e);
                failures.push(PairFailure {
                    focal: key.focal().to_string(),
                    reference: key.reference().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(finalize_pairs(
        fits,
        failures,
        config.fdr_method,
        config.alpha,
    ))
}

fn group_values_for<'a>(
    group_values: &'a HashMap<String, Vec<f64>>,
    label: &str,
) -> Result<&'a [f64]> {
    let values = group_values
        .get(label)
        .ok_or_else(|| AnalysisError::UnknownGroup {
            label: label.to_string(),
        })?;
    if values.is_empty() {
        return Err(AnalysisError::insufficient(
            format!("group '{}'", label),
            1,
            0,
        ));
    }
    Ok(values)
}

fn fit_pair(
    key: &PairKey,
    group_values: &HashMap<String, Vec<f64>>,
    group_covariates: &HashMap<String, CovariateTable>,
    config: &ComparisonConfig,
) -> Result<PairFit> {
    let focal = group_values_for(group_values, key.focal())?;
    let reference = group_values_for(group_values, key.reference())?;

    let mut covariates = stack_covariates(
        (key.focal(), key.reference()),
        group_covariates.get(key.focal()),
        group_covariates.get(key.reference()),
        &config.covariates,
        focal.len(),
        reference.len(),
    )?;

    let mut outcome: Vec<f64> = focal.iter().chain(reference).copied().collect();
    let indicator: Vec<f64> = std::iter::repeat(1.0)
        .take(focal.len())
        .chain(std::iter::repeat(0.0).take(reference.len()))
        .collect();

    let rows: Vec<usize> = if config.standardize {
        standardize_columns(&mut outcome, &mut covariates, &config.covariates)?;
        (0..outcome.len()).collect()
    } else {
        // Listwise deletion of incomplete subjects
        (0..outcome.len())
            .filter(|&r| outcome[r].is_finite() && covariates.iter().all(|c| c[r].is_finite()))
            .collect()
    };

    let n_focal = rows.iter().filter(|&&r| indicator[r] == 1.0).count();
    let n_reference = rows.len() - n_focal;
    if n_focal == 0 || n_reference == 0 {
        let empty = if n_focal == 0 {
            key.focal()
        } else {
            key.reference()
        };
        return Err(AnalysisError::insufficient(
            format!("group '{}' after removing incomplete rows", empty),
            1,
            0,
        ));
    }

    let design = assemble_design(&covariates, &indicator, &rows);
    let y: Array1<f64> = rows.iter().map(|&r| outcome[r]).collect();
    let fit = fit_ols(design.view(), y.view())?;
    let (t_statistic, p_value) = fit.coefficient_test(indicator_column(covariates.len()));

    Ok(PairFit {
        t_statistic,
        p_value,
        n_focal,
        n_reference,
        df_resid: fit.df_resid,
    })
}

/// Z-score outcome and covariates; any missing value is a hard error
fn standardize_columns(
    outcome: &mut [f64],
    covariates: &mut [Vec<f64>],
    names: &[String],
) -> Result<()> {
    if outcome.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::Standardization {
            column: "outcome".to_string(),
        });
    }
    for (column, name) in covariates.iter().zip(names) {
        if column.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::Standardization {
                column: name.clone(),
            });
        }
    }

    if !zscore_in_place(outcome) {
        return Err(AnalysisError::model_fit(
            "outcome has zero variance and cannot be standardized",
        ));
    }
    for (column, name) in covariates.iter_mut().zip(names) {
        if !zscore_in_place(column) {
            return Err(AnalysisError::model_fit(format!(
                "covariate '{}' has zero variance and cannot be standardized",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(entries: &[(&str, Vec<f64>)]) -> HashMap<String, Vec<f64>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn unstandardized() -> ComparisonConfig {
        ComparisonConfig {
            standardize: false,
            ..ComparisonConfig::default()
        }
    }

    #[test]
    fn test_matches_pooled_t_without_covariates() {
        let data = values(&[("A", vec![1.0, 2.0, 3.0]), ("B", vec![4.0, 5.0, 6.0])]);
        let results = compare_groups(&data, &HashMap::new(), &[("A", "B")], &unstandardized())
            .unwrap();
        let ab = results.get("A", "B").unwrap();
        assert!((ab.t_statistic + 3.0 / (2.0_f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(ab.df_resid, 4);
        // single comparison: correction leaves the p-value unchanged
        assert!((ab.p_corrected - ab.p_value).abs() < 1e-15);
    }

    #[test]
    fn test_standardization_does_not_change_t() {
        let data = values(&[
            ("A", vec![1.0, 2.5, 3.0, 2.2]),
            ("B", vec![4.0, 5.5, 6.0, 4.9]),
        ]);
        let raw = compare_groups(&data, &HashMap::new(), &[("A", "B")], &unstandardized())
            .unwrap();
        let z = compare_groups(
            &data,
            &HashMap::new(),
            &[("A", "B")],
            &ComparisonConfig::default(),
        )
        .unwrap();
        let t_raw = raw.get("A", "B").unwrap().t_statistic;
        let t_z = z.get("A", "B").unwrap().t_statistic;
        assert!((t_raw - t_z).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_group_is_pair_failure() {
        let data = values(&[("A", vec![1.0, 2.0, 3.0]), ("B", vec![4.0, 5.0, 7.0])]);
        let results = compare_groups(
            &data,
            &HashMap::new(),
            &[("A", "B"), ("A", "Z")],
            &unstandardized(),
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.failures.len(), 1);
        assert_eq!(results.failures[0].reference, "Z");
        assert!(results.get("A", "Z").is_none());
    }

    #[test]
    fn test_empty_group_is_insufficient_data() {
        let data = values(&[("A", vec![1.0, 2.0]), ("B", vec![])]);
        let results =
            compare_groups(&data, &HashMap::new(), &[("A", "B")], &unstandardized()).unwrap();
        assert!(results.is_empty());
        assert!(results.failures[0].reason.contains("insufficient data"));
    }

    #[test]
    fn test_listwise_deletion_without_standardization() {
        let data = values(&[
            ("A", vec![1.0, 2.0, 3.0, f64::NAN]),
            ("B", vec![4.0, 5.0, 6.0]),
        ]);
        let results =
            compare_groups(&data, &HashMap::new(), &[("A", "B")], &unstandardized()).unwrap();
        assert_eq!(results.get("A", "B").unwrap().n_focal, 3);
    }

    #[test]
    fn test_missing_value_with_standardization_aborts() {
        let data = values(&[
            ("A", vec![1.0, 2.0, 3.0, f64::NAN]),
            ("B", vec![4.0, 5.0, 6.0]),
        ]);
        let err = compare_groups(
            &data,
            &HashMap::new(),
            &[("A", "B")],
            &ComparisonConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Standardization {
                column: "outcome".to_string()
            }
        );
    }

    #[test]
    fn test_same_label_pair_recorded_as_failure() {
        let data = values(&[("A", vec![1.0, 2.0, 3.0])]);
        let results =
            compare_groups(&data, &HashMap::new(), &[("A", "A")], &unstandardized()).unwrap();
        assert!(results.is_empty());
        assert_eq!(results.failures.len(), 1);
    }

    #[test]
    fn test_duplicate_pair_fitted_once() {
        let data = values(&[("A", vec![1.0, 2.0, 3.0]), ("B", vec![4.0, 5.0, 7.0])]);
        let results = compare_groups(
            &data,
            &HashMap::new(),
            &[("A", "B"), ("B", "A")],
            &unstandardized(),
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.get("B", "A").unwrap().key.focal(), "A");
    }
}
