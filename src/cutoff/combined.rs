// Combined positivity cutoff
//
// Two independent thresholds are fused:
// - Mixture crossing: fitted on the whole cohort
// - 2-SD: mean + 2 population SD of a reference (negative) sample
// The combined cutoff is their average, or the 2-SD value alone when the
// mixture yields no crossing.

use crate::config::CutoffOptions;
use crate::cutoff::gmm::{fit_gaussian_mixture, GaussianMixture};
use crate::cutoff::intersection::mixture_crossing;
use crate::cutoff::observer::{CutoffDiagnostics, CutoffObserver, DENSITY_GRID_POINTS};
use crate::error::{AnalysisError, Result};
use aprender::stats::DescriptiveStats;
use serde::Serialize;
use trueno::Vector;

/// Descriptive summary of a score series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub n: usize,
    pub mean: f64,
    /// Population standard deviation
    pub sd: f64,
    pub median: f64,
}

impl ScoreSummary {
    /// Summary of a series with no finite values
    pub fn empty() -> Self {
        Self {
            n: 0,
            mean: f64::NAN,
            sd: f64::NAN,
            median: f64::NAN,
        }
    }

    /// Summarise the finite values of `scores`
    pub fn from_scores(scores: &[f64]) -> Result<Self> {
        let finite: Vec<f32> = scores
            .iter()
            .filter(|v| v.is_finite())
            .map(|&v| v as f32)
            .collect();
        if finite.is_empty() {
            return Err(AnalysisError::insufficient("score summary", 1, 0));
        }

        let vector = Vector::from_slice(&finite);
        let mean = vector
            .mean()
            .map_err(|e| AnalysisError::model_fit(format!("score mean: {}", e)))?;
        let sd = vector
            .stddev()
            .map_err(|e| AnalysisError::model_fit(format!("score spread: {}", e)))?;
        let median = DescriptiveStats::new(&vector)
            .quantile(0.5)
            .map_err(|e| AnalysisError::model_fit(format!("score median: {}", e)))?;

        Ok(Self {
            n: finite.len(),
            mean: f64::from(mean),
            sd: f64::from(sd),
            median: f64::from(median),
        })
    }
}

/// Thresholds from one combined-cutoff run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutoffResult {
    pub cutoff: f64,
    pub mixture_cutoff: Option<f64>,
    pub two_sd_cutoff: f64,
    /// Absent when the mixture could not be fitted
    pub mixture: Option<GaussianMixture>,
    /// Summary of the mixture scores
    pub summary: ScoreSummary,
}

impl CutoffResult {
    /// Generate human-readable report
    pub fn to_report_string(&self, roi: &str) -> String {
        let mut report = String::new();
        report.push_str(&format!("📊 {} combined cut-off = {:.3}\n\n", roi, self.cutoff));
        match self.mixture_cutoff {
            Some(gmm) => report.push_str(&format!("GMM cut-off: {:.3}\n", gmm)),
            None => report.push_str("GMM cut-off: none (2-SD fallback)\n"),
        }
        report.push_str(&format!("2SD cut-off: {:.3}\n", self.two_sd_cutoff));
        if let Some(mixture) = &self.mixture {
            for (label, c) in [("negative", mixture.negative()), ("positive", mixture.positive())] {
                report.push_str(&format!(
                    "  {} component: mean={:.3}, sd={:.3}, weight={:.2}\n",
                    label,
                    c.mean,
                    c.variance.sqrt(),
                    c.weight
                ));
            }
        }
        report.push_str(&format!(
            "Scores: n={}, mean={:.3}, sd={:.3}, median={:.3}\n",
            self.summary.n, self.summary.mean, self.summary.sd, self.summary.median
        ));
        report
    }
}

/// Mean plus two population standard deviations
///
/// # Example
/// ```
/// use pathostat::cutoff::fit_two_sd_cutoff;
///
/// assert_eq!(fit_two_sd_cutoff(&[10.0, 10.0, 10.0, 10.0]).unwrap(), 10.0);
/// ```
pub fn fit_two_sd_cutoff(scores: &[f64]) -> Result<f64> {
    if scores.is_empty() {
        return Err(AnalysisError::insufficient("2-SD reference scores", 1, 0));
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let var = scores.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Ok(mean + 2.0 * var.sqrt())
}

/// Flag each score strictly above `cutoff`; NaN is never above
pub fn is_above_cutoff(scores: &[f64], cutoff: f64) -> Vec<bool> {
    scores.iter().map(|&s| s > cutoff).collect()
}

/// Amyloid status of one subject
///
/// A finite PET value decides against `cutoff` (strictly above is positive).
/// Without one, the CSF Aβ42/40 abnormality flag is used; with neither the
/// status is unknown.
///
/// # Example
/// ```
/// use pathostat::cutoff::determine_amyloid_status;
///
/// assert_eq!(determine_amyloid_status(Some(1.2), 1.033, Some(false)), Some(true));
/// assert_eq!(determine_amyloid_status(None, 1.033, Some(true)), Some(true));
/// assert_eq!(determine_amyloid_status(None, 1.033, None), None);
/// ```
pub fn determine_amyloid_status(
    pet: Option<f64>,
    cutoff: f64,
    csf_abnormal: Option<bool>,
) -> Option<bool> {
    match pet.filter(|v| v.is_finite()) {
        Some(value) => Some(value > cutoff),
        None => csf_abnormal,
    }
}

/// Amyloid status for every subject of a cohort
///
/// `csf_abnormal`, when given, is aligned with `pet` by subject.
///
/// # Errors
/// `ShapeMismatch` when the CSF flags and PET values differ in length.
pub fn amyloid_status_for_cohort(
    pet: &[Option<f64>],
    cutoff: f64,
    csf_abnormal: Option<&[Option<bool>]>,
) -> Result<Vec<Option<bool>>> {
    if let Some(csf) = csf_abnormal {
        if csf.len() != pet.len() {
            return Err(AnalysisError::ShapeMismatch {
                context: "CSF abnormality flags".to_string(),
                expected: pet.len(),
                got: csf.len(),
            });
        }
    }
    let statuses: Vec<Option<bool>> = pet
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let csf = csf_abnormal.and_then(|flags| flags[i]);
            determine_amyloid_status(value, cutoff, csf)
        })
        .collect();

    let unknown = statuses.iter().filter(|s| s.is_none()).count();
    if unknown > 0 {
        tracing::debug!("{} subject(s) without PET or CSF amyloid data", unknown);
    }
    Ok(statuses)
}

/// Fuse the mixture crossing and the 2-SD threshold
///
/// # Arguments
/// * `mixture_scores` - Whole cohort, fitted with a two-component mixture
/// * `sd_scores` - Reference sample for the 2-SD threshold
/// * `options` - Mixture fitting and root selection options
/// * `observer` - QC hook; receives densities and thresholds
///
/// # Errors
/// Only a failing 2-SD threshold (empty `sd_scores`) is an error. Mixture
/// failures fall back to the 2-SD value.
pub fn find_combined_cutoff(
    mixture_scores: &[f64],
    sd_scores: &[f64],
    options: &CutoffOptions,
    observer: &dyn CutoffObserver,
) -> Result<CutoffResult> {
    let two_sd_cutoff = fit_two_sd_cutoff(sd_scores)?;
    let summary =
        ScoreSummary::from_scores(mixture_scores).unwrap_or_else(|_| ScoreSummary::empty());

    let mixture = match fit_gaussian_mixture(mixture_scores, options) {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!("Mixture fit failed, using 2-SD cutoff alone: {}", e);
            None
        }
    };
    let mixture_cutoff = match mixture.as_ref().map(|m| mixture_crossing(m, options)) {
        Some(Ok(Some(x))) => Some(x),
        Some(Ok(None)) => {
            tracing::warn!("Mixture components do not intersect, using 2-SD cutoff alone");
            None
        }
        Some(Err(e)) => {
            tracing::warn!("Mixture cutoff unavailable, using 2-SD cutoff alone: {}", e);
            None
        }
        None => None,
    };

    let cutoff = match mixture_cutoff {
        Some(gmm) => (gmm + two_sd_cutoff) / 2.0,
        None => two_sd_cutoff,
    };

    let lo = mixture_scores
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min);
    let hi = mixture_scores
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    observer.on_cutoff(&CutoffDiagnostics {
        mixture_scores,
        densities: mixture
            .as_ref()
            .map(|m| m.density_curve(lo, hi, DENSITY_GRID_POINTS)),
        mixture_cutoff,
        two_sd_cutoff,
        combined_cutoff: cutoff,
    });

    Ok(CutoffResult {
        cutoff,
        mixture_cutoff,
        two_sd_cutoff,
        mixture,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sd_population_formula() {
        // mean 5, population sd 2
        let cutoff = fit_two_sd_cutoff(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((cutoff - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_sd_empty() {
        assert!(matches!(
            fit_two_sd_cutoff(&[]),
            Err(AnalysisError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_is_above_cutoff_is_strict() {
        assert_eq!(
            is_above_cutoff(&[1.0, 1.5, 2.0, f64::NAN], 1.5),
            vec![false, false, true, false]
        );
    }

    #[test]
    fn test_amyloid_status_pet_takes_precedence() {
        assert_eq!(determine_amyloid_status(Some(1.10), 1.033, Some(false)), Some(true));
        assert_eq!(determine_amyloid_status(Some(0.95), 1.033, Some(true)), Some(false));
        // Equal to the cutoff is negative
        assert_eq!(determine_amyloid_status(Some(1.033), 1.033, None), Some(false));
    }

    #[test]
    fn test_amyloid_status_csf_fallback() {
        assert_eq!(determine_amyloid_status(None, 1.033, Some(true)), Some(true));
        assert_eq!(determine_amyloid_status(None, 1.033, Some(false)), Some(false));
        assert_eq!(determine_amyloid_status(Some(f64::NAN), 1.033, Some(true)), Some(true));
    }

    #[test]
    fn test_amyloid_status_unknown_without_data() {
        assert_eq!(determine_amyloid_status(None, 1.033, None), None);
        assert_eq!(determine_amyloid_status(Some(f64::NAN), 1.033, None), None);
    }

    #[test]
    fn test_cohort_amyloid_status() {
        let pet = [Some(1.2), None, None, Some(0.9)];
        let csf = [Some(false), Some(true), None, Some(true)];
        let statuses = amyloid_status_for_cohort(&pet, 1.033, Some(&csf[..])).unwrap();
        assert_eq!(statuses, vec![Some(true), Some(true), None, Some(false)]);

        let pet_only = amyloid_status_for_cohort(&pet, 1.033, None).unwrap();
        assert_eq!(pet_only, vec![Some(true), None, None, Some(false)]);

        assert!(matches!(
            amyloid_status_for_cohort(&pet, 1.033, Some(&csf[..2])),
            Err(AnalysisError::ShapeMismatch { expected: 4, got: 2, .. })
        ));
    }

    #[test]
    fn test_summary_uses_population_sd() {
        let summary = ScoreSummary::from_scores(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(summary.n, 8);
        assert!((summary.mean - 5.0).abs() < 1e-5);
        assert!((summary.sd - 2.0).abs() < 1e-4);
        assert!((summary.median - 4.5).abs() < 1e-5);
    }
}
