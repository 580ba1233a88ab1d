// Significance annotation and text reports for comparison results
//
// Star thresholds follow the usual figure convention:
// *** p < 0.001, ** p < 0.01, * p < 0.05, otherwise "ns".

use crate::compare::matrix::MatrixComparison;
use crate::compare::pair_key::PairKey;
use crate::compare::pairwise::PairwiseResults;
use serde::Serialize;

/// Star marker for a (corrected) p-value; `"n/a"` for NaN
pub fn significance_marker(p: f64) -> &'static str {
    if !p.is_finite() {
        "n/a"
    } else if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else if p < 0.05 {
        "*"
    } else {
        "ns"
    }
}

/// One bracket annotation for a plotted comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub key: PairKey,
    pub marker: &'static str,
}

/// Markers for every fitted pair, using corrected p-values
///
/// With `hide_ns`, non-significant pairs are left out.
pub fn annotations(results: &PairwiseResults, hide_ns: bool) -> Vec<Annotation> {
    results
        .comparisons
        .iter()
        .map(|c| Annotation {
            key: c.key.clone(),
            marker: significance_marker(c.p_corrected),
        })
        .filter(|a| !(hide_ns && a.marker == "ns"))
        .collect()
}

impl PairwiseResults {
    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();
        let significant = self
            .comparisons
            .iter()
            .filter(|c| c.p_corrected <= self.alpha)
            .count();

        if significant > 0 {
            report.push_str(&format!(
                "❌ GROUP DIFFERENCES DETECTED ({} of {} comparisons)\n\n",
                significant,
                self.comparisons.len()
            ));
        } else {
            report.push_str("✅ NO SIGNIFICANT GROUP DIFFERENCES\n\n");
        }
        report.push_str(&format!(
            "Correction: {} at alpha = {}\n",
            self.method, self.alpha
        ));

        if !self.comparisons.is_empty() {
            report.push_str("\n📊 Comparisons:\n");
            for c in &self.comparisons {
                report.push_str(&format!(
                    "  {} (t={:.3}, p={:.4}, q={:.4}, n={}+{}) {}\n",
                    c.key,
                    c.t_statistic,
                    c.p_value,
                    c.p_corrected,
                    c.n_focal,
                    c.n_reference,
                    significance_marker(c.p_corrected)
                ));
            }
        }

        if !self.failures.is_empty() {
            report.push_str(&format!("\n⚠️  Failed comparisons ({}):\n", self.failures.len()));
            for f in &self.failures {
                report.push_str(&format!("  - {} vs {}: {}\n", f.focal, f.reference, f.reason));
            }
        }

        report
    }
}

impl MatrixComparison {
    /// Generate human-readable report
    ///
    /// Lists at most `max_cells` significant cells, strongest first.
    pub fn to_report_string(&self, max_cells: usize) -> String {
        let n = self.n_regions();
        let mut significant = self.significant_cells();
        significant.sort_by(|a, b| self.p_corrected[*a].total_cmp(&self.p_corrected[*b]));

        let mut report = String::new();
        report.push_str(&format!("📊 {} over {}x{} region pairs\n\n", self.key, n, n));
        report.push_str(&format!(
            "Cells tested: {} of {}\n",
            self.n_valid_cells(),
            n * n
        ));
        report.push_str(&format!(
            "Significant after {} (alpha = {}): {}\n",
            self.method,
            self.alpha,
            significant.len()
        ));

        if !significant.is_empty() {
            report.push('\n');
            for &(i, j) in significant.iter().take(max_cells) {
                report.push_str(&format!(
                    "  ({}, {}) t={:.3} p={:.4} q={:.4} {}\n",
                    i,
                    j,
                    self.t_statistics[[i, j]],
                    self.p_values[[i, j]],
                    self.p_corrected[[i, j]],
                    significance_marker(self.p_corrected[[i, j]])
                ));
            }
            if significant.len() > max_cells {
                report.push_str(&format!(
                    "  ... {} more\n",
                    significant.len() - max_cells
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_thresholds() {
        assert_eq!(significance_marker(0.0005), "***");
        assert_eq!(significance_marker(0.001), "**");
        assert_eq!(significance_marker(0.009), "**");
        assert_eq!(significance_marker(0.01), "*");
        assert_eq!(significance_marker(0.049), "*");
        assert_eq!(significance_marker(0.05), "ns");
        assert_eq!(significance_marker(0.8), "ns");
        assert_eq!(significance_marker(f64::NAN), "n/a");
    }
}
