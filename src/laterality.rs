//! Hemispheric asymmetry of regional pathology
//!
//! The laterality index is `(R - L) / (R + L) * 100`: positive values mean
//! more signal in the right hemisphere. Columns are paired by name, using
//! either FreeSurfer-style `ctx_lh_*`/`ctx_rh_*` or `*_Left`/`*_Right`
//! naming.

use crate::error::{AnalysisError, Result};
use std::collections::BTreeMap;

/// Asymmetry index in percent; NaN when `left + right` is zero
///
/// # Example
/// ```
/// use pathostat::laterality::laterality_index;
///
/// assert_eq!(laterality_index(1.0, 3.0), 50.0);
/// assert!(laterality_index(0.0, 0.0).is_nan());
/// ```
pub fn laterality_index(left: f64, right: f64) -> f64 {
    let total = right + left;
    if total == 0.0 {
        return f64::NAN;
    }
    (right - left) / total * 100.0
}

/// Left/right column pair for one region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HemispherePair {
    pub left: String,
    pub right: String,
    pub region: String,
}

fn right_counterpart(left: &str) -> String {
    left.replace("_lh_", "_rh_").replace("_Left", "_Right")
}

fn region_name(left: &str) -> String {
    if let Some((_, region)) = left.split_once("_lh_") {
        return region.to_string();
    }
    match left.split_once("_Left_") {
        Some((_, region)) => region.to_string(),
        None => left.trim_end_matches("_Left").to_string(),
    }
}

/// Pair every left-hemisphere column with its right counterpart
///
/// Left columns without a matching right column are skipped.
pub fn pair_hemisphere_columns<S: AsRef<str>>(columns: &[S]) -> Vec<HemispherePair> {
    let is_left = |c: &str| c.contains("_lh_") || c.contains("_Left");
    let is_right = |c: &str| c.contains("_rh_") || c.contains("_Right");

    columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|&c| is_left(c))
        .filter_map(|left| {
            let right = right_counterpart(left);
            columns
                .iter()
                .any(|c| c.as_ref() == right && is_right(&right))
                .then(|| HemispherePair {
                    left: left.to_string(),
                    right,
                    region: region_name(left),
                })
        })
        .collect()
}

/// Laterality index columns for every paired region
///
/// Output columns are named `{prefix}{region}{suffix}`.
///
/// # Errors
/// `ShapeMismatch` when a left and right column differ in length.
pub fn regional_laterality(
    columns: &BTreeMap<String, Vec<f64>>,
    prefix: &str,
    suffix: &str,
) -> Result<BTreeMap<String, Vec<f64>>> {
    let names: Vec<&String> = columns.keys().collect();
    let mut indices = BTreeMap::new();

    for pair in pair_hemisphere_columns(&names) {
        let left = &columns[&pair.left];
        let right = &columns[&pair.right];
        if left.len() != right.len() {
            return Err(AnalysisError::ShapeMismatch {
                context: format!("hemisphere columns for '{}'", pair.region),
                expected: left.len(),
                got: right.len(),
            });
        }
        let li = left
            .iter()
            .zip(right)
            .map(|(&l, &r)| laterality_index(l, r))
            .collect();
        indices.insert(format!("{}{}{}", prefix, pair.region, suffix), li);
    }

    tracing::debug!("computed {} laterality indices", indices.len());
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_sign_and_scale() {
        assert_eq!(laterality_index(2.0, 2.0), 0.0);
        assert_eq!(laterality_index(3.0, 1.0), -50.0);
        assert!((laterality_index(1.2, 1.5) - 11.111_111_111).abs() < 1e-6);
    }

    #[test]
    fn test_pairs_both_naming_schemes() {
        let columns = [
            "ctx_lh_entorhinal",
            "ctx_rh_entorhinal",
            "Amygdala_Left",
            "Amygdala_Right",
            "Hippocampus_Left",
            "Brainstem",
        ];
        let pairs = pair_hemisphere_columns(&columns);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].region, "entorhinal");
        assert_eq!(pairs[0].right, "ctx_rh_entorhinal");
        assert_eq!(pairs[1].region, "Amygdala");
    }

    #[test]
    fn test_region_after_left_marker() {
        assert_eq!(region_name("Cerebral_Left_Cortex"), "Cortex");
        assert_eq!(region_name("tau_lh_precuneus"), "precuneus");
    }

    #[test]
    fn test_regional_laterality_columns() {
        let mut columns = BTreeMap::new();
        columns.insert("ctx_lh_fusiform".to_string(), vec![1.0, 2.0, 0.0]);
        columns.insert("ctx_rh_fusiform".to_string(), vec![3.0, 2.0, 0.0]);
        columns.insert("age".to_string(), vec![70.0, 71.0, 72.0]);

        let li = regional_laterality(&columns, "tau_", "_LI").unwrap();
        let fusiform = &li["tau_fusiform_LI"];
        assert_eq!(fusiform[0], 50.0);
        assert_eq!(fusiform[1], 0.0);
        assert!(fusiform[2].is_nan());
        assert_eq!(li.len(), 1);
    }

    #[test]
    fn test_regional_laterality_length_mismatch() {
        let mut columns = BTreeMap::new();
        columns.insert("ctx_lh_fusiform".to_string(), vec![1.0, 2.0]);
        columns.insert("ctx_rh_fusiform".to_string(), vec![3.0]);
        assert!(matches!(
            regional_laterality(&columns, "", "_LI"),
            Err(AnalysisError::ShapeMismatch { .. })
        ));
    }
}
