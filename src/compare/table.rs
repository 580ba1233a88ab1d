//! Per-group covariate tables and design-matrix assembly
//!
//! Missing values are stored as NaN. Tables are column-major: one `Vec<f64>`
//! per named covariate, all of the table's row count.

use crate::error::{AnalysisError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Named covariate columns for one group, one row per subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CovariateTable {
    n_rows: usize,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl CovariateTable {
    /// Empty table for `n_rows` subjects
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Builder-style column insertion
    ///
    /// # Example
    /// ```
    /// use pathostat::compare::CovariateTable;
    ///
    /// let table = CovariateTable::new(3)
    ///     .with_column("age", vec![71.0, 68.5, 80.2])
    ///     .unwrap();
    /// assert_eq!(table.column("age").unwrap()[1], 68.5);
    /// ```
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    /// Add or replace a column
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.n_rows {
            return Err(AnalysisError::ShapeMismatch {
                context: format!("covariate column '{}'", name),
                expected: self.n_rows,
                got: values.len(),
            });
        }
        match self.names.iter().position(|n| *n == name) {
            Some(idx) => self.columns[idx] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.columns[idx].as_slice())
    }

    fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name).ok_or_else(|| AnalysisError::UnknownCovariate {
            name: name.to_string(),
        })
    }

    /// True when every requested covariate is finite in `row`
    pub fn row_complete(&self, row: usize, names: &[String]) -> bool {
        names
            .iter()
            .all(|name| self.column(name).map_or(false, |col| col[row].is_finite()))
    }
}

/// Stack the requested covariates of two groups, focal rows first
///
/// Returns one column per name. An absent table is accepted only when no
/// covariates are requested; otherwise the error names the group lacking it.
pub(crate) fn stack_covariates(
    labels: (&str, &str),
    focal: Option<&CovariateTable>,
    reference: Option<&CovariateTable>,
    names: &[String],
    focal_rows: usize,
    reference_rows: usize,
) -> Result<Vec<Vec<f64>>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut stacked = vec![Vec::with_capacity(focal_rows + reference_rows); names.len()];
    let groups = [
        (labels.0, focal, focal_rows),
        (labels.1, reference, reference_rows),
    ];
    for (label, table, rows) in groups {
        let table = table.ok_or_else(|| AnalysisError::MissingCovariateTable {
            label: label.to_string(),
        })?;
        if table.n_rows() != rows {
            return Err(AnalysisError::ShapeMismatch {
                context: format!("covariate table rows of group '{}'", label),
                expected: rows,
                got: table.n_rows(),
            });
        }
        for (column, name) in stacked.iter_mut().zip(names) {
            column.extend_from_slice(table.require(name)?);
        }
    }
    Ok(stacked)
}

/// Z-score in place with the population standard deviation
///
/// Returns `false` (leaving the data untouched) when the column has zero or
/// non-finite spread.
pub(crate) fn zscore_in_place(values: &mut [f64]) -> bool {
    if values.is_empty() {
        return false;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let sd = var.sqrt();
    if !(sd.is_finite() && sd > 0.0) {
        return false;
    }
    for v in values.iter_mut() {
        *v = (*v - mean) / sd;
    }
    true
}

/// Design matrix `[1, covariates..., indicator]` over the selected rows
pub(crate) fn assemble_design(
    covariates: &[Vec<f64>],
    indicator: &[f64],
    rows: &[usize],
) -> Array2<f64> {
    let width = covariates.len() + 2;
    let mut design = Array2::<f64>::zeros((rows.len(), width));
    for (r, &row) in rows.iter().enumerate() {
        design[[r, 0]] = 1.0;
        for (c, column) in covariates.iter().enumerate() {
            design[[r, c + 1]] = column[row];
        }
        design[[r, width - 1]] = indicator[row];
    }
    design
}

/// Column index of the group indicator in an assembled design
pub(crate) fn indicator_column(n_covariates: usize) -> usize {
    n_covariates + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_column_length_checked() {
        let result = CovariateTable::new(2).with_column("age", vec![70.0]);
        assert!(matches!(result, Err(AnalysisError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_insert_replaces_existing_column() {
        let mut table = CovariateTable::new(2);
        table.insert_column("age", vec![1.0, 2.0]).unwrap();
        table.insert_column("age", vec![3.0, 4.0]).unwrap();
        assert_eq!(table.names().len(), 1);
        assert_eq!(table.column("age").unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_row_complete() {
        let table = CovariateTable::new(2)
            .with_column("age", vec![70.0, f64::NAN])
            .unwrap();
        assert!(table.row_complete(0, &names(&["age"])));
        assert!(!table.row_complete(1, &names(&["age"])));
        assert!(!table.row_complete(0, &names(&["sex"])));
    }

    #[test]
    fn test_stack_focal_rows_first() {
        let a = CovariateTable::new(2).with_column("age", vec![1.0, 2.0]).unwrap();
        let b = CovariateTable::new(1).with_column("age", vec![9.0]).unwrap();
        let stacked = stack_covariates(("A", "B"), Some(&a), Some(&b), &names(&["age"]), 2, 1).unwrap();
        assert_eq!(stacked, vec![vec![1.0, 2.0, 9.0]]);
    }

    #[test]
    fn test_stack_unknown_covariate() {
        let a = CovariateTable::new(1).with_column("age", vec![1.0]).unwrap();
        let result = stack_covariates(("A", "B"), Some(&a), Some(&a), &names(&["sex"]), 1, 1);
        assert!(matches!(result, Err(AnalysisError::UnknownCovariate { .. })));
    }

    #[test]
    fn test_stack_without_covariates_needs_no_tables() {
        let stacked = stack_covariates(("A", "B"), None, None, &[], 3, 4).unwrap();
        assert!(stacked.is_empty());
    }

    #[test]
    fn test_stack_missing_table_names_group() {
        let a = CovariateTable::new(1).with_column("age", vec![1.0]).unwrap();
        let result = stack_covariates(("AD", "CN"), Some(&a), None, &names(&["age"]), 1, 2);
        match result {
            Err(AnalysisError::MissingCovariateTable { label }) => assert_eq!(label, "CN"),
            other => panic!("expected a missing table error, got {:?}", other),
        }
    }

    #[test]
    fn test_zscore_population_sd() {
        let mut values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(zscore_in_place(&mut values));
        // mean 5, population sd 2
        assert!((values[0] + 1.5).abs() < 1e-12);
        assert!((values[7] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_constant_column_refused() {
        let mut values = vec![3.0, 3.0, 3.0];
        assert!(!zscore_in_place(&mut values));
        assert_eq!(values, vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn test_assemble_design_layout() {
        let covs = vec![vec![10.0, 20.0, 30.0]];
        let indicator = vec![1.0, 1.0, 0.0];
        let design = assemble_design(&covs, &indicator, &[0, 2]);
        assert_eq!(design.dim(), (2, 3));
        assert_eq!(design.row(0).to_vec(), vec![1.0, 10.0, 1.0]);
        assert_eq!(design.row(1).to_vec(), vec![1.0, 30.0, 0.0]);
        assert_eq!(indicator_column(covs.len()), 2);
    }
}
