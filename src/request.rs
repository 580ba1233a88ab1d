//! JSON request documents for the command-line front end
//!
//! `null` entries in value and covariate arrays are missing observations and
//! become NaN.

use crate::compare::CovariateTable;
use crate::error::{AnalysisError, Result};
use ndarray::Array3;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

fn to_nan(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

fn covariate_table(
    n_rows: usize,
    covariates: &BTreeMap<String, Vec<Option<f64>>>,
) -> Result<CovariateTable> {
    let mut table = CovariateTable::new(n_rows);
    for (name, column) in covariates {
        table.insert_column(name.clone(), to_nan(column))?;
    }
    Ok(table)
}

/// `pathostat cutoff` input
#[derive(Debug, Clone, Deserialize)]
pub struct CutoffRequest {
    pub roi: String,
    /// Whole cohort, fitted with the mixture
    pub mixture_scores: Vec<f64>,
    /// Reference sample for the 2-SD threshold; the mixture scores when absent
    #[serde(default)]
    pub reference_scores: Option<Vec<f64>>,
    /// PET values to classify, `null` where unmeasured; the mixture scores when absent
    #[serde(default)]
    pub pet: Option<Vec<Option<f64>>>,
    /// Per-subject CSF Aβ42/40 abnormality, aligned with the classified PET values
    #[serde(default)]
    pub csf_abnormal: Option<Vec<Option<bool>>>,
}

impl CutoffRequest {
    pub fn reference(&self) -> &[f64] {
        self.reference_scores
            .as_deref()
            .unwrap_or(&self.mixture_scores[..])
    }

    /// PET values to classify against the cutoff
    pub fn pet_values(&self) -> Vec<Option<f64>> {
        match &self.pet {
            Some(pet) => pet.clone(),
            None => self.mixture_scores.iter().map(|&v| Some(v)).collect(),
        }
    }
}

/// One group's outcome and covariates
#[derive(Debug, Clone, Deserialize)]
pub struct GroupInput {
    pub values: Vec<Option<f64>>,
    #[serde(default)]
    pub covariates: BTreeMap<String, Vec<Option<f64>>>,
}

/// `pathostat compare` input
#[derive(Debug, Clone, Deserialize)]
pub struct CompareRequest {
    pub groups: BTreeMap<String, GroupInput>,
    pub comparisons: Vec<(String, String)>,
}

/// Outcomes and covariate tables keyed by group label
pub type GroupData = (HashMap<String, Vec<f64>>, HashMap<String, CovariateTable>);

impl CompareRequest {
    /// Split into outcome vectors and covariate tables
    pub fn group_data(&self) -> Result<GroupData> {
        let mut values = HashMap::with_capacity(self.groups.len());
        let mut covariates = HashMap::with_capacity(self.groups.len());
        for (label, group) in &self.groups {
            values.insert(label.clone(), to_nan(&group.values));
            covariates.insert(
                label.clone(),
                covariate_table(group.values.len(), &group.covariates)?,
            );
        }
        Ok((values, covariates))
    }
}

/// One group's per-subject connectivity matrices and covariates
#[derive(Debug, Clone, Deserialize)]
pub struct MatrixGroupInput {
    /// `[subject][i][j]`
    pub matrices: Vec<Vec<Vec<Option<f64>>>>,
    #[serde(default)]
    pub covariates: BTreeMap<String, Vec<Option<f64>>>,
}

impl MatrixGroupInput {
    /// Stack subject matrices into a regions × regions × subjects tensor
    pub fn tensor(&self, label: &str) -> Result<Array3<f64>> {
        let n_regions = self.matrices.first().map_or(0, Vec::len);
        let shape = (n_regions, n_regions, self.matrices.len());
        let mut tensor = Array3::<f64>::from_elem(shape, f64::NAN);
        for (s, matrix) in self.matrices.iter().enumerate() {
            if matrix.len() != n_regions {
                return Err(AnalysisError::ShapeMismatch {
                    context: format!("rows of subject {} in group '{}'", s, label),
                    expected: n_regions,
                    got: matrix.len(),
                });
            }
            for (i, row) in matrix.iter().enumerate() {
                if row.len() != n_regions {
                    return Err(AnalysisError::ShapeMismatch {
                        context: format!("row {} of subject {} in group '{}'", i, s, label),
                        expected: n_regions,
                        got: row.len(),
                    });
                }
                for (j, value) in row.iter().enumerate() {
                    tensor[[i, j, s]] = value.unwrap_or(f64::NAN);
                }
            }
        }
        Ok(tensor)
    }
}

/// `pathostat matrix` input
#[derive(Debug, Clone, Deserialize)]
pub struct MatrixRequest {
    pub groups: BTreeMap<String, MatrixGroupInput>,
    pub comparison: (String, String),
}

/// Tensors and covariate tables keyed by group label
pub type TensorData = (HashMap<String, Array3<f64>>, HashMap<String, CovariateTable>);

impl MatrixRequest {
    pub fn tensor_data(&self) -> Result<TensorData> {
        let mut tensors = HashMap::with_capacity(self.groups.len());
        let mut covariates = HashMap::with_capacity(self.groups.len());
        for (label, group) in &self.groups {
            tensors.insert(label.clone(), group.tensor(label)?);
            covariates.insert(
                label.clone(),
                covariate_table(group.matrices.len(), &group.covariates)?,
            );
        }
        Ok((tensors, covariates))
    }
}

fn default_suffix() -> String {
    "_LI".to_string()
}

/// `pathostat laterality` input
#[derive(Debug, Clone, Deserialize)]
pub struct LateralityRequest {
    pub columns: BTreeMap<String, Vec<Option<f64>>>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl LateralityRequest {
    pub fn numeric_columns(&self) -> BTreeMap<String, Vec<f64>> {
        self.columns
            .iter()
            .map(|(name, values)| (name.clone(), to_nan(values)))
            .collect()
    }
}
