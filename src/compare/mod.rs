// Group comparison engines for regional and connectome-level outcomes
//
// Two comparators share one statistical core:
// - Pairwise: one outcome per subject, one OLS fit per requested group pair
// - Matrix-wise: one OLS fit per region pair of a connectivity tensor
//
// Both fit `outcome ~ 1 + covariates + group`, report the group indicator's
// t-statistic and two-sided p-value, and correct the batch of raw p-values
// jointly. Invalid tests never enter the correction family; they surface as
// NaN (matrix cells) or recorded failures (pairs).
//
// Implementation:
// - ndarray for design matrices and tensors
// - statrs for the Student-t distribution
// - aprender for the unadjusted pooled-variance t-test
// - crossbeam scoped threads for the matrix sweep

mod fdr;
mod matrix;
mod ols;
mod pair_key;
mod pairwise;
mod report;
mod table;
mod ttest;

pub use fdr::{apply_fdr_correction, correct_pvalues, FdrCorrection, FdrMethod};
pub use matrix::{
    compare_matrices, fit_cell, CancellationToken, CellFit, MatrixComparison, SharedDesign,
    SweepOptions,
};
pub use ols::{fit_ols, OlsFit};
pub use pair_key::PairKey;
pub use pairwise::{compare_groups, PairFailure, PairwiseComparison, PairwiseResults};
pub use report::{annotations, significance_marker, Annotation};
pub use table::CovariateTable;
pub use ttest::ttest_comparison;
