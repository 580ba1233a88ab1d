// Ordinary least squares through the SVD of the design
//
// Coefficients come from the pseudo-inverse of X and the unscaled
// coefficient covariance from V diag(1/s^2) V', so X'X is never formed.
// A design whose numerical rank (singular values above
// s_max * max(n, p) * eps) is below its column count is singular.
// Two-sided p-values come from statrs' Student-t distribution with n - p
// residual degrees of freedom.

use crate::error::{AnalysisError, Result};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Relative residual sum of squares treated as an exact fit
const EXACT_FIT_TOL: f64 = 1e-20;

/// Fitted least-squares model
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Array1<f64>,
    pub std_errors: Array1<f64>,
    pub t_values: Array1<f64>,
    pub p_values: Array1<f64>,
    pub n_obs: usize,
    pub df_resid: usize,
    pub r_squared: f64,
}

impl OlsFit {
    /// `(t, p)` for coefficient `k`
    pub fn coefficient_test(&self, k: usize) -> (f64, f64) {
        (self.t_values[k], self.p_values[k])
    }
}

/// Fit `outcome ~ design` by ordinary least squares
///
/// `design` must already contain the intercept column. Fails with
/// `InsufficientData` when there are no residual degrees of freedom and with
/// `ModelFit` for a singular design or a perfect fit.
///
/// # Example
/// ```
/// use ndarray::array;
/// use pathostat::compare::fit_ols;
///
/// let design = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
/// let outcome = array![1.1, 2.9, 5.2, 6.8];
/// let fit = fit_ols(design.view(), outcome.view()).unwrap();
/// assert!((fit.coefficients[1] - 1.94).abs() < 1e-9);
/// ```
pub fn fit_ols(design: ArrayView2<'_, f64>, outcome: ArrayView1<'_, f64>) -> Result<OlsFit> {
    let (n, p) = design.dim();
    if outcome.len() != n {
        return Err(AnalysisError::ShapeMismatch {
            context: "ols outcome length".to_string(),
            expected: n,
            got: outcome.len(),
        });
    }
    if n <= p {
        return Err(AnalysisError::insufficient(
            "ols residual degrees of freedom",
            p + 1,
            n,
        ));
    }

    if design.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::model_fit("design matrix has non-finite entries"));
    }
    let x = DMatrix::from_fn(n, p, |i, j| design[[i, j]]);
    let y = DVector::from_iterator(n, outcome.iter().copied());
    let svd = x.svd(true, true);

    let max_sv = svd.singular_values.max();
    if !(max_sv.is_finite() && max_sv > 0.0) {
        return Err(AnalysisError::model_fit("design matrix is all zeros"));
    }
    let rcond = max_sv * n.max(p) as f64 * f64::EPSILON;
    let rank = svd.rank(rcond);
    if rank < p {
        return Err(AnalysisError::model_fit(format!(
            "singular design matrix (rank {} of {} columns)",
            rank, p
        )));
    }

    let beta = svd
        .solve(&y, rcond)
        .map_err(|e| AnalysisError::model_fit(format!("least-squares solve: {}", e)))?;
    let coefficients: Array1<f64> = beta.iter().copied().collect();
    let v_t = svd
        .v_t
        .as_ref()
        .ok_or_else(|| AnalysisError::model_fit("SVD did not return V'"))?;
    // diag((X'X)^-1) = sum_r V[k, r]^2 / s_r^2
    let unscaled_var: Vec<f64> = (0..p)
        .map(|k| {
            svd.singular_values
                .iter()
                .enumerate()
                .map(|(r, s)| (v_t[(r, k)] / s).powi(2))
                .sum::<f64>()
        })
        .collect();

    let fitted = design.dot(&coefficients);
    let rss: f64 = outcome
        .iter()
        .zip(fitted.iter())
        .map(|(y, f)| (y - f).powi(2))
        .sum();

    let df_resid = n - p;
    let sigma2 = rss / df_resid as f64;
    if !sigma2.is_finite() {
        return Err(AnalysisError::model_fit("non-finite residual variance"));
    }
    // Rounding leaves a residual of order eps^2 * |y|^2 on an exact fit
    let outcome_energy = outcome.dot(&outcome);
    if rss <= EXACT_FIT_TOL * outcome_energy {
        return Err(AnalysisError::model_fit(
            "zero residual variance (outcome is fitted exactly)",
        ));
    }

    let t_dist = StudentsT::new(0.0, 1.0, df_resid as f64)
        .map_err(|e| AnalysisError::model_fit(format!("t distribution: {}", e)))?;

    let std_errors: Array1<f64> = (0..p)
        .map(|k| (sigma2 * unscaled_var[k]).sqrt())
        .collect();
    let t_values: Array1<f64> = coefficients
        .iter()
        .zip(std_errors.iter())
        .map(|(b, se)| b / se)
        .collect();
    let p_values: Array1<f64> = t_values
        .iter()
        .map(|t| (2.0 * t_dist.cdf(-t.abs())).clamp(0.0, 1.0))
        .collect();

    let mean_y = outcome.sum() / n as f64;
    let tss: f64 = outcome.iter().map(|y| (y - mean_y).powi(2)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN };

    Ok(OlsFit {
        coefficients,
        std_errors,
        t_values,
        p_values,
        n_obs: n,
        df_resid,
        r_squared,
    })
}
