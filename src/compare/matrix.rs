// Mass-univariate comparison over every cell of a connectivity tensor
//
// The per-subject design (intercept, covariates, group indicator) does not
// depend on the cell, so it is assembled once and shared read-only by the
// sweep workers. Each cell selects the subjects whose value is non-zero and
// finite and fits its own OLS model. Cells that cannot be fitted become NaN;
// they never abort the sweep.
//
// The sweep partitions region rows across crossbeam scoped threads. Every
// worker owns a disjoint set of output rows.

use crate::compare::fdr::{correct_pvalues, FdrMethod};
use crate::compare::ols::fit_ols;
use crate::compare::pair_key::PairKey;
use crate::compare::table::{assemble_design, indicator_column, stack_covariates, CovariateTable};
use crate::config::{ComparisonConfig, SweepConfig};
use crate::error::{AnalysisError, Result};
use ndarray::{Array1, Array2, Array3, ArrayView3, Axis};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag that aborts a running sweep
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Execution options for the sweep
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Worker threads; 0 picks the available parallelism
    pub threads: usize,
    pub deadline: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    /// Log every fitted cell at info level
    pub verbose: bool,
}

impl SweepOptions {
    /// Single-threaded sweep without deadline
    pub fn sequential() -> Self {
        Self {
            threads: 1,
            ..Self::default()
        }
    }

    fn worker_count(&self, rows: usize) -> usize {
        let wanted = if self.threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.threads
        };
        wanted.clamp(1, rows.max(1))
    }
}

impl From<&SweepConfig> for SweepOptions {
    fn from(config: &SweepConfig) -> Self {
        Self {
            threads: config.threads,
            deadline: config.deadline_secs.map(Duration::from_secs_f64),
            cancel: None,
            verbose: config.verbose,
        }
    }
}

/// Whole-matrix statistic surfaces for one comparison
///
/// The three matrices share their NaN positions. They serialize as nested
/// row arrays with NaN written as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixComparison {
    pub key: PairKey,
    #[serde(serialize_with = "serialize_grid")]
    pub t_statistics: Array2<f64>,
    #[serde(serialize_with = "serialize_grid")]
    pub p_values: Array2<f64>,
    #[serde(serialize_with = "serialize_grid")]
    pub p_corrected: Array2<f64>,
    pub method: FdrMethod,
    pub alpha: f64,
}

impl MatrixComparison {
    pub fn n_regions(&self) -> usize {
        self.t_statistics.nrows()
    }

    /// Cells that produced a test
    pub fn n_valid_cells(&self) -> usize {
        self.p_values.iter().filter(|p| !p.is_nan()).count()
    }

    /// Cells whose corrected p-value is at or below alpha
    pub fn significant_cells(&self) -> Vec<(usize, usize)> {
        self.p_corrected
            .indexed_iter()
            .filter(|(_, q)| q.is_finite() && **q <= self.alpha)
            .map(|(idx, _)| idx)
            .collect()
    }
}

fn serialize_grid<S: Serializer>(
    grid: &Array2<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let rows: Vec<Vec<Option<f64>>> = grid
        .outer_iter()
        .map(|row| row.iter().map(|v| v.is_finite().then_some(*v)).collect())
        .collect();
    rows.serialize(serializer)
}

/// Outcome of one cell fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellFit {
    pub t_statistic: f64,
    pub p_value: f64,
    pub n_obs: usize,
}

/// Per-subject design shared by every cell of the sweep
#[derive(Debug)]
pub struct SharedDesign<'a> {
    focal: ArrayView3<'a, f64>,
    reference: ArrayView3<'a, f64>,
    design: Array2<f64>,
    eligible: Vec<bool>,
    indicator_col: usize,
}

impl<'a> SharedDesign<'a> {
    /// Assemble the design once for the two groups of `key`
    pub fn build(
        key: &PairKey,
        group_tensors: &'a HashMap<String, Array3<f64>>,
        group_covariates: &HashMap<String, CovariateTable>,
        covariates: &[String],
    ) -> Result<Self> {
        let focal = tensor_for(group_tensors, key.focal())?;
        let reference = tensor_for(group_tensors, key.reference())?;

        let (r, _, n_focal) = focal.dim();
        let (r_ref, _, n_reference) = reference.dim();
        if r_ref != r {
            return Err(AnalysisError::ShapeMismatch {
                context: format!("regions of group '{}'", key.reference()),
                expected: r,
                got: r_ref,
            });
        }

        let columns = stack_covariates(
            (key.focal(), key.reference()),
            group_covariates.get(key.focal()),
            group_covariates.get(key.reference()),
            covariates,
            n_focal,
            n_reference,
        )?;
        let indicator: Vec<f64> = std::iter::repeat(1.0)
            .take(n_focal)
            .chain(std::iter::repeat(0.0).take(n_reference))
            .collect();
        let all_rows: Vec<usize> = (0..indicator.len()).collect();
        let eligible: Vec<bool> = all_rows
            .iter()
            .map(|&s| columns.iter().all(|c| c[s].is_finite()))
            .collect();

        let excluded = eligible.iter().filter(|e| !**e).count();
        if excluded > 0 {
            tracing::warn!(
                "{} subject(s) with missing covariates excluded from every cell",
                excluded
            );
        }

        Ok(Self {
            focal: focal.view(),
            reference: reference.view(),
            design: assemble_design(&columns, &indicator, &all_rows),
            eligible,
            indicator_col: indicator_column(columns.len()),
        })
    }

    pub fn n_regions(&self) -> usize {
        self.focal.dim().0
    }

    pub fn n_subjects(&self) -> usize {
        self.eligible.len()
    }

    fn n_focal(&self) -> usize {
        self.focal.dim().2
    }

    fn value(&self, i: usize, j: usize, subject: usize) -> f64 {
        let n_focal = self.n_focal();
        if subject < n_focal {
            self.focal[[i, j, subject]]
        } else {
            self.reference[[i, j, subject - n_focal]]
        }
    }
}

fn tensor_for<'a>(
    group_tensors: &'a HashMap<String, Array3<f64>>,
    label: &str,
) -> Result<&'a Array3<f64>> {
    let tensor = group_tensors
        .get(label)
        .ok_or_else(|| AnalysisError::UnknownGroup {
            label: label.to_string(),
        })?;
    let (r1, r2, subjects) = tensor.dim();
    if r1 != r2 {
        return Err(AnalysisError::ShapeMismatch {
            context: format!("square tensor for group '{}'", label),
            expected: r1,
            got: r2,
        });
    }
    if subjects == 0 {
        tracing::warn!("group '{}' has no subjects; every cell will be NaN", label);
    }
    Ok(tensor)
}

/// Fit one cell against the shared design
///
/// Subjects enter when their value at `(i, j)` is non-zero and finite and
/// their covariates are complete.
pub fn fit_cell(shared: &SharedDesign<'_>, i: usize, j: usize) -> Result<CellFit> {
    let n_focal = shared.n_focal();
    let mut rows = Vec::with_capacity(shared.n_subjects());
    let mut outcome = Vec::with_capacity(shared.n_subjects());
    let mut focal_count = 0usize;

    for subject in 0..shared.n_subjects() {
        if !shared.eligible[subject] {
            continue;
        }
        let v = shared.value(i, j, subject);
        if v != 0.0 && v.is_finite() {
            rows.push(subject);
            outcome.push(v);
            if subject < n_focal {
                focal_count += 1;
            }
        }
    }

    if rows.is_empty() {
        return Err(AnalysisError::insufficient("cell subjects", 1, 0));
    }
    if focal_count == 0 || focal_count == rows.len() {
        return Err(AnalysisError::insufficient("cell group coverage", 2, 1));
    }

    let design = shared.design.select(Axis(0), &rows);
    let y = Array1::from(outcome);
    let fit = fit_ols(design.view(), y.view())?;
    let (t_statistic, p_value) = fit.coefficient_test(shared.indicator_col);

    Ok(CellFit {
        t_statistic,
        p_value,
        n_obs: fit.n_obs,
    })
}

struct SweepGuard<'o> {
    cancel: Option<&'o CancellationToken>,
    deadline: Option<Instant>,
}

impl SweepGuard<'_> {
    fn check(&self) -> Result<()> {
        if self.cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(AnalysisError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AnalysisError::Cancelled);
        }
        Ok(())
    }
}

type RowStats = (usize, Vec<(f64, f64)>);

fn sweep_rows(
    shared: &SharedDesign<'_>,
    rows: &[usize],
    guard: &SweepGuard<'_>,
    verbose: bool,
) -> Result<Vec<RowStats>> {
    let n = shared.n_regions();
    let mut out = Vec::with_capacity(rows.len());
    for &i in rows {
        guard.check()?;
        let mut cells = Vec::with_capacity(n);
        for j in 0..n {
            match fit_cell(shared, i, j) {
                Ok(fit) => {
                    if verbose {
                        tracing::info!(
                            "cell ({}, {}): t={:.4} p={:.4} n={}",
                            i,
                            j,
                            fit.t_statistic,
                            fit.p_value,
                            fit.n_obs
                        );
                    }
                    cells.push((fit.t_statistic, fit.p_value));
                }
                Err(e) => {
                    tracing::debug!("cell ({}, {}) skipped: {}", i, j, e);
                    cells.push((f64::NAN, f64::NAN));
                }
            }
        }
        out.push((i, cells));
    }
    Ok(out)
}

/// Compare two groups at every cell of their connectivity tensors
///
/// # Arguments
/// * `group_tensors` - Map of group label → regions × regions × subjects tensor
/// * `group_covariates` - Map of group label → covariates, one row per subject
/// * `comparison` - `(focal, reference)`; the focal group is coded 1
/// * `config` - Covariates, correction method and alpha (`standardize` is not used here)
/// * `options` - Threads, verbosity, cancellation and deadline
///
/// # Errors
/// Unknown groups, non-square or mismatched tensors, covariate tables that
/// do not match the subject axis, and cancellation are returned. Cell-level
/// problems only produce NaN.
pub fn compare_matrices(
    group_tensors: &HashMap<String, Array3<f64>>,
    group_covariates: &HashMap<String, CovariateTable>,
    comparison: (&str, &str),
    config: &ComparisonConfig,
    options: &SweepOptions,
) -> Result<MatrixComparison> {
    let key = PairKey::new(comparison.0, comparison.1).ok_or_else(|| {
        AnalysisError::InvalidConfig("a comparison needs two distinct groups".to_string())
    })?;

    let shared = SharedDesign::build(&key, group_tensors, group_covariates, &config.covariates)?;
    let n = shared.n_regions();

    let guard = SweepGuard {
        cancel: options.cancel.as_ref(),
        deadline: options.deadline.map(|d| Instant::now() + d),
    };

    let workers = options.worker_count(n);
    let all_rows: Vec<usize> = (0..n).collect();
    let chunk = n.div_ceil(workers).max(1);
    tracing::debug!(
        "{}: sweeping {}x{} cells over {} subjects with {} worker(s)",
        key,
        n,
        n,
        shared.n_subjects(),
        workers
    );

    let partials: Vec<Result<Vec<RowStats>>> = crossbeam::scope(|scope| {
        let handles: Vec<_> = all_rows
            .chunks(chunk)
            .map(|rows| {
                let shared = &shared;
                let guard = &guard;
                let verbose = options.verbose;
                scope.spawn(move |_| sweep_rows(shared, rows, guard, verbose))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(AnalysisError::model_fit("sweep worker panicked")))
            })
            .collect()
    })
    .map_err(|_| AnalysisError::model_fit("sweep worker panicked"))?;

    let mut t_statistics = Array2::<f64>::from_elem((n, n), f64::NAN);
    let mut p_values = Array2::<f64>::from_elem((n, n), f64::NAN);
    for partial in partials {
        for (i, cells) in partial? {
            for (j, (t, p)) in cells.into_iter().enumerate() {
                t_statistics[[i, j]] = t;
                p_values[[i, j]] = p;
            }
        }
    }

    let flat: Vec<f64> = p_values.iter().copied().collect();
    let adjusted = correct_pvalues(&flat, config.fdr_method);
    let p_corrected = Array2::from_shape_vec((n, n), adjusted).map_err(|e| {
        AnalysisError::model_fit(format!("corrected p-value reshape: {}", e))
    })?;

    let result = MatrixComparison {
        key,
        t_statistics,
        p_values,
        p_corrected,
        method: config.fdr_method,
        alpha: config.alpha,
    };
    tracing::debug!(
        "{}: {} of {} cells tested, {} significant after {}",
        result.key,
        result.n_valid_cells(),
        n * n,
        result.significant_cells().len(),
        result.method
    );
    Ok(result)
}
