//! Quality-control hooks for the cutoff engine
//!
//! Observers see the fitted densities and all three thresholds after a
//! cutoff is computed. They are passed in explicitly and receive shared
//! references only, so they cannot alter the result.

use crate::cutoff::gmm::DensityCurve;

/// Number of grid points the densities are sampled on
pub const DENSITY_GRID_POINTS: usize = 1000;

/// Everything a QC plot of one cutoff needs
#[derive(Debug, Clone)]
pub struct CutoffDiagnostics<'a> {
    /// Scores the mixture was fitted to
    pub mixture_scores: &'a [f64],
    /// Component densities over `[min, max]` of the mixture scores
    pub densities: Option<DensityCurve>,
    pub mixture_cutoff: Option<f64>,
    pub two_sd_cutoff: f64,
    pub combined_cutoff: f64,
}

/// Receives diagnostics after every combined cutoff
pub trait CutoffObserver {
    fn on_cutoff(&self, diagnostics: &CutoffDiagnostics<'_>);
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CutoffObserver for NoopObserver {
    fn on_cutoff(&self, _diagnostics: &CutoffDiagnostics<'_>) {}
}

/// Observer that logs the thresholds for a named region
#[derive(Debug, Clone)]
pub struct TracingObserver {
    roi: String,
}

impl TracingObserver {
    pub fn new(roi: impl Into<String>) -> Self {
        Self { roi: roi.into() }
    }
}

impl CutoffObserver for TracingObserver {
    fn on_cutoff(&self, diagnostics: &CutoffDiagnostics<'_>) {
        match diagnostics.mixture_cutoff {
            Some(gmm) => tracing::info!(
                "{} combined cut-off = {:.3} (gmm {:.3}, 2sd {:.3})",
                self.roi,
                diagnostics.combined_cutoff,
                gmm,
                diagnostics.two_sd_cutoff
            ),
            None => tracing::info!(
                "{} combined cut-off = {:.3} (2sd only)",
                self.roi,
                diagnostics.combined_cutoff
            ),
        }
        if let Some(curve) = &diagnostics.densities {
            // Location of the density peaks, for eyeballing the fit
            let peak = |density: &[f64]| {
                density
                    .iter()
                    .zip(&curve.grid)
                    .max_by(|a, b| a.0.total_cmp(b.0))
                    .map(|(_, x)| *x)
            };
            tracing::debug!(
                "{} density peaks: negative {:?}, positive {:?} over {} points",
                self.roi,
                peak(&curve.negative),
                peak(&curve.positive),
                curve.grid.len()
            );
        }
    }
}
