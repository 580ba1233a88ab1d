// Positivity cutoffs for regional pathology scores
//
// A region's cutoff fuses two independent estimates:
// - The crossing point of a two-component Gaussian mixture fitted to the
//   whole cohort (negative and positive populations)
// - Mean + 2 SD of a reference sample assumed negative
//
// A missing or failed mixture estimate is a normal outcome: the 2-SD value
// is used alone. QC plotting hooks in through `CutoffObserver`.
//
// Implementation:
// - statrs normal densities for the QC curves
// - trueno vectors and aprender's DescriptiveStats for score summaries

mod combined;
mod gmm;
mod intersection;
mod observer;

pub use combined::{
    amyloid_status_for_cohort, determine_amyloid_status, find_combined_cutoff,
    fit_two_sd_cutoff, is_above_cutoff, CutoffResult, ScoreSummary,
};
pub use gmm::{fit_gaussian_mixture, DensityCurve, GaussianMixture, MixtureComponent};
pub use intersection::{density_intersection, fit_gaussian_mixture_cutoff};
pub use observer::{
    CutoffDiagnostics, CutoffObserver, NoopObserver, TracingObserver, DENSITY_GRID_POINTS,
};
