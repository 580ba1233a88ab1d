//! pathostat - Cohort statistics for regional PET pathology
//!
//! This library turns regional amyloid/tau scores into positivity cutoffs,
//! hemispheric laterality indices and covariate-adjusted group comparisons,
//! including mass-univariate comparisons over every region pair of a
//! connectivity tensor.

pub mod cli;
pub mod compare;
pub mod config;
pub mod cutoff;
pub mod error;
pub mod laterality;
pub mod request;

pub use error::{AnalysisError, Result};
