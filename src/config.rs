// Configuration for cutoff estimation and group comparisons
//
// Every knob is passed in explicitly; the engines never read files or
// environment variables themselves. The binary loads this from TOML.

use crate::compare::FdrMethod;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};

/// Top-level analysis configuration
///
/// # Example
/// ```
/// use pathostat::config::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.comparison.alpha, 0.05);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub comparison: ComparisonConfig,
    pub cutoff: CutoffOptions,
    pub sweep: SweepConfig,
}

/// Settings shared by the pairwise and matrix comparators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Multiple-comparisons method, statsmodels identifiers ("fdr_bh", "holm", ...)
    pub fdr_method: FdrMethod,

    /// Significance threshold
    ///
    /// Only drives the reject flags and the annotation markers; raw and
    /// corrected p-values do not depend on it.
    pub alpha: f64,

    /// Z-score outcome and covariates before the pairwise fit
    pub standardize: bool,

    /// Covariate column names entered into every model
    pub covariates: Vec<String>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            fdr_method: FdrMethod::BenjaminiHochberg,
            alpha: 0.05,
            standardize: true,
            covariates: Vec::new(),
        }
    }
}

/// Which real root of the density-intersection quadratic becomes the cutoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RootPolicy {
    /// First root a companion-matrix solver reports: the one of larger magnitude
    ///
    /// For positive scores with a narrower positive component this root lies
    /// above both means. For negative scores it is the more negative root.
    #[default]
    FirstRoot,

    /// Root inside the interval spanned by the two component means
    BetweenMeans,
}

/// Gaussian-mixture and fusion settings for the cutoff engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoffOptions {
    /// Minimum number of scores before a mixture is attempted
    pub min_observations: usize,

    /// Maximum EM iterations
    pub max_iter: usize,

    /// Convergence tolerance on the per-sample log-likelihood
    pub tol: f64,

    /// Added to every component variance to keep the fit non-singular
    pub reg_covar: f64,

    pub root_policy: RootPolicy,
}

impl Default for CutoffOptions {
    fn default() -> Self {
        Self {
            min_observations: 2,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            root_policy: RootPolicy::FirstRoot,
        }
    }
}

/// Execution settings for the connectome sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SweepConfig {
    /// Worker threads; 0 picks the available parallelism
    pub threads: usize,

    /// Abort the sweep after this many seconds
    pub deadline_secs: Option<f64>,

    /// Log every fitted cell at info level
    pub verbose: bool,
}

impl AnalysisConfig {
    /// Create a strict configuration (alpha 0.01, Holm correction)
    pub fn strict() -> Self {
        Self {
            comparison: ComparisonConfig {
                fdr_method: FdrMethod::Holm,
                alpha: 0.01,
                ..ComparisonConfig::default()
            },
            cutoff: CutoffOptions {
                min_observations: 20,
                max_iter: 500,
                tol: 1e-6,
                ..CutoffOptions::default()
            },
            sweep: SweepConfig::default(),
        }
    }

    /// Create a permissive configuration (alpha 0.10)
    pub fn permissive() -> Self {
        Self {
            comparison: ComparisonConfig {
                alpha: 0.10,
                ..ComparisonConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parse a TOML document; missing sections fall back to defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.comparison.alpha) {
            return Err(AnalysisError::InvalidConfig(format!(
                "alpha must be in [0, 1], got {}",
                self.comparison.alpha
            )));
        }

        if self.cutoff.min_observations < 2 {
            return Err(AnalysisError::InvalidConfig(format!(
                "min_observations must be >= 2 for a two-component mixture, got {}",
                self.cutoff.min_observations
            )));
        }

        if self.cutoff.max_iter == 0 {
            return Err(AnalysisError::InvalidConfig(
                "max_iter must be positive".to_string(),
            ));
        }

        if !(self.cutoff.tol > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "tol must be positive, got {}",
                self.cutoff.tol
            )));
        }

        if self.cutoff.reg_covar < 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "reg_covar must be non-negative, got {}",
                self.cutoff.reg_covar
            )));
        }

        if let Some(secs) = self.sweep.deadline_secs {
            if !(secs > 0.0) {
                return Err(AnalysisError::InvalidConfig(format!(
                    "deadline_secs must be positive, got {}",
                    secs
                )));
            }
        }

        Ok(())
    }
}
