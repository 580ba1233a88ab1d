//! CLI argument parsing for pathostat

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for analysis results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report (default)
    Text,
    /// JSON for machine parsing; NaN is written as null
    Json,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// JSON request document
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// TOML analysis configuration (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Combined GMM / 2-SD positivity cutoff for one region
    Cutoff {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Covariate-adjusted pairwise group comparisons
    Compare {
        #[command(flatten)]
        common: CommonArgs,

        /// Unadjusted Student t-tests instead of the OLS model
        #[arg(long = "ttest")]
        ttest: bool,

        /// Leave non-significant pairs out of the annotation list
        #[arg(long = "hide-ns")]
        hide_ns: bool,
    },

    /// Mass-univariate comparison over every cell of a connectivity tensor
    Matrix {
        #[command(flatten)]
        common: CommonArgs,

        /// Worker threads for the sweep (0 = available parallelism)
        #[arg(long = "threads", value_name = "N")]
        threads: Option<usize>,

        /// Abort the sweep after this many seconds
        #[arg(long = "deadline", value_name = "SECS")]
        deadline: Option<f64>,

        /// Log every fitted cell
        #[arg(short, long)]
        verbose: bool,

        /// Significant cells listed in the text report
        #[arg(long = "max-cells", default_value = "20")]
        max_cells: usize,
    },

    /// Hemispheric laterality indices for paired left/right columns
    Laterality {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Parser, Debug)]
#[command(name = "pathostat")]
#[command(version)]
#[command(
    about = "Positivity cutoffs, laterality and group comparisons for regional PET pathology",
    long_about = None
)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}
