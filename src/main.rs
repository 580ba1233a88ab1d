use anyhow::{Context, Result};
use clap::Parser;
use pathostat::cli::{Cli, Command, CommonArgs, OutputFormat};
use pathostat::compare::{
    annotations, compare_groups, compare_matrices, ttest_comparison, SweepOptions,
};
use pathostat::config::AnalysisConfig;
use pathostat::cutoff::{
    amyloid_status_for_cohort, find_combined_cutoff, is_above_cutoff, TracingObserver,
};
use pathostat::laterality::regional_laterality;
use pathostat::request::{CompareRequest, CutoffRequest, LateralityRequest, MatrixRequest};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load the analysis configuration, or defaults when no file is given
fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    AnalysisConfig::from_toml_str(&text)
        .with_context(|| format!("Invalid config {}", path.display()))
}

fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Malformed request {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_cutoff(common: &CommonArgs) -> Result<()> {
    let config = load_config(common.config.as_deref())?;
    let request: CutoffRequest = read_request(&common.input)?;

    let observer = TracingObserver::new(request.roi.clone());
    let result = find_combined_cutoff(
        &request.mixture_scores,
        request.reference(),
        &config.cutoff,
        &observer,
    )
    .with_context(|| format!("Cutoff estimation failed for {}", request.roi))?;
    let positive = is_above_cutoff(&request.mixture_scores, result.cutoff);
    let status = match request.csf_abnormal.as_deref() {
        Some(csf) => Some(amyloid_status_for_cohort(
            &request.pet_values(),
            result.cutoff,
            Some(csf),
        )?),
        None => None,
    };

    match common.format {
        OutputFormat::Text => {
            print!("{}", result.to_report_string(&request.roi));
            println!(
                "Above cut-off: {} of {}",
                positive.iter().filter(|p| **p).count(),
                positive.len()
            );
            if let Some(status) = &status {
                let count = |want: Option<bool>| status.iter().filter(|s| **s == want).count();
                println!(
                    "Amyloid status: {} positive, {} negative, {} unknown",
                    count(Some(true)),
                    count(Some(false)),
                    count(None)
                );
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "roi": request.roi,
            "result": result,
            "above_cutoff": positive,
            "amyloid_status": status,
        }))?,
    }
    Ok(())
}

fn run_compare(common: &CommonArgs, ttest: bool, hide_ns: bool) -> Result<()> {
    let config = load_config(common.config.as_deref())?;
    let request: CompareRequest = read_request(&common.input)?;
    let (values, covariates) = request.group_data()?;

    let results = if ttest {
        ttest_comparison(
            &values,
            &request.comparisons,
            config.comparison.fdr_method,
            config.comparison.alpha,
        )
    } else {
        compare_groups(&values, &covariates, &request.comparisons, &config.comparison)
            .context("Pairwise comparison aborted")?
    };
    let markers = annotations(&results, hide_ns);

    match common.format {
        OutputFormat::Text => {
            print!("{}", results.to_report_string());
            if !markers.is_empty() {
                println!("\nAnnotations:");
                for a in &markers {
                    println!("  {}: {}", a.key, a.marker);
                }
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "results": results,
            "annotations": markers,
        }))?,
    }
    Ok(())
}

fn run_matrix(
    common: &CommonArgs,
    threads: Option<usize>,
    deadline: Option<f64>,
    verbose: bool,
    max_cells: usize,
) -> Result<()> {
    let config = load_config(common.config.as_deref())?;
    let request: MatrixRequest = read_request(&common.input)?;
    let (tensors, covariates) = request.tensor_data()?;

    let mut options = SweepOptions::from(&config.sweep);
    if let Some(threads) = threads {
        options.threads = threads;
    }
    if let Some(secs) = deadline {
        anyhow::ensure!(secs > 0.0, "--deadline must be positive, got {}", secs);
        options.deadline = Some(Duration::from_secs_f64(secs));
    }
    options.verbose |= verbose;

    let (focal, reference) = &request.comparison;
    let result = compare_matrices(
        &tensors,
        &covariates,
        (focal.as_str(), reference.as_str()),
        &config.comparison,
        &options,
    )
    .with_context(|| format!("Matrix comparison {} vs {} failed", focal, reference))?;

    match common.format {
        OutputFormat::Text => print!("{}", result.to_report_string(max_cells)),
        OutputFormat::Json => print_json(&result)?,
    }
    Ok(())
}

fn run_laterality(common: &CommonArgs) -> Result<()> {
    let request: LateralityRequest = read_request(&common.input)?;
    let columns = request.numeric_columns();
    let indices = regional_laterality(&columns, &request.prefix, &request.suffix)?;

    match common.format {
        OutputFormat::Text => {
            println!("📊 Laterality indices ({} regions)\n", indices.len());
            for (name, values) in &indices {
                let rendered: Vec<String> = values.iter().map(|v| format!("{:.2}", v)).collect();
                println!("  {}: {}", name, rendered.join(", "));
            }
        }
        OutputFormat::Json => print_json(&indices)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(args.debug);

    match &args.command {
        Command::Cutoff { common } => run_cutoff(common),
        Command::Compare {
            common,
            ttest,
            hide_ns,
        } => run_compare(common, *ttest, *hide_ns),
        Command::Matrix {
            common,
            threads,
            deadline,
            verbose,
            max_cells,
        } => run_matrix(common, *threads, *deadline, *verbose, *max_cells),
        Command::Laterality { common } => run_laterality(common),
    }
}
