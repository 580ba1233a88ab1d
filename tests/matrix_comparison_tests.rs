// Mass-univariate matrix sweep: cell eligibility, threading and cancellation

use ndarray::Array3;
use pathostat::compare::{
    compare_matrices, CancellationToken, CovariateTable, SweepOptions,
};
use pathostat::config::ComparisonConfig;
use pathostat::AnalysisError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;

fn tensors(pairs: Vec<(&str, Array3<f64>)>) -> HashMap<String, Array3<f64>> {
    pairs
        .into_iter()
        .map(|(label, t)| (label.to_string(), t))
        .collect()
}

/// 2 regions, focal with 2 subjects and reference with 1
fn tiny_cohort() -> HashMap<String, Array3<f64>> {
    let mut focal = Array3::<f64>::zeros((2, 2, 2));
    let mut reference = Array3::<f64>::zeros((2, 2, 1));

    focal[[0, 0, 0]] = 1.0;
    focal[[0, 0, 1]] = 1.4;
    reference[[0, 0, 0]] = 3.0;

    // (1, 0) only measured in the focal group
    focal[[1, 0, 0]] = 0.7;
    focal[[1, 0, 1]] = 0.9;

    focal[[1, 1, 0]] = 2.0;
    focal[[1, 1, 1]] = f64::NAN;
    reference[[1, 1, 0]] = 2.1;

    tensors(vec![("focal", focal), ("reference", reference)])
}

fn random_cohort(n_regions: usize, n_subjects: usize, seed: u64) -> HashMap<String, Array3<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut draw = |shift: f64| {
        Array3::from_shape_fn((n_regions, n_regions, n_subjects), |(i, j, _)| {
            if (i + j) % 7 == 3 {
                0.0
            } else {
                shift + 0.02 * (i * j) as f64 + rng.gen_range(-0.1..0.1)
            }
        })
    };
    let patients = draw(0.45);
    let controls = draw(0.40);
    tensors(vec![("patients", patients), ("controls", controls)])
}

fn unadjusted() -> ComparisonConfig {
    ComparisonConfig::default()
}

#[test]
fn test_cell_eligibility_on_tiny_cohort() {
    let result = compare_matrices(
        &tiny_cohort(),
        &HashMap::new(),
        ("focal", "reference"),
        &unadjusted(),
        &SweepOptions::sequential(),
    )
    .unwrap();

    // Focal mean 1.2 vs 3.0 with pooled residual variance 0.08 on 1 df
    let t = result.t_statistics[[0, 0]];
    assert!((t + 3.0 * 3f64.sqrt()).abs() < 1e-9);
    let expected_p = 1.0 - 2.0 / std::f64::consts::PI * (3.0 * 3f64.sqrt()).atan();
    assert!((result.p_values[[0, 0]] - expected_p).abs() < 1e-7);

    // All-zero cell and single-group cells are not testable
    assert!(result.t_statistics[[0, 1]].is_nan());
    assert!(result.t_statistics[[1, 0]].is_nan());
    // One focal subject left after dropping NaN leaves no residual df
    assert!(result.t_statistics[[1, 1]].is_nan());

    for ((i, j), t) in result.t_statistics.indexed_iter() {
        assert_eq!(t.is_nan(), result.p_values[[i, j]].is_nan());
        assert_eq!(t.is_nan(), result.p_corrected[[i, j]].is_nan());
    }
    assert_eq!(result.n_valid_cells(), 1);
    assert!((result.p_corrected[[0, 0]] - result.p_values[[0, 0]]).abs() < 1e-12);
}

#[test]
fn test_threaded_sweep_is_deterministic() {
    let cohort = random_cohort(12, 9, 42);
    let config = unadjusted();
    let sequential = compare_matrices(
        &cohort,
        &HashMap::new(),
        ("patients", "controls"),
        &config,
        &SweepOptions::sequential(),
    )
    .unwrap();

    for threads in [2, 5, 0] {
        let options = SweepOptions {
            threads,
            ..SweepOptions::default()
        };
        let threaded = compare_matrices(
            &cohort,
            &HashMap::new(),
            ("patients", "controls"),
            &config,
            &options,
        )
        .unwrap();
        for (a, b) in sequential.p_corrected.iter().zip(threaded.p_corrected.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in sequential.t_statistics.iter().zip(threaded.t_statistics.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
    assert!(sequential.n_valid_cells() < 144);
    assert!(sequential.t_statistics[[3, 0]].is_nan());
}

#[test]
fn test_covariates_are_shared_across_cells() {
    let cohort = random_cohort(5, 6, 8);
    let mut rng = StdRng::seed_from_u64(9);
    let mut covariates = HashMap::new();
    for label in ["patients", "controls"] {
        let table = CovariateTable::new(6)
            .with_column("age", (0..6).map(|_| rng.gen_range(60.0..80.0)).collect())
            .unwrap();
        covariates.insert(label.to_string(), table);
    }
    let config = ComparisonConfig {
        covariates: vec!["age".to_string()],
        ..ComparisonConfig::default()
    };

    let result = compare_matrices(
        &cohort,
        &covariates,
        ("patients", "controls"),
        &config,
        &SweepOptions::sequential(),
    )
    .unwrap();
    assert!(result.t_statistics[[0, 0]].is_finite());
    assert!(result.t_statistics[[0, 3]].is_nan());
    assert_eq!(result.key.focal(), "patients");
}

#[test]
fn test_cancelled_sweep_returns_error() {
    let token = CancellationToken::new();
    token.cancel();
    let options = SweepOptions {
        threads: 3,
        cancel: Some(token),
        ..SweepOptions::default()
    };
    let err = compare_matrices(
        &random_cohort(6, 5, 1),
        &HashMap::new(),
        ("patients", "controls"),
        &unadjusted(),
        &options,
    )
    .unwrap_err();
    assert_eq!(err, AnalysisError::Cancelled);
}

#[test]
fn test_expired_deadline_returns_error() {
    let options = SweepOptions {
        deadline: Some(Duration::ZERO),
        ..SweepOptions::sequential()
    };
    let err = compare_matrices(
        &random_cohort(4, 5, 2),
        &HashMap::new(),
        ("patients", "controls"),
        &unadjusted(),
        &options,
    )
    .unwrap_err();
    assert_eq!(err, AnalysisError::Cancelled);
}

#[test]
fn test_mismatched_region_counts_rejected() {
    let mut cohort = random_cohort(4, 5, 3);
    cohort.insert("controls".to_string(), Array3::<f64>::ones((3, 3, 5)));
    let err = compare_matrices(
        &cohort,
        &HashMap::new(),
        ("patients", "controls"),
        &unadjusted(),
        &SweepOptions::sequential(),
    )
    .unwrap_err();
    assert!(matches!(err, AnalysisError::ShapeMismatch { expected: 4, got: 3, .. }));
}

#[test]
fn test_json_surface_writes_null_for_untested_cells() {
    let result = compare_matrices(
        &tiny_cohort(),
        &HashMap::new(),
        ("focal", "reference"),
        &unadjusted(),
        &SweepOptions::sequential(),
    )
    .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert!(json["t_statistics"][0][1].is_null());
    assert!(json["t_statistics"][0][0].is_f64());
}
