//! Effect recovery and validation integration tests.
//!
//! Covers:
//! - validator: exact missing-column lists, idempotent positivity, domains
//! - estimator dispatch through `default_estimators` by strategy
//! - forest and bootstrap deadlines

use std::collections::BTreeSet;

use ct_core::{
    Contrast, Dataset, Domain, Error, Estimand, EstimationFailureCause, EstimatorConfig,
    ForestConfig, Strategy, Variable,
};
use ct_inference::{
    CausalForestEstimator, DataValidator, ValidationConfig, default_estimators,
};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal as RandNormal};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn backdoor(adjust: &[&str]) -> Estimand {
    Estimand::new(
        Strategy::Backdoor,
        vec!["x".into()],
        vec!["y".into()],
        adjust.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
    )
}

/// `y = k x + z + noise`, `x = z + noise`.
fn linear_confounded(n: usize, k: f64, seed: u64) -> Dataset {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let eps = RandNormal::new(0.0, 1.0).unwrap();
    let z: Vec<f64> = (0..n).map(|_| eps.sample(&mut rng)).collect();
    let x: Vec<f64> = z.iter().map(|z| z + eps.sample(&mut rng)).collect();
    let y: Vec<f64> = (0..n).map(|i| k * x[i] + z[i] + 0.5 * eps.sample(&mut rng)).collect();
    Dataset::from_numeric([("x", x), ("y", y), ("z", z)]).unwrap()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn missing_columns_are_listed_exactly() {
    let data = Dataset::from_numeric([("x", vec![0.0, 1.0]), ("q", vec![1.0, 2.0])]).unwrap();
    let err = DataValidator::default()
        .check_columns(&data, &backdoor(&["w", "z"]))
        .unwrap_err();
    match err {
        Error::MissingColumn(cols) => assert_eq!(cols, vec!["w", "y", "z"]),
        other => panic!("expected MissingColumn, got {other}"),
    }
}

#[test]
fn positivity_check_is_idempotent() {
    let data = linear_confounded(400, 1.0, 3);
    let validator = DataValidator::new(ValidationConfig::default());
    let contrast = Contrast::numeric("x", 0.0, 10.0);
    let first = validator.check_positivity(&data, &backdoor(&["z"]), &contrast).unwrap();
    let second = validator.check_positivity(&data, &backdoor(&["z"]), &contrast).unwrap();
    assert_eq!(first, second);
    assert!(!first.is_satisfied());
    assert_eq!(first.n_strata, 4);
}

#[test]
fn declared_domains_flag_out_of_range_values() {
    let data = Dataset::from_numeric([
        ("x", vec![0.0, 1.0, 0.0, 1.0]),
        ("y", vec![0.5, 2.0, 11.0, -3.0]),
    ])
    .unwrap();
    let vars = [
        Variable::input("x", Domain::Binary),
        Variable::output("y", Domain::bounded(0.0, 10.0)),
    ];
    let report = DataValidator::default()
        .with_variables(&vars)
        .validate(&data, &backdoor(&[]), &Contrast::numeric("x", 0.0, 1.0))
        .unwrap();
    assert!(report.positivity.is_satisfied());
    assert_eq!(report.domain_violations.len(), 1);
    assert_eq!(report.domain_violations[0].variable, "y");
    assert_eq!(report.domain_violations[0].sample_rows, vec![2, 3]);
    assert!(!report.is_clean());
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

#[test]
fn default_estimators_dispatch_on_strategy() {
    let data = linear_confounded(3000, 1.5, 9);
    let estimand = backdoor(&["z"]);
    let estimator = default_estimators()
        .into_iter()
        .find(|e| e.supports(estimand.strategy()))
        .unwrap();
    assert_eq!(estimator.name(), "linear_regression");

    let fit = estimator.fit(&data, &estimand, &EstimatorConfig::default()).unwrap();
    let contrast = Contrast::numeric("x", 1.0, 3.0);
    let effect = fit.effect(&contrast).unwrap();
    assert!((effect - 3.0).abs() < 0.1, "effect={effect}");
    let (lo, hi) = fit.interval(&contrast, 0.05).unwrap().unwrap();
    assert!(lo <= effect && effect <= hi);
    assert_eq!(fit.n_obs(), 3000);
}

#[test]
fn incomplete_rows_are_dropped_before_fitting() {
    let base = linear_confounded(200, 2.0, 4);
    let holes: Vec<Option<ct_core::Value>> =
        (0..200).map(|i| if i % 10 == 0 { None } else { Some(1.0.into()) }).collect();
    let data = base.with_column("w", holes).unwrap();
    let Err(err) =
        default_estimators()[0].fit(&data, &backdoor(&["w", "z"]), &EstimatorConfig::default())
    else {
        panic!("constant column must not fit");
    };
    // `w` is constant on the complete rows.
    assert!(matches!(err, Error::EstimationFailure(EstimationFailureCause::Singular(_))));

    let fit = default_estimators()[0]
        .fit(&data, &backdoor(&["z"]), &EstimatorConfig::default())
        .unwrap();
    assert_eq!(fit.n_obs(), 200);
}

#[test]
fn forest_deadline_yields_timeout() {
    let data = linear_confounded(4000, 1.0, 6);
    let config = EstimatorConfig {
        max_duration_secs: Some(1e-6),
        forest: ForestConfig { n_trees: 5000, min_leaf_size: 10, max_depth: 8 },
        ..Default::default()
    };
    let err = CausalForestEstimator::new()
        .fit_forest(&data, &backdoor(&["z"]), &config)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::EstimationFailure(EstimationFailureCause::Timeout { requested: 5000, .. })
    ));
}
