//! Causal test execution: identification, validation, estimation.
//!
//! ```text
//! CausalTestCase ──► EstimandIdentifier ──► DataValidator ──► CausalEstimator ──► CausalTestResult
//!                        (&CausalDag)          (&Dataset)                              │
//!                                                                                Oracle::evaluate
//! ```
//!
//! Every stage fails fast; the first error is returned and no partial result
//! is produced. Batches run on the rayon pool over shared borrows of the graph
//! and the dataset.

use std::sync::Arc;
use std::time::Instant;

use ct_core::{
    CausalEstimator, Contrast, Dataset, Error, Estimand, Result, ValidationReport,
};
use ct_graph::{CausalDag, EstimandIdentifier};
use ct_inference::{DataValidator, default_estimators};
use rayon::prelude::*;

use crate::case::CausalTestCase;
use crate::config::{EngineConfig, PositivityPolicy};
use crate::oracle::Verdict;
use crate::result::CausalTestResult;

/// Result of a case together with its verdict.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    /// Estimate.
    pub result: CausalTestResult,
    /// Oracle judgement of the estimate.
    pub verdict: Verdict,
}

/// Runs causal test cases against a graph and a dataset.
#[derive(Clone)]
pub struct CausalTestEngine {
    estimators: Vec<Arc<dyn CausalEstimator>>,
    config: EngineConfig,
}

impl Default for CausalTestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CausalTestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.estimators.iter().map(|e| e.name()).collect();
        f.debug_struct("CausalTestEngine")
            .field("estimators", &names)
            .field("config", &self.config)
            .finish()
    }
}

impl CausalTestEngine {
    /// Default estimators and configuration.
    pub fn new() -> Self {
        Self { estimators: default_estimators(), config: EngineConfig::default() }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the estimator list. Earlier estimators win when several
    /// support the same strategy.
    pub fn with_estimators(mut self, estimators: Vec<Arc<dyn CausalEstimator>>) -> Self {
        self.estimators = estimators;
        self
    }

    /// Try `estimator` before the configured ones.
    pub fn prefer(mut self, estimator: Arc<dyn CausalEstimator>) -> Self {
        self.estimators.insert(0, estimator);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Names of the configured estimators, in preference order.
    pub fn estimator_names(&self) -> Vec<&str> {
        self.estimators.iter().map(|e| e.name()).collect()
    }

    /// Execute one case.
    pub fn execute(
        &self,
        case: &CausalTestCase,
        dag: &CausalDag,
        data: &Dataset,
    ) -> Result<CausalTestResult> {
        let t0 = Instant::now();
        let estimands = EstimandIdentifier::with_config(dag, self.config.identifier)
            .identify(case.treatments(), case.outcomes())?;
        let contrast = case.contrast()?;
        let (estimand, estimator) = self.select(&estimands)?;
        tracing::debug!(
            case = case.name(),
            strategy = %estimand.strategy(),
            estimator = estimator.name(),
            n_candidates = estimands.len(),
            "selected estimand"
        );

        let report = DataValidator::new(self.config.validation.clone())
            .with_variables(dag.variables())
            .validate(data, estimand, &contrast)?;
        let caveats = self.review(case, report)?;

        let fitted = estimator.fit(data, estimand, &self.config.estimator)?;
        let point_estimate = fitted.effect(&contrast)?;
        let confidence_level = self.config.estimator.confidence_level;
        let confidence_intervals = match confidence_level {
            Some(level) => fitted.interval(&contrast, level)?,
            None => None,
        };
        let result = CausalTestResult {
            estimand: estimand.clone(),
            point_estimate,
            confidence_intervals,
            confidence_level: confidence_intervals.and(confidence_level),
            estimator: estimator.name().to_string(),
            assumptions: estimator.modelling_assumptions(),
            n_obs: fitted.n_obs(),
            caveats,
        };
        tracing::info!(
            case = case.name(),
            estimand = %result.estimand,
            estimator = %result.estimator,
            point_estimate,
            lower = result.lower(),
            upper = result.upper(),
            n_obs = result.n_obs,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "executed causal test"
        );
        Ok(result)
    }

    /// Execute and judge one case.
    pub fn run(
        &self,
        case: &CausalTestCase,
        dag: &CausalDag,
        data: &Dataset,
    ) -> Result<TestOutcome> {
        let result = self.execute(case, dag, data)?;
        let verdict = case.oracle().evaluate(&result);
        if let Verdict::Fail(reason) = &verdict {
            tracing::info!(case = case.name(), oracle = %case.oracle(), reason = %reason, "causal test failed");
        }
        Ok(TestOutcome { result, verdict })
    }

    /// Execute independent cases in parallel; results keep the input order.
    pub fn execute_batch(
        &self,
        cases: &[CausalTestCase],
        dag: &CausalDag,
        data: &Dataset,
    ) -> Vec<Result<CausalTestResult>> {
        let t0 = Instant::now();
        let out: Vec<Result<CausalTestResult>> =
            cases.par_iter().map(|case| self.execute(case, dag, data)).collect();
        log_batch(&out, t0);
        out
    }

    /// [`CausalTestEngine::run`] over independent cases in parallel.
    pub fn run_batch(
        &self,
        cases: &[CausalTestCase],
        dag: &CausalDag,
        data: &Dataset,
    ) -> Vec<Result<TestOutcome>> {
        let t0 = Instant::now();
        let out: Vec<Result<TestOutcome>> =
            cases.par_iter().map(|case| self.run(case, dag, data)).collect();
        log_batch(&out, t0);
        out
    }

    /// First estimand, in identification order, that some estimator supports.
    fn select<'e>(
        &self,
        estimands: &'e [Estimand],
    ) -> Result<(&'e Estimand, &Arc<dyn CausalEstimator>)> {
        estimands
            .iter()
            .find_map(|e| {
                self.estimators.iter().find(|est| est.supports(e.strategy())).map(|est| (e, est))
            })
            .ok_or_else(|| {
                let strategies: Vec<String> =
                    estimands.iter().map(|e| e.strategy().to_string()).collect();
                Error::unsupported(format!(
                    "no configured estimator supports any of [{}]",
                    strategies.join(", ")
                ))
            })
    }

    /// Apply the positivity policy; returns caveats to attach to the result.
    fn review(&self, case: &CausalTestCase, report: ValidationReport) -> Result<Vec<String>> {
        if !report.positivity.is_satisfied() {
            match self.config.positivity {
                PositivityPolicy::Abort => return Err(Error::PositivityViolation(report.positivity)),
                PositivityPolicy::Proceed => tracing::warn!(
                    case = case.name(),
                    report = %report.positivity,
                    "proceeding despite positivity violation"
                ),
            }
        }
        Ok(report.caveats())
    }
}

fn log_batch<T>(out: &[Result<T>], t0: Instant) {
    let n_failed = out.iter().filter(|r| r.is_err()).count();
    tracing::info!(
        n_cases = out.len(),
        n_failed,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "executed causal test batch"
    );
}

/// Resolve `case` into the contrast the engine would estimate, without data.
///
/// Useful for checking a case against a graph before collecting data.
pub fn plan(case: &CausalTestCase, dag: &CausalDag) -> Result<(Vec<Estimand>, Contrast)> {
    let estimands = EstimandIdentifier::new(dag).identify(case.treatments(), case.outcomes())?;
    Ok((estimands, case.contrast()?))
}

#[cfg(test)]
mod tests {
    use ct_core::{
        Domain, EstimatorConfig, FittedEffect, Intervention, Strategy, Variable,
    };

    use super::*;
    use crate::oracle::Oracle;

    fn chain() -> CausalDag {
        CausalDag::from_parts(
            vec![
                Variable::input("x", Domain::continuous()),
                Variable::output("y", Domain::continuous()),
            ],
            [("x", "y")],
        )
        .unwrap()
    }

    /// `y = 3x` exactly on x in 0..20.
    fn exact_data() -> Dataset {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 * x + if *x as i64 % 2 == 0 { 0.1 } else { -0.1 }).collect();
        Dataset::from_numeric([("x", x), ("y", y)]).unwrap()
    }

    fn case() -> CausalTestCase {
        CausalTestCase::new(Intervention::delta("x", 2.0), ["y"], Oracle::exact(6.0, 0.1))
            .with_baseline("x", 5.0)
    }

    struct Fixed;

    struct FixedFit;

    impl FittedEffect for FixedFit {
        fn n_obs(&self) -> usize {
            1
        }

        fn effect(&self, _contrast: &Contrast) -> Result<f64> {
            Ok(42.0)
        }

        fn interval(&self, _contrast: &Contrast, _level: f64) -> Result<Option<(f64, f64)>> {
            Ok(None)
        }
    }

    impl CausalEstimator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn supports(&self, strategy: Strategy) -> bool {
            strategy == Strategy::Backdoor
        }

        fn modelling_assumptions(&self) -> Vec<String> {
            vec!["always 42".into()]
        }

        fn fit(
            &self,
            _data: &Dataset,
            _estimand: &Estimand,
            _config: &EstimatorConfig,
        ) -> Result<Box<dyn FittedEffect>> {
            Ok(Box::new(FixedFit))
        }
    }

    #[test]
    fn execute_fills_every_field() {
        let r = CausalTestEngine::new().execute(&case(), &chain(), &exact_data()).unwrap();
        assert!((r.point_estimate - 6.0).abs() < 0.05);
        assert_eq!(r.estimator, "linear_regression");
        assert_eq!(r.estimand.strategy(), Strategy::Backdoor);
        assert_eq!(r.confidence_level, Some(0.05));
        let (lo, hi) = r.confidence_intervals.unwrap();
        assert!(lo <= r.point_estimate && r.point_estimate <= hi);
        assert_eq!(r.n_obs, 20);
        assert!(!r.assumptions.is_empty());
        assert!(r.caveats.is_empty());
    }

    #[test]
    fn no_interval_without_confidence_level() {
        let config = EngineConfig {
            estimator: EstimatorConfig { confidence_level: None, ..Default::default() },
            ..Default::default()
        };
        let r = CausalTestEngine::new()
            .with_config(config)
            .execute(&case(), &chain(), &exact_data())
            .unwrap();
        assert_eq!(r.confidence_intervals, None);
        assert_eq!(r.confidence_level, None);
    }

    #[test]
    fn preferred_estimator_is_used_through_the_trait() {
        let engine = CausalTestEngine::new().prefer(Arc::new(Fixed));
        assert_eq!(engine.estimator_names()[0], "fixed");
        let outcome = engine.run(&case(), &chain(), &exact_data()).unwrap();
        assert_eq!(outcome.result.point_estimate, 42.0);
        assert_eq!(outcome.result.assumptions, vec!["always 42"]);
        assert!(!outcome.verdict.is_pass());
    }

    #[test]
    fn no_supporting_estimator_is_unsupported() {
        let engine = CausalTestEngine::new().with_estimators(vec![]);
        let err = engine.execute(&case(), &chain(), &exact_data()).unwrap_err();
        assert!(matches!(err, Error::EstimationFailure(_)));
    }

    #[test]
    fn missing_column_fails_before_fitting() {
        let data = Dataset::from_numeric([("x", vec![1.0, 2.0, 3.0])]).unwrap();
        let err = CausalTestEngine::new().execute(&case(), &chain(), &data).unwrap_err();
        assert!(matches!(err, Error::MissingColumn(ref cols) if cols == &vec!["y".to_string()]));
    }

    #[test]
    fn plan_without_data() {
        let (estimands, contrast) = plan(&case(), &chain()).unwrap();
        assert_eq!(estimands[0].strategy(), Strategy::Backdoor);
        assert_eq!(contrast.get("x").unwrap().numeric_delta(), Some(2.0));
    }
}
