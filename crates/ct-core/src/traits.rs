//! Core traits for causal estimation
//!
//! The execution pipeline only talks to these traits: new estimator families
//! plug in by implementing [`CausalEstimator`], never by adding a branch to
//! the pipeline.

use crate::{Contrast, Dataset, Estimand, EstimatorConfig, Result, Strategy};

/// An estimator family (regression adjustment, 2SLS, causal forest, ...).
pub trait CausalEstimator: Send + Sync {
    /// Stable identifier, e.g. `"linear_regression"`.
    fn name(&self) -> &str;

    /// Whether this estimator can estimate estimands identified by `strategy`.
    fn supports(&self, strategy: Strategy) -> bool;

    /// Assumptions that must hold for the estimate to be valid.
    fn modelling_assumptions(&self) -> Vec<String>;

    /// Fit on the complete rows of `data` for the given estimand.
    fn fit(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        config: &EstimatorConfig,
    ) -> Result<Box<dyn FittedEffect>>;
}

/// A fitted model able to answer effect queries.
pub trait FittedEffect: Send + Sync {
    /// Observations used by the fit.
    fn n_obs(&self) -> usize;

    /// Average effect of moving treatments from control to treated levels.
    fn effect(&self, contrast: &Contrast) -> Result<f64>;

    /// Interval for [`FittedEffect::effect`] at miss probability `confidence_level`.
    ///
    /// `None` when the model has no closed form and resampling is disabled.
    fn interval(&self, contrast: &Contrast, confidence_level: f64) -> Result<Option<(f64, f64)>>;
}
