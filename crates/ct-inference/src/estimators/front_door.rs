//! Linear front-door estimator: product of the treatment -> mediator and
//! mediator -> outcome (given treatment) coefficients.

use ct_core::{
    CausalEstimator, Contrast, Dataset, Error, Estimand, EstimatorConfig, FittedEffect, Result,
    Strategy,
};
use nalgebra::{DMatrix, DVector};

use super::{model_rows, numeric_vector, require_strategy, scaled_percentile_interval, single, unit_delta};
use crate::bootstrap_ci::{bootstrap_indices, run_resamples};
use crate::regression::ols;

/// Front-door estimator for linear structural models.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontDoorEstimator;

impl FrontDoorEstimator {
    /// New estimator.
    pub fn new() -> Self {
        Self
    }

    /// Fit and return the concrete model.
    pub fn fit_front_door(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        config: &EstimatorConfig,
    ) -> Result<FrontDoorFit> {
        require_strategy(self.name(), estimand, Strategy::FrontDoor)?;
        let treatment = single(estimand.treatments(), "treatment")?;
        let outcome = single(estimand.outcomes(), "outcome")?;
        if estimand.adjustment_set().is_empty() {
            return Err(Error::InvalidInput("front-door estimand without mediators".into()));
        }
        let rows = model_rows(data, estimand)?;
        let x = numeric_vector(data, &rows, treatment)?;
        let y = numeric_vector(data, &rows, outcome)?;
        let mediators = estimand
            .adjustment_set()
            .iter()
            .map(|m| numeric_vector(data, &rows, m))
            .collect::<Result<Vec<_>>>()?;

        let per_unit = front_door_slope(&x, &mediators, &y)?;
        let n = rows.len();

        let samples = match config.confidence_level {
            Some(_) if config.bootstrap_iterations > 0 => {
                let resampled = run_resamples(
                    config.bootstrap_iterations,
                    config.seed,
                    config.max_duration(),
                    |rng| {
                        let idx = bootstrap_indices(rng, n);
                        let pick = |v: &DVector<f64>| DVector::from_iterator(n, idx.iter().map(|&i| v[i]));
                        let ms: Vec<DVector<f64>> = mediators.iter().map(&pick).collect();
                        front_door_slope(&pick(&x), &ms, &pick(&y))
                    },
                )?;
                Some(resampled.values)
            }
            Some(_) => {
                tracing::warn!("bootstrap_iterations is 0; front-door interval disabled");
                None
            }
            None => None,
        };

        tracing::info!(n_obs = n, per_unit, n_mediators = mediators.len(), "fitted front-door model");
        Ok(FrontDoorFit { treatment: treatment.to_string(), per_unit, samples, n_obs: n })
    }
}

/// `sum_j a_j * b_j` with `M_j = c + a_j X` and `Y = c + sum_j b_j M_j + g X`.
fn front_door_slope(x: &DVector<f64>, mediators: &[DVector<f64>], y: &DVector<f64>) -> Result<f64> {
    let n = x.len();
    let k = mediators.len();
    let first = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let a = mediators
        .iter()
        .map(|m| ols(&first, m).map(|f| f.coefficients[1]))
        .collect::<Result<Vec<f64>>>()?;

    let second = DMatrix::from_fn(n, k + 2, |i, j| match j {
        0 => 1.0,
        j if j <= k => mediators[j - 1][i],
        _ => x[i],
    });
    let fit = ols(&second, y)?;
    Ok(a.iter().enumerate().map(|(j, a)| a * fit.coefficients[1 + j]).sum())
}

impl CausalEstimator for FrontDoorEstimator {
    fn name(&self) -> &str {
        "front_door"
    }

    fn supports(&self, strategy: Strategy) -> bool {
        strategy == Strategy::FrontDoor
    }

    fn modelling_assumptions(&self) -> Vec<String> {
        vec![
            "mediators depend linearly on the treatment".to_string(),
            "the outcome depends linearly on the mediators and the treatment".to_string(),
            "no treatment-mediator interaction".to_string(),
        ]
    }

    fn fit(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        config: &EstimatorConfig,
    ) -> Result<Box<dyn FittedEffect>> {
        Ok(Box::new(self.fit_front_door(data, estimand, config)?))
    }
}

/// Fitted front-door model.
#[derive(Debug, Clone)]
pub struct FrontDoorFit {
    treatment: String,
    per_unit: f64,
    samples: Option<Vec<f64>>,
    n_obs: usize,
}

impl FrontDoorFit {
    /// Effect of a unit increase in the treatment.
    pub fn per_unit_effect(&self) -> f64 {
        self.per_unit
    }

    /// Bootstrap replicates of the per-unit effect, if resampling ran.
    pub fn bootstrap_samples(&self) -> Option<&[f64]> {
        self.samples.as_deref()
    }
}

impl FittedEffect for FrontDoorFit {
    fn n_obs(&self) -> usize {
        self.n_obs
    }

    fn effect(&self, contrast: &Contrast) -> Result<f64> {
        Ok(self.per_unit * unit_delta(contrast, &self.treatment)?)
    }

    fn interval(&self, contrast: &Contrast, confidence_level: f64) -> Result<Option<(f64, f64)>> {
        let delta = unit_delta(contrast, &self.treatment)?;
        match &self.samples {
            Some(s) => scaled_percentile_interval(s, delta, confidence_level).map(Some),
            None => Ok(None),
        }
    }
}
