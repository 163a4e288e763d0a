//! Regression adjustment: OLS of the outcome on treatments and the adjustment
//! set, with optional squared and product terms.

use ct_core::{
    CausalEstimator, Contrast, Dataset, Estimand, EstimatorConfig, FittedEffect, Result, Strategy,
};
use serde::{Deserialize, Serialize};

use super::{model_rows, numeric_vector, project, require_strategy, single};
use crate::design::Design;
use crate::regression::{OlsFit, ols, t_interval};

/// Back-door linear regression estimator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRegressionEstimator {
    /// Variables entering with an extra squared term.
    pub squared_terms: Vec<String>,
    /// Pairs entering with an extra product term.
    pub product_terms: Vec<(String, String)>,
}

impl LinearRegressionEstimator {
    /// Main effects only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name^2`.
    pub fn with_squared_term(mut self, name: impl Into<String>) -> Self {
        self.squared_terms.push(name.into());
        self
    }

    /// Add `a * b`.
    pub fn with_product_term(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.product_terms.push((a.into(), b.into()));
        self
    }

    /// Fit and return the concrete model.
    pub fn fit_linear(&self, data: &Dataset, estimand: &Estimand) -> Result<LinearFit> {
        require_strategy(self.name(), estimand, Strategy::Backdoor)?;
        let outcome = single(estimand.outcomes(), "outcome")?;
        let rows = model_rows(data, estimand)?;
        let data = project(data, estimand, &rows)?;
        let rows: Vec<usize> = (0..data.n_rows()).collect();

        let mut variables: Vec<String> = estimand.treatments().to_vec();
        variables.extend(estimand.adjustment_set().iter().cloned());
        let design =
            Design::new(&data, &rows, &variables, &self.squared_terms, &self.product_terms, true)?;
        let x = design.matrix(&data, &rows)?;
        let y = numeric_vector(&data, &rows, outcome)?;
        let fit = ols(&x, &y)?;
        tracing::info!(
            n_obs = fit.n_obs,
            n_terms = design.n_terms(),
            sigma2 = fit.sigma2,
            "fitted linear regression"
        );
        Ok(LinearFit { design, fit, data, rows })
    }
}

impl CausalEstimator for LinearRegressionEstimator {
    fn name(&self) -> &str {
        "linear_regression"
    }

    fn supports(&self, strategy: Strategy) -> bool {
        strategy == Strategy::Backdoor
    }

    fn modelling_assumptions(&self) -> Vec<String> {
        let mut out = vec![
            "the outcome is a linear combination of the model terms plus noise".to_string(),
            "errors are independent with constant variance".to_string(),
        ];
        for v in &self.squared_terms {
            out.push(format!("includes a squared term on '{v}'"));
        }
        for (a, b) in &self.product_terms {
            out.push(format!("includes a product term '{a}:{b}'"));
        }
        out
    }

    fn fit(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        _config: &EstimatorConfig,
    ) -> Result<Box<dyn FittedEffect>> {
        Ok(Box::new(self.fit_linear(data, estimand)?))
    }
}

/// Fitted regression-adjustment model.
#[derive(Debug, Clone)]
pub struct LinearFit {
    design: Design,
    fit: OlsFit,
    data: Dataset,
    rows: Vec<usize>,
}

impl LinearFit {
    /// Column names of the design.
    pub fn term_names(&self) -> Vec<String> {
        self.design.term_names()
    }

    /// Underlying OLS fit.
    pub fn ols(&self) -> &OlsFit {
        &self.fit
    }
}

impl FittedEffect for LinearFit {
    fn n_obs(&self) -> usize {
        self.fit.n_obs
    }

    fn effect(&self, contrast: &Contrast) -> Result<f64> {
        let c = self.design.contrast_vector(&self.data, &self.rows, contrast)?;
        Ok(self.fit.linear_combination(&c))
    }

    fn interval(&self, contrast: &Contrast, confidence_level: f64) -> Result<Option<(f64, f64)>> {
        let c = self.design.contrast_vector(&self.data, &self.rows, contrast)?;
        let estimate = self.fit.linear_combination(&c);
        let se = self.fit.linear_combination_se(&c);
        t_interval(estimate, se, self.fit.dof, confidence_level).map(Some)
    }
}
