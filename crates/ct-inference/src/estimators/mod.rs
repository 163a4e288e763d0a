//! Estimator families.
//!
//! Each estimator implements [`ct_core::CausalEstimator`]; the fitted models
//! own the projected rows they were fitted on, so they outlive the dataset.

mod forest;
mod front_door;
mod instrumental;
mod linear;

use std::sync::Arc;

use ct_core::{CausalEstimator, Contrast, Dataset, Error, Estimand, Result, Strategy};
use nalgebra::DVector;

pub use forest::{CateEstimate, CausalForestEstimator, CausalForestFit};
pub use front_door::{FrontDoorEstimator, FrontDoorFit};
pub use instrumental::{InstrumentalFit, InstrumentalVariableEstimator};
pub use linear::{LinearFit, LinearRegressionEstimator};

/// Linear regression, front-door and instrumental-variable estimators, in
/// that order.
pub fn default_estimators() -> Vec<Arc<dyn CausalEstimator>> {
    vec![
        Arc::new(LinearRegressionEstimator::new()),
        Arc::new(FrontDoorEstimator::new()),
        Arc::new(InstrumentalVariableEstimator::new()),
    ]
}

pub(crate) fn require_strategy(name: &str, estimand: &Estimand, expected: Strategy) -> Result<()> {
    if estimand.strategy() == expected {
        Ok(())
    } else {
        Err(Error::unsupported(format!(
            "{name} cannot estimate a {} estimand",
            estimand.strategy()
        )))
    }
}

pub(crate) fn single<'a>(names: &'a [String], what: &str) -> Result<&'a str> {
    match names {
        [one] => Ok(one.as_str()),
        _ => Err(Error::unsupported(format!("expected exactly one {what}, got {}", names.len()))),
    }
}

/// Complete rows of every referenced column, or `MissingColumn`/`InsufficientData`.
pub(crate) fn model_rows(data: &Dataset, estimand: &Estimand) -> Result<Vec<usize>> {
    let referenced = estimand.referenced_variables();
    let missing: Vec<String> = referenced.iter().filter(|n| !data.has_column(n)).cloned().collect();
    if !missing.is_empty() {
        return Err(Error::MissingColumn(missing));
    }
    let rows = data.complete_rows(referenced.iter().map(String::as_str));
    if rows.is_empty() {
        return Err(Error::insufficient_data("no complete rows"));
    }
    Ok(rows)
}

/// Referenced columns restricted to `rows`.
pub(crate) fn project(data: &Dataset, estimand: &Estimand, rows: &[usize]) -> Result<Dataset> {
    let columns = estimand.referenced_variables().into_iter().map(|name| {
        let col = rows.iter().map(|&r| data.value(r, &name).cloned()).collect();
        (name, col)
    });
    Dataset::from_optional_columns(columns)
}

pub(crate) fn numeric_vector(data: &Dataset, rows: &[usize], name: &str) -> Result<DVector<f64>> {
    let values = rows
        .iter()
        .map(|&r| {
            data.value(r, name).and_then(|v| v.as_f64()).ok_or_else(|| {
                Error::unsupported(format!("'{name}' must be numeric for this estimator"))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(DVector::from_vec(values))
}

/// `treated - control` of `treatment`; every other contrast item must be absent.
pub(crate) fn unit_delta(contrast: &Contrast, treatment: &str) -> Result<f64> {
    if let Some(other) = contrast.items().iter().find(|c| c.name != treatment) {
        return Err(Error::InvalidInput(format!(
            "contrast names '{}', which is not the treatment '{treatment}'",
            other.name
        )));
    }
    let item = contrast
        .get(treatment)
        .ok_or_else(|| Error::InvalidInput(format!("contrast does not set '{treatment}'")))?;
    item.numeric_delta().ok_or_else(|| {
        Error::unsupported(format!("non-numeric contrast on '{treatment}' for a linear-effect model"))
    })
}

/// Percentile interval of `per_unit_samples * delta`.
pub(crate) fn scaled_percentile_interval(
    per_unit_samples: &[f64],
    delta: f64,
    confidence_level: f64,
) -> Result<(f64, f64)> {
    let scaled: Vec<f64> = per_unit_samples.iter().map(|s| s * delta).collect();
    crate::bootstrap_ci::percentile_interval(&scaled, confidence_level)
}
