//! # ct-inference
//!
//! Estimation for causal test execution.
//!
//! This crate provides:
//! - Data validation: required columns, declared domains, positivity
//! - Regression adjustment (OLS) for back-door estimands
//! - Linear front-door estimation with bootstrap intervals
//! - Two-stage least squares for instrumental-variable estimands
//! - A causal forest for heterogeneous back-door effects
//!
//! Estimators implement `ct_core::CausalEstimator` and are looked up by the
//! strategy of the estimand they are handed.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Percentile intervals and parallel seeded resampling.
pub mod bootstrap_ci;
/// Design matrices with dummy coding and higher-order terms.
pub mod design;
/// Estimator families.
pub mod estimators;
/// Two-stage least squares.
pub mod iv;
/// Ordinary least squares and t intervals.
pub mod regression;
/// Pre-estimation data checks.
pub mod validation;

pub use estimators::{
    CateEstimate, CausalForestEstimator, CausalForestFit, FrontDoorEstimator, FrontDoorFit,
    InstrumentalFit, InstrumentalVariableEstimator, LinearFit, LinearRegressionEstimator,
    default_estimators,
};
pub use validation::{DataValidator, ValidationConfig};
