//! # ct-core
//!
//! Shared building blocks for causal test execution: variables, values,
//! datasets, estimands, interventions, validation reports, the error type and
//! the estimator traits every estimator family implements.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Estimator configuration.
pub mod config;
/// Tabular datasets.
pub mod dataset;
/// Error taxonomy.
pub mod error;
/// Validation reports.
pub mod report;
/// Estimator traits.
pub mod traits;
/// Variables, values, estimands and interventions.
pub mod types;

pub use config::{EstimatorConfig, ForestConfig, validate_confidence_level};
pub use dataset::Dataset;
pub use error::{Error, EstimationFailureCause, NoEstimandReason, Result};
pub use report::{
    Arm, DomainViolation, MissingLevel, PositivityReport, StratumViolation, ValidationReport,
};
pub use traits::{CausalEstimator, FittedEffect};
pub use types::{
    Contrast, Domain, Estimand, Intervention, InterventionValue, Role, Strategy,
    TreatmentContrast, Value, Variable,
};
