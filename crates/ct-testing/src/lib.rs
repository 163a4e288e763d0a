//! # ct-testing
//!
//! Causal testing on top of the graph and inference crates.
//!
//! A [`CausalTestCase`] states a causal claim ("setting X from a to b changes
//! Y by about k"). [`CausalTestEngine::execute`] identifies an estimand from
//! the causal graph, validates the dataset against it, fits the first
//! estimator that supports the estimand's strategy and returns a
//! [`CausalTestResult`], which an [`Oracle`] turns into a [`Verdict`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test cases.
pub mod case;
/// Engine configuration.
pub mod config;
/// Pipeline orchestration and batch execution.
pub mod engine;
/// Oracles and verdicts.
pub mod oracle;
/// Test results.
pub mod result;

pub use case::CausalTestCase;
pub use config::{EngineConfig, PositivityPolicy};
pub use engine::{CausalTestEngine, TestOutcome, plan};
pub use oracle::{Oracle, Predicate, Verdict};
pub use result::CausalTestResult;
