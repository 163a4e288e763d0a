//! # ct-graph
//!
//! Causal graph model for causal test execution: a typed DAG with lazy
//! ancestor/descendant traversal, d-separation, DOT interchange and an
//! estimand identifier covering back-door, front-door and instrumental
//! variable strategies.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Causal DAG.
pub mod dag;
/// Graphviz DOT import/export.
pub mod dot;
/// d-separation.
pub mod dsep;
/// Estimand identification.
pub mod identify;

pub use dag::{CausalDag, Reachable};
pub use dot::{DotGraph, parse_dot};
pub use identify::{EstimandIdentifier, IdentifierConfig};
