//! Common data types for causal test execution

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single observed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flag (numeric view 0/1).
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Real value.
    Float(f64),
    /// Categorical label.
    Text(String),
}

impl Value {
    /// Numeric view. `Text` has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            Self::Text(_) => None,
        }
    }

    /// `true` if the value has a numeric view.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text(_))
    }

    /// Equality that treats `Int(1)`, `Float(1.0)` and `Bool(true)` as the same level.
    pub fn same_level(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self == other,
            _ => false,
        }
    }

    /// Label used for categorical encoding and report rendering.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{}", *x as i64)
                } else {
                    write!(f, "{x}")
                }
            }
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Role a variable plays for the system under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Input of the system (candidate treatment).
    Input,
    /// Output of the system (candidate outcome).
    Output,
    /// Observed covariate.
    Covariate,
    /// Latent common cause; never available for adjustment.
    Unobserved,
}

impl Role {
    /// Whether values of this variable can appear in a dataset.
    pub fn is_observed(self) -> bool {
        self != Self::Unobserved
    }
}

/// Declared value domain of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    /// Real-valued, optionally bounded (inclusive).
    Continuous {
        /// Valid `(min, max)` range.
        #[serde(default)]
        range: Option<(f64, f64)>,
    },
    /// Unordered labels, optionally restricted to a declared level set.
    Categorical {
        /// Allowed levels.
        #[serde(default)]
        levels: Option<Vec<String>>,
    },
    /// Two-valued (0/1 or false/true).
    Binary,
}

impl Domain {
    /// Unbounded continuous domain.
    pub fn continuous() -> Self {
        Self::Continuous { range: None }
    }

    /// Continuous domain bounded to `[min, max]`.
    pub fn bounded(min: f64, max: f64) -> Self {
        Self::Continuous { range: Some((min, max)) }
    }

    /// Categorical domain with the given levels.
    pub fn categorical<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Categorical { levels: Some(levels.into_iter().map(Into::into).collect()) }
    }

    /// Whether strata and treatment arms are matched by exact level.
    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::Continuous { .. })
    }

    /// Check a value against the domain.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Self::Continuous { range } => match value.as_f64() {
                Some(x) if x.is_finite() => range.is_none_or(|(lo, hi)| x >= lo && x <= hi),
                _ => false,
            },
            Self::Categorical { levels } => match levels {
                Some(levels) => {
                    let label = value.label();
                    levels.iter().any(|l| *l == label)
                }
                None => true,
            },
            Self::Binary => matches!(value.as_f64(), Some(x) if x == 0.0 || x == 1.0),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        match self {
            Self::Continuous { range: Some((lo, hi)) } => {
                if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                    return Err(Error::InvalidInput(format!(
                        "variable '{name}' has invalid range [{lo}, {hi}]"
                    )));
                }
            }
            Self::Categorical { levels: Some(levels) } if levels.is_empty() => {
                return Err(Error::InvalidInput(format!(
                    "variable '{name}' declares an empty level set"
                )));
            }
            _ => {}
        }
        Ok(())
    }
}

/// A named random variable of the causal model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    role: Role,
    domain: Domain,
}

impl Variable {
    /// Create a variable. Checked by [`Variable::validate`] when registered in a graph.
    pub fn new(name: impl Into<String>, role: Role, domain: Domain) -> Self {
        Self { name: name.into(), role, domain }
    }

    /// Input (treatment candidate).
    pub fn input(name: impl Into<String>, domain: Domain) -> Self {
        Self::new(name, Role::Input, domain)
    }

    /// Output (outcome candidate).
    pub fn output(name: impl Into<String>, domain: Domain) -> Self {
        Self::new(name, Role::Output, domain)
    }

    /// Observed covariate.
    pub fn covariate(name: impl Into<String>, domain: Domain) -> Self {
        Self::new(name, Role::Covariate, domain)
    }

    /// Unobserved confounder.
    pub fn unobserved(name: impl Into<String>) -> Self {
        Self::new(name, Role::Unobserved, Domain::continuous())
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Declared domain.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Reject empty names and malformed domains.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("variable name must be non-empty".to_string()));
        }
        self.domain.validate(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Estimands
// ---------------------------------------------------------------------------

/// Identification strategy, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Adjustment for a set blocking all back-door paths.
    Backdoor,
    /// Mediators intercepting every directed path.
    FrontDoor,
    /// Instruments affecting the outcome only through the treatment.
    Instrumental,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Backdoor => "backdoor",
            Self::FrontDoor => "front-door",
            Self::Instrumental => "instrumental",
        })
    }
}

/// A graph-justified recipe for estimating a causal effect.
///
/// `adjustment_set` holds the confounders for back-door estimands, the
/// mediators for front-door estimands and the instruments for instrumental
/// estimands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimand {
    strategy: Strategy,
    treatments: Vec<String>,
    outcomes: Vec<String>,
    adjustment_set: BTreeSet<String>,
}

impl Estimand {
    /// Create an estimand.
    pub fn new(
        strategy: Strategy,
        treatments: Vec<String>,
        outcomes: Vec<String>,
        adjustment_set: BTreeSet<String>,
    ) -> Self {
        Self { strategy, treatments, outcomes, adjustment_set }
    }

    /// Identification strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Treatment variable names.
    pub fn treatments(&self) -> &[String] {
        &self.treatments
    }

    /// Outcome variable names.
    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    /// Adjustment, mediator or instrument set depending on the strategy.
    pub fn adjustment_set(&self) -> &BTreeSet<String> {
        &self.adjustment_set
    }

    /// Every variable that must be observed to estimate this estimand.
    pub fn referenced_variables(&self) -> BTreeSet<String> {
        self.treatments
            .iter()
            .chain(&self.outcomes)
            .chain(&self.adjustment_set)
            .cloned()
            .collect()
    }
}

impl fmt::Display for Estimand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = self.adjustment_set.iter().cloned().collect::<Vec<_>>().join(", ");
        let label = match self.strategy {
            Strategy::Backdoor => "adjust",
            Strategy::FrontDoor => "via",
            Strategy::Instrumental => "instruments",
        };
        write!(
            f,
            "{}: {} -> {} ({label} {{{set}}})",
            self.strategy,
            self.treatments.join(", "),
            self.outcomes.join(", ")
        )
    }
}

// ---------------------------------------------------------------------------
// Interventions
// ---------------------------------------------------------------------------

/// How an intervention moves a treatment away from its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionValue {
    /// Set the treatment to this value.
    Set(Value),
    /// Shift the (numeric) baseline by this amount.
    Delta(f64),
}

/// Mapping from treatment variables to their intervened value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    changes: BTreeMap<String, InterventionValue>,
}

impl Intervention {
    /// Intervention setting one treatment to `value`.
    pub fn set(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and_set(name, value)
    }

    /// Intervention shifting one treatment by `delta`.
    pub fn delta(name: impl Into<String>, delta: f64) -> Self {
        Self::default().and_delta(name, delta)
    }

    /// Add a set-to-value change.
    pub fn and_set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.changes.insert(name.into(), InterventionValue::Set(value.into()));
        self
    }

    /// Add a shift change.
    pub fn and_delta(mut self, name: impl Into<String>, delta: f64) -> Self {
        self.changes.insert(name.into(), InterventionValue::Delta(delta));
        self
    }

    /// Intervened variables, sorted.
    pub fn treatments(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }

    /// Iterate over `(variable, change)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InterventionValue)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `true` if no variable is targeted.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Resolve against baseline assignments into control/treated levels.
    pub fn resolve(&self, baseline: &BTreeMap<String, Value>) -> Result<Contrast> {
        if self.changes.is_empty() {
            return Err(Error::InvalidInput("intervention targets no variable".to_string()));
        }
        let mut items = Vec::with_capacity(self.changes.len());
        for (name, change) in &self.changes {
            let control = baseline.get(name).cloned().ok_or_else(|| {
                Error::InvalidInput(format!("no baseline value for treatment '{name}'"))
            })?;
            let treated = match change {
                InterventionValue::Set(v) => v.clone(),
                InterventionValue::Delta(d) => {
                    if !d.is_finite() {
                        return Err(Error::InvalidInput(format!(
                            "delta for '{name}' must be finite, got {d}"
                        )));
                    }
                    shift(&control, *d).ok_or_else(|| {
                        Error::InvalidInput(format!(
                            "cannot shift non-numeric baseline '{control}' of '{name}'"
                        ))
                    })?
                }
            };
            items.push(TreatmentContrast { name: name.clone(), control, treated });
        }
        Ok(Contrast { items })
    }
}

fn shift(base: &Value, delta: f64) -> Option<Value> {
    match base {
        Value::Int(i) if delta.fract() == 0.0 => {
            // `as` saturates, so only trust the step if it round-trips.
            let step = delta as i64;
            match i.checked_add(step) {
                Some(sum) if step as f64 == delta => Some(Value::Int(sum)),
                _ => Some(Value::Float(*i as f64 + delta)),
            }
        }
        Value::Text(_) => None,
        other => other.as_f64().map(|x| Value::Float(x + delta)),
    }
}

/// Control and treated level of one treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentContrast {
    /// Treatment variable.
    pub name: String,
    /// Baseline level.
    pub control: Value,
    /// Intervened level.
    pub treated: Value,
}

impl TreatmentContrast {
    /// `treated - control` when both levels are numeric.
    pub fn numeric_delta(&self) -> Option<f64> {
        Some(self.treated.as_f64()? - self.control.as_f64()?)
    }
}

/// Resolved intervention: control vs. treated level per treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contrast {
    items: Vec<TreatmentContrast>,
}

impl Contrast {
    /// Build directly from per-treatment contrasts.
    pub fn new(items: Vec<TreatmentContrast>) -> Self {
        Self { items }
    }

    /// Single-treatment numeric contrast.
    pub fn numeric(name: impl Into<String>, control: f64, treated: f64) -> Self {
        Self::new(vec![TreatmentContrast {
            name: name.into(),
            control: Value::Float(control),
            treated: Value::Float(treated),
        }])
    }

    /// Per-treatment contrasts.
    pub fn items(&self) -> &[TreatmentContrast] {
        &self.items
    }

    /// Look up the contrast for a treatment.
    pub fn get(&self, name: &str) -> Option<&TreatmentContrast> {
        self.items.iter().find(|c| c.name == name)
    }
}
