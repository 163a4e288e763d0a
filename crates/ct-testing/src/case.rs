//! Causal test cases: baseline inputs, an intervention, outcomes and the
//! expected effect.

use std::collections::BTreeMap;

use ct_core::{Contrast, Error, Intervention, Result, Value};

use crate::oracle::Oracle;

/// One causal claim to check against data.
#[derive(Debug, Clone)]
pub struct CausalTestCase {
    name: String,
    baseline: BTreeMap<String, Value>,
    intervention: Intervention,
    outcomes: Vec<String>,
    oracle: Oracle,
}

impl CausalTestCase {
    /// Case checking `intervention` on `outcomes` with `oracle`. Treatments
    /// need a baseline value, see [`CausalTestCase::with_baseline`].
    pub fn new<I, S>(intervention: Intervention, outcomes: I, oracle: Oracle) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let outcomes: Vec<String> = outcomes.into_iter().map(Into::into).collect();
        let name = format!("{} -> {}", intervention.treatments().join(","), outcomes.join(","));
        Self { name, baseline: BTreeMap::new(), intervention, outcomes, oracle }
    }

    /// Label used in logs and batch reports.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the baseline value of one input.
    pub fn with_baseline(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.baseline.insert(name.into(), value.into());
        self
    }

    /// Label of the case.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Baseline input configuration.
    pub fn baseline(&self) -> &BTreeMap<String, Value> {
        &self.baseline
    }

    /// Intervention under test.
    pub fn intervention(&self) -> &Intervention {
        &self.intervention
    }

    /// Intervened variables, sorted.
    pub fn treatments(&self) -> Vec<String> {
        self.intervention.treatments()
    }

    /// Outcome variables.
    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    /// Expected effect.
    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    /// Control vs. treated levels of every treatment.
    pub fn contrast(&self) -> Result<Contrast> {
        if self.outcomes.is_empty() {
            return Err(Error::InvalidInput(format!("test case '{}' names no outcome", self.name)));
        }
        self.intervention.resolve(&self.baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_resolves_against_baseline() {
        let case = CausalTestCase::new(Intervention::delta("x", 1.0), ["y"], Oracle::Positive)
            .with_baseline("x", 2.0);
        assert_eq!(case.name(), "x -> y");
        let c = case.contrast().unwrap();
        assert_eq!(c.get("x").unwrap().numeric_delta(), Some(1.0));
    }

    #[test]
    fn missing_baseline_or_outcome_is_invalid() {
        let no_base = CausalTestCase::new(Intervention::delta("x", 1.0), ["y"], Oracle::Positive);
        assert!(matches!(no_base.contrast(), Err(Error::InvalidInput(_))));
        let no_outcome =
            CausalTestCase::new(Intervention::set("x", 1.0), Vec::<String>::new(), Oracle::Positive)
                .with_baseline("x", 0.0);
        assert!(matches!(no_outcome.contrast(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn set_keeps_categorical_levels() {
        let case = CausalTestCase::new(Intervention::set("mode", "fast"), ["latency"], Oracle::Negative)
            .with_name("fast mode lowers latency")
            .with_baseline("mode", "slow");
        let c = case.contrast().unwrap();
        let item = c.get("mode").unwrap();
        assert_eq!(item.control, Value::from("slow"));
        assert_eq!(item.treated, Value::from("fast"));
        assert_eq!(item.numeric_delta(), None);
    }
}
