//! Design matrices with dummy coding, squared and product terms, and
//! counterfactual rows for effect contrasts.

use std::collections::BTreeMap;

use ct_core::{Contrast, Dataset, Error, Result, Value};
use nalgebra::{DMatrix, DVector};

/// How a variable enters the design.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    /// Used as-is.
    Numeric,
    /// One indicator per non-reference level; `levels[0]` is the reference.
    Categorical {
        /// Sorted level labels.
        levels: Vec<String>,
    },
}

/// One column of the design.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Constant 1.
    Intercept,
    /// Numeric variable.
    Linear(String),
    /// Indicator `variable == level`.
    Level {
        /// Variable name.
        variable: String,
        /// Level label.
        level: String,
    },
    /// `variable^2`.
    Square(String),
    /// `a * b`.
    Product(String, String),
}

impl Term {
    /// Column name (`"x"`, `"z[b]"`, `"x^2"`, `"x:z"`).
    pub fn name(&self) -> String {
        match self {
            Self::Intercept => "intercept".to_string(),
            Self::Linear(v) => v.clone(),
            Self::Level { variable, level } => format!("{variable}[{level}]"),
            Self::Square(v) => format!("{v}^2"),
            Self::Product(a, b) => format!("{a}:{b}"),
        }
    }
}

/// Column layout inferred from a dataset.
#[derive(Debug, Clone)]
pub struct Design {
    encodings: BTreeMap<String, Encoding>,
    terms: Vec<Term>,
}

impl Design {
    /// Infer encodings of `variables` from `rows` of `data` and lay out the terms:
    /// intercept (optional), main effects in the given order, then squares and
    /// products.
    pub fn new(
        data: &Dataset,
        rows: &[usize],
        variables: &[String],
        squared: &[String],
        products: &[(String, String)],
        intercept: bool,
    ) -> Result<Self> {
        let mut encodings = BTreeMap::new();
        let mut terms = Vec::new();
        if intercept {
            terms.push(Term::Intercept);
        }
        for name in variables {
            let encoding = infer_encoding(data, rows, name)?;
            match &encoding {
                Encoding::Numeric => terms.push(Term::Linear(name.clone())),
                Encoding::Categorical { levels } => terms.extend(
                    levels[1..]
                        .iter()
                        .map(|l| Term::Level { variable: name.clone(), level: l.clone() }),
                ),
            }
            encodings.insert(name.clone(), encoding);
        }

        let numeric = |v: &String| -> Result<()> {
            match encodings.get(v) {
                Some(Encoding::Numeric) => Ok(()),
                Some(Encoding::Categorical { .. }) => Err(Error::unsupported(format!(
                    "higher-order term on categorical variable '{v}'"
                ))),
                None => Err(Error::InvalidInput(format!(
                    "higher-order term references '{v}', which is not in the model"
                ))),
            }
        };
        for v in squared {
            numeric(v)?;
            terms.push(Term::Square(v.clone()));
        }
        for (a, b) in products {
            numeric(a)?;
            numeric(b)?;
            terms.push(Term::Product(a.clone(), b.clone()));
        }
        Ok(Self { encodings, terms })
    }

    /// Number of columns.
    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    /// Column layout.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Column names.
    pub fn term_names(&self) -> Vec<String> {
        self.terms.iter().map(Term::name).collect()
    }

    /// Encoding of a model variable.
    pub fn encoding(&self, name: &str) -> Option<&Encoding> {
        self.encodings.get(name)
    }

    /// Evaluate one design row, reading variable values through `lookup`.
    pub fn row<'v, F>(&self, lookup: F) -> Result<Vec<f64>>
    where
        F: Fn(&str) -> Option<&'v Value>,
    {
        let num = |name: &str| -> Result<f64> {
            let v = lookup(name)
                .ok_or_else(|| Error::InvalidInput(format!("no value for '{name}'")))?;
            v.as_f64().ok_or_else(|| {
                Error::unsupported(format!("non-numeric value '{v}' for numeric variable '{name}'"))
            })
        };
        self.terms
            .iter()
            .map(|t| match t {
                Term::Intercept => Ok(1.0),
                Term::Linear(v) => num(v),
                Term::Square(v) => num(v).map(|x| x * x),
                Term::Product(a, b) => Ok(num(a)? * num(b)?),
                Term::Level { variable, level } => {
                    let v = lookup(variable)
                        .ok_or_else(|| Error::InvalidInput(format!("no value for '{variable}'")))?;
                    let label = v.label();
                    if let Some(Encoding::Categorical { levels }) = self.encodings.get(variable) {
                        if !levels.contains(&label) {
                            return Err(Error::unsupported(format!(
                                "level '{label}' of '{variable}' was not observed in the data"
                            )));
                        }
                    }
                    Ok(if label == *level { 1.0 } else { 0.0 })
                }
            })
            .collect()
    }

    /// `rows.len() x n_terms` matrix.
    pub fn matrix(&self, data: &Dataset, rows: &[usize]) -> Result<DMatrix<f64>> {
        let p = self.terms.len();
        let mut buf = Vec::with_capacity(rows.len() * p);
        for &r in rows {
            buf.extend(self.row(|name| data.value(r, name))?);
        }
        Ok(DMatrix::from_row_slice(rows.len(), p, &buf))
    }

    /// Average over `rows` of `row(treated) - row(control)`.
    ///
    /// Treatments named in `contrast` are set to their arm level; every other
    /// variable keeps its observed value.
    pub fn contrast_vector(
        &self,
        data: &Dataset,
        rows: &[usize],
        contrast: &Contrast,
    ) -> Result<DVector<f64>> {
        if rows.is_empty() {
            return Err(Error::insufficient_data("no rows to average the contrast over"));
        }
        for c in contrast.items() {
            if !self.encodings.contains_key(&c.name) {
                return Err(Error::InvalidInput(format!(
                    "contrast names '{}', which is not in the model",
                    c.name
                )));
            }
        }
        let mut acc = DVector::zeros(self.terms.len());
        for &r in rows {
            let treated = self.row(|name| match contrast.get(name) {
                Some(c) => Some(&c.treated),
                None => data.value(r, name),
            })?;
            let control = self.row(|name| match contrast.get(name) {
                Some(c) => Some(&c.control),
                None => data.value(r, name),
            })?;
            for (j, (t, c)) in treated.iter().zip(&control).enumerate() {
                acc[j] += t - c;
            }
        }
        Ok(acc / rows.len() as f64)
    }
}

fn infer_encoding(data: &Dataset, rows: &[usize], name: &str) -> Result<Encoding> {
    if !data.has_column(name) {
        return Err(Error::MissingColumn(vec![name.to_string()]));
    }
    let values: Vec<&Value> = rows.iter().filter_map(|&r| data.value(r, name)).collect();
    if values.iter().all(|v| v.is_numeric()) {
        return Ok(Encoding::Numeric);
    }
    let mut levels: Vec<String> = values.iter().map(|v| v.label()).collect();
    levels.sort();
    levels.dedup();
    if levels.len() < 2 {
        return Err(Error::insufficient_data(format!(
            "categorical variable '{name}' has a single observed level"
        )));
    }
    Ok(Encoding::Categorical { levels })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ct_core::TreatmentContrast;

    use super::*;

    fn data() -> Dataset {
        Dataset::from_columns([
            ("x", vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]),
            ("g", vec![Value::from("b"), Value::from("a"), Value::from("c")]),
        ])
        .unwrap()
    }

    #[test]
    fn dummy_coding_uses_first_level_as_reference() {
        let d = data();
        let design = Design::new(&d, &[0, 1, 2], &["x".into(), "g".into()], &[], &[], true).unwrap();
        assert_eq!(design.term_names(), vec!["intercept", "x", "g[b]", "g[c]"]);
        let m = design.matrix(&d, &[0, 1, 2]).unwrap();
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 1.0, 1.0, 0.0]);
        assert_eq!(m.row(1).iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn higher_order_terms_need_numeric_variables() {
        let d = data();
        let vars = ["x".to_string(), "g".to_string()];
        let sq = Design::new(&d, &[0, 1, 2], &vars, &["x".into()], &[], true).unwrap();
        assert_eq!(sq.term_names().last().map(String::as_str), Some("x^2"));
        assert!(Design::new(&d, &[0, 1, 2], &vars, &["g".into()], &[], true).is_err());
        assert!(Design::new(&d, &[0, 1, 2], &vars, &[], &[("x".into(), "w".into())], true).is_err());
    }

    #[test]
    fn contrast_vector_averages_counterfactual_rows() {
        let d = Dataset::from_numeric([("x", vec![0.0, 1.0]), ("z", vec![1.0, 3.0])]).unwrap();
        let design = Design::new(
            &d,
            &[0, 1],
            &["x".into(), "z".into()],
            &[],
            &[("x".into(), "z".into())],
            true,
        )
        .unwrap();
        let c = design.contrast_vector(&d, &[0, 1], &Contrast::numeric("x", 0.0, 2.0)).unwrap();
        // [intercept, x, z, x:z] differences: 0, 2, 0, 2 * mean(z) = 4.
        assert_relative_eq!(c[0], 0.0);
        assert_relative_eq!(c[1], 2.0);
        assert_relative_eq!(c[2], 0.0);
        assert_relative_eq!(c[3], 4.0);
    }

    #[test]
    fn unseen_levels_are_unsupported() {
        let d = data();
        let design = Design::new(&d, &[0, 1, 2], &["g".into()], &[], &[], true).unwrap();
        let contrast = Contrast::new(vec![TreatmentContrast {
            name: "g".into(),
            control: Value::from("a"),
            treated: Value::from("z"),
        }]);
        assert!(design.contrast_vector(&d, &[0, 1, 2], &contrast).is_err());
    }
}
