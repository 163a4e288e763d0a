//! Column-oriented tabular data borrowed by validation and estimation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, Value};

/// Tabular observations: one column per variable, cells may be missing.
///
/// The engine only ever borrows a `Dataset`; every transformation returns a
/// new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DatasetRepr", into = "DatasetRepr")]
pub struct Dataset {
    columns: BTreeMap<String, Vec<Option<Value>>>,
    n_rows: usize,
}

#[derive(Serialize, Deserialize)]
struct DatasetRepr {
    columns: BTreeMap<String, Vec<Option<Value>>>,
}

impl TryFrom<DatasetRepr> for Dataset {
    type Error = Error;

    fn try_from(repr: DatasetRepr) -> Result<Self> {
        Self::from_optional_columns(repr.columns)
    }
}

impl From<Dataset> for DatasetRepr {
    fn from(ds: Dataset) -> Self {
        Self { columns: ds.columns }
    }
}

impl Dataset {
    /// Empty dataset (no columns, no rows).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from fully observed columns.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        Self::from_optional_columns(
            columns.into_iter().map(|(name, col)| (name, col.into_iter().map(Some).collect())),
        )
    }

    /// Build from columns that may contain missing cells.
    pub fn from_optional_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<Option<Value>>)>,
        S: Into<String>,
    {
        let mut out = Self::default();
        for (name, col) in columns {
            out.insert_column(name.into(), col)?;
        }
        Ok(out)
    }

    /// Build from numeric columns.
    pub fn from_numeric<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        Self::from_columns(
            columns.into_iter().map(|(name, col)| (name, col.into_iter().map(Value::Float).collect())),
        )
    }

    /// Build from row mappings; a key absent from a row is a missing cell.
    pub fn from_rows(rows: &[BTreeMap<String, Value>]) -> Self {
        let names: BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
        let columns = names
            .into_iter()
            .map(|name| (name.clone(), rows.iter().map(|r| r.get(name).cloned()).collect()))
            .collect();
        Self { columns, n_rows: rows.len() }
    }

    /// Return a copy with one extra (or replaced) column.
    pub fn with_column(&self, name: impl Into<String>, values: Vec<Option<Value>>) -> Result<Self> {
        let name = name.into();
        let mut out = self.clone();
        out.columns.remove(&name);
        if out.columns.is_empty() {
            out.n_rows = 0;
        }
        out.insert_column(name, values)?;
        Ok(out)
    }

    fn insert_column(&mut self, name: String, values: Vec<Option<Value>>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("column name must be non-empty".to_string()));
        }
        if self.columns.contains_key(&name) {
            return Err(Error::InvalidInput(format!("duplicate column '{name}'")));
        }
        if self.columns.is_empty() {
            self.n_rows = values.len();
        } else if values.len() != self.n_rows {
            return Err(Error::InvalidInput(format!(
                "column '{name}' has {} rows, expected {}",
                values.len(),
                self.n_rows
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// `true` when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Column names, sorted.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Raw cells of a column.
    pub fn column(&self, name: &str) -> Option<&[Option<Value>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Cell at `(row, column)`; `None` if the column is absent or the cell missing.
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        self.columns.get(name)?.get(row)?.as_ref()
    }

    /// Numeric view of a column; non-numeric cells become `None`.
    pub fn numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.columns
            .get(name)
            .map(|col| col.iter().map(|c| c.as_ref().and_then(Value::as_f64)).collect())
    }

    /// Indices of rows observed in every listed column.
    ///
    /// Absent columns make every row incomplete.
    pub fn complete_rows<'a, I>(&self, names: I) -> Vec<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let cols: Option<Vec<&Vec<Option<Value>>>> =
            names.into_iter().map(|n| self.columns.get(n)).collect();
        let Some(cols) = cols else {
            return Vec::new();
        };
        (0..self.n_rows).filter(|&i| cols.iter().all(|c| c[i].is_some())).collect()
    }

    /// Derived view containing only the given rows (in the given order).
    pub fn select_rows(&self, rows: &[usize]) -> Result<Self> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.n_rows) {
            return Err(Error::InvalidInput(format!(
                "row index {bad} out of bounds for {} rows",
                self.n_rows
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| (name.clone(), rows.iter().map(|&r| col[r].clone()).collect()))
            .collect();
        Ok(Self { columns, n_rows: rows.len() })
    }

    /// Append the rows of `other`; both datasets must have identical columns.
    ///
    /// Used to merge separately collected control and treatment runs.
    pub fn concat(&self, other: &Dataset) -> Result<Self> {
        if self.columns.is_empty() {
            return Ok(other.clone());
        }
        if other.columns.is_empty() {
            return Ok(self.clone());
        }
        let lhs: BTreeSet<&String> = self.columns.keys().collect();
        let rhs: BTreeSet<&String> = other.columns.keys().collect();
        if lhs != rhs {
            let diff: Vec<String> = lhs.symmetric_difference(&rhs).map(|s| s.to_string()).collect();
            return Err(Error::InvalidInput(format!(
                "cannot concatenate datasets with different columns: {}",
                diff.join(", ")
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| {
                let mut merged = col.clone();
                merged.extend(other.columns[name].iter().cloned());
                (name.clone(), merged)
            })
            .collect();
        Ok(Self { columns, n_rows: self.n_rows + other.n_rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Dataset {
        Dataset::from_optional_columns([
            ("x", vec![Some(Value::Int(0)), Some(Value::Int(1)), None]),
            ("y", vec![Some(Value::Float(0.5)), Some(Value::Float(2.5)), Some(Value::Float(4.0))]),
        ])
        .unwrap()
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let err = Dataset::from_numeric([("a", vec![1.0, 2.0]), ("b", vec![1.0])]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn complete_rows_skip_missing_cells() {
        let ds = small();
        assert_eq!(ds.complete_rows(["x", "y"]), vec![0, 1]);
        assert_eq!(ds.complete_rows(["y"]), vec![0, 1, 2]);
        assert!(ds.complete_rows(["nope"]).is_empty());
    }

    #[test]
    fn from_rows_marks_absent_keys_missing() {
        let rows = vec![
            BTreeMap::from([("a".to_string(), Value::Int(1))]),
            BTreeMap::from([("b".to_string(), Value::Int(2))]),
        ];
        let ds = Dataset::from_rows(&rows);
        assert_eq!(ds.n_rows(), 2);
        assert_eq!(ds.value(0, "a"), Some(&Value::Int(1)));
        assert_eq!(ds.value(1, "a"), None);
    }

    #[test]
    fn select_and_concat() {
        let ds = small();
        let sub = ds.select_rows(&[2, 0]).unwrap();
        assert_eq!(sub.n_rows(), 2);
        assert_eq!(sub.value(1, "x"), Some(&Value::Int(0)));
        assert!(ds.select_rows(&[3]).is_err());

        let both = ds.concat(&sub).unwrap();
        assert_eq!(both.n_rows(), 5);
        let other = Dataset::from_numeric([("x", vec![1.0])]).unwrap();
        assert!(ds.concat(&other).is_err());
    }

    #[test]
    fn json_roundtrip_validates_shape() {
        let ds = small();
        let json = serde_json::to_string(&ds).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ds);
        let bad = r#"{"columns":{"a":[1,2],"b":[1]}}"#;
        assert!(serde_json::from_str::<Dataset>(bad).is_err());
    }

    #[test]
    fn with_column_replaces_by_name() {
        let ds = small();
        let flagged = ds
            .with_column("x", vec![Some(Value::Bool(true)), None, Some(Value::Bool(false))])
            .unwrap();
        assert_eq!(flagged.n_columns(), 2);
        assert_eq!(flagged.value(0, "x"), Some(&Value::Bool(true)));
        assert!(ds.with_column("z", vec![None]).is_err());
    }
}
