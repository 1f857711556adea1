//! In-memory tabular dataset passed between processors.
//!
//! Columns sit behind `Arc`, so cloning a [`Dataset`] is cheap and adding or
//! replacing a column on a clone never touches the table a caller still holds.

use crate::config::{DEFAULT_ERA_COL, FEATURE_PREFIX, PREDICTION_PREFIX, TARGET_PREFIX};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Series {
    /// Numeric values (NaN allowed).
    Float(Vec<f64>),
    /// Categorical values such as era labels, tickers or ids.
    Text(Vec<String>),
}

impl Series {
    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            Series::Float(v) => v.len(),
            Series::Text(v) => v.len(),
        }
    }

    /// Check if the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view of the column.
    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Series::Float(v) => Some(v),
            Series::Text(_) => None,
        }
    }

    /// Text view of the column.
    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Series::Text(v) => Some(v),
            Series::Float(_) => None,
        }
    }

    /// String label of a single value, used for grouping.
    pub fn label(&self, row: usize) -> String {
        match self {
            Series::Float(v) => format!("{}", v[row]),
            Series::Text(v) => v[row].clone(),
        }
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Series::Float(values)
    }
}

impl From<Vec<String>> for Series {
    fn from(values: Vec<String>) -> Self {
        Series::Text(values)
    }
}

impl From<Vec<&str>> for Series {
    fn from(values: Vec<&str>) -> Self {
        Series::Text(values.into_iter().map(str::to_string).collect())
    }
}

/// Non-table state carried forward unchanged by every processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Name of the era (grouping) column.
    pub era_col: String,
    /// Data version, if known.
    pub version: Option<u32>,
    /// Free-form extra fields.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            era_col: DEFAULT_ERA_COL.to_string(),
            version: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Rows sharing one value of a grouping column.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Group label (the era or ticker value).
    pub label: String,
    /// Row indices in original order.
    pub rows: Vec<usize>,
}

/// Ordered table with named columns and metadata.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Arc<Series>>,
    n_rows: usize,
    meta: Metadata,
}

impl Dataset {
    /// Create an empty dataset with the given metadata.
    pub fn new(meta: Metadata) -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            n_rows: 0,
            meta,
        }
    }

    /// Build a dataset from named columns.
    pub fn from_columns<S: Into<Series>>(
        meta: Metadata,
        columns: impl IntoIterator<Item = (String, S)>,
    ) -> Result<Self> {
        let mut dataset = Self::new(meta);
        for (name, series) in columns {
            dataset.insert_column(name, series)?;
        }
        Ok(dataset)
    }

    /// Builder-style column insertion.
    pub fn with_column(mut self, name: impl Into<String>, series: impl Into<Series>) -> Result<Self> {
        self.insert_column(name, series)?;
        Ok(self)
    }

    /// Add a column, or replace it if the name already exists.
    pub fn insert_column(&mut self, name: impl Into<String>, series: impl Into<Series>) -> Result<()> {
        let name = name.into();
        let series = series.into();

        if self.columns.is_empty() {
            self.n_rows = series.len();
        } else if series.len() != self.n_rows {
            return Err(Error::precondition(format!(
                "column '{name}' has {} rows, dataset has {}",
                series.len(),
                self.n_rows
            )));
        }

        match self.position(&name) {
            Some(idx) => self.columns[idx] = Arc::new(series),
            None => {
                self.names.push(name);
                self.columns.push(Arc::new(series));
            }
        }
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Check if a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Series> {
        self.position(name).map(|idx| self.columns[idx].as_ref())
    }

    /// Get a numeric column, failing if it is missing or not numeric.
    pub fn float_column(&self, name: &str) -> Result<&[f64]> {
        let series = self.column(name).ok_or_else(|| Error::missing_column(name))?;
        series
            .as_float()
            .ok_or_else(|| Error::precondition(format!("column '{name}' is not numeric")))
    }

    /// Fail with a precondition error unless every named column exists.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        match names.iter().find(|n| !self.has_column(n.as_ref())) {
            Some(missing) => Err(Error::missing_column(missing.as_ref())),
            None => Ok(()),
        }
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    /// (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols())
    }

    /// Dataset metadata.
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Replace the metadata.
    pub fn with_meta(mut self, meta: Metadata) -> Self {
        self.meta = meta;
        self
    }

    /// Name of the era column.
    pub fn era_col(&self) -> &str {
        &self.meta.era_col
    }

    fn prefixed(&self, prefix: &str) -> Vec<String> {
        self.names
            .iter()
            .filter(|n| n.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Columns prefixed `feature`.
    pub fn feature_cols(&self) -> Vec<String> {
        self.prefixed(FEATURE_PREFIX)
    }

    /// Columns prefixed `target`.
    pub fn target_cols(&self) -> Vec<String> {
        self.prefixed(TARGET_PREFIX)
    }

    /// Columns prefixed `prediction`.
    pub fn prediction_cols(&self) -> Vec<String> {
        self.prefixed(PREDICTION_PREFIX)
    }

    /// Every column that is not a feature, target or prediction.
    pub fn aux_cols(&self) -> Vec<String> {
        self.names
            .iter()
            .filter(|n| {
                !n.starts_with(FEATURE_PREFIX)
                    && !n.starts_with(TARGET_PREFIX)
                    && !n.starts_with(PREDICTION_PREFIX)
            })
            .cloned()
            .collect()
    }

    /// Keep only the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Dataset> {
        let mut selected = Dataset::new(self.meta.clone());
        selected.n_rows = self.n_rows;
        for name in names {
            let name = name.as_ref();
            if selected.has_column(name) {
                continue;
            }
            let idx = self.position(name).ok_or_else(|| Error::missing_column(name))?;
            selected.names.push(name.to_string());
            selected.columns.push(Arc::clone(&self.columns[idx]));
        }
        Ok(selected)
    }

    /// Copy with freshly allocated column storage.
    pub fn deep_copy(&self) -> Dataset {
        Dataset {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Arc::new(c.as_ref().clone()))
                .collect(),
            n_rows: self.n_rows,
            meta: self.meta.clone(),
        }
    }

    /// Check whether two datasets share the storage of a column.
    pub fn shares_column(&self, other: &Dataset, name: &str) -> bool {
        match (self.position(name), other.position(name)) {
            (Some(a), Some(b)) => Arc::ptr_eq(&self.columns[a], &other.columns[b]),
            _ => false,
        }
    }

    /// Group rows by the values of a column.
    ///
    /// Groups appear in order of first occurrence; rows keep their original
    /// order inside each group.
    pub fn groups(&self, col: &str) -> Result<Vec<Group>> {
        let series = self.column(col).ok_or_else(|| Error::missing_column(col))?;
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();

        for row in 0..self.n_rows {
            let label = series.label(row);
            match index.get(&label) {
                Some(&g) => groups[g].rows.push(row),
                None => {
                    index.insert(label.clone(), groups.len());
                    groups.push(Group {
                        label,
                        rows: vec![row],
                    });
                }
            }
        }
        Ok(groups)
    }

    /// Group rows by era.
    pub fn era_groups(&self, era_col: &str) -> Result<Vec<Group>> {
        self.groups(era_col)
    }
}

/// Gather the values of `column` at `rows`.
pub fn gather(column: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().map(|&r| column[r]).collect()
}

/// Write per-group values back to their rows.
pub fn scatter(target: &mut [f64], rows: &[usize], values: &[f64]) {
    for (&row, &value) in rows.iter().zip(values) {
        target[row] = value;
    }
}
