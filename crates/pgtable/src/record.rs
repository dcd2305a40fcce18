//! Fetched rows.

use crate::error::{TableError, TableResult};
use crate::value::Value;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// How an executor should shape the rows it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStyle {
    /// Values keyed by column name (and still addressable by index).
    #[default]
    Named,
    /// Values by ordinal position only.
    Positional,
}

/// One fetched row.
///
/// Column names are shared between all records of one result set, so a named
/// `Vec<Record>` only stores each name once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    columns: Option<Arc<[String]>>,
    values: Vec<Value>,
}

impl Record {
    /// Create a named record. `columns` and `values` are matched by position.
    pub fn named(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self {
            columns: Some(columns),
            values,
        }
    }

    /// Create a positional record.
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            columns: None,
            values,
        }
    }

    /// Build a named record from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::named(columns.into(), values)
    }

    pub fn style(&self) -> FetchStyle {
        if self.columns.is_some() {
            FetchStyle::Named
        } else {
            FetchStyle::Positional
        }
    }

    /// Column names, empty for positional records.
    pub fn columns(&self) -> &[String] {
        self.columns.as_deref().unwrap_or(&[])
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value by column name. Always `None` for positional records.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self.columns.as_ref()?.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// The first value of the row, if any.
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    /// JSON view: an object for named records, an array for positional ones.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.columns {
            Some(columns) => serde_json::Value::Object(
                columns
                    .iter()
                    .zip(&self.values)
                    .map(|(c, v)| (c.clone(), v.to_json()))
                    .collect(),
            ),
            None => serde_json::Value::Array(self.values.iter().map(Value::to_json).collect()),
        }
    }

    /// Deserialize the record into `T` through its JSON view.
    pub fn deserialize<T: DeserializeOwned>(&self) -> TableResult<T> {
        serde_json::from_value(self.to_json()).map_err(TableError::from)
    }
}
