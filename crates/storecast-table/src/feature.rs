//! Numeric feature tables.
//!
//! A [`FeatureTable`] stores named `f64` columns in column-major order plus one
//! [`RecordId`] per row. The record identity is assigned once, when the raw
//! table is normalized, and follows its row through every later filter, split
//! and grouping so predictions can be mapped back to the original record.
//!
//! Tables are never modified in place; every operation returns a new table.

use serde::{Deserialize, Serialize};

use crate::SchemaError;

/// Stable identity of a record: its row position in the raw input table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
pub struct RecordId(pub usize);

/// Store identifier, the partitioning key for per-store training.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
pub struct EntityId(pub i64);

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    record_ids: Vec<RecordId>,
}

impl FeatureTable {
    /// Creates a table with the given rows and no columns.
    #[must_use]
    pub fn with_record_ids(record_ids: Vec<RecordId>) -> Self {
        Self {
            names: vec![],
            columns: vec![],
            record_ids,
        }
    }

    /// Builds a table from named columns.
    ///
    /// # Errors
    ///
    /// * [`SchemaError::DuplicateColumn`] if a name repeats
    /// * [`SchemaError::LengthMismatch`] if a column length differs from the row count
    pub fn from_columns<I, S>(record_ids: Vec<RecordId>, columns: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut table = Self::with_record_ids(record_ids);
        for (name, values) in columns {
            table = table.with_column(name, values)?;
        }
        Ok(table)
    }

    /// Returns the table with one more column appended.
    pub fn with_column<S>(mut self, name: S, values: Vec<f64>) -> Result<Self, SchemaError>
    where
        S: Into<String>,
    {
        let name = name.into();
        if self.has_column(&name) {
            return Err(SchemaError::DuplicateColumn { column: name });
        }
        if values.len() != self.len() {
            return Err(SchemaError::LengthMismatch {
                column: name,
                expected: self.len(),
                found: values.len(),
            });
        }
        self.names.push(name);
        self.columns.push(values);
        Ok(self)
    }

    /// Appends an all-zero column; the caller guarantees the name is absent.
    pub(crate) fn with_zero_column(mut self, name: String) -> Self {
        debug_assert!(!self.has_column(&name));
        self.columns.push(vec![0.0; self.len()]);
        self.names.push(name);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.record_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }

    /// Column names in table order.
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn record_ids(&self) -> &[RecordId] {
        &self.record_ids
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn require_column(&self, name: &str) -> Result<&[f64], SchemaError> {
        self.column(name).ok_or_else(|| SchemaError::MissingColumn {
            column: name.to_owned(),
        })
    }

    /// Returns a copy of the table without the named column (no-op if absent).
    #[must_use]
    pub fn without_column(&self, name: &str) -> Self {
        let (names, columns) = self
            .names
            .iter()
            .zip(&self.columns)
            .filter(|(n, _)| *n != name)
            .map(|(n, c)| (n.clone(), c.clone()))
            .unzip();
        Self {
            names,
            columns,
            record_ids: self.record_ids.clone(),
        }
    }

    /// Returns a table containing the rows at `positions`, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if a position is out of bounds.
    #[must_use]
    pub fn select_rows(&self, positions: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| positions.iter().map(|&p| c[p]).collect())
                .collect(),
            record_ids: positions.iter().map(|&p| self.record_ids[p]).collect(),
        }
    }

    /// Keeps the rows for which `pred` returns `true`, in order.
    #[must_use]
    pub fn filter_rows<F>(&self, mut pred: F) -> Self
    where
        F: FnMut(usize) -> bool,
    {
        let positions = (0..self.len()).filter(|&i| pred(i)).collect::<Vec<_>>();
        self.select_rows(&positions)
    }

    /// Column names excluding `excluded`, in table order.
    #[must_use]
    pub fn columns_except(&self, excluded: &[&str]) -> Vec<String> {
        self.names
            .iter()
            .filter(|n| !excluded.contains(&n.as_str()))
            .cloned()
            .collect()
    }

    /// Flattens the named columns into a row-major buffer of
    /// `self.len() * names.len()` values.
    pub fn to_row_major<S>(&self, names: &[S]) -> Result<Vec<f64>, SchemaError>
    where
        S: AsRef<str>,
    {
        let columns = names
            .iter()
            .map(|n| self.require_column(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let mut data = Vec::with_capacity(self.len() * columns.len());
        for row in 0..self.len() {
            data.extend(columns.iter().map(|c| c[row]));
        }
        Ok(data)
    }

    /// Concatenates tables with identical column names (in the same order).
    ///
    /// # Errors
    ///
    /// [`SchemaError::Misaligned`] if the column names differ.
    pub fn concat(tables: &[FeatureTable]) -> Result<Self, SchemaError> {
        let Some(first) = tables.first() else {
            return Ok(Self::with_record_ids(vec![]));
        };
        let mut out = first.clone();
        for table in &tables[1..] {
            if table.names != out.names {
                return Err(SchemaError::Misaligned {
                    missing_in_test: missing_from(&out.names, &table.names),
                    missing_in_train: missing_from(&table.names, &out.names),
                });
            }
            for (dst, src) in out.columns.iter_mut().zip(&table.columns) {
                dst.extend_from_slice(src);
            }
            out.record_ids.extend_from_slice(&table.record_ids);
        }
        Ok(out)
    }
}

fn missing_from(expected: &[String], actual: &[String]) -> Vec<String> {
    expected
        .iter()
        .filter(|n| !actual.contains(n))
        .cloned()
        .collect()
}
