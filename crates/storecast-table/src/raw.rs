//! Raw text tables as read from the input files.

use std::collections::HashMap;

use crate::SchemaError;

/// A header plus rows of text cells.
///
/// Every row has exactly as many cells as the header. Cells are kept as text;
/// parsing happens in [`normalize`](crate::normalize::normalize).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Builds a table, checking that the header has no duplicates and every row
    /// has the header's width.
    pub fn new<H, R, C>(header: H, rows: impl IntoIterator<Item = R>) -> Result<Self, SchemaError>
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let header = header.into_iter().map(Into::into).collect::<Vec<String>>();
        for (i, name) in header.iter().enumerate() {
            if header[..i].contains(name) {
                return Err(SchemaError::DuplicateColumn {
                    column: name.clone(),
                });
            }
        }

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(row, cells)| {
                let cells = cells.into_iter().map(Into::into).collect::<Vec<String>>();
                if cells.len() == header.len() {
                    Ok(cells)
                } else {
                    Err(SchemaError::RaggedRow {
                        row,
                        expected: header.len(),
                        found: cells.len(),
                    })
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { header, rows })
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.header.iter().any(|h| h == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, SchemaError> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SchemaError::MissingColumn {
                column: name.to_owned(),
            })
    }

    /// Returns a copy of the table without the named columns.
    ///
    /// Names that are not present are ignored.
    #[must_use]
    pub fn without_columns<S>(&self, names: &[S]) -> Self
    where
        S: AsRef<str>,
    {
        let keep = self
            .header
            .iter()
            .map(|h| !names.iter().any(|n| n.as_ref() == h))
            .collect::<Vec<_>>();
        let pick = |cells: &[String]| {
            cells
                .iter()
                .zip(&keep)
                .filter_map(|(cell, keep)| keep.then(|| cell.clone()))
                .collect::<Vec<_>>()
        };
        Self {
            header: pick(self.header.as_slice()),
            rows: self.rows.iter().map(|row| pick(row.as_slice())).collect(),
        }
    }

    /// Left-joins `other` onto this table on the `key` column.
    ///
    /// Every column of `other` except `key` is appended. Rows without a match in
    /// `other` get empty cells. Row order and count of `self` are preserved.
    ///
    /// # Errors
    ///
    /// * [`SchemaError::MissingColumn`] if either side lacks `key`
    /// * [`SchemaError::DuplicateKey`] if a key value repeats in `other`
    /// * [`SchemaError::DuplicateColumn`] if an appended column already exists
    pub fn left_join(&self, other: &RawTable, key: &str) -> Result<Self, SchemaError> {
        let left_key = self.column_index(key)?;
        let right_key = other.column_index(key)?;

        let mut lookup = HashMap::with_capacity(other.len());
        for row in &other.rows {
            let value = row[right_key].trim();
            if lookup.insert(value, row).is_some() {
                return Err(SchemaError::DuplicateKey {
                    column: key.to_owned(),
                    value: value.to_owned(),
                });
            }
        }

        let appended = (0..other.header.len())
            .filter(|&i| i != right_key)
            .collect::<Vec<_>>();

        let header = self
            .header
            .iter()
            .chain(appended.iter().map(|&i| &other.header[i]))
            .cloned()
            .collect::<Vec<_>>();

        let rows = self.rows.iter().map(|row| {
            let matched = lookup.get(row[left_key].trim());
            let extra = appended.iter().map(move |&i| {
                matched.map_or_else(String::new, |other_row| other_row[i].clone())
            });
            row.iter().cloned().chain(extra).collect::<Vec<_>>()
        });

        Self::new(header, rows)
    }
}
