//! Schema alignment between independently normalized tables.

use crate::{SchemaError, feature::FeatureTable};

/// Adds every column of `required` missing from `table`, filled with zeros.
///
/// Present columns are kept as they are, including ones not listed in
/// `required`. Aligning an already aligned table returns an equal table.
///
/// # Examples
///
/// ```
/// use storecast_table::{align::align, feature::{FeatureTable, RecordId}};
///
/// let table = FeatureTable::from_columns(
///     vec![RecordId(0), RecordId(1)],
///     [("StateHoliday_0", vec![1.0, 1.0])],
/// )
/// .unwrap();
/// let required = ["StateHoliday_0".to_owned(), "StateHoliday_a".to_owned()];
///
/// let aligned = align(&table, &required);
/// assert_eq!(aligned.column("StateHoliday_a"), Some([0.0, 0.0].as_slice()));
/// assert_eq!(align(&aligned, &required), aligned);
/// ```
#[must_use]
pub fn align(table: &FeatureTable, required: &[String]) -> FeatureTable {
    let mut aligned = table.clone();
    for name in required {
        if !aligned.has_column(name) {
            tracing::debug!(column = %name, "adding zero-filled column");
            aligned = aligned.with_zero_column(name.clone());
        }
    }
    aligned
}

/// Difference between two feature column sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    /// Columns the training side has and the test side lacks
    pub missing_in_test: Vec<String>,
    /// Columns the test side has and the training side lacks
    pub missing_in_train: Vec<String>,
}

impl SchemaDiff {
    #[must_use]
    pub fn between<S>(train: &[S], test: &[S]) -> Self
    where
        S: AsRef<str>,
    {
        let missing = |from: &[S], other: &[S]| {
            from.iter()
                .filter(|n| !other.iter().any(|o| o.as_ref() == n.as_ref()))
                .map(|n| n.as_ref().to_owned())
                .collect::<Vec<_>>()
        };
        Self {
            missing_in_test: missing(train, test),
            missing_in_train: missing(test, train),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing_in_test.is_empty() && self.missing_in_train.is_empty()
    }

    /// Converts a non-empty difference into [`SchemaError::Misaligned`].
    pub fn into_result(self) -> Result<(), SchemaError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Misaligned {
                missing_in_test: self.missing_in_test,
                missing_in_train: self.missing_in_train,
            })
        }
    }
}
