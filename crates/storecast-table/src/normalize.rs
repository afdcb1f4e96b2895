//! Feature normalization: raw text records to numeric feature tables.
//!
//! # Transformations
//!
//! Applied in this order by [`normalize`]:
//!
//! 1. **Drop** the columns in [`FeatureConfig::drop_columns`] (by default the raw
//!    date and any `Id` column shipped with the input; record identity is the
//!    row position instead)
//! 2. **Indicator expansion** for every [`CategoricalColumn`]: the column is
//!    replaced by one 0/1 column per observed level, named `<prefix>_<level>`,
//!    appended after the numeric columns. Names listed in
//!    [`FeatureConfig::excluded_levels`] are suppressed.
//! 3. **Log transform** for every column in [`FeatureConfig::log_columns`]:
//!    zeros are replaced by [`FeatureConfig::zero_floor`], then `log2` is applied.
//! 4. **Target transform** (training side only): the target column gets the same
//!    floor + `log2` treatment via [`LogTransform`]. Predictions are reported
//!    through [`LogTransform::inverse`].
//! 5. **Record identity**: every row keeps its position in the raw table as its
//!    [`RecordId`].
//!
//! All other columns must hold plain numbers.
//!
//! # Level Enumeration
//!
//! Indicator columns only exist for levels observed in the data, so a test slice
//! that never sees, say, `StateHoliday_b` would lack that column. The configured
//! [`CategoricalColumn::levels`] enumerate every level the business rules allow;
//! [`FeatureConfig::required_columns`] turns them into the column set that
//! [`align`](crate::align::align) guarantees on both sides.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    SchemaError,
    feature::{FeatureTable, RecordId},
    raw::RawTable,
};

/// A categorical column expanded into indicator columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    /// Raw column name
    pub column: String,
    /// Prefix of the generated indicator columns
    pub prefix: String,
    /// Every level that may appear; drives schema alignment
    pub levels: Vec<String>,
}

impl CategoricalColumn {
    pub fn new<S, L>(column: S, prefix: S, levels: L) -> Self
    where
        S: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            column: column.into(),
            prefix: prefix.into(),
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn indicator_name(&self, level: &str) -> String {
        format!("{}_{level}", self.prefix)
    }
}

/// Feature engineering settings shared by the training and test sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub drop_columns: Vec<String>,
    pub categorical: Vec<CategoricalColumn>,
    /// Indicator column names (prefix included) to suppress
    pub excluded_levels: Vec<String>,
    pub log_columns: Vec<String>,
    /// Replacement for zero before the log transform
    pub zero_floor: f64,
    /// Value for empty numeric cells; `None` makes them an error
    pub missing_numeric: Option<f64>,
    pub target_column: String,
    pub entity_column: String,
    pub open_column: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            drop_columns: vec!["Date".to_owned(), "Id".to_owned()],
            categorical: vec![
                CategoricalColumn::new("StateHoliday", "StateHoliday", ["0", "a", "b", "c"]),
                CategoricalColumn::new("DayOfWeek", "Day", ["1", "2", "3", "4", "5", "6", "7"]),
            ],
            excluded_levels: vec![],
            log_columns: vec!["Customers".to_owned()],
            zero_floor: 0.0001,
            missing_numeric: None,
            target_column: "Sales".to_owned(),
            entity_column: "Store".to_owned(),
            open_column: "Open".to_owned(),
        }
    }
}

impl FeatureConfig {
    /// Transform shared by the log columns and the target.
    ///
    /// # Errors
    ///
    /// [`SchemaError::InvalidZeroFloor`] if the floor is not positive.
    pub fn target_transform(&self) -> Result<LogTransform, SchemaError> {
        LogTransform::new(self.zero_floor)
    }

    /// Indicator columns both feature tables must expose, excluded levels removed.
    #[must_use]
    pub fn required_columns(&self) -> Vec<String> {
        self.categorical
            .iter()
            .flat_map(|c| c.levels.iter().map(|level| c.indicator_name(level)))
            .filter(|name| !self.is_excluded(name))
            .collect()
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.excluded_levels.iter().any(|e| e == name)
    }

    fn is_categorical(&self, column: &str) -> bool {
        self.categorical.iter().any(|c| c.column == column)
    }

    fn is_log(&self, column: &str) -> bool {
        self.log_columns.iter().any(|c| c == column)
    }
}

/// Floor-then-`log2` transform applied to customer counts and the sales target.
///
/// # Examples
///
/// ```
/// use storecast_table::normalize::LogTransform;
///
/// let transform = LogTransform::new(0.0001).unwrap();
/// assert_eq!(transform.forward(8.0), Some(3.0));
/// assert_eq!(transform.inverse(3.0), 8.0);
///
/// // zero maps to the floor, never back to zero
/// let y = transform.forward(0.0).unwrap();
/// assert!((transform.inverse(y) - 0.0001).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogTransform {
    zero_floor: f64,
}

impl LogTransform {
    pub fn new(zero_floor: f64) -> Result<Self, SchemaError> {
        if zero_floor.is_finite() && zero_floor > 0.0 {
            Ok(Self { zero_floor })
        } else {
            Err(SchemaError::InvalidZeroFloor { value: zero_floor })
        }
    }

    /// Returns `None` for negative or non-finite input.
    #[must_use]
    pub fn forward(&self, value: f64) -> Option<f64> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let value = if value == 0.0 { self.zero_floor } else { value };
        Some(value.log2())
    }

    #[must_use]
    pub fn inverse(&self, value: f64) -> f64 {
        value.exp2()
    }
}

/// Normalizes a raw table into a feature table.
///
/// `has_target` selects whether the target column is expected and transformed
/// (training side) or left alone (test side, where it is normally absent).
///
/// # Errors
///
/// * [`SchemaError::MissingColumn`] if a categorical, log or (with `has_target`)
///   target column is absent
/// * [`SchemaError::InvalidNumber`] if a numeric cell does not parse, is empty
///   without [`FeatureConfig::missing_numeric`], or is negative in a log column
/// * [`SchemaError::InvalidZeroFloor`] if the floor is not positive
pub fn normalize(
    raw: &RawTable,
    config: &FeatureConfig,
    has_target: bool,
) -> Result<FeatureTable, SchemaError> {
    let transform = config.target_transform()?;
    let raw = raw.without_columns(&config.drop_columns);

    for column in config
        .categorical
        .iter()
        .map(|c| &c.column)
        .chain(&config.log_columns)
        .chain(has_target.then_some(&config.target_column))
    {
        raw.column_index(column)?;
    }

    let record_ids = (0..raw.len()).map(RecordId).collect();
    let mut table = FeatureTable::with_record_ids(record_ids);

    for (index, name) in raw.header().iter().enumerate() {
        if config.is_categorical(name) {
            continue;
        }
        let log = config.is_log(name) || (has_target && *name == config.target_column);
        let values = raw
            .rows()
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                let cell = &cells[index];
                let invalid = || SchemaError::InvalidNumber {
                    column: name.clone(),
                    row,
                    value: cell.clone(),
                };
                let value = parse_numeric(cell, config.missing_numeric).ok_or_else(invalid)?;
                if log {
                    transform.forward(value).ok_or_else(invalid)
                } else {
                    Ok(value)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        table = table.with_column(name.clone(), values)?;
    }

    for categorical in &config.categorical {
        let index = raw.column_index(&categorical.column)?;
        let cells = raw
            .rows()
            .iter()
            .map(|cells| cells[index].trim())
            .collect::<Vec<_>>();
        let observed = cells.iter().copied().collect::<BTreeSet<_>>();
        for level in observed {
            let name = categorical.indicator_name(level);
            if config.is_excluded(&name) {
                continue;
            }
            let values = cells
                .iter()
                .map(|&c| if c == level { 1.0 } else { 0.0 })
                .collect();
            table = table.with_column(name, values)?;
        }
    }

    tracing::debug!(
        rows = table.len(),
        columns = table.column_names().len(),
        has_target,
        "normalized table"
    );
    Ok(table)
}

fn parse_numeric(cell: &str, missing: Option<f64>) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return missing;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn train_raw() -> RawTable {
        RawTable::new(
            [
                "Store",
                "DayOfWeek",
                "Date",
                "Sales",
                "Customers",
                "Open",
                "Promo",
                "StateHoliday",
                "SchoolHoliday",
            ],
            vec![
                vec!["1", "5", "2015-07-31", "8", "4", "1", "1", "0", "1"],
                vec!["1", "4", "2015-07-30", "0", "0", "0", "1", "a", "1"],
                vec!["2", "5", "2015-07-31", "32", "16", "1", "0", "0", "0"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_column_layout() {
        let table = normalize(&train_raw(), &FeatureConfig::default(), true).unwrap();
        assert_eq!(
            table.column_names(),
            [
                "Store",
                "Sales",
                "Customers",
                "Open",
                "Promo",
                "SchoolHoliday",
                "StateHoliday_0",
                "StateHoliday_a",
                "Day_4",
                "Day_5",
            ]
        );
        assert_eq!(
            table.record_ids(),
            [RecordId(0), RecordId(1), RecordId(2)]
        );
        assert_eq!(table.column("Day_4"), Some([0.0, 1.0, 0.0].as_slice()));
    }

    #[test]
    fn test_log_columns_and_target() {
        let table = normalize(&train_raw(), &FeatureConfig::default(), true).unwrap();
        let sales = table.column("Sales").unwrap();
        assert_eq!(sales[0], 3.0);
        assert_eq!(sales[2], 5.0);
        assert!((sales[1] - 0.0001_f64.log2()).abs() < 1e-12);
        let customers = table.column("Customers").unwrap();
        assert_eq!(customers[0], 2.0);
        assert_eq!(customers[2], 4.0);
    }

    #[test]
    fn test_target_untouched_without_flag() {
        let table = normalize(&train_raw(), &FeatureConfig::default(), false).unwrap();
        assert_eq!(table.column("Sales"), Some([8.0, 0.0, 32.0].as_slice()));
    }

    #[test]
    fn test_excluded_levels_dropped() {
        let config = FeatureConfig {
            excluded_levels: vec!["Day_5".to_owned()],
            ..FeatureConfig::default()
        };
        let table = normalize(&train_raw(), &config, true).unwrap();
        assert!(table.has_column("Day_4"));
        assert!(!table.has_column("Day_5"));
        assert!(!config.required_columns().contains(&"Day_5".to_owned()));
    }

    #[test]
    fn test_missing_categorical_column() {
        let raw = train_raw().without_columns(&["StateHoliday"]);
        let err = normalize(&raw, &FeatureConfig::default(), true).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingColumn {
                column: "StateHoliday".to_owned()
            }
        );
    }

    #[test]
    fn test_missing_target_column() {
        let raw = train_raw().without_columns(&["Sales"]);
        assert!(normalize(&raw, &FeatureConfig::default(), false).is_ok());
        assert!(matches!(
            normalize(&raw, &FeatureConfig::default(), true),
            Err(SchemaError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_empty_cells() {
        let raw = RawTable::new(
            ["Store", "StateHoliday", "DayOfWeek", "Customers", "CompetitionDistance"],
            vec![vec!["1", "0", "1", "3", ""]],
        )
        .unwrap();
        let err = normalize(&raw, &FeatureConfig::default(), false).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidNumber { row: 0, .. }));

        let config = FeatureConfig {
            missing_numeric: Some(0.0),
            ..FeatureConfig::default()
        };
        let table = normalize(&raw, &config, false).unwrap();
        assert_eq!(table.column("CompetitionDistance"), Some([0.0].as_slice()));
    }

    #[test]
    fn test_negative_log_value_rejected() {
        let raw = RawTable::new(
            ["Store", "StateHoliday", "DayOfWeek", "Customers"],
            vec![vec!["1", "0", "1", "-3"]],
        )
        .unwrap();
        assert!(matches!(
            normalize(&raw, &FeatureConfig::default(), false),
            Err(SchemaError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_input_not_modified() {
        let raw = train_raw();
        let before = raw.clone();
        let _ = normalize(&raw, &FeatureConfig::default(), true).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn test_config_json_defaults() {
        let config: FeatureConfig = serde_json::from_str(
            r#"{ "excluded_levels": ["StateHoliday_c"], "missing_numeric": 0.0 }"#,
        )
        .unwrap();
        assert_eq!(config.log_columns, ["Customers"]);
        assert_eq!(config.missing_numeric, Some(0.0));
        let required = config.required_columns();
        assert_eq!(required.len(), 10);
        assert!(!required.contains(&"StateHoliday_c".to_owned()));
        assert!(required.contains(&"Day_7".to_owned()));
    }

    #[test]
    fn test_invalid_floor() {
        assert!(LogTransform::new(0.0).is_err());
        assert!(LogTransform::new(f64::NAN).is_err());

        let config = FeatureConfig {
            zero_floor: -1.0,
            ..FeatureConfig::default()
        };
        assert_eq!(
            config.target_transform(),
            Err(SchemaError::InvalidZeroFloor { value: -1.0 })
        );
        assert_eq!(
            FeatureConfig::default().target_transform(),
            LogTransform::new(0.0001)
        );
    }

    proptest! {
        #[test]
        fn prop_log_transform_round_trip(v in 1e-6_f64..1e9) {
            let transform = LogTransform::new(0.0001).unwrap();
            let back = transform.inverse(transform.forward(v).unwrap());
            prop_assert!((back - v).abs() <= v * 1e-12);
        }
    }
}
