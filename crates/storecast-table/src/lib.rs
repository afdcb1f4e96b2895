//! Tabular data preparation for per-store sales forecasting
//!
//! This crate turns raw sales records into numeric feature tables that the
//! training and inference sides can share, and slices those tables the way the
//! per-store training loop needs them.
//!
//! # Overview
//!
//! ```text
//! RawTable (text cells, as read from CSV)
//!     ↓ normalize (normalize)
//! FeatureTable (numeric columns + record identity)
//!     ↓ align (align)
//! FeatureTable with the shared indicator schema
//!     ↓ retain_open / split_closed (partition)
//! open rows (+ closed record identities on the test side)
//!     ↓ partition (partition)
//! BTreeMap<EntityId, FeatureTable>
//! ```
//!
//! - [`raw`]: Raw text tables and the store-attribute join
//! - [`feature`]: Column-major numeric feature tables with stable record identity
//! - [`normalize`]: Indicator expansion, log transforms, target transform
//! - [`align`]: Zero-filled schema alignment and schema comparison
//! - [`partition`]: Closed-store split and per-store grouping
//!
//! # Example
//!
//! ```
//! use storecast_table::{
//!     align::align, normalize::{FeatureConfig, normalize}, partition::partition,
//!     raw::RawTable,
//! };
//!
//! let raw = RawTable::new(
//!     ["Store", "DayOfWeek", "Date", "Customers", "Open", "Promo", "StateHoliday", "SchoolHoliday"],
//!     vec![
//!         vec!["1", "5", "2015-07-31", "555", "1", "1", "0", "1"],
//!         vec!["2", "5", "2015-07-31", "625", "1", "1", "0", "1"],
//!     ],
//! )
//! .unwrap();
//!
//! let config = FeatureConfig::default();
//! let table = normalize(&raw, &config, false).unwrap();
//! let table = align(&table, &config.required_columns());
//! assert!(table.has_column("Day_7"));
//! assert!(table.has_column("StateHoliday_c"));
//!
//! let stores = partition(&table, &config.entity_column).unwrap();
//! assert_eq!(stores.len(), 2);
//! ```

use self::feature::RecordId;

pub mod align;
pub mod feature;
pub mod normalize;
pub mod partition;
pub mod raw;

/// Structural problems with a table: missing or duplicated columns, unparsable
/// cells, or train/test feature sets that do not agree.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum SchemaError {
    #[display("column '{column}' not found")]
    MissingColumn { column: String },
    #[display("column '{column}' appears more than once")]
    DuplicateColumn { column: String },
    #[display("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[display("column '{column}' has {found} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[display("invalid value '{value}' in column '{column}' at row {row}")]
    InvalidNumber {
        column: String,
        row: usize,
        value: String,
    },
    #[display("zero floor must be a positive finite number, got {value}")]
    InvalidZeroFloor { value: f64 },
    #[display("key '{value}' appears more than once in join column '{column}'")]
    DuplicateKey { column: String, value: String },
    #[display("record {record} has invalid entity id {value}")]
    InvalidEntity { record: RecordId, value: f64 },
    #[display(
        "train/test feature schemas differ: missing in test {missing_in_test:?}, missing in train {missing_in_train:?}"
    )]
    Misaligned {
        missing_in_test: Vec<String>,
        missing_in_train: Vec<String>,
    },
}
