//! Closed-store handling and per-store grouping.
//!
//! Closed days never reach a model: on the training side they are dropped
//! because they do not reflect demand, on the test side they are set aside and
//! later receive a fixed override value instead of a prediction.

use std::collections::BTreeMap;

use crate::{
    SchemaError,
    feature::{EntityId, FeatureTable, RecordId},
};

/// Keeps only the rows whose open flag is non-zero. The flag column stays.
pub fn retain_open(table: &FeatureTable, open_column: &str) -> Result<FeatureTable, SchemaError> {
    let open = table.require_column(open_column)?;
    Ok(table.filter_rows(|i| is_open(open[i])))
}

/// Splits a test table into the identities of closed records and a table of
/// open records without the flag column.
///
/// # Examples
///
/// ```
/// use storecast_table::{feature::{FeatureTable, RecordId}, partition::split_closed};
///
/// let table = FeatureTable::from_columns(
///     vec![RecordId(0), RecordId(1), RecordId(2)],
///     [("Store", vec![1.0, 2.0, 1.0]), ("Open", vec![1.0, 0.0, 1.0])],
/// )
/// .unwrap();
///
/// let (closed, open) = split_closed(&table, "Open").unwrap();
/// assert_eq!(closed, [RecordId(1)]);
/// assert_eq!(open.record_ids(), [RecordId(0), RecordId(2)]);
/// assert!(!open.has_column("Open"));
/// ```
pub fn split_closed(
    table: &FeatureTable,
    open_column: &str,
) -> Result<(Vec<RecordId>, FeatureTable), SchemaError> {
    let open = table.require_column(open_column)?;
    let closed_ids = table
        .record_ids()
        .iter()
        .zip(open)
        .filter(|(_, flag)| !is_open(**flag))
        .map(|(id, _)| *id)
        .collect();
    let open_table = table
        .filter_rows(|i| is_open(open[i]))
        .without_column(open_column);
    Ok((closed_ids, open_table))
}

/// Groups rows by store id, preserving row order and record identity.
///
/// # Errors
///
/// * [`SchemaError::MissingColumn`] if `entity_column` is absent
/// * [`SchemaError::InvalidEntity`] if a store id is not an integer
pub fn partition(
    table: &FeatureTable,
    entity_column: &str,
) -> Result<BTreeMap<EntityId, FeatureTable>, SchemaError> {
    let entities = table.require_column(entity_column)?;
    let mut positions = BTreeMap::<EntityId, Vec<usize>>::new();
    for (i, (&value, &record)) in entities.iter().zip(table.record_ids()).enumerate() {
        let entity = entity_id(value).ok_or(SchemaError::InvalidEntity { record, value })?;
        positions.entry(entity).or_default().push(i);
    }
    Ok(positions
        .into_iter()
        .map(|(entity, positions)| (entity, table.select_rows(&positions)))
        .collect())
}

fn is_open(flag: f64) -> bool {
    flag != 0.0
}

#[expect(clippy::cast_possible_truncation)]
fn entity_id(value: f64) -> Option<EntityId> {
    #[expect(clippy::cast_precision_loss)]
    let in_range = value.abs() < i64::MAX as f64;
    (value.is_finite() && value.fract() == 0.0 && in_range).then(|| EntityId(value as i64))
}
