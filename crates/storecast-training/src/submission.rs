//! Merging open-store predictions and overrides into submission rows.
//!
//! Rows come out in two groups. Predicted records come first, ascending by
//! record identity, carrying the inverse-transformed prediction. Overridden
//! records (closed stores, plus stores whose fit failed under
//! [`FallbackPolicy::Override`](crate::config::FallbackPolicy::Override))
//! follow, also ascending, carrying the override constant. Each row's `Id` is
//! the record identity plus one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use storecast_table::{feature::RecordId, normalize::LogTransform};

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
#[display("record {record} has both a prediction and an override")]
pub struct DuplicateIdentityError {
    pub record: RecordId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRow {
    #[serde(rename = "Id")]
    pub id: usize,
    #[serde(rename = "Sales")]
    pub sales: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub rows: Vec<SubmissionRow>,
    /// Rows carrying a model prediction
    pub predicted: usize,
    /// Rows carrying the override constant
    pub overridden: usize,
}

impl Submission {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Builds the submission from log-space `predictions` and the records that get
/// `override_constant`.
///
/// # Errors
///
/// [`DuplicateIdentityError`] if a record is both predicted and overridden.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use storecast_table::{feature::RecordId, normalize::LogTransform};
/// use storecast_training::submission::{SubmissionRow, assemble};
///
/// let predictions = BTreeMap::from([(RecordId(0), 3.0)]);
/// let transform = LogTransform::new(0.0001).unwrap();
/// let submission = assemble(&[RecordId(1)], &predictions, &transform, 1.0).unwrap();
///
/// assert_eq!(
///     submission.rows,
///     [
///         SubmissionRow { id: 1, sales: 8.0 },
///         SubmissionRow { id: 2, sales: 1.0 },
///     ]
/// );
/// ```
pub fn assemble(
    override_ids: &[RecordId],
    predictions: &BTreeMap<RecordId, f64>,
    transform: &LogTransform,
    override_constant: f64,
) -> Result<Submission, DuplicateIdentityError> {
    let overrides = override_ids.iter().copied().collect::<BTreeSet<_>>();
    if let Some(&record) = overrides.iter().find(|id| predictions.contains_key(id)) {
        return Err(DuplicateIdentityError { record });
    }

    let rows = predictions
        .iter()
        .map(|(id, value)| SubmissionRow {
            id: id.0 + 1,
            sales: transform.inverse(*value),
        })
        .chain(overrides.iter().map(|id| SubmissionRow {
            id: id.0 + 1,
            sales: override_constant,
        }))
        .collect();

    Ok(Submission {
        rows,
        predicted: predictions.len(),
        overridden: overrides.len(),
    })
}
