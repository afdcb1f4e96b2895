//! A complete forecasting run over raw training and test tables.

use std::collections::BTreeMap;

use storecast_table::{
    SchemaError,
    align::align,
    feature::{EntityId, FeatureTable, RecordId},
    normalize::{FeatureConfig, normalize},
    partition::{partition, retain_open, split_closed},
    raw::RawTable,
};

use crate::{
    PipelineError,
    config::{PipelineConfig, TrainingMode},
    segment::{SegmentOptions, SegmentOutcome, train_pooled, train_predict},
    submission::{Submission, assemble},
};

/// Normalized and aligned feature tables for both sides of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTables {
    pub train: FeatureTable,
    pub test: FeatureTable,
}

impl PreparedTables {
    /// Feature columns models would be fitted on (training side) and applied
    /// to (test side).
    #[must_use]
    pub fn feature_columns(&self, options: &SegmentOptions) -> (Vec<String>, Vec<String>) {
        (
            self.train.columns_except(&options.train_excluded()),
            self.test.columns_except(&options.test_excluded()),
        )
    }
}

/// Normalizes both raw tables and aligns them to the configured indicator set.
pub fn prepare(
    train: &RawTable,
    test: &RawTable,
    features: &FeatureConfig,
) -> Result<PreparedTables, SchemaError> {
    let required = features.required_columns();
    let train = align(&normalize(train, features, true)?, &required);
    let test = align(&normalize(test, features, false)?, &required);
    Ok(PreparedTables { train, test })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub submission: Submission,
    pub segments: SegmentOutcome,
    /// Test records whose store was closed
    pub closed: Vec<RecordId>,
}

impl RunOutcome {
    /// Number of models fitted or attempted, pooled fallback excluded.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.scores.len() + self.segments.failures.len()
    }
}

/// Runs the whole forecast: preparation, closed-store split, training and
/// assembly.
///
/// # Errors
///
/// Any [`PipelineError`] except model fit failures. Per-store failures are
/// resolved by [`PipelineConfig::fallback`]; rows no model could be fitted
/// for receive the override constant. Both are reported in
/// [`RunOutcome::segments`]. The assembled submission is checked to hold exactly one row per test
/// record.
pub fn run(
    train: &RawTable,
    test: &RawTable,
    config: &PipelineConfig,
) -> Result<RunOutcome, PipelineError> {
    let features = &config.features;
    let options = SegmentOptions::from_config(config);
    tracing::info!(
        train_rows = train.len(),
        test_rows = test.len(),
        "preparing features"
    );
    let prepared = prepare(train, test, features)?;

    let train_open = retain_open(&prepared.train, &features.open_column)?;
    let (closed, test_open) = split_closed(&prepared.test, &features.open_column)?;
    tracing::info!(
        train_open = train_open.len(),
        test_open = test_open.len(),
        test_closed = closed.len(),
        "split closed stores"
    );

    let segments = match config.mode {
        TrainingMode::PerStore => {
            let train_parts = partition(&train_open, &features.entity_column)?;
            let test_parts: BTreeMap<EntityId, FeatureTable> =
                partition(&test_open, &features.entity_column)?;
            train_predict(&train_parts, &test_parts, &config.model, &options)?
        }
        TrainingMode::Pooled => train_pooled(&train_open, &test_open, &config.model, &options)?,
    };

    let override_ids = closed
        .iter()
        .chain(&segments.overrides)
        .copied()
        .collect::<Vec<_>>();
    let submission = assemble(
        &override_ids,
        &segments.predictions,
        &features.target_transform()?,
        config.override_constant,
    )?;
    if submission.len() != test.len() {
        return Err(PipelineError::IncompleteSubmission {
            expected: test.len(),
            found: submission.len(),
        });
    }
    tracing::info!(
        predicted = submission.predicted,
        overridden = submission.overridden,
        "assembled submission"
    );

    Ok(RunOutcome {
        submission,
        segments,
        closed,
    })
}
