//! Per-store model fitting.
//!
//! [`train_predict`] fits one fresh model per store that has test rows, on
//! that store's open training rows only, and predicts the store's open test
//! rows. Stores are spread over a fixed number of scoped worker threads. Each
//! worker returns its own results and the caller merges them in store order,
//! so the outcome does not depend on the worker count.
//!
//! # Feature Columns
//!
//! Training features are every column except the target, store and open-flag
//! columns; test features are every column except the store and open-flag
//! columns. Both sets must be equal. Test columns are read in training column
//! order, so their physical order does not matter.
//!
//! # Fallback
//!
//! A store whose model cannot be fitted (too few rows, singular system, ...)
//! does not stop the others. After all stores are done its test rows either
//! get predictions from one pooled model fitted on every open training row
//! ([`FallbackPolicy::Pooled`]) or are marked for the override constant
//! ([`FallbackPolicy::Override`]). When the pooled model cannot be fitted
//! either, those rows are marked for the override constant as well and the
//! error is kept in [`SegmentOutcome::pooled_error`].

use std::{collections::BTreeMap, panic, thread};

use serde::Serialize;
use storecast_model::{Matrix, ModelFactory, ModelFitError};
use storecast_stats::{descriptive::DescriptiveStats, percentiles::Percentiles};
use storecast_table::{
    SchemaError,
    align::SchemaDiff,
    feature::{EntityId, FeatureTable, RecordId},
};

use crate::{
    PartitionError, PipelineError,
    config::{FallbackPolicy, PipelineConfig},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentOptions {
    pub target_column: String,
    pub entity_column: String,
    pub open_column: String,
    pub min_training_rows: usize,
    pub fallback: FallbackPolicy,
    pub workers: usize,
}

impl SegmentOptions {
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            target_column: config.features.target_column.clone(),
            entity_column: config.features.entity_column.clone(),
            open_column: config.features.open_column.clone(),
            min_training_rows: config.min_training_rows,
            fallback: config.fallback,
            workers: config.worker_count(),
        }
    }

    pub(crate) fn train_excluded(&self) -> [&str; 3] {
        [
            self.target_column.as_str(),
            self.entity_column.as_str(),
            self.open_column.as_str(),
        ]
    }

    pub(crate) fn test_excluded(&self) -> [&str; 2] {
        [self.entity_column.as_str(), self.open_column.as_str()]
    }
}

/// The rows a model was fitted on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum Segment {
    #[display("store {_0}")]
    Entity(EntityId),
    #[display("pooled")]
    Pooled,
}

/// Training-set R² of one fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentScore {
    pub segment: Segment,
    pub training_rows: usize,
    pub score: f64,
}

/// A store whose model could not be fitted.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFailure {
    pub entity: EntityId,
    pub error: ModelFitError,
    /// Test records of the store, resolved through the fallback policy
    pub records: Vec<RecordId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentOutcome {
    /// Feature columns in the order the models saw them
    pub feature_columns: Vec<String>,
    /// Log-space predictions keyed by record identity
    pub predictions: BTreeMap<RecordId, f64>,
    /// One score per successfully fitted store, in store order
    pub scores: Vec<SegmentScore>,
    pub failures: Vec<SegmentFailure>,
    /// Score of the pooled fallback model, when one was needed
    pub fallback_score: Option<SegmentScore>,
    /// Records that must receive the override constant
    pub overrides: Vec<RecordId>,
    /// Why the pooled model (pooled mode or fallback) could not be fitted
    pub pooled_error: Option<ModelFitError>,
}

impl SegmentOutcome {
    /// Summary of the per-store training scores.
    #[must_use]
    pub fn score_stats(&self) -> Option<DescriptiveStats> {
        DescriptiveStats::new(self.scores.iter().map(|s| s.score))
    }

    /// Nearest-rank percentiles of the per-store training scores.
    #[must_use]
    pub fn score_percentiles(&self, points: &[f64]) -> Option<Percentiles> {
        let scores = self
            .scores
            .iter()
            .map(|s| s.score)
            .filter(|s| s.is_finite())
            .collect::<Vec<_>>();
        (!scores.is_empty()).then(|| Percentiles::new(&scores, points))
    }
}

struct Job<'a> {
    entity: EntityId,
    train: &'a FeatureTable,
    test: &'a FeatureTable,
    features: Vec<String>,
}

struct SegmentFit {
    score: SegmentScore,
    predictions: Vec<(RecordId, f64)>,
}

/// Fits and predicts every store present in `test`.
///
/// # Errors
///
/// * [`PipelineError::Partition`] if a test store has no training partition;
///   checked before any model is fitted
/// * [`PipelineError::Schema`] if a store's train and test feature sets differ
pub fn train_predict(
    train: &BTreeMap<EntityId, FeatureTable>,
    test: &BTreeMap<EntityId, FeatureTable>,
    factory: &dyn ModelFactory,
    options: &SegmentOptions,
) -> Result<SegmentOutcome, PipelineError> {
    if let Some(&entity) = test.keys().find(|e| !train.contains_key(e)) {
        return Err(PartitionError { entity }.into());
    }

    let mut jobs = Vec::with_capacity(test.len());
    for (&entity, test_table) in test {
        let train_table = &train[&entity];
        let features = feature_columns(train_table, test_table, options)?;
        jobs.push(Job {
            entity,
            train: train_table,
            test: test_table,
            features,
        });
    }

    let mut outcome = SegmentOutcome::default();
    let Some(first) = jobs.first() else {
        return Ok(outcome);
    };
    outcome.feature_columns = first.features.clone();
    tracing::info!(
        model = factory.name(),
        stores = jobs.len(),
        features = ?outcome.feature_columns,
        "training per-store models"
    );

    for (job, result) in run_workers(jobs, factory, options) {
        match result {
            Ok(fit) => {
                tracing::debug!(
                    store = %job.entity,
                    rows = fit.score.training_rows,
                    score = fit.score.score,
                    "fitted store model"
                );
                outcome.predictions.extend(fit.predictions);
                outcome.scores.push(fit.score);
            }
            Err(PipelineError::ModelFit(error)) => {
                tracing::warn!(
                    store = %job.entity,
                    %error,
                    fallback = %options.fallback,
                    "store model not fitted"
                );
                outcome.failures.push(SegmentFailure {
                    entity: job.entity,
                    error,
                    records: job.test.record_ids().to_vec(),
                });
            }
            Err(error) => return Err(error),
        }
    }

    if let Some(stats) = outcome.score_stats() {
        tracing::info!(
            mean = stats.mean,
            std_dev = stats.std_dev,
            stores = stats.count,
            "training scores"
        );
    }

    resolve_failures(&mut outcome, train, test, factory, options)?;
    Ok(outcome)
}

/// Fits a single model over all of `train` and predicts all of `test`.
///
/// If the model cannot be fitted, every test record is marked for the
/// override constant.
///
/// # Errors
///
/// [`PipelineError::Schema`] if the feature sets differ.
pub fn train_pooled(
    train: &FeatureTable,
    test: &FeatureTable,
    factory: &dyn ModelFactory,
    options: &SegmentOptions,
) -> Result<SegmentOutcome, PipelineError> {
    let features = feature_columns(train, test, options)?;
    tracing::info!(
        model = factory.name(),
        rows = train.len(),
        features = ?features,
        "training pooled model"
    );
    let mut outcome = SegmentOutcome {
        feature_columns: features,
        ..SegmentOutcome::default()
    };
    if test.is_empty() {
        return Ok(outcome);
    }
    match fit_segment(
        Segment::Pooled,
        train,
        test,
        &outcome.feature_columns,
        factory,
        options,
    ) {
        Ok(fit) => {
            tracing::info!(score = fit.score.score, "training score");
            outcome.predictions.extend(fit.predictions);
            outcome.scores.push(fit.score);
        }
        Err(PipelineError::ModelFit(error)) => {
            tracing::warn!(rows = test.len(), %error, "pooled model not fitted");
            outcome.overrides.extend_from_slice(test.record_ids());
            outcome.pooled_error = Some(error);
        }
        Err(error) => return Err(error),
    }
    Ok(outcome)
}

fn feature_columns(
    train: &FeatureTable,
    test: &FeatureTable,
    options: &SegmentOptions,
) -> Result<Vec<String>, SchemaError> {
    let train_features = train.columns_except(&options.train_excluded());
    let test_features = test.columns_except(&options.test_excluded());
    SchemaDiff::between(&train_features, &test_features).into_result()?;
    Ok(train_features)
}

/// Runs `jobs` on scoped workers and returns the results in job order.
fn run_workers<'a>(
    jobs: Vec<Job<'a>>,
    factory: &dyn ModelFactory,
    options: &SegmentOptions,
) -> Vec<(Job<'a>, Result<SegmentFit, PipelineError>)> {
    let workers = options.workers.clamp(1, jobs.len().max(1));
    let mut buckets = (0..workers).map(|_| vec![]).collect::<Vec<_>>();
    for (i, job) in jobs.into_iter().enumerate() {
        buckets[i % workers].push((i, job));
    }

    let mut results = thread::scope(|s| {
        let handles = buckets
            .into_iter()
            .map(|bucket| {
                s.spawn(move || {
                    bucket
                        .into_iter()
                        .map(|(i, job)| {
                            let result = fit_segment(
                                Segment::Entity(job.entity),
                                job.train,
                                job.test,
                                &job.features,
                                factory,
                                options,
                            );
                            (i, job, result)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
            .collect::<Vec<_>>()
    });
    results.sort_by_key(|(i, _, _)| *i);
    results
        .into_iter()
        .map(|(_, job, result)| (job, result))
        .collect()
}

fn fit_segment(
    segment: Segment,
    train: &FeatureTable,
    test: &FeatureTable,
    features: &[String],
    factory: &dyn ModelFactory,
    options: &SegmentOptions,
) -> Result<SegmentFit, PipelineError> {
    let rows = train.len();
    let min = options.min_training_rows.max(1);
    if rows < min {
        return Err(ModelFitError::TooFewRows { rows, min }.into());
    }
    let x = Matrix::new(rows, features.len(), train.to_row_major(features)?)?;
    let y = train.require_column(&options.target_column)?;

    let mut model = factory.create();
    model.fit(&x, y)?;
    let score = model.score(&x, y)?;

    let test_x = Matrix::new(test.len(), features.len(), test.to_row_major(features)?)?;
    let predicted = model.predict(&test_x)?;

    Ok(SegmentFit {
        score: SegmentScore {
            segment,
            training_rows: rows,
            score,
        },
        predictions: test.record_ids().iter().copied().zip(predicted).collect(),
    })
}

fn resolve_failures(
    outcome: &mut SegmentOutcome,
    train: &BTreeMap<EntityId, FeatureTable>,
    test: &BTreeMap<EntityId, FeatureTable>,
    factory: &dyn ModelFactory,
    options: &SegmentOptions,
) -> Result<(), PipelineError> {
    if outcome.failures.is_empty() {
        return Ok(());
    }
    match options.fallback {
        FallbackPolicy::Override => {
            outcome
                .overrides
                .extend(outcome.failures.iter().flat_map(|f| f.records.iter().copied()));
        }
        FallbackPolicy::Pooled => {
            let pooled_train = FeatureTable::concat(&train.values().cloned().collect::<Vec<_>>())?;
            let failed_test = outcome
                .failures
                .iter()
                .map(|f| test[&f.entity].clone())
                .collect::<Vec<_>>();
            let pooled_test = FeatureTable::concat(&failed_test)?;
            match fit_segment(
                Segment::Pooled,
                &pooled_train,
                &pooled_test,
                &outcome.feature_columns,
                factory,
                options,
            ) {
                Ok(fit) => {
                    tracing::info!(
                        stores = outcome.failures.len(),
                        rows = pooled_test.len(),
                        score = fit.score.score,
                        "predicted unfitted stores with pooled model"
                    );
                    outcome.predictions.extend(fit.predictions);
                    outcome.fallback_score = Some(fit.score);
                }
                Err(PipelineError::ModelFit(error)) => {
                    tracing::warn!(
                        stores = outcome.failures.len(),
                        rows = pooled_test.len(),
                        %error,
                        "pooled fallback model not fitted, overriding"
                    );
                    outcome
                        .overrides
                        .extend_from_slice(pooled_test.record_ids());
                    outcome.pooled_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use storecast_model::kind::ModelKind;

    use super::*;

    fn options(fallback: FallbackPolicy, workers: usize) -> SegmentOptions {
        SegmentOptions {
            fallback,
            workers,
            ..SegmentOptions::from_config(&PipelineConfig::default())
        }
    }

    fn train_table(first_id: usize, store: f64, x: &[f64], sales: &[f64]) -> FeatureTable {
        let ids = (first_id..first_id + x.len()).map(RecordId).collect();
        FeatureTable::from_columns(
            ids,
            [
                ("Store", vec![store; x.len()]),
                ("Sales", sales.to_vec()),
                ("x", x.to_vec()),
                ("Open", vec![1.0; x.len()]),
            ],
        )
        .unwrap()
    }

    fn test_table(first_id: usize, store: f64, x: &[f64]) -> FeatureTable {
        let ids = (first_id..first_id + x.len()).map(RecordId).collect();
        FeatureTable::from_columns(ids, [("x", x.to_vec()), ("Store", vec![store; x.len()])])
            .unwrap()
    }

    fn two_stores() -> (
        BTreeMap<EntityId, FeatureTable>,
        BTreeMap<EntityId, FeatureTable>,
    ) {
        let train = BTreeMap::from([
            (
                EntityId(1),
                train_table(0, 1.0, &[1.0, 2.0, 3.0], &[3.0, 5.0, 7.0]),
            ),
            (EntityId(2), train_table(3, 2.0, &[1.0, 2.0], &[10.0, 20.0])),
        ]);
        let test = BTreeMap::from([
            (EntityId(1), test_table(0, 1.0, &[4.0])),
            (EntityId(2), test_table(1, 2.0, &[3.0, 0.0])),
        ]);
        (train, test)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_one_model_per_store() {
        let (train, test) = two_stores();
        let outcome = train_predict(
            &train,
            &test,
            &ModelKind::default(),
            &options(FallbackPolicy::Pooled, 2),
        )
        .unwrap();

        assert_eq!(outcome.feature_columns, ["x"]);
        assert!(close(outcome.predictions[&RecordId(0)], 9.0));
        assert!(close(outcome.predictions[&RecordId(1)], 30.0));
        assert!(close(outcome.predictions[&RecordId(2)], 0.0));
        assert_eq!(
            outcome.scores.iter().map(|s| s.segment).collect::<Vec<_>>(),
            [Segment::Entity(EntityId(1)), Segment::Entity(EntityId(2))]
        );
        assert!(outcome.scores.iter().all(|s| close(s.score, 1.0)));
        assert!(outcome.failures.is_empty());
        assert!(outcome.overrides.is_empty());
        assert!(close(outcome.score_stats().unwrap().mean, 1.0));
        let percentiles = outcome.score_percentiles(&[50.0]).unwrap();
        assert!(close(percentiles.get(50.0).unwrap(), 1.0));
        assert!(SegmentOutcome::default().score_percentiles(&[50.0]).is_none());
    }

    #[test]
    fn test_training_stores_without_test_rows_are_skipped() {
        let (train, mut test) = two_stores();
        test.remove(&EntityId(2));
        let outcome = train_predict(
            &train,
            &test,
            &ModelKind::default(),
            &options(FallbackPolicy::Pooled, 1),
        )
        .unwrap();
        assert_eq!(outcome.scores.len(), 1);
        assert_eq!(outcome.predictions.len(), 1);
    }

    #[test]
    fn test_store_missing_from_training() {
        let (mut train, test) = two_stores();
        train.remove(&EntityId(2));
        assert_eq!(
            train_predict(
                &train,
                &test,
                &ModelKind::default(),
                &options(FallbackPolicy::Pooled, 1)
            ),
            Err(PipelineError::Partition(PartitionError {
                entity: EntityId(2)
            }))
        );
    }

    #[test]
    fn test_feature_mismatch() {
        let (train, mut test) = two_stores();
        let extra = test[&EntityId(1)]
            .clone()
            .with_column("Promo", vec![1.0])
            .unwrap();
        test.insert(EntityId(1), extra);
        let result = train_predict(
            &train,
            &test,
            &ModelKind::default(),
            &options(FallbackPolicy::Pooled, 1),
        );
        assert!(matches!(
            result,
            Err(PipelineError::Schema(SchemaError::Misaligned { .. }))
        ));
    }

    #[test]
    fn test_failed_store_uses_pooled_model() {
        let (mut train, test) = two_stores();
        train.insert(EntityId(2), train_table(3, 2.0, &[5.0], &[11.0]));
        let outcome = train_predict(
            &train,
            &test,
            &ModelKind::default(),
            &options(FallbackPolicy::Pooled, 2),
        )
        .unwrap();

        assert_eq!(outcome.scores.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].entity, EntityId(2));
        assert_eq!(
            outcome.failures[0].error,
            ModelFitError::TooFewRows { rows: 1, min: 2 }
        );
        assert_eq!(outcome.failures[0].records, [RecordId(1), RecordId(2)]);
        // pooled rows lie on y = 2x + 1
        assert!(close(outcome.predictions[&RecordId(1)], 7.0));
        assert!(close(outcome.predictions[&RecordId(2)], 1.0));
        assert_eq!(
            outcome.fallback_score.map(|s| (s.segment, s.training_rows)),
            Some((Segment::Pooled, 4))
        );
        assert!(outcome.overrides.is_empty());
    }

    #[test]
    fn test_failed_store_overridden() {
        let (mut train, test) = two_stores();
        train.insert(EntityId(2), train_table(3, 2.0, &[5.0], &[11.0]));
        let outcome = train_predict(
            &train,
            &test,
            &ModelKind::default(),
            &options(FallbackPolicy::Override, 2),
        )
        .unwrap();

        assert_eq!(outcome.overrides, [RecordId(1), RecordId(2)]);
        assert_eq!(
            outcome.predictions.keys().copied().collect::<Vec<_>>(),
            [RecordId(0)]
        );
        assert!(outcome.fallback_score.is_none());
    }

    #[test]
    fn test_failed_pooled_fallback_overrides() {
        let (mut train, test) = two_stores();
        train.insert(EntityId(2), train_table(3, 2.0, &[5.0], &[11.0]));
        let options = SegmentOptions {
            min_training_rows: 5,
            ..options(FallbackPolicy::Pooled, 2)
        };
        let outcome = train_predict(&train, &test, &ModelKind::default(), &options).unwrap();

        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.predictions.is_empty());
        assert!(outcome.fallback_score.is_none());
        assert_eq!(outcome.overrides, [RecordId(0), RecordId(1), RecordId(2)]);
        assert_eq!(
            outcome.pooled_error,
            Some(ModelFitError::TooFewRows { rows: 4, min: 5 })
        );
    }

    #[test]
    fn test_result_independent_of_worker_count() {
        let mut train = BTreeMap::new();
        let mut test = BTreeMap::new();
        for store in 0..9_u8 {
            let s = f64::from(store);
            let x = [1.0, 2.0, 3.0, 4.0];
            let sales = x.map(|v| s * v + 1.0);
            let base = usize::from(store) * 4;
            train.insert(EntityId(i64::from(store)), train_table(base, s, &x, &sales));
            test.insert(
                EntityId(i64::from(store)),
                test_table(usize::from(store), s, &[s]),
            );
        }
        let run = |workers| {
            train_predict(
                &train,
                &test,
                &ModelKind::default(),
                &options(FallbackPolicy::Pooled, workers),
            )
            .unwrap()
        };
        let single = run(1);
        assert_eq!(single.predictions.len(), 9);
        assert_eq!(single, run(4));
        assert_eq!(single, run(32));
    }

    #[test]
    fn test_pooled_mode() {
        let (train, test) = two_stores();
        let train = FeatureTable::concat(&train.into_values().collect::<Vec<_>>()).unwrap();
        let test = FeatureTable::concat(&test.into_values().collect::<Vec<_>>()).unwrap();
        let outcome = train_pooled(
            &train,
            &test,
            &ModelKind::default(),
            &options(FallbackPolicy::Pooled, 1),
        )
        .unwrap();
        assert_eq!(outcome.predictions.len(), 3);
        assert_eq!(outcome.scores.len(), 1);
        assert_eq!(outcome.scores[0].segment, Segment::Pooled);
        assert_eq!(outcome.scores[0].training_rows, 5);
    }

    #[test]
    fn test_pooled_mode_with_nothing_to_predict() {
        let (train, _) = two_stores();
        let train = FeatureTable::concat(&train.into_values().collect::<Vec<_>>()).unwrap();
        let test = test_table(0, 1.0, &[]);
        let outcome = train_pooled(
            &train,
            &test,
            &ModelKind::default(),
            &options(FallbackPolicy::Pooled, 1),
        )
        .unwrap();
        assert!(outcome.predictions.is_empty());
        assert!(outcome.scores.is_empty());
    }

    #[test]
    fn test_pooled_mode_unfitted_overrides() {
        let (train, test) = two_stores();
        let train = FeatureTable::concat(&train.into_values().collect::<Vec<_>>()).unwrap();
        let test = FeatureTable::concat(&test.into_values().collect::<Vec<_>>()).unwrap();
        let options = SegmentOptions {
            min_training_rows: 10,
            ..options(FallbackPolicy::Pooled, 1)
        };
        let outcome = train_pooled(&train, &test, &ModelKind::default(), &options).unwrap();
        assert!(outcome.predictions.is_empty());
        assert_eq!(outcome.overrides, [RecordId(0), RecordId(1), RecordId(2)]);
        assert_eq!(
            outcome.pooled_error,
            Some(ModelFitError::TooFewRows { rows: 5, min: 10 })
        );
    }
}
