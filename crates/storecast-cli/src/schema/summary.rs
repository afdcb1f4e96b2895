use chrono::{DateTime, Utc};
use serde::Serialize;
use storecast_model::kind::ModelKind;
use storecast_stats::{descriptive::DescriptiveStats, percentiles::Percentiles};
use storecast_table::feature::EntityId;
use storecast_training::{
    config::{FallbackPolicy, PipelineConfig, TrainingMode},
    pipeline::RunOutcome,
    segment::SegmentScore,
};

const SCORE_PERCENTILES: [f64; 5] = [10.0, 25.0, 50.0, 75.0, 90.0];

/// Machine-readable record of one forecast run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub model: ModelKind,
    pub mode: TrainingMode,
    pub fallback: FallbackPolicy,
    pub feature_columns: Vec<String>,
    /// Stores a model was fitted or attempted for
    pub stores: usize,
    /// Training-set R² across stores; observational, not held-out quality
    pub scores: Option<DescriptiveStats>,
    pub score_percentiles: Option<Percentiles>,
    pub segment_scores: Vec<SegmentScore>,
    pub failures: Vec<FailureSummary>,
    pub fallback_score: Option<SegmentScore>,
    /// Pooled model error; its rows got the override constant
    pub pooled_error: Option<String>,
    pub rows: RowCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub store: EntityId,
    pub error: String,
    pub rows: usize,
    pub fallback: FallbackPolicy,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RowCounts {
    pub total: usize,
    pub predicted: usize,
    pub overridden: usize,
    pub closed: usize,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, config: &PipelineConfig, outcome: &RunOutcome) -> Self {
        let segments = &outcome.segments;
        Self {
            started_at,
            finished_at: Utc::now(),
            model: config.model,
            mode: config.mode,
            fallback: config.fallback,
            feature_columns: segments.feature_columns.clone(),
            stores: outcome.segment_count(),
            scores: segments.score_stats(),
            score_percentiles: segments.score_percentiles(&SCORE_PERCENTILES),
            segment_scores: segments.scores.clone(),
            failures: segments
                .failures
                .iter()
                .map(|f| FailureSummary {
                    store: f.entity,
                    error: f.error.to_string(),
                    rows: f.records.len(),
                    fallback: config.fallback,
                })
                .collect(),
            fallback_score: segments.fallback_score,
            pooled_error: segments.pooled_error.as_ref().map(ToString::to_string),
            rows: RowCounts {
                total: outcome.submission.len(),
                predicted: outcome.submission.predicted,
                overridden: outcome.submission.overridden,
                closed: outcome.closed.len(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use storecast_table::raw::RawTable;
    use storecast_training::pipeline;

    use super::*;

    #[test]
    fn test_summary_of_scenario_run() {
        let train = RawTable::new(
            ["Store", "DayOfWeek", "Sales", "Customers", "Open", "StateHoliday"],
            vec![
                vec!["1", "1", "8", "4", "1", "0"],
                vec!["1", "2", "16", "8", "1", "0"],
                vec!["2", "1", "9", "3", "1", "0"],
                vec!["1", "3", "32", "16", "1", "0"],
            ],
        )
        .unwrap();
        let test = RawTable::new(
            ["Id", "Store", "DayOfWeek", "Customers", "Open", "StateHoliday"],
            vec![
                vec!["1", "1", "4", "10", "1", "0"],
                vec!["2", "2", "4", "3", "1", "0"],
                vec!["3", "1", "4", "0", "0", "0"],
            ],
        )
        .unwrap();
        let config = PipelineConfig::default();
        let outcome = pipeline::run(&train, &test, &config).unwrap();
        let summary = RunSummary::new(Utc::now(), &config, &outcome);

        assert_eq!(summary.stores, 2);
        assert_eq!(summary.segment_scores.len(), 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].store, EntityId(2));
        assert!(summary.fallback_score.is_some());
        assert_eq!(summary.rows.total, 3);
        assert_eq!(summary.rows.predicted, 2);
        assert_eq!(summary.rows.closed, 1);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["model"]["kind"], "linear");
        assert_eq!(json["mode"], "per-store");
        assert_eq!(json["score_percentiles"]["values"].as_array().unwrap().len(), 5);
        assert_eq!(json["failures"][0]["store"], 2);
        assert_eq!(json["segment_scores"][0]["segment"]["entity"], 1);
        assert!(json["pooled_error"].is_null());
    }

    #[test]
    fn test_summary_reports_pooled_error() {
        let train = RawTable::new(
            ["Store", "DayOfWeek", "Sales", "Customers", "Open", "StateHoliday"],
            vec![vec!["1", "1", "8", "4", "1", "0"]],
        )
        .unwrap();
        let test = RawTable::new(
            ["Id", "Store", "DayOfWeek", "Customers", "Open", "StateHoliday"],
            vec![vec!["1", "1", "4", "10", "1", "0"]],
        )
        .unwrap();
        let config = PipelineConfig::default();
        let outcome = pipeline::run(&train, &test, &config).unwrap();
        let summary = RunSummary::new(Utc::now(), &config, &outcome);

        assert_eq!(
            summary.pooled_error.as_deref(),
            Some("1 training rows, at least 2 required")
        );
        assert!(summary.fallback_score.is_none());
        assert_eq!(summary.rows.overridden, 1);
        assert_eq!(summary.rows.predicted, 0);
    }
}
