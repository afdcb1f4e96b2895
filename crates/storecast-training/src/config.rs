use std::{num::NonZeroUsize, thread};

use serde::{Deserialize, Serialize};
use storecast_model::kind::ModelKind;
use storecast_table::normalize::FeatureConfig;

/// How training rows are grouped into models.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum TrainingMode {
    /// One model per store
    #[default]
    #[display("per-store")]
    PerStore,
    /// One model over every open training row
    #[display("pooled")]
    Pooled,
}

/// What happens to the test rows of a store whose model could not be fitted.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Predict them with a model fitted on all open training rows
    #[default]
    #[display("pooled")]
    Pooled,
    /// Emit the override constant, like closed stores
    #[display("override")]
    Override,
}

/// Every tunable of a forecasting run.
///
/// All fields are optional in JSON; missing ones take their defaults.
///
/// ```json
/// {
///   "model": { "kind": "forest", "trees": 50 },
///   "mode": "per-store",
///   "fallback": "override",
///   "workers": 4
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub model: ModelKind,
    pub mode: TrainingMode,
    pub fallback: FallbackPolicy,
    /// Sales value reported for closed-store records
    pub override_constant: f64,
    /// Stores with fewer open training rows are not fitted individually
    pub min_training_rows: usize,
    /// Worker threads for per-store training; `None` uses available parallelism
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            model: ModelKind::default(),
            mode: TrainingMode::default(),
            fallback: FallbackPolicy::default(),
            override_constant: 1.0,
            min_training_rows: 2,
            workers: None,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|&n| n > 0)
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }
}
