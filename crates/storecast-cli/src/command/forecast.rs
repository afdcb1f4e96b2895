use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use storecast_model::{
    forest::ForestParams,
    kind::ModelKind,
    linear::LinearParams,
};
use storecast_training::{
    config::{FallbackPolicy, PipelineConfig, TrainingMode},
    pipeline,
};

use crate::{
    schema::summary::RunSummary,
    util::{self, Output},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ModelArg {
    Linear,
    Forest,
}

impl ModelArg {
    /// Keeps the configured parameters when the kind already matches.
    fn apply(self, current: ModelKind) -> ModelKind {
        match (self, current) {
            (Self::Linear, kind @ ModelKind::Linear(_))
            | (Self::Forest, kind @ ModelKind::Forest(_)) => kind,
            (Self::Linear, _) => ModelKind::Linear(LinearParams::default()),
            (Self::Forest, _) => ModelKind::Forest(ForestParams::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ModeArg {
    PerStore,
    Pooled,
}

impl From<ModeArg> for TrainingMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::PerStore => Self::PerStore,
            ModeArg::Pooled => Self::Pooled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum FallbackArg {
    Pooled,
    Override,
}

impl From<FallbackArg> for FallbackPolicy {
    fn from(arg: FallbackArg) -> Self {
        match arg {
            FallbackArg::Pooled => Self::Pooled,
            FallbackArg::Override => Self::Override,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ForecastArg {
    /// Training records (CSV, including the sales column)
    #[arg(long)]
    train: PathBuf,
    /// Records to forecast (CSV)
    #[arg(long)]
    test: PathBuf,
    /// Store attributes joined onto both inputs by store id (CSV)
    #[arg(long)]
    stores: Option<PathBuf>,
    /// Pipeline configuration (JSON); missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Submission output path [default: stdout]
    #[arg(long)]
    output: Option<PathBuf>,
    /// Write a JSON run summary to this path (`-` for stdout)
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Regression model, overriding the configuration file
    #[arg(long, value_enum)]
    model: Option<ModelArg>,
    /// Training mode, overriding the configuration file
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// Handling of stores whose model cannot be fitted
    #[arg(long, value_enum)]
    fallback: Option<FallbackArg>,
    /// Worker threads for per-store training [default: available parallelism]
    #[arg(long)]
    workers: Option<usize>,
}

impl ForecastArg {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = util::read_config_file(self.config.as_deref())?;
        if let Some(model) = self.model {
            config.model = model.apply(config.model);
        }
        if let Some(mode) = self.mode {
            config.mode = mode.into();
        }
        if let Some(fallback) = self.fallback {
            config.fallback = fallback.into();
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        Ok(config)
    }
}

pub(crate) fn run(arg: &ForecastArg) -> anyhow::Result<()> {
    let config = arg.pipeline_config()?;
    let (train, test) = util::read_inputs(
        &arg.train,
        &arg.test,
        arg.stores.as_deref(),
        &config.features.entity_column,
    )?;

    let started_at = Utc::now();
    let outcome = pipeline::run(&train, &test, &config).context("Forecast failed")?;

    let mut output = Output::from_output_path(arg.output.clone())?;
    output.write_csv(&outcome.submission.rows)?;
    tracing::info!(
        rows = outcome.submission.len(),
        path = %output.display_path(),
        "wrote submission"
    );

    if let Some(path) = &arg.summary {
        let summary = RunSummary::new(started_at, &config, &outcome);
        Output::save_json(&summary, Some(path.clone()))?;
    }
    Ok(())
}
