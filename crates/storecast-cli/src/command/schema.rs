use std::path::PathBuf;

use anyhow::Context;
use storecast_training::{pipeline, segment::SegmentOptions};

use crate::{
    schema::report::SchemaReport,
    util::{self, Output},
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SchemaArg {
    /// Training records (CSV, including the sales column)
    #[arg(long)]
    train: PathBuf,
    /// Records to forecast (CSV)
    #[arg(long)]
    test: PathBuf,
    /// Store attributes joined onto both inputs by store id (CSV)
    #[arg(long)]
    stores: Option<PathBuf>,
    /// Pipeline configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output file path [default: stdout]
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &SchemaArg) -> anyhow::Result<()> {
    let config = util::read_config_file(arg.config.as_deref())?;
    let (train, test) = util::read_inputs(
        &arg.train,
        &arg.test,
        arg.stores.as_deref(),
        &config.features.entity_column,
    )?;

    let prepared = pipeline::prepare(&train, &test, &config.features)
        .context("Failed to prepare feature tables")?;
    let options = SegmentOptions::from_config(&config);
    let (train_features, test_features) = prepared.feature_columns(&options);
    let report = SchemaReport::new(
        config.features.required_columns(),
        train_features,
        test_features,
    );
    if report.is_aligned() {
        tracing::info!(features = report.train_features.len(), "schemas aligned");
    } else {
        tracing::warn!(
            missing_in_test = ?report.missing_in_test,
            missing_in_train = ?report.missing_in_train,
            "schemas differ"
        );
    }
    Output::save_json(&report, arg.output.clone())
}
