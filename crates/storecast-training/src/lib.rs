//! Per-store training and submission assembly.
//!
//! This crate drives a forecasting run end to end: it prepares both sides with
//! `storecast-table`, fits one `storecast-model` regressor per store, and
//! assembles the predictions and closed-store overrides into one submission.
//!
//! # Run Flow
//!
//! ```text
//! train RawTable            test RawTable
//!     ↓ normalize + align       ↓ normalize + align
//!     ↓ retain_open             ↓ split_closed ──→ closed record ids
//!     ↓ partition               ↓ partition
//!     └──────────→ train_predict ←┘
//!                      ↓ per-store predictions (log space) + failures
//!                 assemble (inverse transform, overrides)
//!                      ↓
//!                  Submission
//! ```
//!
//! - [`config`]: [`PipelineConfig`](config::PipelineConfig) and its policy enums
//! - [`segment`]: the per-store worker pool and the fallback for stores that
//!   cannot be fitted
//! - [`submission`]: merging predictions and overrides into output rows
//! - [`pipeline`]: the whole run, from raw tables to a checked submission
//!
//! # Failure Handling
//!
//! Structural problems ([`SchemaError`], [`PartitionError`],
//! [`DuplicateIdentityError`]) abort the run. A [`ModelFitError`] only affects
//! the store it happened in; that store's rows go through the configured
//! [`FallbackPolicy`](config::FallbackPolicy) and the failure is reported in
//! the run outcome. Rows that no model can be fitted for, not even a pooled
//! one, receive the override constant.

use storecast_model::ModelFitError;
use storecast_table::{SchemaError, feature::EntityId};

pub use self::submission::DuplicateIdentityError;

pub mod config;
pub mod pipeline;
pub mod segment;
pub mod submission;

/// A store has rows to predict but no open training rows.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
#[display("store {entity} has test rows but no open training rows")]
pub struct PartitionError {
    pub entity: EntityId,
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    derive_more::Display,
    derive_more::Error,
    derive_more::From,
)]
pub enum PipelineError {
    #[display("schema error: {_0}")]
    Schema(SchemaError),
    #[display("{_0}")]
    Partition(PartitionError),
    #[display("model fit failed: {_0}")]
    ModelFit(ModelFitError),
    #[display("{_0}")]
    DuplicateIdentity(DuplicateIdentityError),
    #[display("submission has {found} rows, expected one per test record ({expected})")]
    #[from(skip)]
    IncompleteSubmission { expected: usize, found: usize },
}
