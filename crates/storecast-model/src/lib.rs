//! Regression models behind a fit/predict/score capability.
//!
//! The training pipeline never names a concrete algorithm. It asks a
//! [`ModelFactory`] for a fresh [`Regressor`] per store, fits it on that store's
//! rows, predicts the store's test rows and records [`Regressor::score`] as a
//! diagnostic.
//!
//! # Architecture
//!
//! ```text
//! ModelKind (configuration)
//!     ↓ implements
//! ModelFactory::create()
//!     ↓ produces (one per store)
//! Box<dyn Regressor>
//!     ↓ fit(X, y) / predict(X) / score(X, y)
//! predictions + training-set R²
//! ```
//!
//! # Implementations
//!
//! - [`linear::LinearRegression`]: ordinary least squares with intercept
//! - [`forest::RandomForestRegressor`]: bagged regression trees
//!
//! # Score Semantics
//!
//! [`Regressor::score`] defaults to the coefficient of determination (see
//! [`r2_score`]). The pipeline evaluates it on the rows the model was fitted
//! on, so it measures fit quality only and says nothing about generalization.
//!
//! # Example
//!
//! ```
//! use storecast_model::{Matrix, ModelFactory, kind::ModelKind};
//!
//! let x = Matrix::new(4, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! let y = [3.0, 5.0, 7.0, 9.0];
//!
//! let mut model = ModelKind::default().create();
//! model.fit(&x, &y).unwrap();
//!
//! let prediction = model.predict(&Matrix::new(1, 1, vec![5.0]).unwrap()).unwrap();
//! assert!((prediction[0] - 11.0).abs() < 1e-6);
//! assert!((model.score(&x, &y).unwrap() - 1.0).abs() < 1e-9);
//! ```

use std::fmt;

pub use self::matrix::Matrix;

pub mod forest;
pub mod kind;
pub mod linear;
pub mod matrix;

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ModelFitError {
    #[display("{rows} training rows, at least {min} required")]
    TooFewRows { rows: usize, min: usize },
    #[display("{rows} feature rows but {targets} targets")]
    TargetLength { rows: usize, targets: usize },
    #[display("expected {expected} features, got {found}")]
    FeatureCount { expected: usize, found: usize },
    #[display("matrix data has {found} values, expected {rows}x{cols}")]
    Shape {
        rows: usize,
        cols: usize,
        found: usize,
    },
    #[display("training data contains non-finite values")]
    NonFinite,
    #[display("normal equations are not positive definite")]
    Singular,
    #[display("model used before fit")]
    NotFitted,
}

/// A regression model bound to one training set.
pub trait Regressor: fmt::Debug + Send {
    /// Fits the model to `features` (one row per sample) and `targets`.
    fn fit(&mut self, features: &Matrix, targets: &[f64]) -> Result<(), ModelFitError>;

    /// Predicts one value per row of `features`.
    fn predict(&self, features: &Matrix) -> Result<Vec<f64>, ModelFitError>;

    /// Coefficient of determination of the predictions for `features` against `targets`.
    fn score(&self, features: &Matrix, targets: &[f64]) -> Result<f64, ModelFitError> {
        check_targets(features, targets)?;
        let predicted = self.predict(features)?;
        Ok(r2_score(targets, &predicted))
    }
}

pub type BoxedRegressor = Box<dyn Regressor>;

/// Produces fresh, unfitted regressors.
pub trait ModelFactory: fmt::Debug + Send + Sync {
    /// Short name used in logs and run summaries.
    fn name(&self) -> &'static str;

    fn create(&self) -> BoxedRegressor;
}

/// Coefficient of determination `1 - SS_res / SS_tot`.
///
/// A constant target scores 1.0 when predicted exactly and 0.0 otherwise.
/// An empty input scores `NaN`.
///
/// # Examples
///
/// ```
/// use storecast_model::r2_score;
///
/// assert_eq!(r2_score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
/// assert_eq!(r2_score(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]), 0.0);
/// assert_eq!(r2_score(&[4.0, 4.0], &[4.0, 5.0]), 0.0);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    assert_eq!(actual.len(), predicted.len());
    if actual.is_empty() {
        return f64::NAN;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>();
    let ss_tot = actual.iter().map(|a| (a - mean).powi(2)).sum::<f64>();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Validates the training inputs shared by every implementation.
pub(crate) fn check_training_data(
    features: &Matrix,
    targets: &[f64],
) -> Result<(), ModelFitError> {
    check_targets(features, targets)?;
    if features.rows() == 0 {
        return Err(ModelFitError::TooFewRows { rows: 0, min: 1 });
    }
    if !features.view().iter().chain(targets).all(|v| v.is_finite()) {
        return Err(ModelFitError::NonFinite);
    }
    Ok(())
}

fn check_targets(features: &Matrix, targets: &[f64]) -> Result<(), ModelFitError> {
    if features.rows() == targets.len() {
        Ok(())
    } else {
        Err(ModelFitError::TargetLength {
            rows: features.rows(),
            targets: targets.len(),
        })
    }
}
