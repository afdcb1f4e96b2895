//! Ordinary least squares with intercept.
//!
//! The model centers features and targets, then solves the normal equations
//!
//! ```text
//! (XcᵀXc + λI) w = Xcᵀyc        intercept = ȳ - x̄·w
//! ```
//!
//! with a Cholesky decomposition. `λ` is [`LinearParams::ridge`] scaled by the
//! mean diagonal of `XcᵀXc`. It is tiny, so predictions match plain least
//! squares, but it keeps the system positive definite when indicator columns
//! are collinear (a full set of day-of-week indicators sums to one) or
//! constant (a holiday level a store never sees).

use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use serde::{Deserialize, Serialize};

use crate::{Matrix, ModelFitError, Regressor, check_training_data};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearParams {
    /// Relative ridge term added to the normal equations
    pub ridge: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self { ridge: 1e-8 }
    }
}

#[derive(Debug, Clone)]
pub struct LinearRegression {
    params: LinearParams,
    fitted: Option<Coefficients>,
}

#[derive(Debug, Clone)]
struct Coefficients {
    intercept: f64,
    weights: Array1<f64>,
}

impl LinearRegression {
    #[must_use]
    pub fn new(params: LinearParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    /// Intercept and per-feature weights, once fitted.
    #[must_use]
    pub fn coefficients(&self) -> Option<(f64, ArrayView1<'_, f64>)> {
        self.fitted
            .as_ref()
            .map(|c| (c.intercept, c.weights.view()))
    }
}

impl Regressor for LinearRegression {
    #[expect(clippy::cast_precision_loss)]
    fn fit(&mut self, features: &Matrix, targets: &[f64]) -> Result<(), ModelFitError> {
        check_training_data(features, targets)?;
        let too_few = ModelFitError::TooFewRows { rows: 0, min: 1 };
        let x = features.view();
        let y = ArrayView1::from(targets);
        let x_mean = x.mean_axis(Axis(0)).ok_or(too_few.clone())?;
        let y_mean = y.mean().ok_or(too_few)?;

        let xc = &x - &x_mean;
        let yc = &y - y_mean;
        let p = xc.ncols();

        let weights = if p == 0 {
            Array1::zeros(0)
        } else {
            let xt = xc.t();
            let gram = xt.dot(&xc);
            let trace = gram.diag().sum();
            let scale = if trace > 0.0 { trace / p as f64 } else { 1.0 };
            let gram = &gram + &(Array2::<f64>::eye(p) * (self.params.ridge * scale));
            let lower = cholesky(&gram)?;
            solve_cholesky(&lower, &xt.dot(&yc))
        };

        let intercept = y_mean - weights.dot(&x_mean);
        self.fitted = Some(Coefficients { intercept, weights });
        Ok(())
    }

    fn predict(&self, features: &Matrix) -> Result<Vec<f64>, ModelFitError> {
        let fitted = self.fitted.as_ref().ok_or(ModelFitError::NotFitted)?;
        if features.cols() != fitted.weights.len() {
            return Err(ModelFitError::FeatureCount {
                expected: fitted.weights.len(),
                found: features.cols(),
            });
        }
        let predicted = features.view().dot(&fitted.weights) + fitted.intercept;
        Ok(predicted.to_vec())
    }
}

/// Lower-triangular Cholesky factor of the symmetric matrix `a`.
fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>, ModelFitError> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let done = l.slice(s![j, ..j]);
        let diag = a[[j, j]] - done.dot(&done);
        // pivots at rounding-noise level mean the column is a combination of earlier ones
        if !diag.is_finite() || diag <= a[[j, j]].abs() * 1e-12 {
            return Err(ModelFitError::Singular);
        }
        let diag = diag.sqrt();
        l[[j, j]] = diag;
        for i in j + 1..n {
            let dot = l.slice(s![i, ..j]).dot(&l.slice(s![j, ..j]));
            l[[i, j]] = (a[[i, j]] - dot) / diag;
        }
    }
    Ok(l)
}

/// Solves `L Lᵀ x = b` by forward then back substitution.
fn solve_cholesky(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let dot = l.slice(s![i, ..i]).dot(&z.slice(s![..i]));
        z[i] = (b[i] - dot) / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let dot = l.slice(s![i + 1.., i]).dot(&x.slice(s![i + 1..]));
        x[i] = (z[i] - dot) / l[[i, i]];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(rows: usize, cols: usize, x: Vec<f64>, y: &[f64]) -> LinearRegression {
        let mut model = LinearRegression::new(LinearParams::default());
        model.fit(&Matrix::new(rows, cols, x).unwrap(), y).unwrap();
        model
    }

    #[test]
    fn test_recovers_exact_plane() {
        // y = 1 + 2a - 3b
        let x = vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 2.0, 1.0, 3.0, 5.0];
        let y = [1.0, 3.0, -2.0, 2.0, -8.0];
        let model = fit(5, 2, x, &y);
        let (intercept, weights) = model.coefficients().unwrap();
        assert!((intercept - 1.0).abs() < 1e-6);
        assert!((weights[0] - 2.0).abs() < 1e-6);
        assert!((weights[1] + 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_collinear_indicators_solvable() {
        // two indicator columns that always sum to one, plus a constant zero column
        let x = vec![
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0,
        ];
        let y = [10.0, 20.0, 10.0, 20.0];
        let features = Matrix::new(4, 3, x).unwrap();
        let mut model = LinearRegression::new(LinearParams::default());
        model.fit(&features, &y).unwrap();
        let predicted = model.predict(&features).unwrap();
        for (p, y) in predicted.iter().zip(y) {
            assert!((p - y).abs() < 1e-4, "{p} vs {y}");
        }
        assert!(model.score(&features, &y).unwrap() > 0.999_999);
    }

    #[test]
    fn test_no_features_predicts_mean() {
        let model = fit(3, 0, vec![], &[1.0, 2.0, 6.0]);
        let predicted = model.predict(&Matrix::new(2, 0, vec![]).unwrap()).unwrap();
        assert_eq!(predicted, vec![3.0, 3.0]);
    }

    #[test]
    fn test_errors() {
        let mut model = LinearRegression::new(LinearParams::default());
        let empty = Matrix::new(0, 2, vec![]).unwrap();
        assert_eq!(
            model.fit(&empty, &[]),
            Err(ModelFitError::TooFewRows { rows: 0, min: 1 })
        );
        assert_eq!(
            model.predict(&empty),
            Err(ModelFitError::NotFitted)
        );

        let x = Matrix::new(2, 1, vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            model.fit(&x, &[1.0]),
            Err(ModelFitError::TargetLength { .. })
        ));
        assert_eq!(model.fit(&x, &[1.0, f64::NAN]), Err(ModelFitError::NonFinite));

        model.fit(&x, &[1.0, 2.0]).unwrap();
        assert!(matches!(
            model.predict(&Matrix::new(1, 2, vec![1.0, 2.0]).unwrap()),
            Err(ModelFitError::FeatureCount {
                expected: 1,
                found: 2
            })
        ));
    }

    #[test]
    fn test_singular_without_ridge() {
        let mut model = LinearRegression::new(LinearParams { ridge: 0.0 });
        let x = Matrix::new(3, 2, vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]).unwrap();
        assert_eq!(
            model.fit(&x, &[1.0, 2.0, 3.0]),
            Err(ModelFitError::Singular)
        );
    }
}
