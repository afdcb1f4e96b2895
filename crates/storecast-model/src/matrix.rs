use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::ModelFitError;

/// Dense feature matrix, one row per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    values: Array2<f64>,
}

impl From<Array2<f64>> for Matrix {
    fn from(values: Array2<f64>) -> Self {
        Self { values }
    }
}

impl Matrix {
    /// Builds a `rows x cols` matrix from row-major `data`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ModelFitError> {
        let found = data.len();
        Array2::from_shape_vec((rows, cols), data)
            .map(Self::from)
            .map_err(|_| ModelFitError::Shape { rows, cols, found })
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    #[must_use]
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    #[must_use]
    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.values.row(i)
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[[row, col]]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> + '_ {
        self.values.rows().into_iter()
    }
}
