#![allow(clippy::needless_range_loop)]
//! Dense matrix operations backed by faer.
//!
//! Wraps faer's column-major `Mat<f64>` with the handful of operations the
//! proportional-odds fitter and the association tests need: element
//! access, matrix-vector products and column stacking for augmented
//! design matrices.

use faer::Mat;

/// A dense matrix wrapper around faer's `Mat<f64>`.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    inner: Mat<f64>,
}

impl DenseMatrix {
    /// Create a new dense matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            inner: Mat::zeros(nrows, ncols),
        }
    }

    /// Create a dense matrix from a flat vec (column-major order).
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[j * nrows + i]);
        Self { inner }
    }

    /// Create a dense matrix from a 2D slice (row-major input).
    pub fn from_row_major(nrows: usize, ncols: usize, data: &[f64]) -> Self {
        assert_eq!(data.len(), nrows * ncols);
        let inner = Mat::from_fn(nrows, ncols, |i, j| data[i * ncols + j]);
        Self { inner }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    /// Get element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.inner.read(row, col)
    }

    /// Set element at (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.inner.write(row, col, value);
    }

    /// Add `value` to the element at (row, col).
    pub fn add_to(&mut self, row: usize, col: usize, value: f64) {
        let current = self.inner.read(row, col);
        self.inner.write(row, col, current + value);
    }

    /// Matrix-vector product: self * v -> result vector.
    pub fn mat_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.ncols(), v.len());
        let n = self.nrows();
        let mut result = vec![0.0; n];
        for j in 0..self.ncols() {
            let vj = v[j];
            if vj == 0.0 {
                continue;
            }
            for i in 0..n {
                result[i] += self.inner.read(i, j) * vj;
            }
        }
        result
    }

    /// Extract column as a Vec<f64>.
    pub fn col(&self, j: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.inner.read(i, j)).collect()
    }

    /// Copy row `i` into `out` without allocating.
    pub fn row_into(&self, i: usize, out: &mut [f64]) {
        assert_eq!(out.len(), self.ncols());
        for (j, o) in out.iter_mut().enumerate() {
            *o = self.inner.read(i, j);
        }
    }

    /// Set an entire column from a slice.
    pub fn set_col(&mut self, j: usize, data: &[f64]) {
        assert_eq!(data.len(), self.nrows());
        for i in 0..self.nrows() {
            self.inner.write(i, j, data[i]);
        }
    }

    /// Horizontally stack `self` and `other`: `[self | other]`.
    ///
    /// Used to append genotype columns to a null design matrix.
    pub fn hcat(&self, other: &DenseMatrix) -> DenseMatrix {
        assert_eq!(self.nrows(), other.nrows());
        let p = self.ncols();
        let inner = Mat::from_fn(self.nrows(), p + other.ncols(), |i, j| {
            if j < p {
                self.inner.read(i, j)
            } else {
                other.inner.read(i, j - p)
            }
        });
        DenseMatrix { inner }
    }

    /// Dot product of two slices.
    pub fn dot(a: &[f64], b: &[f64]) -> f64 {
        assert_eq!(a.len(), b.len());
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let m = DenseMatrix::zeros(3, 4);
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.ncols(), 4);
        assert_eq!(m.get(0, 0), 0.0);
    }

    #[test]
    fn test_mat_vec() {
        let m = DenseMatrix::from_row_major(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.mat_vec(&[1.0, 0.0, -1.0]), vec![-2.0, -2.0]);
    }

    #[test]
    fn test_row_into_and_set_col() {
        let mut m = DenseMatrix::zeros(2, 2);
        m.set_col(1, &[5.0, 6.0]);
        m.add_to(0, 0, 1.5);
        let mut row = [0.0; 2];
        m.row_into(1, &mut row);
        assert_eq!(row, [0.0, 6.0]);
        assert_eq!(m.get(0, 0), 1.5);
        assert_eq!(DenseMatrix::dot(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }

    #[test]
    fn test_hcat_appends_columns() {
        let x = DenseMatrix::from_row_major(3, 1, &[1.0, 2.0, 3.0]);
        let z = DenseMatrix::from_row_major(3, 2, &[0.0, 1.0, 1.0, 0.0, 2.0, 2.0]);
        let xz = x.hcat(&z);
        assert_eq!(xz.ncols(), 3);
        assert_eq!(xz.col(0), vec![1.0, 2.0, 3.0]);
        assert_eq!(xz.col(1), vec![0.0, 1.0, 2.0]);
        assert_eq!(xz.col(2), vec![1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_col_major_roundtrip_layout() {
        let m = DenseMatrix::from_col_major(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(m.get(1, 0), 2.0);
        assert_eq!(m.get(0, 1), 3.0);
        assert_eq!(m.col(1), vec![3.0, 4.0]);
    }
}
