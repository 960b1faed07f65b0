use faer::Mat;

use crate::error::{AlsError, Result};

// ── Observation storage ─────────────────────────────────────────────────

/// Row-major dense matrix. Used for observations and reconstructed predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    nrows: usize,
    ncols: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    /// Build from a list of rows. Every row must have the same, non-zero length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(AlsError::Shape("matrix has no rows".into()));
        }
        let ncols = rows[0].len();
        if ncols == 0 {
            return Err(AlsError::Shape("matrix has no columns".into()));
        }
        let mut data = Vec::with_capacity(rows.len() * ncols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != ncols {
                return Err(AlsError::Shape(format!(
                    "row {} has length {}, expected {}",
                    i,
                    row.len(),
                    ncols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            nrows: rows.len(),
            ncols,
            data,
        })
    }

    /// Wrap a row-major buffer.
    pub fn from_row_major(nrows: usize, ncols: usize, data: Vec<f64>) -> Result<Self> {
        if nrows == 0 || ncols == 0 {
            return Err(AlsError::Shape(format!(
                "matrix must be non-empty, got {}x{}",
                nrows, ncols
            )));
        }
        if data.len() != nrows * ncols {
            return Err(AlsError::Shape(format!(
                "buffer of length {} cannot hold a {}x{} matrix",
                data.len(),
                nrows,
                ncols
            )));
        }
        Ok(Self { nrows, ncols, data })
    }

    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![0.0; nrows * ncols],
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.ncols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.ncols + col] = value;
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    /// Copy of one column. Prefer `transpose().row(j)` when reading many columns.
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.nrows).map(|r| self.get(r, col)).collect()
    }

    /// Yields nothing when the matrix has no columns.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.ncols.max(1))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn transpose(&self) -> DenseMatrix {
        let mut out = vec![0.0; self.data.len()];
        for (r, row) in self.rows().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                out[c * self.nrows + r] = v;
            }
        }
        DenseMatrix {
            nrows: self.ncols,
            ncols: self.nrows,
            data: out,
        }
    }

    /// Number of entries strictly greater than zero.
    pub fn observed_count(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0.0).count()
    }

    pub fn to_mat(&self) -> Mat<f64> {
        Mat::from_fn(self.nrows, self.ncols, |r, c| self.get(r, c))
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(|r| r.to_vec()).collect()
    }
}

// ── Factor storage ──────────────────────────────────────────────────────

/// `rank × n` factor matrix. Each column is one latent vector and is stored
/// contiguously, so a whole column can be handed out as `&mut [f64]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorMatrix {
    rank: usize,
    ncols: usize,
    data: Vec<f64>,
}

impl FactorMatrix {
    pub fn zeros(rank: usize, ncols: usize) -> Self {
        Self::filled(rank, ncols, 0.0)
    }

    pub fn filled(rank: usize, ncols: usize, value: f64) -> Self {
        Self {
            rank,
            ncols,
            data: vec![value; rank * ncols],
        }
    }

    /// Build from `f(feature, column)`.
    pub fn from_fn(rank: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rank * ncols);
        for c in 0..ncols {
            for r in 0..rank {
                data.push(f(r, c));
            }
        }
        Self { rank, ncols, data }
    }

    /// Number of latent features (rows).
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn get(&self, feature: usize, col: usize) -> f64 {
        self.data[col * self.rank + feature]
    }

    #[inline]
    pub fn column(&self, col: usize) -> &[f64] {
        &self.data[col * self.rank..(col + 1) * self.rank]
    }

    #[inline]
    pub fn column_mut(&mut self, col: usize) -> &mut [f64] {
        &mut self.data[col * self.rank..(col + 1) * self.rank]
    }

    /// Yields nothing when the rank is zero.
    pub fn columns(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.rank.max(1))
    }

    /// Column-contiguous buffer, `ncols` chunks of `rank`.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Row `feature` across all columns.
    pub fn feature_row(&self, feature: usize) -> Vec<f64> {
        self.columns().map(|c| c[feature]).collect()
    }

    /// `rank × ncols` faer matrix.
    pub fn to_mat(&self) -> Mat<f64> {
        Mat::from_fn(self.rank, self.ncols, |r, c| self.get(r, c))
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rank).map(|f| self.feature_row(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_rejected() {
        let err = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, AlsError::Shape(_)));
    }

    #[test]
    fn empty_matrix_is_rejected() {
        assert!(matches!(
            DenseMatrix::from_rows(&[]),
            Err(AlsError::Shape(_))
        ));
        assert!(matches!(
            DenseMatrix::from_rows(&[vec![], vec![]]),
            Err(AlsError::Shape(_))
        ));
        assert!(matches!(
            DenseMatrix::from_row_major(2, 2, vec![1.0; 3]),
            Err(AlsError::Shape(_))
        ));
    }

    #[test]
    fn transpose_swaps_rows_and_columns() {
        let m = DenseMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let t = m.transpose();
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 2);
        assert_eq!(t.row(0), &[1.0, 4.0]);
        assert_eq!(t.row(2), &[3.0, 6.0]);
        assert_eq!(m.column(1), t.row(1).to_vec());
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn degenerate_shapes_iterate_nothing() {
        assert_eq!(DenseMatrix::zeros(5, 0).rows().count(), 0);
        assert_eq!(DenseMatrix::zeros(0, 5).rows().count(), 0);
        assert_eq!(FactorMatrix::zeros(0, 4).columns().count(), 0);
        assert!(FactorMatrix::zeros(0, 4).to_rows().is_empty());
    }

    #[test]
    fn factor_columns_are_contiguous() {
        let f = FactorMatrix::from_fn(2, 3, |r, c| (r * 10 + c) as f64);
        assert_eq!(f.column(1), &[1.0, 11.0]);
        assert_eq!(f.feature_row(1), vec![10.0, 11.0, 12.0]);
        let m = f.to_mat();
        assert_eq!(m.nrows(), 2);
        assert_eq!(m.ncols(), 3);
        assert_eq!(m[(1, 2)], 12.0);
    }
}
