use faer::linalg::matmul::matmul;
use faer::{Accum, Mat, Par};

use crate::error::{AlsError, Result};
use crate::matrix::{DenseMatrix, FactorMatrix};
use crate::normal::dot;

/// Output of a finished run: row factors `P` (`k × rows`) and column factors `Q` (`k × cols`).
#[derive(Debug, Clone, PartialEq)]
pub struct Factorization {
    p: FactorMatrix,
    q: FactorMatrix,
}

impl Factorization {
    pub fn new(p: FactorMatrix, q: FactorMatrix) -> Result<Self> {
        if p.rank() == 0 {
            return Err(AlsError::Shape("factors must have at least one feature".into()));
        }
        if p.rank() != q.rank() {
            return Err(AlsError::Shape(format!(
                "row factors have rank {}, column factors have rank {}",
                p.rank(),
                q.rank()
            )));
        }
        Ok(Self { p, q })
    }

    pub fn p(&self) -> &FactorMatrix {
        &self.p
    }

    pub fn q(&self) -> &FactorMatrix {
        &self.q
    }

    pub fn into_parts(self) -> (FactorMatrix, FactorMatrix) {
        (self.p, self.q)
    }

    pub fn rank(&self) -> usize {
        self.p.rank()
    }

    /// Predicted strength for `(row, col)`: `P[:, row] · Q[:, col]`.
    #[inline]
    pub fn predict(&self, row: usize, col: usize) -> f64 {
        dot(self.p.column(row), self.q.column(col))
    }

    /// Full prediction matrix `Pᵀ Q`.
    pub fn reconstruct(&self) -> DenseMatrix {
        let rows = self.p.ncols();
        let cols = self.q.ncols();
        let p = self.p.to_mat();
        let q = self.q.to_mat();
        let mut out = Mat::<f64>::zeros(rows, cols);
        matmul(
            out.as_mut(),
            Accum::Replace,
            p.as_ref().transpose(),
            q.as_ref(),
            1.0,
            Par::rayon(0),
        );

        let mut dense = DenseMatrix::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                dense.set(r, c, out[(r, c)]);
            }
        }
        dense
    }

    /// Root mean squared error over the observed (> 0) entries of `observations`.
    /// Returns 0 when nothing is observed.
    pub fn rmse(&self, observations: &DenseMatrix) -> Result<f64> {
        self.check_shape(observations)?;
        Ok(observed_rmse(&self.p, &self.q, observations))
    }

    /// Top `n` columns for `row` by predicted score, highest first.
    /// Columns observed in `exclude` (if given) are skipped.
    pub fn recommend(
        &self,
        row: usize,
        n: usize,
        exclude: Option<&DenseMatrix>,
    ) -> Result<Vec<(usize, f64)>> {
        if row >= self.p.ncols() {
            return Err(AlsError::Shape(format!(
                "row {} out of range for {} rows",
                row,
                self.p.ncols()
            )));
        }
        if let Some(obs) = exclude {
            self.check_shape(obs)?;
        }

        let u = self.p.column(row);
        let mut scored: Vec<(usize, f64)> = (0..self.q.ncols())
            .filter(|&c| exclude.map_or(true, |obs| obs.get(row, c) <= 0.0))
            .map(|c| (c, dot(u, self.q.column(c))))
            .collect();

        let take = n.min(scored.len());
        if take == 0 {
            return Ok(vec![]);
        }
        // total_cmp keeps the order total even for NaN scores; ties go to the lower column
        let by_score = |a: &(usize, f64), b: &(usize, f64)| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0));
        scored.select_nth_unstable_by(take - 1, by_score);
        scored.truncate(take);
        scored.sort_unstable_by(by_score);
        Ok(scored)
    }

    fn check_shape(&self, observations: &DenseMatrix) -> Result<()> {
        if observations.nrows() != self.p.ncols() || observations.ncols() != self.q.ncols() {
            return Err(AlsError::Shape(format!(
                "observations are {}x{}, factorization covers {}x{}",
                observations.nrows(),
                observations.ncols(),
                self.p.ncols(),
                self.q.ncols()
            )));
        }
        Ok(())
    }
}

pub(crate) fn observed_rmse(p: &FactorMatrix, q: &FactorMatrix, observations: &DenseMatrix) -> f64 {
    let mut sse = 0.0;
    let mut count = 0usize;
    for (r, row) in observations.rows().enumerate() {
        let pr = p.column(r);
        for (c, &v) in row.iter().enumerate() {
            if v > 0.0 {
                let e = dot(pr, q.column(c)) - v;
                sse += e * e;
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        (sse / count as f64).sqrt()
    }
}
