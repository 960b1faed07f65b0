//! Per-vector normal equations.
//!
//! For one row of the observation matrix (or one row of its transpose) and a
//! fixed `k × n` opposite factor `F`, builds
//!
//! ```text
//! G = Σ_{a : v[a] > 0} F[:, a] F[:, a]ᵀ + λ I      (k × k, row-major)
//! b = Σ_{a : v[a] > 0} F[:, a] v[a]                (k)
//! ```
//!
//! Only the upper triangle of `G` is accumulated; the lower triangle is a copy
//! of it, so `G` is exactly symmetric.

use crate::error::{AlsError, Result};
use crate::matrix::FactorMatrix;

// ── Vector primitives ───────────────────────────────────────────────────

#[inline(always)]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0.0;
    let mut i = 0;
    while i + 4 <= a.len() {
        sum += a[i] * b[i] + a[i + 1] * b[i + 1] + a[i + 2] * b[i + 2] + a[i + 3] * b[i + 3];
        i += 4;
    }
    while i < a.len() {
        sum += a[i] * b[i];
        i += 1;
    }
    sum
}

#[inline(always)]
pub(crate) fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

// ── Builder ─────────────────────────────────────────────────────────────

/// Reusable buffers for one `k × k` system.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    rank: usize,
    gram: Vec<f64>,
    rhs: Vec<f64>,
    observed: usize,
}

impl NormalEquations {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            gram: vec![0.0; rank * rank],
            rhs: vec![0.0; rank],
            observed: 0,
        }
    }

    /// Build a fresh system for `observations` against `factors`.
    pub fn build(factors: &FactorMatrix, observations: &[f64], lambda: f64) -> Result<Self> {
        let mut eq = Self::new(factors.rank());
        eq.rebuild(factors, observations, lambda)?;
        Ok(eq)
    }

    /// Overwrite the buffers with the system for `observations` against `factors`.
    pub fn rebuild(&mut self, factors: &FactorMatrix, observations: &[f64], lambda: f64) -> Result<()> {
        if factors.ncols() != observations.len() {
            return Err(AlsError::Shape(format!(
                "observation vector has length {}, factor matrix has {} columns",
                observations.len(),
                factors.ncols()
            )));
        }

        let k = factors.rank();
        self.rank = k;
        self.gram.clear();
        self.gram.resize(k * k, 0.0);
        self.rhs.clear();
        self.rhs.resize(k, 0.0);
        self.observed = 0;

        for (a, &v) in observations.iter().enumerate() {
            if v <= 0.0 {
                continue;
            }
            self.observed += 1;
            let y = factors.column(a);
            axpy(v, y, &mut self.rhs);
            for i in 0..k {
                let yi = y[i];
                axpy(yi, &y[i..], &mut self.gram[i * k + i..(i + 1) * k]);
            }
        }

        for i in 0..k {
            for j in (i + 1)..k {
                self.gram[j * k + i] = self.gram[i * k + j];
            }
            self.gram[i * k + i] += lambda;
        }
        Ok(())
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Row-major `k × k` Gram matrix including the ridge term.
    #[inline]
    pub fn gram(&self) -> &[f64] {
        &self.gram
    }

    #[inline]
    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Number of observed entries that contributed to the system.
    #[inline]
    pub fn observed(&self) -> usize {
        self.observed
    }

    /// True when no entries were observed: `G = λI`, `b = 0`.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.observed == 0
    }

    /// Both buffers at once, for solvers that work in place.
    pub fn system_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.gram, &mut self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(factors: &FactorMatrix, v: &[f64], lambda: f64) -> (Vec<f64>, Vec<f64>) {
        let k = factors.rank();
        let mut g = vec![0.0; k * k];
        let mut b = vec![0.0; k];
        for i in 0..k {
            for j in 0..k {
                let mut t = 0.0;
                for a in 0..v.len() {
                    if v[a] > 0.0 {
                        t += factors.get(i, a) * factors.get(j, a);
                    }
                }
                if i == j {
                    t += lambda;
                }
                g[i * k + j] = t;
            }
            for a in 0..v.len() {
                if v[a] > 0.0 {
                    b[i] += factors.get(i, a) * v[a];
                }
            }
        }
        (g, b)
    }

    fn sample_factors() -> FactorMatrix {
        FactorMatrix::from_fn(3, 5, |r, c| ((r + 1) as f64) * 0.3 + (c as f64) * 0.17 - 0.4)
    }

    #[test]
    fn matches_naive_double_loop() {
        let f = sample_factors();
        let v = [1.0, 0.0, 3.5, 2.0, 0.0];
        let eq = NormalEquations::build(&f, &v, 0.1).unwrap();
        let (g, b) = naive(&f, &v, 0.1);
        assert_eq!(eq.observed(), 3);
        for (x, y) in eq.gram().iter().zip(&g) {
            assert!((x - y).abs() < 1e-12, "{} vs {}", x, y);
        }
        for (x, y) in eq.rhs().iter().zip(&b) {
            assert!((x - y).abs() < 1e-12, "{} vs {}", x, y);
        }
    }

    #[test]
    fn gram_is_symmetric() {
        let f = FactorMatrix::from_fn(4, 6, |r, c| ((r * 7 + c * 3) % 5) as f64 * 0.31 + 0.013);
        let v = [0.5, 1.0, 0.0, 4.0, 2.5, 1.5];
        let eq = NormalEquations::build(&f, &v, 0.0).unwrap();
        let k = eq.rank();
        for i in 0..k {
            for j in 0..k {
                assert_eq!(eq.gram()[i * k + j], eq.gram()[j * k + i]);
            }
        }
    }

    #[test]
    fn unobserved_vector_gives_scaled_identity() {
        let f = sample_factors();
        let eq = NormalEquations::build(&f, &[0.0; 5], 0.25).unwrap();
        assert!(eq.is_degenerate());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 0.25 } else { 0.0 };
                assert_eq!(eq.gram()[i * 3 + j], expected);
            }
        }
        assert!(eq.rhs().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn rebuild_resets_buffers() {
        let f = sample_factors();
        let mut eq = NormalEquations::new(3);
        eq.rebuild(&f, &[1.0, 1.0, 1.0, 1.0, 1.0], 0.1).unwrap();
        eq.rebuild(&f, &[0.0, 0.0, 2.0, 0.0, 0.0], 0.1).unwrap();
        let fresh = NormalEquations::build(&f, &[0.0, 0.0, 2.0, 0.0, 0.0], 0.1).unwrap();
        assert_eq!(eq.gram(), fresh.gram());
        assert_eq!(eq.rhs(), fresh.rhs());
        assert_eq!(eq.observed(), 1);
    }

    #[test]
    fn length_mismatch_is_a_shape_error() {
        let f = sample_factors();
        assert!(matches!(
            NormalEquations::build(&f, &[1.0, 2.0], 0.1),
            Err(AlsError::Shape(_))
        ));
    }
}
