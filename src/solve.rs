use faer::linalg::solvers::Solve;
use faer::{MatMut, MatRef, Side};

use crate::error::{AlsError, Result};
use crate::normal::{axpy, dot};

/// Dense solver for the small symmetric systems built per vector.
///
/// `gram` is a row-major `k × k` matrix and may be overwritten. On success
/// `rhs` holds the solution `x` of `G x = b`.
pub trait LinearSolve: Send + Sync {
    fn solve(&self, gram: &mut [f64], rhs: &mut [f64], k: usize) -> Result<()>;

    fn name(&self) -> &'static str;
}

fn numerical(reason: impl Into<String>) -> AlsError {
    AlsError::Numerical {
        index: 0,
        reason: reason.into(),
    }
}

fn check_dims(gram: &[f64], rhs: &[f64], k: usize) -> Result<()> {
    if gram.len() != k * k || rhs.len() != k {
        return Err(AlsError::Shape(format!(
            "system of rank {} needs {} gram entries and {} rhs entries, got {} and {}",
            k,
            k * k,
            k,
            gram.len(),
            rhs.len()
        )));
    }
    Ok(())
}

/// LLᵀ factorization through faer. Requires a positive definite system.
#[derive(Debug, Clone, Copy, Default)]
pub struct CholeskySolver;

impl LinearSolve for CholeskySolver {
    fn solve(&self, gram: &mut [f64], rhs: &mut [f64], k: usize) -> Result<()> {
        check_dims(gram, rhs, k)?;
        let a_mat = MatRef::from_row_major_slice(gram, k, k);
        let mut b_mat = MatMut::from_column_major_slice_mut(rhs, k, 1);

        let llt = a_mat
            .llt(Side::Lower)
            .map_err(|e| numerical(format!("system is not positive definite: {:?}", e)))?;
        let x = llt.solve(b_mat.as_ref());
        b_mat.copy_from(x.as_ref());

        if rhs.iter().any(|v| !v.is_finite()) {
            return Err(numerical("solution is not finite"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cholesky"
    }
}

/// Gaussian elimination with partial pivoting. Works for any non-singular system.
#[derive(Debug, Clone, Copy)]
pub struct GaussSolver {
    /// Pivots with smaller magnitude are treated as singular.
    pub pivot_tolerance: f64,
}

impl Default for GaussSolver {
    fn default() -> Self {
        Self {
            pivot_tolerance: 1e-12,
        }
    }
}

impl LinearSolve for GaussSolver {
    fn solve(&self, gram: &mut [f64], rhs: &mut [f64], k: usize) -> Result<()> {
        check_dims(gram, rhs, k)?;

        // forward elimination to upper triangular form
        for col in 0..k {
            let (pivot_row, pivot) = (col..k)
                .map(|r| (r, gram[r * k + col].abs()))
                .fold((col, f64::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !(pivot >= self.pivot_tolerance) {
                return Err(numerical(format!(
                    "pivot {:e} in column {} is below tolerance",
                    pivot, col
                )));
            }
            if pivot_row != col {
                let (head, tail) = gram.split_at_mut(pivot_row * k);
                head[col * k..(col + 1) * k].swap_with_slice(&mut tail[..k]);
                rhs.swap(col, pivot_row);
            }

            let (done, rest) = gram.split_at_mut((col + 1) * k);
            let lead = &done[col * k + col..(col + 1) * k];
            for (offset, row) in rest.chunks_exact_mut(k).enumerate() {
                let factor = row[col] / lead[0];
                if factor == 0.0 {
                    continue;
                }
                axpy(-factor, lead, &mut row[col..]);
                rhs[col + 1 + offset] -= factor * rhs[col];
            }
        }

        // back substitution
        for row in (0..k).rev() {
            let tail = &gram[row * k + row + 1..(row + 1) * k];
            let known = dot(tail, &rhs[row + 1..]);
            rhs[row] = (rhs[row] - known) / gram[row * k + row];
        }

        if rhs.iter().any(|v| !v.is_finite()) {
            return Err(numerical("solution is not finite"));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "gauss"
    }
}
