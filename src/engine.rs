use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tracing::{debug, info, trace};

use crate::config::AlsConfig;
use crate::error::{AlsError, Result};
use crate::matrix::{DenseMatrix, FactorMatrix};
use crate::model::{observed_rmse, Factorization};
use crate::normal::NormalEquations;
use crate::pass::PassRunner;
use crate::solve::{CholeskySolver, LinearSolve};

/// Alternating least squares over a dense observation matrix.
///
/// Construction validates everything up front; [`run`](Self::run) consumes the
/// engine, so a run that fails part-way leaves nothing behind to reuse.
pub struct AlsEngine<S: LinearSolve = CholeskySolver> {
    observations: DenseMatrix,
    transposed: DenseMatrix,
    p: FactorMatrix,
    q: FactorMatrix,
    config: AlsConfig,
    solver: S,
    runner: PassRunner,
}

impl AlsEngine<CholeskySolver> {
    pub fn new(observations: DenseMatrix, config: AlsConfig) -> Result<Self> {
        Self::with_solver(observations, config, CholeskySolver)
    }
}

impl<S: LinearSolve> AlsEngine<S> {
    pub fn with_solver(observations: DenseMatrix, config: AlsConfig, solver: S) -> Result<Self> {
        if observations.nrows() == 0 || observations.ncols() == 0 {
            return Err(AlsError::Shape(format!(
                "observation matrix must be non-empty, got {}x{}",
                observations.nrows(),
                observations.ncols()
            )));
        }
        validate_observations(&observations)?;
        config.validate(observations.nrows(), observations.ncols())?;

        let runner = PassRunner::new(config.workers)?;
        let p = FactorMatrix::zeros(config.rank, observations.nrows());
        let q = config.init.fill(config.rank, observations.ncols());
        let transposed = observations.transpose();

        Ok(Self {
            observations,
            transposed,
            p,
            q,
            config,
            solver,
            runner,
        })
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }

    pub fn observations(&self) -> &DenseMatrix {
        &self.observations
    }

    pub fn p(&self) -> &FactorMatrix {
        &self.p
    }

    pub fn q(&self) -> &FactorMatrix {
        &self.q
    }

    /// Run exactly `config.iterations` (solve-P, solve-Q) cycles.
    pub fn run(mut self) -> Result<Factorization> {
        let rows = self.observations.nrows();
        let cols = self.observations.ncols();
        info!(
            rows,
            cols,
            observed = self.observations.observed_count(),
            rank = self.config.rank,
            regularization = self.config.regularization,
            iterations = self.config.iterations,
            solver = self.solver.name(),
            workers = self.runner.workers(),
            "starting ALS factorization"
        );

        let start = Instant::now();
        for iter in 0..self.config.iterations {
            let start_p = Instant::now();
            let empty_rows = solve_side(
                &self.runner,
                &self.solver,
                &self.observations,
                &self.q,
                &mut self.p,
                self.config.regularization,
            )?;
            let p_time = start_p.elapsed();

            let start_q = Instant::now();
            let empty_cols = solve_side(
                &self.runner,
                &self.solver,
                &self.transposed,
                &self.p,
                &mut self.q,
                self.config.regularization,
            )?;
            let q_time = start_q.elapsed();

            if self.config.track_loss {
                let rmse = observed_rmse(&self.p, &self.q, &self.observations);
                debug!(
                    iteration = iter + 1,
                    p_secs = p_time.as_secs_f64(),
                    q_secs = q_time.as_secs_f64(),
                    rmse,
                    "ALS iteration"
                );
            } else {
                debug!(
                    iteration = iter + 1,
                    p_secs = p_time.as_secs_f64(),
                    q_secs = q_time.as_secs_f64(),
                    "ALS iteration"
                );
            }
            if empty_rows + empty_cols > 0 {
                trace!(empty_rows, empty_cols, "vectors without observations set to zero");
            }
        }
        info!(secs = start.elapsed().as_secs_f64(), "ALS factorization done");

        Factorization::new(self.p, self.q)
    }
}

/// One pass: every column of `out` is re-solved against the fixed `factors`,
/// using row `j` of `observations` for column `j`. Returns how many columns
/// had no observations.
fn solve_side<S: LinearSolve>(
    runner: &PassRunner,
    solver: &S,
    observations: &DenseMatrix,
    factors: &FactorMatrix,
    out: &mut FactorMatrix,
    lambda: f64,
) -> Result<usize> {
    let k = out.rank();
    debug_assert_eq!(observations.nrows(), out.ncols());

    let empty = AtomicUsize::new(0);
    runner.run_with(
        out.as_mut_slice(),
        k,
        || NormalEquations::new(k),
        |eq: &mut NormalEquations, j, xu| {
            eq.rebuild(factors, observations.row(j), lambda)?;
            if eq.is_degenerate() {
                // λI x = 0
                xu.fill(0.0);
                empty.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            let (gram, rhs) = eq.system_mut();
            solver.solve(gram, rhs, k).map_err(|e| e.at_index(j))?;
            xu.copy_from_slice(rhs);
            Ok(())
        },
    )?;
    Ok(empty.into_inner())
}

fn validate_observations(observations: &DenseMatrix) -> Result<()> {
    for (row, values) in observations.rows().enumerate() {
        for (col, &value) in values.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(AlsError::InvalidObservation { row, col, value });
            }
        }
    }
    Ok(())
}

/// Factorize `rows` with the default Cholesky solver.
pub fn factorize(rows: &[Vec<f64>], config: &AlsConfig) -> Result<Factorization> {
    let observations = DenseMatrix::from_rows(rows)?;
    AlsEngine::new(observations, config.clone())?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QInit;
    use crate::solve::GaussSolver;

    fn sample_rows() -> Vec<Vec<f64>> {
        vec![
            vec![1.0, 1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![1.0, 0.0, 1.0, 1.0],
            vec![0.0, 1.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0, 0.0],
        ]
    }

    fn sample() -> DenseMatrix {
        DenseMatrix::from_rows(&sample_rows()).unwrap()
    }

    #[test]
    fn construction_allocates_p_zero_and_initialises_q() {
        let cfg = AlsConfig::new(2, 0.01, 10).with_init(QInit::Constant(2.0));
        let engine = AlsEngine::new(sample(), cfg).unwrap();
        assert_eq!((engine.p().nrows(), engine.p().ncols()), (2, 5));
        assert_eq!((engine.q().nrows(), engine.q().ncols()), (2, 4));
        assert!(engine.p().as_slice().iter().all(|&v| v == 0.0));
        assert!(engine.q().as_slice().iter().all(|&v| v == 2.0));
    }

    #[test]
    fn empty_matrix_is_a_shape_error() {
        for obs in [DenseMatrix::zeros(5, 0), DenseMatrix::zeros(0, 5)] {
            let err = AlsEngine::new(obs, AlsConfig::new(1, 0.1, 1)).err().unwrap();
            assert!(matches!(err, AlsError::Shape(_)), "got {:?}", err);
        }
    }

    #[test]
    fn negative_observation_is_rejected() {
        let mut rows = sample_rows();
        rows[3][2] = -1.0;
        let err = AlsEngine::new(
            DenseMatrix::from_rows(&rows).unwrap(),
            AlsConfig::new(2, 0.01, 1),
        )
        .err()
        .unwrap();
        assert_eq!(
            err,
            AlsError::InvalidObservation {
                row: 3,
                col: 2,
                value: -1.0
            }
        );
    }

    #[test]
    fn solve_side_writes_every_column() {
        let obs = sample();
        let q = QInit::Constant(1.0).fill(2, 4);
        let mut p = FactorMatrix::filled(2, 5, f64::NAN);
        let empty = solve_side(
            &PassRunner::sequential(),
            &CholeskySolver,
            &obs,
            &q,
            &mut p,
            0.1,
        )
        .unwrap();
        assert_eq!(empty, 0);
        assert!(p.as_slice().iter().all(|v| v.is_finite()));
        // row 1 has one observation of 1.0 against q = [1, 1]:
        // [[1.1, 1], [1, 1.1]] x = [1, 1] -> x = [1/2.1, 1/2.1]
        for &v in p.column(1) {
            assert!((v - 1.0 / 2.1).abs() < 1e-12);
        }
    }

    #[test]
    fn solver_failure_carries_the_vector_index() {
        struct Failing;
        impl LinearSolve for Failing {
            fn solve(&self, _: &mut [f64], _: &mut [f64], _: usize) -> Result<()> {
                Err(AlsError::Numerical {
                    index: 0,
                    reason: "refused".into(),
                })
            }
            fn name(&self) -> &'static str {
                "failing"
            }
        }

        // row 0 is empty and never reaches the solver
        let mut rows = sample_rows();
        rows[0] = vec![0.0; 4];
        let cfg = AlsConfig::new(2, 0.01, 3).with_workers(1);
        let err = AlsEngine::with_solver(DenseMatrix::from_rows(&rows).unwrap(), cfg, Failing)
            .unwrap()
            .run()
            .unwrap_err();
        assert_eq!(
            err,
            AlsError::Numerical {
                index: 1,
                reason: "refused".into()
            }
        );
    }

    #[test]
    fn gauss_and_cholesky_agree() {
        let cfg = AlsConfig::new(2, 0.01, 10).with_init(QInit::Random { seed: 3 });
        let a = AlsEngine::new(sample(), cfg.clone()).unwrap().run().unwrap();
        let b = AlsEngine::with_solver(sample(), cfg, GaussSolver::default())
            .unwrap()
            .run()
            .unwrap();
        for (x, y) in a.p().as_slice().iter().zip(b.p().as_slice()) {
            assert!((x - y).abs() < 1e-8, "{} vs {}", x, y);
        }
    }

    #[test]
    fn track_loss_does_not_change_the_result() {
        let cfg = AlsConfig::new(2, 0.01, 5).with_init(QInit::Constant(2.0));
        let a = AlsEngine::new(sample(), cfg.clone()).unwrap().run().unwrap();
        let b = AlsEngine::new(sample(), cfg.with_track_loss(true))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(a, b);
    }
}
