use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{AlsError, Result};
use crate::matrix::FactorMatrix;

/// How the column factor matrix Q is filled before the first pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QInit {
    /// Every entry set to the same value.
    Constant(f64),
    /// Uniform draws from [0, 1) using a caller-supplied seed.
    Random { seed: u64 },
}

impl QInit {
    pub fn fill(&self, rank: usize, ncols: usize) -> FactorMatrix {
        match *self {
            QInit::Constant(v) => FactorMatrix::filled(rank, ncols, v),
            QInit::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                FactorMatrix::from_fn(rank, ncols, |_, _| rng.random::<f64>())
            }
        }
    }
}

impl Default for QInit {
    fn default() -> Self {
        QInit::Random { seed: 42 }
    }
}

/// Hyperparameters for one factorization run.
#[derive(Debug, Clone, PartialEq)]
pub struct AlsConfig {
    /// Number of latent features `k`; must satisfy `0 < k < min(rows, cols)`.
    pub rank: usize,
    /// Ridge penalty added to each system's diagonal; must be `> 0`.
    pub regularization: f64,
    /// Exact number of (solve-P, solve-Q) cycles.
    pub iterations: usize,
    pub init: QInit,
    /// Worker threads per pass. 0 uses rayon's global pool, 1 runs sequentially.
    pub workers: usize,
    /// Compute the training RMSE after every iteration and log it.
    pub track_loss: bool,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            rank: 10,
            regularization: 0.01,
            iterations: 10,
            init: QInit::default(),
            workers: 0,
            track_loss: false,
        }
    }
}

impl AlsConfig {
    pub fn new(rank: usize, regularization: f64, iterations: usize) -> Self {
        Self {
            rank,
            regularization,
            iterations,
            ..Self::default()
        }
    }

    pub fn with_init(mut self, init: QInit) -> Self {
        self.init = init;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_track_loss(mut self, track_loss: bool) -> Self {
        self.track_loss = track_loss;
        self
    }

    /// Check the parameters against an observation matrix of `rows × cols`.
    pub fn validate(&self, rows: usize, cols: usize) -> Result<()> {
        let limit = rows.min(cols);
        if self.rank == 0 {
            return Err(AlsError::invalid("rank", "must be greater than zero"));
        }
        if self.rank >= limit {
            return Err(AlsError::invalid(
                "rank",
                format!(
                    "{} must be strictly less than min(rows, cols) = {}",
                    self.rank, limit
                ),
            ));
        }
        if !(self.regularization.is_finite() && self.regularization > 0.0) {
            return Err(AlsError::invalid(
                "regularization",
                format!("{} must be positive and finite", self.regularization),
            ));
        }
        if let QInit::Constant(v) = self.init {
            if !v.is_finite() {
                return Err(AlsError::invalid("init", format!("constant fill {} is not finite", v)));
            }
        }
        Ok(())
    }
}
