//! Alternating least squares factorization of dense, partially observed matrices.
//!
//! An observation matrix `R` (`rows × cols`, entries `> 0` observed, `0`
//! unobserved) is factored into `P` (`k × rows`) and `Q` (`k × cols`) so that
//! `Pᵀ Q` approximates the observed entries. Each half-iteration re-solves
//! every column of one factor in parallel against the other, frozen, factor.
//!
//! ```no_run
//! use densals::{factorize, AlsConfig, QInit};
//!
//! let rows = vec![
//!     vec![1.0, 1.0, 0.0, 0.0],
//!     vec![0.0, 1.0, 0.0, 0.0],
//!     vec![1.0, 0.0, 1.0, 1.0],
//! ];
//! let config = AlsConfig::new(2, 0.01, 10).with_init(QInit::Random { seed: 7 });
//! let model = factorize(&rows, &config)?;
//! let score = model.predict(1, 3);
//! # Ok::<(), densals::AlsError>(())
//! ```

mod config;
mod engine;
mod error;
mod matrix;
mod model;
mod normal;
mod pass;
mod solve;

pub use config::{AlsConfig, QInit};
pub use engine::{factorize, AlsEngine};
pub use error::{AlsError, Result};
pub use matrix::{DenseMatrix, FactorMatrix};
pub use model::Factorization;
pub use normal::NormalEquations;
pub use pass::PassRunner;
pub use solve::{CholeskySolver, GaussSolver, LinearSolve};
