//! ordgwas-linalg: Linear algebra wrappers for ordgwas
//!
//! Provides the dense matrix type and the Cholesky-based solvers used
//! by the proportional-odds fitter and the association tests.

pub mod decomposition;
pub mod dense;

pub use decomposition::LinalgError;
pub use dense::DenseMatrix;
