#![forbid(unsafe_code)]
#![warn(clippy::all, rust_2018_idioms)]

//! Eigenvalues and eigenvectors of general square matrices.
//!
//! The pipeline is
//! 1. [`Balancer`]: permute and scale the matrix to isolate trivial
//!    eigenvalues and even out row/column norms;
//! 2. a Schur decomposition ([`RealSchur`], [`ComplexSchur`] or
//!    [`SymmetricSchur`]) of the balanced matrix;
//! 3. the eigen-extractor ([`eigenvalues_of_schur`],
//!    [`eigenvectors_of_schur`]) reading eigenvalues off the diagonal of `T`
//!    and back-substituting for eigenvectors.
//!
//! [`Eigen`] wires these together:
//!
//! ```
//! use nalgebra::DMatrix;
//!
//! // Cyclic permutation: eigenvalues are the fourth roots of unity.
//! let a = DMatrix::from_row_slice(
//!     4,
//!     4,
//!     &[
//!         0.0, 0.0, 0.0, 1.0, //
//!         1.0, 0.0, 0.0, 0.0, //
//!         0.0, 1.0, 0.0, 0.0, //
//!         0.0, 0.0, 1.0, 0.0,
//!     ],
//! );
//! let values = balanced_eigen::eigenvalues(&a)?;
//! assert!(values.iter().all(|lambda| (lambda.norm() - 1.0).abs() < 1e-12));
//! # Ok::<(), balanced_eigen::EigenError>(())
//! ```

mod balance;
mod eigen;
mod eigen2x2;
mod error;
mod hessenberg;
mod scalar;
mod schur;
mod symmetric;
mod triangular;

pub use balance::{balance_in_place, BalanceConfig, BalanceRecord, Balancer};
pub use eigen::{
    eigenpairs, eigenvalues, eigenvalues_of_schur, eigenvectors, eigenvectors_of_schur,
    eigenvectors_of_triangular, Eigen, EigenPairs,
};
pub use eigen2x2::{complex_eigenvalues_2x2, eigenvalues_2x2_matrix, real_eigenvalues_2x2};
pub use error::{EigenError, Result};
pub use scalar::{is_self_adjoint, Scalar};
pub use schur::{ComplexSchur, RealSchur, SchurConfig, SchurScalar};
pub use symmetric::SymmetricSchur;
pub use triangular::TriangularSolver;

pub use num_complex::Complex64;
