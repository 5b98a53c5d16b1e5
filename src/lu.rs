use anyhow::{format_err, Result};
use faer::prelude::{Mat, Solve};
use faer::sparse::{SparseColMat, Triplet};
use sprs::CsMat;

use crate::error::PowersError;
use crate::traits::LinearSolver;

/// Sparse LU with partial pivoting, backed by `faer`.
///
/// Handles the unsymmetric power flow Jacobian as well as the symmetric
/// indefinite KKT systems of the interior point method.
#[derive(Default, Clone, Copy)]
pub struct SparseLU;

impl LinearSolver for SparseLU {
    fn solve(&self, a_mat: &CsMat<f64>, b: &[f64]) -> Result<Vec<f64>> {
        let n = a_mat.rows();
        if a_mat.cols() != n {
            return Err(format_err!("matrix must be square: {}x{}", n, a_mat.cols()));
        }
        if b.len() != n {
            return Err(PowersError::LengthMismatch {
                what: "rhs".to_string(),
                actual: b.len(),
                expected: n,
            }
            .into());
        }
        if n == 0 {
            return Ok(Vec::new());
        }

        let triplets: Vec<Triplet<usize, usize, f64>> = a_mat
            .iter()
            .map(|(&v, (i, j))| Triplet::new(i, j, v))
            .collect();
        let a = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
            .map_err(|err| PowersError::LinearSolve(format!("{:?}", err)))?;

        let lu = a.sp_lu().map_err(|err| match err {
            faer::sparse::linalg::LuError::SymbolicSingular { .. } => PowersError::SingularMatrix,
            err => PowersError::LinearSolve(format!("{:?}", err)),
        })?;

        let mut x = Mat::<f64>::from_fn(n, 1, |i, _| b[i]);
        lu.solve_in_place(&mut x);

        let x: Vec<f64> = (0..n).map(|i| x[(i, 0)]).collect();
        if x.iter().any(|v| !v.is_finite()) {
            return Err(PowersError::SingularMatrix.into());
        }
        Ok(x)
    }
}
