use anyhow::{format_err, Result};
use sprs::CsMat;

use crate::error::PowersError;
use crate::ips::{nlp, IpsOpt, IpsSolution, ObjectiveFunction};
use crate::math::dot;
use crate::sparse::{mul_vec, zeros};
use crate::traits::LinearSolver;

/// Quadratic objective `1/2 x'Hx + c'x`.
struct QuadraticCost<'a> {
    h: CsMat<f64>,
    c: &'a [f64],
}

impl<'a> ObjectiveFunction for QuadraticCost<'a> {
    fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
        let hx = mul_vec(&self.h, x);
        let f = 0.5 * dot(&hx, x) + dot(self.c, x);
        let df = hx.iter().zip(self.c).map(|(hx, c)| hx + c).collect();
        (f, df)
    }

    fn d2f(&self, _x: &[f64]) -> CsMat<f64> {
        self.h.clone()
    }
}

/// Quadratic program solver based on the interior point method.
///
/// ```text
///     min 1/2 x'*H*x + c'*x
///      x
/// subject to
///     l <= A*x <= u       (linear constraints)
///     xmin <= x <= xmax   (variable bounds)
/// ```
///
/// An empty `H` gives a linear program, in which case the problem size
/// is taken from `c`, `A` or the bounds. Empty `c` and `x0` default to
/// zero.
#[allow(clippy::too_many_arguments)]
pub fn qp(
    h: Option<&CsMat<f64>>,
    c: &[f64],
    a_mat: Option<&CsMat<f64>>,
    l: &[f64],
    u: &[f64],
    xmin: &[f64],
    xmax: &[f64],
    x0: &[f64],
    opt: &IpsOpt,
    lin_solver: &dyn LinearSolver,
) -> Result<IpsSolution> {
    let nx = match h {
        Some(h) if h.rows() > 0 => h.rows(),
        _ => {
            if !c.is_empty() {
                c.len()
            } else if let Some(a) = a_mat {
                a.cols()
            } else if !xmin.is_empty() {
                xmin.len()
            } else if !xmax.is_empty() {
                xmax.len()
            } else {
                return Err(format_err!(
                    "LP problem must include constraints or variable bounds"
                ));
            }
        }
    };
    let h = match h {
        Some(h) if h.rows() > 0 => {
            if h.cols() != nx {
                return Err(PowersError::DimensionMismatch {
                    what: "H".to_string(),
                    actual: h.cols(),
                    expected: nx,
                }
                .into());
            }
            h.clone()
        }
        _ => zeros(nx, nx),
    };
    let c = if c.is_empty() { vec![0.0; nx] } else { c.to_vec() };
    if c.len() != nx {
        return Err(PowersError::LengthMismatch {
            what: "c".to_string(),
            actual: c.len(),
            expected: nx,
        }
        .into());
    }
    let x0 = if x0.is_empty() { vec![0.0; nx] } else { x0.to_vec() };

    let f_fcn = QuadraticCost { h, c: &c };

    nlp(
        &f_fcn, &x0, a_mat, l, u, xmin, xmax, None, None, opt, lin_solver,
    )
}
