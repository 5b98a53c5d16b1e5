use anyhow::Result;
use sprs::CsMat;

use crate::error::PowersError;
use crate::math::dot;
use crate::mpc::{CostModel, GenCost, UserExtension};
use crate::sparse::{mul_vec, mul_vec_t, transpose, zeros};

/// Evaluates a polynomial cost, or its first or second derivative, at `x`.
///
/// Coefficients are stored highest order first. Piecewise linear costs
/// evaluate to zero; they enter the OPF through the `y` variables.
pub fn polycost(cost: &GenCost, x: f64, der: usize) -> f64 {
    if cost.model != CostModel::Polynomial {
        return 0.0;
    }
    // c[k] is the coefficient of x^k
    let mut c: Vec<f64> = cost.cost.iter().rev().cloned().collect();
    for _ in 0..der {
        if c.len() < 2 {
            return 0.0;
        }
        c = c.iter().enumerate().skip(1).map(|(k, ck)| k as f64 * ck).collect();
    }
    c.iter().rev().fold(0.0, |f, ck| f * x + ck)
}

/// Total cost of producing `x` MW (or MVAr).
///
/// Piecewise linear costs are extrapolated beyond the first and last
/// breakpoints using the end segments.
pub fn totcost(cost: &GenCost, x: f64) -> f64 {
    match cost.model {
        CostModel::Polynomial => polycost(cost, x, 0),
        CostModel::PwLinear => {
            let pts = cost.points();
            if pts.len() < 2 {
                return pts.first().map_or(0.0, |&(_, c)| c);
            }
            let mut total = 0.0;
            for seg in pts.windows(2) {
                let ((p1, c1), (p2, c2)) = (seg[0], seg[1]);
                let m = (c2 - c1) / (p2 - p1);
                total = c1 + m * (x - p1);
                if x < p2 {
                    break;
                }
            }
            total
        }
    }
}

/// Converts a polynomial cost to a piecewise linear one by evaluating it
/// at `npts` evenly spaced points on `[pmin, pmax]`.
pub fn poly2pwl(cost: &GenCost, pmin: f64, pmax: f64, npts: usize) -> GenCost {
    let npts = npts.max(2);
    // a fixed output still needs a non-degenerate segment
    let span = if pmax > pmin { pmax - pmin } else { 1.0 };
    let step = span / (npts - 1) as f64;
    let points: Vec<(f64, f64)> = (0..npts)
        .map(|k| {
            let p = pmin + k as f64 * step;
            (p, totcost(cost, p))
        })
        .collect();
    GenCost {
        startup: cost.startup,
        shutdown: cost.shutdown,
        ..GenCost::pw_linear(&points)
    }
}

/// Checks a cost for use in the OPF and rewrites a piecewise linear cost
/// with a single segment as the equivalent linear polynomial.
pub(crate) fn prepare_cost(gen: usize, cost: &GenCost) -> Result<GenCost, PowersError> {
    match cost.model {
        CostModel::Polynomial => {
            if cost.cost.is_empty() {
                return Err(PowersError::InvalidCost {
                    gen,
                    reason: "polynomial cost has no coefficients".to_string(),
                });
            }
            Ok(cost.clone())
        }
        CostModel::PwLinear => {
            if cost.cost.len() % 2 != 0 || cost.n_cost() < 2 {
                return Err(PowersError::InvalidCost {
                    gen,
                    reason: "piecewise linear cost needs at least two (p, f) points".to_string(),
                });
            }
            let pts = cost.points();
            if pts.windows(2).any(|s| s[1].0 <= s[0].0) {
                return Err(PowersError::InvalidCost {
                    gen,
                    reason: "piecewise linear breakpoints must be increasing".to_string(),
                });
            }
            if pts.len() == 2 {
                let ((x0, y0), (x1, y1)) = (pts[0], pts[1]);
                let m = (y1 - y0) / (x1 - x0);
                let b = y0 - m * x0;
                return Ok(GenCost {
                    startup: cost.startup,
                    shutdown: cost.shutdown,
                    ..GenCost::polynomial(&[m, b])
                });
            }
            Ok(cost.clone())
        }
    }
}

/// User defined cost `1/2 w'Hw + Cw'w` with `w = N x - rh`.
pub(crate) struct UserCost {
    n: CsMat<f64>,
    h: CsMat<f64>,
    cw: Vec<f64>,
    rh: Vec<f64>,
}

impl UserCost {
    /// Validates the cost part of `user` against `nx` optimization
    /// variables. Returns `None` when no `N` is given.
    pub(crate) fn new(user: &UserExtension, nx: usize) -> Result<Option<Self>> {
        let n = match &user.n {
            Some(n) => n.clone(),
            None => return Ok(None),
        };
        if n.cols() != nx {
            return Err(PowersError::DimensionMismatch {
                what: "user N".to_string(),
                actual: n.cols(),
                expected: nx,
            }
            .into());
        }
        let nw = n.rows();
        let h = match &user.h {
            Some(h) => {
                if h.rows() != nw || h.cols() != nw {
                    return Err(PowersError::DimensionMismatch {
                        what: "user H".to_string(),
                        actual: h.cols(),
                        expected: nw,
                    }
                    .into());
                }
                h.clone()
            }
            None => zeros(nw, nw),
        };
        let fill = |v: &[f64], what: &str| -> Result<Vec<f64>> {
            if v.is_empty() {
                Ok(vec![0.0; nw])
            } else if v.len() != nw {
                Err(PowersError::LengthMismatch {
                    what: what.to_string(),
                    actual: v.len(),
                    expected: nw,
                }
                .into())
            } else {
                Ok(v.to_vec())
            }
        };
        Ok(Some(UserCost {
            cw: fill(&user.cw, "user Cw")?,
            rh: fill(&user.rh, "user rh")?,
            n,
            h,
        }))
    }

    /// Value and gradient at `x`.
    pub(crate) fn eval(&self, x: &[f64]) -> (f64, Vec<f64>) {
        let w: Vec<f64> = mul_vec(&self.n, x)
            .iter()
            .zip(&self.rh)
            .map(|(nx, rh)| nx - rh)
            .collect();
        let hw = mul_vec(&self.h, &w);
        let f = 0.5 * dot(&w, &hw) + dot(&self.cw, &w);
        let hwc: Vec<f64> = hw.iter().zip(&self.cw).map(|(a, b)| a + b).collect();
        (f, mul_vec_t(&self.n, &hwc))
    }

    /// Constant Hessian `N'HN`.
    pub(crate) fn hessian(&self) -> CsMat<f64> {
        &(&transpose(&self.n) * &self.h) * &self.n
    }

    /// Coefficients of the equivalent quadratic `1/2 x'Qx + c'x + k`.
    pub(crate) fn quadratic(&self) -> (CsMat<f64>, Vec<f64>, f64) {
        let h_rh = mul_vec(&self.h, &self.rh);
        let lin: Vec<f64> = self.cw.iter().zip(&h_rh).map(|(c, hr)| c - hr).collect();
        let k = 0.5 * dot(&self.rh, &h_rh) - dot(&self.cw, &self.rh);
        (self.hessian(), mul_vec_t(&self.n, &lin), k)
    }
}
