use anyhow::Result;
use sprs::CsMat;

use crate::debug::format_f64_vec;
use crate::error::PowersError;
use crate::ips::{HessianFunction, IpsOpt, NonlinearConstraint, ObjectiveFunction};
use crate::math::{any_nan, dot, max, norm_inf, select as select_vec, EPS};
use crate::sparse::{mul_vec, mul_vec_t, scale, select, spdiag, transpose, zeros};
use crate::traits::LinearSolver;

const XI: f64 = 0.99995;
const SIGMA: f64 = 0.1;
const Z0: f64 = 1.0;
const ALPHA_MIN: f64 = 1e-8;
const RHO_MIN: f64 = 0.95;
const RHO_MAX: f64 = 1.05;
const MU_THRESHOLD: f64 = 1e-5;

/// Values at or beyond this magnitude are treated as unbounded.
const BOUND: f64 = 1e10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitFlag {
    /// First order optimality conditions satisfied.
    Converged = 1,
    /// Maximum number of iterations reached.
    NotConverged = 0,
    /// Numerically failed.
    NumericalFailure = -1,
}

/// Convergence measures recorded for each iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IterationRecord {
    pub feascond: f64,
    pub gradcond: f64,
    pub compcond: f64,
    pub costcond: f64,
    pub gamma: f64,
    pub stepsize: f64,
    pub obj: f64,
    pub alphap: f64,
    pub alphad: f64,
}

/// Lagrange and Kuhn-Tucker multipliers at the solution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lambda {
    /// Lower bound on optimization variables.
    pub lower: Vec<f64>,
    /// Upper bound on optimization variables.
    pub upper: Vec<f64>,
    /// Lower (left-hand) limit on linear constraints.
    pub mu_l: Vec<f64>,
    /// Upper (right-hand) limit on linear constraints.
    pub mu_u: Vec<f64>,
    /// Nonlinear equality constraints.
    pub eqnonlin: Vec<f64>,
    /// Nonlinear inequality constraints.
    pub ineqnonlin: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct IpsSolution {
    /// Solution vector.
    pub x: Vec<f64>,
    /// Final objective function value.
    pub f: f64,
    pub exitflag: ExitFlag,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Convergence measures at the initial point and after each iteration.
    pub history: Vec<IterationRecord>,
    pub message: String,
    pub lambda: Lambda,
}

impl IpsSolution {
    pub fn converged(&self) -> bool {
        self.exitflag == ExitFlag::Converged
    }
}

/// Objective and constraints evaluated at a point.
struct Point {
    f: f64,
    df: Vec<f64>,
    h: Vec<f64>,
    g: Vec<f64>,
    dh: CsMat<f64>,
    dg: CsMat<f64>,
}

/// Linear constraints split into equality `Ae x = be` and
/// inequality `Ai x <= bi` form.
struct Linear {
    ae: CsMat<f64>,
    be: Vec<f64>,
    ai: CsMat<f64>,
    bi: Vec<f64>,
    ae_t: CsMat<f64>,
    ai_t: CsMat<f64>,
}

struct Problem<'a> {
    nx: usize,
    f_fcn: &'a dyn ObjectiveFunction,
    gh_fcn: Option<&'a dyn NonlinearConstraint>,
    lin: Linear,
    cost_mult: f64,
}

impl<'a> Problem<'a> {
    fn evaluate(&self, x: &[f64]) -> Result<Point> {
        let (f, df) = self.f_fcn.f(x);
        if df.len() != self.nx {
            return Err(PowersError::LengthMismatch {
                what: "objective gradient".to_string(),
                actual: df.len(),
                expected: self.nx,
            }
            .into());
        }
        let (hn, gn, dhn, dgn) = match self.gh_fcn {
            Some(gh_fcn) => gh_fcn.gh(x),
            None => (vec![], vec![], zeros(self.nx, 0), zeros(self.nx, 0)),
        };
        for (what, d, n) in [("dh", &dhn, hn.len()), ("dg", &dgn, gn.len())] {
            if d.rows() != self.nx || d.cols() != n {
                return Err(PowersError::DimensionMismatch {
                    what: format!("{} ({}x{})", what, d.rows(), d.cols()),
                    actual: d.cols(),
                    expected: n,
                }
                .into());
            }
        }

        let lin = &self.lin;
        let ai_x = mul_vec(&lin.ai, x);
        let ae_x = mul_vec(&lin.ae, x);

        Ok(Point {
            f: f * self.cost_mult,
            df: df.iter().map(|df| df * self.cost_mult).collect(),
            // inequality constraints
            h: hn
                .into_iter()
                .chain(ai_x.iter().zip(&lin.bi).map(|(a, b)| a - b))
                .collect(),
            // equality constraints
            g: gn
                .into_iter()
                .chain(ae_x.iter().zip(&lin.be).map(|(a, b)| a - b))
                .collect(),
            // 1st derivatives
            dh: sprs::hstack(&[dhn.view(), lin.ai_t.view()]),
            dg: sprs::hstack(&[dgn.view(), lin.ae_t.view()]),
        })
    }
}

/// Gradient of the Lagrangian `df + dg * lam + dh * mu`.
fn lagrangian_gradient(p: &Point, lam: &[f64], mu: &[f64]) -> Vec<f64> {
    let dg_lam = mul_vec(&p.dg, lam);
    let dh_mu = mul_vec(&p.dh, mu);
    p.df.iter()
        .zip(dg_lam)
        .zip(dh_mu)
        .map(|((df, a), b)| df + a + b)
        .collect()
}

/// Value of the barrier Lagrangian used by the step-size control.
fn merit(f: f64, p: &Point, z: &[f64], lam: &[f64], mu: &[f64], gamma: f64) -> f64 {
    let hz: Vec<f64> = p.h.iter().zip(z).map(|(h, z)| h + z).collect();
    f + dot(lam, &p.g) + dot(mu, &hz) - gamma * z.iter().map(|z| z.ln()).sum::<f64>()
}

fn feasibility(p: &Point, x: &[f64], z: &[f64]) -> f64 {
    let max_h = max(&p.h).unwrap_or(f64::NEG_INFINITY);
    norm_inf(&p.g).max(max_h) / (1.0 + norm_inf(x).max(norm_inf(z)))
}

fn gradient(lx: &[f64], lam: &[f64], mu: &[f64]) -> f64 {
    norm_inf(lx) / (1.0 + norm_inf(lam).max(norm_inf(mu)))
}

/// Largest step in `[0, 1]`, scaled by `XI`, that keeps `v + alpha*dv`
/// positive.
fn step_length(v: &[f64], dv: &[f64]) -> f64 {
    let min = v
        .iter()
        .zip(dv)
        .filter(|(_, &dv)| dv < 0.0)
        .map(|(v, dv)| v / -dv)
        .fold(f64::INFINITY, f64::min);
    (XI * min).min(1.0)
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    y.iter_mut().zip(x).for_each(|(y, x)| *y += alpha * x);
}

fn bounds(v: &[f64], n: usize, default: f64, what: &str) -> Result<Vec<f64>> {
    if v.is_empty() {
        Ok(vec![default; n])
    } else if v.len() != n {
        Err(PowersError::LengthMismatch {
            what: what.to_string(),
            actual: v.len(),
            expected: n,
        }
        .into())
    } else {
        Ok(v.to_vec())
    }
}

/// Primal-dual interior point method for NLP (nonlinear programming).
///
/// Minimize a function `f(x)` beginning from a starting point `x0`,
/// subject to optional linear and nonlinear constraints and variable
/// bounds.
///
/// ```text
///     min f(x)
///      x
/// subject to
///     g(x) = 0            (nonlinear equalities)
///     h(x) <= 0           (nonlinear inequalities)
///     l <= A*x <= u       (linear constraints)
///     xmin <= x <= xmax   (variable bounds)
/// ```
///
/// Empty `l`, `u`, `xmin` or `xmax` slices default to unbounded. A
/// `hess_fcn` must be provided when there are nonlinear constraints.
///
/// Malformed dimensions are returned as errors. Non-convergence and
/// numerical failure are reported through `IpsSolution::exitflag`.
/// Inconsistent bounds (`l > u` or `xmin > xmax`) are reported as a
/// numerical failure without iterating.
#[allow(clippy::too_many_arguments)]
pub fn nlp(
    f_fcn: &dyn ObjectiveFunction,
    x0: &[f64],
    a_mat: Option<&CsMat<f64>>,
    l: &[f64],
    u: &[f64],
    xmin: &[f64],
    xmax: &[f64],
    gh_fcn: Option<&dyn NonlinearConstraint>,
    hess_fcn: Option<&dyn HessianFunction>,
    opt: &IpsOpt,
    lin_solver: &dyn LinearSolver,
) -> Result<IpsSolution> {
    let nx = x0.len(); // number of optimization variables

    let a_mat = match a_mat {
        Some(a) => {
            if a.cols() != nx {
                return Err(PowersError::DimensionMismatch {
                    what: "A".to_string(),
                    actual: a.cols(),
                    expected: nx,
                }
                .into());
            }
            a.clone()
        }
        None => zeros(0, nx),
    };
    let na = a_mat.rows(); // number of original linear constraints

    let l = bounds(l, na, f64::NEG_INFINITY, "l")?;
    let u = bounds(u, na, f64::INFINITY, "u")?;
    let xmin = bounds(xmin, nx, f64::NEG_INFINITY, "xmin")?;
    let xmax = bounds(xmax, nx, f64::INFINITY, "xmax")?;

    let nonlinear = gh_fcn.is_some();
    if nonlinear && hess_fcn.is_none() {
        return Err(PowersError::MissingHessian.into());
    }

    let cost_mult = opt.cost_mult;

    if l.iter().zip(&u).any(|(l, u)| l > u) || xmin.iter().zip(&xmax).any(|(l, u)| l > u) {
        log::info!("Numerically failed: infeasible bounds");
        let (f, _) = f_fcn.f(x0);
        return Ok(IpsSolution {
            x: x0.to_vec(),
            f,
            exitflag: ExitFlag::NumericalFailure,
            iterations: 0,
            history: Vec::new(),
            message: "infeasible bounds".to_string(),
            lambda: Lambda {
                lower: vec![0.0; nx],
                upper: vec![0.0; nx],
                mu_l: vec![0.0; na],
                mu_u: vec![0.0; na],
                ..Default::default()
            },
        });
    }

    // add var limits to linear constraints
    let aa = sprs::vstack(&[CsMat::eye(nx).view(), a_mat.view()]);
    let ll = [xmin, l].concat();
    let uu = [xmax, u].concat();

    // split up linear constraints
    let mut ieq = Vec::new(); // equality
    let mut igt = Vec::new(); // greater than, unbounded above
    let mut ilt = Vec::new(); // less than, unbounded below
    let mut ibx = Vec::new(); // box constraints
    for (i, (&lo, &up)) in ll.iter().zip(&uu).enumerate() {
        if (up - lo).abs() <= EPS {
            ieq.push(i);
        } else if up >= BOUND && lo > -BOUND {
            igt.push(i);
        } else if lo <= -BOUND && up < BOUND {
            ilt.push(i);
        } else if up < BOUND && lo > -BOUND {
            ibx.push(i);
        }
    }
    let (nlt, ngt, nbx) = (ilt.len(), igt.len(), ibx.len());

    let ae = select(&aa, Some(&ieq), None);
    let be = select_vec(&uu, &ieq);
    let (a_lt, a_gt, a_bx) = (
        select(&aa, Some(&ilt), None),
        select(&aa, Some(&igt), None),
        select(&aa, Some(&ibx), None),
    );
    let ai = sprs::vstack(&[
        a_lt.view(),
        scale(&a_gt, -1.0).view(),
        a_bx.view(),
        scale(&a_bx, -1.0).view(),
    ]);
    let bi: Vec<f64> = ilt
        .iter()
        .map(|&i| uu[i])
        .chain(igt.iter().map(|&i| -ll[i]))
        .chain(ibx.iter().map(|&i| uu[i]))
        .chain(ibx.iter().map(|&i| -ll[i]))
        .collect();

    let problem = Problem {
        nx,
        f_fcn,
        gh_fcn,
        lin: Linear {
            ae_t: transpose(&ae),
            ai_t: transpose(&ai),
            ae,
            be,
            ai,
            bi,
        },
        cost_mult,
    };

    // evaluate cost f(x0) and constraints g(x0), h(x0)
    let mut x = x0.to_vec();
    let mut p = problem.evaluate(&x)?;

    // grab some dimensions
    let neq = p.g.len(); // number of equality constraints
    let niq = p.h.len(); // number of inequality constraints
    let neqnln = neq - problem.lin.be.len(); // number of nonlinear equality constraints
    let niqnln = niq - problem.lin.bi.len(); // number of nonlinear inequality constraints

    // initialize gamma, lam, mu, z, e
    let mut gamma = 1.0; // barrier coefficient
    let mut lam = vec![0.0; neq];
    let mut z = vec![Z0; niq];
    let mut mu = z.clone();
    for (z, &h) in z.iter_mut().zip(&p.h) {
        if h < -Z0 {
            *z = -h;
        }
    }
    for (mu, &z) in mu.iter_mut().zip(&z) {
        if gamma / z > Z0 {
            *mu = gamma / z;
        }
    }

    // check tolerance
    let mut f0 = p.f;
    let mut l_merit = if opt.step_control {
        merit(p.f, &p, &z, &lam, &mu, gamma)
    } else {
        0.0
    };
    let mut lx = lagrangian_gradient(&p, &lam, &mu);

    let mut feascond = feasibility(&p, &x, &z);
    let mut gradcond = gradient(&lx, &lam, &mu);
    let compcond = dot(&z, &mu) / (1.0 + norm_inf(&x));
    let costcond = (p.f - f0).abs() / (1.0 + f0.abs());

    let mut history = vec![IterationRecord {
        feascond,
        gradcond,
        compcond,
        costcond,
        gamma,
        stepsize: 0.0,
        obj: p.f / cost_mult,
        alphap: 0.0,
        alphad: 0.0,
    }];
    log::debug!(
        "{:3}  {:12.8} {:10} {:12e} {:12e} {:12e} {:12e}",
        0,
        p.f / cost_mult,
        "",
        feascond,
        gradcond,
        compcond,
        costcond
    );

    let converged_at = |c: &IterationRecord| {
        c.feascond < opt.feastol
            && c.gradcond < opt.gradtol
            && c.compcond < opt.comptol
            && c.costcond < opt.costtol
    };

    let mut converged = converged_at(&history[0]);
    let mut failed = false;
    let mut i = 0;

    // do Newton iterations
    while !converged && i < opt.max_it {
        // update iteration counter
        i += 1;

        // compute update step
        let lxx = match hess_fcn {
            Some(hess_fcn) if nonlinear => {
                hess_fcn.hess(&x, &lam[..neqnln], &mu[..niqnln], cost_mult)
            }
            _ => scale(&f_fcn.d2f(&x), cost_mult),
        };
        if lxx.rows() != nx || lxx.cols() != nx {
            return Err(PowersError::DimensionMismatch {
                what: "Hessian".to_string(),
                actual: lxx.cols(),
                expected: nx,
            }
            .into());
        }

        let zinv: Vec<f64> = z.iter().map(|z| 1.0 / z).collect();
        let mu_zinv: Vec<f64> = mu.iter().zip(&z).map(|(mu, z)| mu / z).collect();
        let dh_t = transpose(&p.dh);
        let m_mat = &lxx + &(&(&p.dh * &spdiag(&mu_zinv)) * &dh_t);
        let rhs: Vec<f64> = (0..niq)
            .map(|k| zinv[k] * (mu[k] * p.h[k] + gamma))
            .collect();
        let n_vec: Vec<f64> = lx
            .iter()
            .zip(mul_vec(&p.dh, &rhs))
            .map(|(lx, v)| lx + v)
            .collect();

        let dg_t = transpose(&p.dg);
        let kkt = sprs::bmat(&[[Some(m_mat.view()), Some(p.dg.view())], [Some(dg_t.view()), None]]);
        let b: Vec<f64> = n_vec.iter().chain(&p.g).map(|v| -v).collect();

        let dxdlam = match lin_solver.solve(&kkt, &b) {
            Ok(dxdlam) => dxdlam,
            Err(err) => {
                log::info!("Numerically failed: {}", err);
                failed = true;
                break;
            }
        };
        if any_nan(&dxdlam) {
            log::info!("Numerically failed: NaN in update step");
            failed = true;
            break;
        }
        let mut dx = dxdlam[..nx].to_vec();
        let mut dlam = dxdlam[nx..].to_vec();
        let dh_dx = mul_vec_t(&p.dh, &dx);
        let mut dz: Vec<f64> = (0..niq).map(|k| -p.h[k] - z[k] - dh_dx[k]).collect();
        let mut dmu: Vec<f64> = (0..niq)
            .map(|k| -mu[k] + zinv[k] * (gamma - mu[k] * dz[k]))
            .collect();

        // optional step-size control
        if opt.step_control {
            let x1: Vec<f64> = x.iter().zip(&dx).map(|(x, dx)| x + dx).collect();
            let p1 = problem.evaluate(&x1)?;
            let lx1 = lagrangian_gradient(&p1, &lam, &mu);
            let feascond1 = feasibility(&p1, &x1, &z);
            let gradcond1 = gradient(&lx1, &lam, &mu);

            if feascond1 > feascond && gradcond1 > gradcond {
                let mut alpha = 1.0;
                for j in 0..opt.max_red {
                    let dx1: Vec<f64> = dx.iter().map(|dx| alpha * dx).collect();
                    let x1: Vec<f64> = x.iter().zip(&dx1).map(|(x, dx)| x + dx).collect();
                    let p1 = problem.evaluate(&x1)?;
                    let l1 = merit(p1.f, &p1, &z, &lam, &mu, gamma);
                    let lxx_dx1 = mul_vec(&lxx, &dx1);
                    let rho = (l1 - l_merit) / (dot(&lx, &dx1) + 0.5 * dot(&dx1, &lxx_dx1));
                    log::trace!("   {:3}            {:10e}", -(j as i64), norm_inf(&dx1));
                    if rho > RHO_MIN && rho < RHO_MAX {
                        break;
                    }
                    alpha /= 2.0;
                }
                dx.iter_mut().for_each(|v| *v *= alpha);
                dz.iter_mut().for_each(|v| *v *= alpha);
                dlam.iter_mut().for_each(|v| *v *= alpha);
                dmu.iter_mut().for_each(|v| *v *= alpha);
            }
        }

        // do the update
        let alphap = step_length(&z, &dz);
        let alphad = step_length(&mu, &dmu);

        axpy(alphap, &dx, &mut x);
        axpy(alphap, &dz, &mut z);
        axpy(alphad, &dlam, &mut lam);
        axpy(alphad, &dmu, &mut mu);
        if niq > 0 {
            gamma = SIGMA * dot(&z, &mu) / niq as f64;
        }

        // evaluate cost, constraints, derivatives
        p = problem.evaluate(&x)?;

        // check tolerance
        lx = lagrangian_gradient(&p, &lam, &mu);
        feascond = feasibility(&p, &x, &z);
        gradcond = gradient(&lx, &lam, &mu);
        let record = IterationRecord {
            feascond,
            gradcond,
            compcond: dot(&z, &mu) / (1.0 + norm_inf(&x)),
            costcond: (p.f - f0).abs() / (1.0 + f0.abs()),
            gamma,
            stepsize: alphap * norm_inf(&dx),
            obj: p.f / cost_mult,
            alphap,
            alphad,
        };
        log::debug!(
            "{:3}  {:12.8} {:10.5} {:12e} {:12e} {:12e} {:12e}",
            i,
            record.obj,
            record.stepsize,
            record.feascond,
            record.gradcond,
            record.compcond,
            record.costcond
        );
        history.push(record);

        if converged_at(&record) {
            converged = true;
        } else {
            if any_nan(&x)
                || alphap < ALPHA_MIN
                || alphad < ALPHA_MIN
                || gamma < EPS
                || gamma > 1.0 / EPS
            {
                log::info!("Numerically failed");
                failed = true;
                break;
            }
            f0 = p.f;
            if opt.step_control {
                l_merit = merit(p.f, &p, &z, &lam, &mu, gamma);
            }
        }
    }

    let (exitflag, message) = if failed {
        (ExitFlag::NumericalFailure, "Numerically failed")
    } else if converged {
        log::info!("Converged in {} iterations", i);
        (ExitFlag::Converged, "Converged")
    } else {
        log::info!("Did not converge in {} iterations", i);
        (ExitFlag::NotConverged, "Did not converge")
    };
    log::trace!("x: {}", format_f64_vec(&x));

    // zero out multipliers on non-binding constraints
    for (mu, &h) in mu.iter_mut().zip(&p.h) {
        if h < -opt.feastol && *mu < MU_THRESHOLD {
            *mu = 0.0;
        }
    }

    // un-scale cost and prices
    let f = p.f / cost_mult;
    lam.iter_mut().for_each(|v| *v /= cost_mult);
    mu.iter_mut().for_each(|v| *v /= cost_mult);

    // re-package multipliers
    let lam_lin = &lam[neqnln..]; // lambda for linear constraints
    let mu_lin = &mu[niqnln..]; // mu for linear constraints

    let mut mu_l = vec![0.0; nx + na];
    let mut mu_u = vec![0.0; nx + na];
    for (&k, &lam) in ieq.iter().zip(lam_lin) {
        if lam < 0.0 {
            mu_l[k] = -lam; // lower bound binding
        } else if lam > 0.0 {
            mu_u[k] = lam; // upper bound binding
        }
    }
    for (j, &k) in ilt.iter().enumerate() {
        mu_u[k] = mu_lin[j];
    }
    for (j, &k) in igt.iter().enumerate() {
        mu_l[k] = mu_lin[nlt + j];
    }
    for (j, &k) in ibx.iter().enumerate() {
        mu_u[k] = mu_lin[nlt + ngt + j];
        mu_l[k] = mu_lin[nlt + ngt + nbx + j];
    }

    let lambda = Lambda {
        lower: mu_l[..nx].to_vec(),
        upper: mu_u[..nx].to_vec(),
        mu_l: mu_l[nx..].to_vec(),
        mu_u: mu_u[nx..].to_vec(),
        eqnonlin: lam[..neqnln].to_vec(),
        ineqnonlin: mu[..niqnln].to_vec(),
    };

    Ok(IpsSolution {
        x,
        f,
        exitflag,
        iterations: i,
        history,
        message: message.to_string(),
        lambda,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ips::IpsOptBuilder;
    use crate::lu::SparseLU;
    use crate::sparse::sparse;
    use anyhow::Result;

    fn assert_near(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {} got {}",
            expected,
            actual
        );
    }

    fn dense(rows: &[&[f64]]) -> CsMat<f64> {
        let (mut ri, mut ci, mut v) = (vec![], vec![], vec![]);
        for (i, row) in rows.iter().enumerate() {
            for (j, &a) in row.iter().enumerate() {
                if a != 0.0 {
                    ri.push(i);
                    ci.push(j);
                    v.push(a);
                }
            }
        }
        sparse((rows.len(), rows[0].len()), &ri, &ci, &v)
    }

    struct Parabola;

    impl ObjectiveFunction for Parabola {
        fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
            ((x[0] - 3.0).powi(2), vec![2.0 * (x[0] - 3.0)])
        }
        fn d2f(&self, _x: &[f64]) -> CsMat<f64> {
            dense(&[&[2.0]])
        }
    }

    #[test]
    fn bounded_parabola() -> Result<()> {
        let s = nlp(
            &Parabola,
            &[1.0],
            None,
            &[],
            &[],
            &[0.0],
            &[5.0],
            None,
            None,
            &IpsOpt::default(),
            &SparseLU,
        )?;
        assert!(s.converged());
        assert!(s.iterations < 10);
        assert_near(s.x[0], 3.0, 1e-5);
        assert_near(s.f, 0.0, 1e-8);
        assert_eq!(s.history.len(), s.iterations + 1);

        // neither bound is binding
        assert_eq!(s.lambda.lower, vec![0.0]);
        assert_eq!(s.lambda.upper, vec![0.0]);
        Ok(())
    }

    #[test]
    fn infeasible_bounds() -> Result<()> {
        let s = nlp(
            &Parabola,
            &[1.0],
            None,
            &[],
            &[],
            &[5.0],
            &[0.0],
            None,
            None,
            &IpsOpt::default(),
            &SparseLU,
        )?;
        assert_eq!(s.exitflag, ExitFlag::NumericalFailure);
        assert!(!s.converged());
        assert_eq!(s.iterations, 0);
        assert_eq!(s.message, "infeasible bounds");
        Ok(())
    }

    #[test]
    fn malformed_dimensions() {
        let a = dense(&[&[1.0, 1.0]]);
        let r = nlp(
            &Parabola,
            &[1.0],
            Some(&a),
            &[],
            &[1.0],
            &[],
            &[],
            None,
            None,
            &IpsOpt::default(),
            &SparseLU,
        );
        assert!(r.is_err());

        let r = nlp(
            &Parabola,
            &[1.0],
            None,
            &[],
            &[],
            &[0.0, 0.0],
            &[],
            None,
            None,
            &IpsOpt::default(),
            &SparseLU,
        );
        assert!(r.is_err());
    }

    #[test]
    fn missing_hessian() {
        let r = nlp(
            &Sphere,
            &[1.0, 1.0, 0.0],
            None,
            &[],
            &[],
            &[],
            &[],
            Some(&Sphere),
            None,
            &IpsOpt::default(),
            &SparseLU,
        );
        let err = r.err().and_then(|e| e.downcast::<PowersError>().ok());
        assert_eq!(err, Some(PowersError::MissingHessian));
    }

    struct Rosenbrock;

    impl ObjectiveFunction for Rosenbrock {
        fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
            let a = 100.0;
            let f = a * (x[1] - x[0].powi(2)).powi(2) + (1.0 - x[0]).powi(2);
            let df = vec![
                4.0 * a * (x[0].powi(3) - x[0] * x[1]) + 2.0 * x[0] - 2.0,
                2.0 * a * (x[1] - x[0].powi(2)),
            ];
            (f, df)
        }
        fn d2f(&self, x: &[f64]) -> CsMat<f64> {
            let a = 100.0;
            dense(&[
                &[4.0 * a * (3.0 * x[0].powi(2) - x[1]) + 2.0, -4.0 * a * x[0]],
                &[-4.0 * a * x[0], 2.0 * a],
            ])
        }
    }

    #[test]
    fn unconstrained_banana() -> Result<()> {
        let s = nlp(
            &Rosenbrock,
            &[-1.9, 2.0],
            None,
            &[],
            &[],
            &[],
            &[],
            None,
            None,
            &IpsOpt::default(),
            &SparseLU,
        )?;
        assert!(s.converged());
        assert_near(s.x[0], 1.0, 1e-5);
        assert_near(s.x[1], 1.0, 1e-5);
        assert_near(s.f, 0.0, 1e-10);
        Ok(())
    }

    /// min -x1*x2 - x2*x3
    /// s.t. x1^2 - x2^2 + x3^2 - 2 <= 0
    ///      x1^2 + x2^2 + x3^2 - 10 <= 0
    struct Sphere;

    impl ObjectiveFunction for Sphere {
        fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
            (
                -x[0] * x[1] - x[1] * x[2],
                vec![-x[1], -(x[0] + x[2]), -x[1]],
            )
        }
        fn d2f(&self, _x: &[f64]) -> CsMat<f64> {
            dense(&[&[0.0, -1.0, 0.0], &[-1.0, 0.0, -1.0], &[0.0, -1.0, 0.0]])
        }
    }

    impl NonlinearConstraint for Sphere {
        fn gh(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>, CsMat<f64>, CsMat<f64>) {
            let h = vec![
                x[0].powi(2) - x[1].powi(2) + x[2].powi(2) - 2.0,
                x[0].powi(2) + x[1].powi(2) + x[2].powi(2) - 10.0,
            ];
            let dh = dense(&[
                &[2.0 * x[0], 2.0 * x[0]],
                &[-2.0 * x[1], 2.0 * x[1]],
                &[2.0 * x[2], 2.0 * x[2]],
            ]);
            (h, vec![], dh, zeros(3, 0))
        }
    }

    impl HessianFunction for Sphere {
        fn hess(&self, x: &[f64], _lam: &[f64], mu: &[f64], cost_mult: f64) -> CsMat<f64> {
            let d2f = scale(&self.d2f(x), cost_mult);
            let d2h = spdiag(&[
                2.0 * (mu[0] + mu[1]),
                2.0 * (mu[1] - mu[0]),
                2.0 * (mu[0] + mu[1]),
            ]);
            &d2f + &d2h
        }
    }

    #[test]
    fn constrained_sphere() -> Result<()> {
        let s = nlp(
            &Sphere,
            &[1.0, 1.0, 0.0],
            None,
            &[],
            &[],
            &[],
            &[],
            Some(&Sphere),
            Some(&Sphere),
            &IpsOpt::default(),
            &SparseLU,
        )?;
        assert!(s.converged());
        assert_near(s.f, -5.0 * 2f64.sqrt(), 1e-5);
        assert_near(s.x[0], 1.58113883, 1e-5);
        assert_near(s.x[1], 2.23606798, 1e-5);
        assert_near(s.x[2], 1.58113883, 1e-5);
        assert_eq!(s.lambda.ineqnonlin[0], 0.0);
        assert_near(s.lambda.ineqnonlin[1], 1.0 / 2f64.sqrt(), 1e-5);
        assert!(s.lambda.eqnonlin.is_empty());
        Ok(())
    }

    /// Hock & Schittkowski test problem #71.
    struct Hs071;

    impl ObjectiveFunction for Hs071 {
        fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
            let f = x[0] * x[3] * (x[0] + x[1] + x[2]) + x[2];
            let df = vec![
                x[0] * x[3] + x[3] * (x[0] + x[1] + x[2]),
                x[0] * x[3],
                x[0] * x[3] + 1.0,
                x[0] * (x[0] + x[1] + x[2]),
            ];
            (f, df)
        }
        fn d2f(&self, x: &[f64]) -> CsMat<f64> {
            let s = 2.0 * x[0] + x[1] + x[2];
            dense(&[
                &[2.0 * x[3], x[3], x[3], s],
                &[x[3], 0.0, 0.0, x[0]],
                &[x[3], 0.0, 0.0, x[0]],
                &[s, x[0], x[0], 0.0],
            ])
        }
    }

    impl NonlinearConstraint for Hs071 {
        fn gh(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>, CsMat<f64>, CsMat<f64>) {
            let g = vec![x.iter().map(|x| x * x).sum::<f64>() - 40.0];
            let h = vec![25.0 - x[0] * x[1] * x[2] * x[3]];
            let dg = dense(&[&[2.0 * x[0]], &[2.0 * x[1]], &[2.0 * x[2]], &[2.0 * x[3]]]);
            let dh = dense(&[
                &[-x[1] * x[2] * x[3]],
                &[-x[0] * x[2] * x[3]],
                &[-x[0] * x[1] * x[3]],
                &[-x[0] * x[1] * x[2]],
            ]);
            (h, g, dh, dg)
        }
    }

    impl HessianFunction for Hs071 {
        fn hess(&self, x: &[f64], lam: &[f64], mu: &[f64], cost_mult: f64) -> CsMat<f64> {
            let d2f = scale(&self.d2f(x), cost_mult);
            let d2g = spdiag(&[2.0 * lam[0]; 4]);
            let m = mu[0];
            let d2h = dense(&[
                &[0.0, -m * x[2] * x[3], -m * x[1] * x[3], -m * x[1] * x[2]],
                &[-m * x[2] * x[3], 0.0, -m * x[0] * x[3], -m * x[0] * x[2]],
                &[-m * x[1] * x[3], -m * x[0] * x[3], 0.0, -m * x[0] * x[1]],
                &[-m * x[1] * x[2], -m * x[0] * x[2], -m * x[0] * x[1], 0.0],
            ]);
            &(&d2f + &d2g) + &d2h
        }
    }

    #[test]
    fn hock_schittkowski_71() -> Result<()> {
        let s = nlp(
            &Hs071,
            &[1.0, 5.0, 5.0, 1.0],
            None,
            &[],
            &[],
            &[1.0; 4],
            &[5.0; 4],
            Some(&Hs071),
            Some(&Hs071),
            &IpsOpt::default(),
            &SparseLU,
        )?;
        assert!(s.converged());
        assert_near(s.f, 17.0140173, 1e-5);
        let expected = [1.0, 4.7429994, 3.8211503, 1.3794082];
        for (x, e) in s.x.iter().zip(expected) {
            assert_near(*x, e, 1e-5);
        }
        assert_near(s.lambda.eqnonlin[0], 0.1614686, 1e-5);
        assert_near(s.lambda.ineqnonlin[0], 0.55229366, 1e-5);
        assert_near(s.lambda.lower[0], 1.08787121, 1e-5);
        Ok(())
    }

    #[test]
    fn step_control_and_cost_scaling() -> Result<()> {
        let opt = IpsOptBuilder::default()
            .step_control(true)
            .cost_mult(1e-2)
            .build()?;
        let s = nlp(
            &Hs071,
            &[1.0, 5.0, 5.0, 1.0],
            None,
            &[],
            &[],
            &[1.0; 4],
            &[5.0; 4],
            Some(&Hs071),
            Some(&Hs071),
            &opt,
            &SparseLU,
        )?;
        assert!(s.converged());
        assert_near(s.f, 17.0140173, 1e-4);
        assert_near(s.lambda.eqnonlin[0], 0.1614686, 1e-3);
        Ok(())
    }

    #[test]
    fn iteration_limit() -> Result<()> {
        let opt = IpsOptBuilder::default().max_it(2).build()?;
        let s = nlp(
            &Hs071,
            &[1.0, 5.0, 5.0, 1.0],
            None,
            &[],
            &[],
            &[1.0; 4],
            &[5.0; 4],
            Some(&Hs071),
            Some(&Hs071),
            &opt,
            &SparseLU,
        )?;
        assert_eq!(s.exitflag, ExitFlag::NotConverged);
        assert_eq!(s.iterations, 2);
        assert_eq!(s.history.len(), 3);
        Ok(())
    }

    fn assert_numerical_failure(s: &IpsSolution, iterations: usize) {
        assert_eq!(s.exitflag, ExitFlag::NumericalFailure);
        assert!(!s.converged());
        assert_eq!(s.iterations, iterations);
        assert_eq!(s.message, "Numerically failed");
    }

    /// Parabola whose gradient is NaN away from the starting point.
    struct NanGradient;

    impl ObjectiveFunction for NanGradient {
        fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
            let df = if x[0] == 1.0 { 2.0 * (x[0] - 3.0) } else { f64::NAN };
            ((x[0] - 3.0).powi(2), vec![df])
        }
        fn d2f(&self, _x: &[f64]) -> CsMat<f64> {
            dense(&[&[2.0]])
        }
    }

    #[test]
    fn nan_gradient_fails() -> Result<()> {
        let s = nlp(
            &NanGradient,
            &[1.0],
            None,
            &[],
            &[],
            &[],
            &[],
            None,
            None,
            &IpsOpt::default(),
            &SparseLU,
        )?;
        // the first step lands on x = 3, the second cannot be solved
        assert_numerical_failure(&s, 2);
        assert!(s.history[1].gradcond.is_nan());
        Ok(())
    }

    /// Linear objective with a Hessian that leaves `x[1]` undetermined.
    struct Singular;

    impl ObjectiveFunction for Singular {
        fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
            (x[0] + x[1], vec![1.0, 1.0])
        }
        fn d2f(&self, _x: &[f64]) -> CsMat<f64> {
            sparse((2, 2), &[0], &[0], &[1.0])
        }
    }

    #[test]
    fn singular_kkt_fails() -> Result<()> {
        let s = nlp(
            &Singular,
            &[0.0, 0.0],
            None,
            &[],
            &[],
            &[],
            &[],
            None,
            None,
            &IpsOpt::default(),
            &SparseLU,
        )?;
        assert_numerical_failure(&s, 1);
        assert_eq!(s.x, vec![0.0, 0.0]);
        Ok(())
    }

    struct NanSolver;

    impl LinearSolver for NanSolver {
        fn solve(&self, _a_mat: &CsMat<f64>, b: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![f64::NAN; b.len()])
        }
    }

    #[test]
    fn nan_update_step_fails() -> Result<()> {
        let s = nlp(
            &Parabola,
            &[1.0],
            None,
            &[],
            &[],
            &[0.0],
            &[5.0],
            None,
            None,
            &IpsOpt::default(),
            &NanSolver,
        )?;
        assert_numerical_failure(&s, 1);
        assert!(s.x.iter().all(|x| x.is_finite()));
        Ok(())
    }

    /// `min 1e9 x` subject to `x <= 1` is unbounded below. The dual step
    /// to the bound multiplier shrinks below the minimum step length.
    struct Steep;

    impl ObjectiveFunction for Steep {
        fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
            (1e9 * x[0], vec![1e9])
        }
        fn d2f(&self, _x: &[f64]) -> CsMat<f64> {
            zeros(1, 1)
        }
    }

    #[test]
    fn short_dual_step_fails() -> Result<()> {
        let s = nlp(
            &Steep,
            &[0.0],
            None,
            &[],
            &[],
            &[],
            &[1.0],
            None,
            None,
            &IpsOpt::default(),
            &SparseLU,
        )?;
        assert_numerical_failure(&s, 1);
        let last = s.history[1];
        assert!(last.alphad < ALPHA_MIN);
        assert_near(last.alphap, 1.0, 1e-12);
        Ok(())
    }

    /// Parabola with the far away nonlinear bound `x <= 1e22`. The slack
    /// starts at 1e22 and the barrier coefficient blows up after one step.
    struct FarBound;

    impl NonlinearConstraint for FarBound {
        fn gh(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>, CsMat<f64>, CsMat<f64>) {
            (vec![x[0] - 1e22], vec![], dense(&[&[1.0]]), zeros(1, 0))
        }
    }

    impl HessianFunction for FarBound {
        fn hess(&self, _x: &[f64], _lam: &[f64], _mu: &[f64], cost_mult: f64) -> CsMat<f64> {
            dense(&[&[2.0 * cost_mult]])
        }
    }

    #[test]
    fn barrier_coefficient_out_of_range_fails() -> Result<()> {
        let s = nlp(
            &Parabola,
            &[1.0],
            None,
            &[],
            &[],
            &[],
            &[],
            Some(&FarBound),
            Some(&FarBound),
            &IpsOpt::default(),
            &SparseLU,
        )?;
        assert_numerical_failure(&s, 1);
        assert!(s.history[1].gamma > 1.0 / EPS);
        assert!(s.history[1].alphad > ALPHA_MIN);
        assert_near(s.x[0], 3.0, 1e-9);
        Ok(())
    }
}
