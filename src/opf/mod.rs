//! AC and DC optimal power flow.
//!
//! The problem is assembled in an [`OpfModel`] from named variable sets
//! (`Va`, `Vm`, `Pg`, `Qg`, the piecewise linear cost variables `y` and
//! the user variables `z`) and constraint blocks, then solved with the
//! interior point method in [`crate::ips`].

mod ac;
mod constraints;
mod costs;
mod dc;
mod model;

pub use constraints::*;
pub use costs::{poly2pwl, polycost, totcost};
pub use model::*;

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::error::PowersError;
use crate::ext_to_int::ext_to_int;
use crate::int_to_ext::int_to_ext;
use crate::ips::{ExitFlag, IpsSolution, IterationRecord, Lambda};
use crate::mpc::{Branch, Bus, Gen, GenCost, MPC};
use crate::mpopt::MPOpt;
use crate::traits::LinearSolver;

use costs::prepare_cost;

/// Magnitude used in place of infinite bounds when choosing the
/// initial point.
const BIG: f64 = 1e10;

/// Result of `runopf`.
#[derive(Debug, Clone)]
pub struct OpfResult {
    /// Solved case in external numbering, with multipliers.
    pub case: MPC,
    /// Objective function value.
    pub f: f64,
    pub success: bool,
    pub iterations: usize,
    /// Final value of the optimization vector (internal ordering).
    pub x: Vec<f64>,
    pub lambda: Lambda,
    pub history: Vec<IterationRecord>,
    pub exitflag: ExitFlag,
    /// Elapsed time.
    pub et: Duration,
}

/// Solves an AC or DC optimal power flow.
///
/// Dispatches in-service generators to minimize total cost subject to
/// power balance, voltage, generation and branch flow limits. The
/// multipliers are written to the `lam_*` and `mu_*` fields of the
/// returned case.
pub fn runopf(casedata: &MPC, mpopt: &MPOpt, solver: &dyn LinearSolver) -> Result<OpfResult> {
    let (mut mpc, order) = ext_to_int(casedata)?;

    let t0 = Instant::now();
    let s = if mpopt.dc {
        log::info!(" -- DC Optimal Power Flow");
        dc::dc_opf(&mut mpc, mpopt, solver)?
    } else {
        log::info!(" -- AC Optimal Power Flow");
        ac::ac_opf(&mut mpc, mpopt, solver)?
    };
    let et = t0.elapsed();

    let success = s.converged();
    if success {
        log::info!(
            "Converged in {} iterations ({:.2} seconds), f = {:.4}",
            s.iterations,
            et.as_secs_f64(),
            s.f
        );
    } else {
        log::info!("Did not converge: {}", s.message);
    }

    let mut case = int_to_ext(&mpc, &order)?;

    for &i in &order.gen.off {
        let g = &mut case.gen[i];
        g.pg = 0.0;
        g.qg = 0.0;
        g.mu_pmax = 0.0;
        g.mu_pmin = 0.0;
        g.mu_qmax = 0.0;
        g.mu_qmin = 0.0;
    }
    for &i in &order.branch.off {
        clear_branch_results(&mut case.branch[i]);
    }

    Ok(OpfResult {
        case,
        f: s.f,
        success,
        iterations: s.iterations,
        x: s.x,
        lambda: s.lambda,
        history: s.history,
        exitflag: s.exitflag,
        et,
    })
}

fn clear_branch_results(br: &mut Branch) {
    br.pf = 0.0;
    br.qf = 0.0;
    br.pt = 0.0;
    br.qt = 0.0;
    br.mu_sf = 0.0;
    br.mu_st = 0.0;
    br.mu_ang_min = 0.0;
    br.mu_ang_max = 0.0;
}

/// Generator costs checked and normalized for the OPF.
struct GenCosts {
    p: Vec<GenCost>,
    q: Vec<Option<GenCost>>,
}

impl GenCosts {
    /// A generator without a real power cost is free.
    fn new(gen: &[Gen]) -> Result<Self, PowersError> {
        let free = GenCost::polynomial(&[0.0]);
        let p = gen
            .iter()
            .enumerate()
            .map(|(i, g)| prepare_cost(i, g.pcost.as_ref().unwrap_or(&free)))
            .collect::<Result<Vec<_>, _>>()?;
        let q = gen
            .iter()
            .enumerate()
            .map(|(i, g)| g.qcost.as_ref().map(|c| prepare_cost(i, c)).transpose())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { p, q })
    }

    /// Initial value for the cost variables: just above the largest end
    /// point of any piecewise linear cost.
    fn y0<'a>(pwl: impl Iterator<Item = &'a GenCost>) -> Option<f64> {
        pwl.filter_map(|c| c.points().last().map(|&(_, f)| f))
            .fold(None, |m: Option<f64>, f| Some(m.map_or(f, |m| m.max(f))))
            .map(|c| c + 0.1 * c.abs())
    }
}

/// Adds the user variables `z`, if any.
fn add_user_vars(om: &mut OpfModel, mpc: &MPC) -> Result<()> {
    let user = match &mpc.user {
        Some(user) if user.nz > 0 => user,
        _ => return Ok(()),
    };
    let nz = user.nz;
    let fill = |v: &[f64], default: f64| {
        if v.is_empty() {
            vec![default; nz]
        } else {
            v.to_vec()
        }
    };
    om.add_vars(
        "z",
        fill(&user.z0, 0.0),
        fill(&user.zl, f64::NEG_INFINITY),
        fill(&user.zu, f64::INFINITY),
    )
}

/// Adds the user linear constraints, which span all variable sets.
fn add_user_constraints(om: &mut OpfModel, mpc: &MPC, vs: &[&str]) -> Result<()> {
    let user = match &mpc.user {
        Some(user) => user,
        None => return Ok(()),
    };
    let a = match &user.a {
        Some(a) if a.rows() > 0 => a,
        _ => return Ok(()),
    };
    if a.cols() != om.nx() {
        return Err(PowersError::DimensionMismatch {
            what: "user A".to_string(),
            actual: a.cols(),
            expected: om.nx(),
        }
        .into());
    }
    let fill = |v: &[f64], default: f64| {
        if v.is_empty() {
            vec![default; a.rows()]
        } else {
            v.to_vec()
        }
    };
    let vs: Vec<&str> = vs.iter().filter(|v| om.n_var(v) > 0).cloned().collect();
    om.add_lin_constraints(
        "usr",
        a.clone(),
        fill(&user.l, f64::NEG_INFINITY),
        fill(&user.u, f64::INFINITY),
        &vs,
    )
}

/// Voltage angle bounds with the reference angles fixed, in radians.
fn angle_bounds(bus: &[Bus], refs: &[usize]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let va: Vec<f64> = bus.iter().map(|b| b.va * PI / 180.0).collect();
    let mut val = vec![f64::NEG_INFINITY; bus.len()];
    let mut vau = vec![f64::INFINITY; bus.len()];
    for &r in refs {
        val[r] = va[r];
        vau[r] = va[r];
    }
    (va, val, vau)
}

/// Chooses an interior initial point: the middle of the variable bounds,
/// with all angles at the reference angle and the cost variables above
/// the largest cost. User variables start at their given values.
fn initial_point(om: &OpfModel, va_ref: f64, y0: Option<f64>) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let (v0, xmin, xmax) = om.params_var();
    let mut x0: Vec<f64> = xmin
        .iter()
        .zip(&xmax)
        .map(|(l, u)| (l.max(-BIG) + u.min(BIG)) / 2.0)
        .collect();
    if let Some(va) = om.var("Va") {
        x0[va.range()].iter_mut().for_each(|x| *x = va_ref);
    }
    if let (Some(y), Some(y0)) = (om.var("y"), y0) {
        x0[y.range()].iter_mut().for_each(|x| *x = y0);
    }
    if let Some(z) = om.var("z") {
        x0[z.range()].copy_from_slice(&v0[z.range()]);
    }
    (x0, xmin, xmax)
}

/// Writes the solution status to the log at debug level.
fn log_solution(s: &IpsSolution) {
    log::debug!(
        "{} after {} iterations, exit flag {:?}",
        s.message,
        s.iterations,
        s.exitflag
    );
}

#[cfg(test)]
mod tests;
