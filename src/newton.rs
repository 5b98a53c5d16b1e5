use anyhow::Result;
use num_complex::Complex64;
use sprs::CsMat;

use crate::debug::format_f64_vec;
use crate::jac::jacobian;
use crate::math::{abs, arg, norm_inf, polar};
use crate::mpopt::MPOpt;
use crate::sbus::{d_sbus_d_v, power_mismatch};
use crate::traits::LinearSolver;

pub trait ProgressMonitor {
    fn update(&self, i: usize, norm_f: f64);
}

/// Prints the mismatch norm of each iteration to the log.
pub struct LogProgress;

impl ProgressMonitor for LogProgress {
    fn update(&self, i: usize, norm_f: f64) {
        log::info!("{:3}  {:10.3e}", i, norm_f);
    }
}

/// State of a Newton power flow solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NewtonState {
    NotConverged,
    Converged,
    Failed,
}

/// Result of `newtonpf`.
#[derive(Debug, Clone)]
pub struct NewtonResult {
    /// Final complex bus voltages.
    pub v: Vec<Complex64>,
    pub state: NewtonState,
    /// Number of Newton iterations performed.
    pub iterations: usize,
    /// Infinity norm of the mismatch at the start and after each iteration.
    pub history: Vec<f64>,
}

impl NewtonResult {
    pub fn converged(&self) -> bool {
        self.state == NewtonState::Converged
    }
}

/// Mismatch vector `[real(mis(pvpq)); imag(mis(pq))]`.
fn mismatch(y_bus: &CsMat<Complex64>, v: &[Complex64], s_bus: &[Complex64], pvpq: &[usize], pq: &[usize]) -> Vec<f64> {
    let mis = power_mismatch(y_bus, v, s_bus);
    pvpq.iter()
        .map(|&i| mis[i].re)
        .chain(pq.iter().map(|&i| mis[i].im))
        .collect()
}

/// Newton-Raphson power flow in polar coordinates with power balance
/// equations.
///
/// `v0` carries the voltage set points of generator buses and the
/// reference angle, plus the starting guess elsewhere. Angles of PV and
/// PQ buses and magnitudes of PQ buses are updated each iteration until
/// the largest mismatch falls below `mpopt.pf.tolerance`.
///
/// Failure to converge within the iteration limit is reported through
/// the returned state, not as an error.
pub fn newtonpf(
    y_bus: &CsMat<Complex64>,
    s_bus: &[Complex64],
    v0: &[Complex64],
    pv: &[usize],
    pq: &[usize],
    lin_solver: &dyn LinearSolver,
    mpopt: &MPOpt,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<NewtonResult> {
    let pv_pq = [pv, pq].concat();

    let tol = mpopt.pf.tolerance;
    let max_it = mpopt.pf.max_it_nr;

    let mut state = NewtonState::NotConverged;
    let mut i = 0;
    let mut v = v0.to_vec();
    let mut va = arg(&v);
    let mut vm = abs(&v);
    let mut history = Vec::with_capacity(max_it + 1);

    // dx = [dVa(pv), dVa(pq), dVm(pq)]
    let (npv, npq) = (pv.len(), pq.len());
    let va_pv = 0..npv;
    let va_pq = npv..npv + npq;
    let vm_pq = npv + npq..npv + 2 * npq;

    let mut f = mismatch(y_bus, &v, s_bus, &pv_pq, pq);

    let norm_f = norm_inf(&f);
    history.push(norm_f);
    if let Some(pm) = progress {
        pm.update(i, norm_f);
    }
    if norm_f < tol {
        state = NewtonState::Converged;
        log::info!("Newton's method power flow converged in 0 iterations.");
    }

    while state == NewtonState::NotConverged && i < max_it {
        i += 1;

        let (d_sbus_d_va, d_sbus_d_vm) = d_sbus_d_v(y_bus, &v);
        let jac = jacobian(&d_sbus_d_va, &d_sbus_d_vm, &pv_pq, pq);

        let neg_f: Vec<f64> = f.iter().map(|f_i| -f_i).collect();
        let dx = match lin_solver.solve(&jac, &neg_f) {
            Ok(dx) => dx,
            Err(err) => {
                log::info!("Newton's method power flow failed: {}", err);
                state = NewtonState::Failed;
                break;
            }
        };
        log::trace!("dx: {}", format_f64_vec(&dx));

        pv.iter().zip(va_pv.clone()).for_each(|(&b, j)| va[b] += dx[j]);
        pq.iter().zip(va_pq.clone()).for_each(|(&b, j)| va[b] += dx[j]);
        pq.iter().zip(vm_pq.clone()).for_each(|(&b, j)| vm[b] += dx[j]);

        // renormalize in case a magnitude went negative
        v = polar(&vm, &va);
        va = arg(&v);
        vm = abs(&v);

        f = mismatch(y_bus, &v, s_bus, &pv_pq, pq);

        let norm_f = norm_inf(&f);
        history.push(norm_f);
        if let Some(pm) = progress {
            pm.update(i, norm_f);
        }
        log::debug!("iteration {}: max mismatch {:e}", i, norm_f);
        if norm_f.is_nan() {
            state = NewtonState::Failed;
        } else if norm_f < tol {
            state = NewtonState::Converged;
            log::info!("Newton power flow converged in {} iterations", i);
        }
    }

    if state != NewtonState::Converged {
        log::info!("Newton power flow did not converge in {} iterations", i);
    }

    Ok(NewtonResult {
        v,
        state,
        iterations: i,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus_types::bus_types;
    use crate::cases::case9;
    use crate::ext_to_int::ext_to_int;
    use crate::jac::initial_voltage;
    use crate::lu::SparseLU;
    use crate::sbus::make_sbus;
    use crate::ybus::make_ybus;
    use std::cell::RefCell;

    struct Recorder(RefCell<Vec<(usize, f64)>>);

    impl ProgressMonitor for Recorder {
        fn update(&self, i: usize, norm_f: f64) {
            self.0.borrow_mut().push((i, norm_f));
        }
    }

    #[test]
    fn case9_converges_and_resolves_in_zero_iterations() -> Result<()> {
        let (mpc, _) = ext_to_int(&case9())?;
        let (y_bus, _, _) = make_ybus(mpc.base_mva, &mpc.bus, &mpc.branch)?;
        let s_bus = make_sbus(mpc.base_mva, &mpc.bus, &mpc.gen, None);
        let (_, pv, pq) = bus_types(&mpc.bus, &mpc.gen)?;
        let v0 = initial_voltage(&mpc.bus, &mpc.gen);
        let mpopt = MPOpt::default();

        let recorder = Recorder(RefCell::new(Vec::new()));
        let res = newtonpf(&y_bus, &s_bus, &v0, &pv, &pq, &SparseLU, &mpopt, Some(&recorder))?;
        assert!(res.converged());
        assert!(res.iterations > 0 && res.iterations <= 10);
        assert_eq!(res.history.len(), res.iterations + 1);
        assert_eq!(recorder.0.borrow().len(), res.iterations + 1);

        // mismatch at the solution
        let pvpq = [pv.clone(), pq.clone()].concat();
        let f = mismatch(&y_bus, &res.v, &s_bus, &pvpq, &pq);
        assert!(norm_inf(&f) < mpopt.pf.tolerance);

        // quadratic convergence: each step cuts the mismatch sharply
        let h = &res.history;
        assert!(h[h.len() - 1] < 1e-2 * h[h.len() - 2]);

        let again = newtonpf(&y_bus, &s_bus, &res.v, &pv, &pq, &SparseLU, &mpopt, None)?;
        assert!(again.converged());
        assert_eq!(again.iterations, 0);
        Ok(())
    }

    #[test]
    fn iteration_limit_is_not_an_error() -> Result<()> {
        let (mut mpc, _) = ext_to_int(&case9())?;
        mpc.bus.iter_mut().for_each(|b| {
            b.pd *= 4.0;
            b.qd *= 4.0;
        });
        let (y_bus, _, _) = make_ybus(mpc.base_mva, &mpc.bus, &mpc.branch)?;
        let s_bus = make_sbus(mpc.base_mva, &mpc.bus, &mpc.gen, None);
        let (_, pv, pq) = bus_types(&mpc.bus, &mpc.gen)?;
        let v0 = initial_voltage(&mpc.bus, &mpc.gen);
        let mut mpopt = MPOpt::default();
        mpopt.pf.max_it_nr = 2;

        let res = newtonpf(&y_bus, &s_bus, &v0, &pv, &pq, &SparseLU, &mpopt, None)?;
        assert!(!res.converged());
        assert!(res.iterations <= 2);
        Ok(())
    }
}
