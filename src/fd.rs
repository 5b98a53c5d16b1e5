use anyhow::Result;
use num_complex::Complex64;
use sprs::CsMat;

use crate::math::{abs, arg, norm_inf, polar};
use crate::mpc::{Branch, Bus};
use crate::mpopt::{Alg, MPOpt};
use crate::newton::ProgressMonitor;
use crate::sbus::power_mismatch;
use crate::sparse::select;
use crate::traits::LinearSolver;
use crate::ybus::make_ybus;

/// Builds the two matrices B prime and B double prime used in the fast
/// decoupled power flow.
///
/// Bus shunts, line charging and taps are dropped from B prime and phase
/// shifters from B double prime. Line resistance is zeroed in B prime
/// for the XB version and in B double prime for the BX version.
pub fn make_b(
    base_mva: f64,
    bus: &[Bus],
    branch: &[Branch],
    alg: Alg,
) -> Result<(CsMat<f64>, CsMat<f64>)> {
    let mut bus = bus.to_vec(); // modify a copy of bus
    for b in bus.iter_mut() {
        b.bs = 0.0; // zero out shunts at buses
    }

    // Form Bp (B prime).
    let b_p = {
        let mut branch = branch.to_vec(); // modify a copy of branch
        for br in branch.iter_mut() {
            br.b = 0.0; // zero out line charging shunts
            br.tap = 1.0; // cancel out taps
            if alg == Alg::FDXB {
                br.r = 0.0; // zero out line resistance
            }
        }
        let (y_p, _, _) = make_ybus(base_mva, &bus, &branch)?;
        y_p.map(|y| -y.im)
    };

    // Form Bpp (B double prime).
    let b_pp = {
        let mut branch = branch.to_vec();
        for br in branch.iter_mut() {
            br.shift = 0.0; // zero out phase shifters
            if alg == Alg::FDBX {
                br.r = 0.0;
            }
        }
        let (y_pp, _, _) = make_ybus(base_mva, &bus, &branch)?;
        y_pp.map(|y| -y.im)
    };

    Ok((b_p, b_pp))
}

/// Mismatch normalized by voltage magnitude, split into the real part at
/// `pvpq` and the imaginary part at `pq`.
fn decoupled_mismatch(
    y_bus: &CsMat<Complex64>,
    v: &[Complex64],
    s_bus: &[Complex64],
    pvpq: &[usize],
    pq: &[usize],
) -> (Vec<f64>, Vec<f64>) {
    let mis: Vec<Complex64> = power_mismatch(y_bus, v, s_bus)
        .into_iter()
        .zip(v)
        .map(|(m, v)| m / v.norm())
        .collect();
    let p = pvpq.iter().map(|&i| mis[i].re).collect();
    let q = pq.iter().map(|&i| mis[i].im).collect();
    (p, q)
}

/// Solves the power flow using a fast decoupled method.
///
/// Each iteration is a P half-step that updates the angles of PV and PQ
/// buses from `b_p`, then a Q half-step that updates the magnitudes of
/// PQ buses from `b_pp`. Convergence is checked after each half-step,
/// against `mpopt.pf.tolerance` on both the P and Q mismatch. Returns
/// the final voltages, the convergence flag and the number of
/// iterations.
#[allow(clippy::too_many_arguments)]
pub fn fdpf(
    y_bus: &CsMat<Complex64>,
    s_bus: &[Complex64],
    v0: &[Complex64],
    b_p: &CsMat<f64>,
    b_pp: &CsMat<f64>,
    pv: &[usize],
    pq: &[usize],
    lin_solver: &dyn LinearSolver,
    mpopt: &MPOpt,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<(Vec<Complex64>, bool, usize)> {
    let pvpq = [pv, pq].concat();

    let tol = mpopt.pf.tolerance;
    let max_it = mpopt.pf.max_it_fd;

    let mut converged = false;
    let mut i = 0;
    let mut v = v0.to_vec();
    let mut va = arg(&v);
    let mut vm = abs(&v);

    let (mut p, mut q) = decoupled_mismatch(y_bus, &v, s_bus, &pvpq, pq);

    let (norm_p, norm_q) = (norm_inf(&p), norm_inf(&q));
    if let Some(pm) = progress {
        pm.update(i, norm_p.max(norm_q));
    }
    if norm_p < tol && norm_q < tol {
        converged = true;
        log::info!("Fast-decoupled power flow converged in 0 iterations.");
    }

    // reduce B matrices
    let b_p = select(b_p, Some(&pvpq), Some(&pvpq));
    let b_pp = select(b_pp, Some(pq), Some(pq));

    while !converged && i < max_it {
        i += 1;

        // P iteration, update Va
        let dva = match lin_solver.solve(&b_p, &p) {
            Ok(dva) => dva,
            Err(err) => {
                log::info!("Fast-decoupled power flow failed: {}", err);
                break;
            }
        };
        pvpq.iter().zip(dva).for_each(|(&b, dva)| va[b] -= dva);
        v = polar(&vm, &va);

        (p, q) = decoupled_mismatch(y_bus, &v, s_bus, &pvpq, pq);
        let (norm_p, norm_q) = (norm_inf(&p), norm_inf(&q));
        log::debug!("iteration {} (P): max mismatch P {:e} Q {:e}", i, norm_p, norm_q);
        if norm_p.is_nan() || norm_q.is_nan() {
            break;
        }
        if norm_p < tol && norm_q < tol {
            converged = true;
            log::info!(
                "Fast-decoupled power flow converged in {} P-iterations and {} Q-iterations.",
                i,
                i - 1
            );
            break;
        }

        // Q iteration, update Vm
        let dvm = match lin_solver.solve(&b_pp, &q) {
            Ok(dvm) => dvm,
            Err(err) => {
                log::info!("Fast-decoupled power flow failed: {}", err);
                break;
            }
        };
        pq.iter().zip(dvm).for_each(|(&b, dvm)| vm[b] -= dvm);
        v = polar(&vm, &va);

        (p, q) = decoupled_mismatch(y_bus, &v, s_bus, &pvpq, pq);
        let (norm_p, norm_q) = (norm_inf(&p), norm_inf(&q));
        if let Some(pm) = progress {
            pm.update(i, norm_p.max(norm_q));
        }
        if norm_p.is_nan() || norm_q.is_nan() {
            break;
        }
        if norm_p < tol && norm_q < tol {
            converged = true;
            log::info!(
                "Fast-decoupled power flow converged in {} P-iterations and {} Q-iterations.",
                i,
                i
            );
        }
    }

    if !converged {
        log::info!("Fast-decoupled power flow did not converge in {} iterations.", i);
    }

    Ok((v, converged, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus_types::bus_types;
    use crate::cases::case9;
    use crate::ext_to_int::ext_to_int;
    use crate::jac::initial_voltage;
    use crate::lu::SparseLU;
    use crate::newton::newtonpf;
    use crate::sbus::make_sbus;
    use crate::sparse::to_dense;

    #[test]
    fn b_matrices_drop_resistance_per_version() -> Result<()> {
        let (mpc, _) = ext_to_int(&case9())?;
        // branch 4-5 has r = 0.017, x = 0.092 and line charging
        let (r, x) = (0.017, 0.092);
        let lossy = -x / (r * r + x * x);
        let lossless = -1.0 / x;

        let (b_p, b_pp) = make_b(mpc.base_mva, &mpc.bus, &mpc.branch, Alg::FDXB)?;
        let (b_p, b_pp) = (to_dense(&b_p), to_dense(&b_pp));
        assert!((b_p[3][4] - lossless).abs() < 1e-9);
        assert!((b_pp[3][4] - lossy).abs() < 1e-9);

        let (b_p, b_pp) = make_b(mpc.base_mva, &mpc.bus, &mpc.branch, Alg::FDBX)?;
        let (b_p, b_pp) = (to_dense(&b_p), to_dense(&b_pp));
        assert!((b_p[3][4] - lossy).abs() < 1e-9);
        assert!((b_pp[3][4] - lossless).abs() < 1e-9);

        // no shunts in B prime, line charging kept in B double prime
        let row_sum: f64 = b_p[3].iter().sum();
        assert!(row_sum.abs() < 1e-9);
        let row_sum: f64 = b_pp[3].iter().sum();
        assert!((row_sum + (0.158 + 0.176) / 2.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn both_versions_match_newton() -> Result<()> {
        let (mpc, _) = ext_to_int(&case9())?;
        let (y_bus, _, _) = make_ybus(mpc.base_mva, &mpc.bus, &mpc.branch)?;
        let s_bus = make_sbus(mpc.base_mva, &mpc.bus, &mpc.gen, None);
        let (_, pv, pq) = bus_types(&mpc.bus, &mpc.gen)?;
        let v0 = initial_voltage(&mpc.bus, &mpc.gen);
        let mpopt = MPOpt::default();

        let nr = newtonpf(&y_bus, &s_bus, &v0, &pv, &pq, &SparseLU, &mpopt, None)?;
        assert!(nr.converged());

        for alg in [Alg::FDXB, Alg::FDBX] {
            let (b_p, b_pp) = make_b(mpc.base_mva, &mpc.bus, &mpc.branch, alg)?;
            let (v, converged, iterations) =
                fdpf(&y_bus, &s_bus, &v0, &b_p, &b_pp, &pv, &pq, &SparseLU, &mpopt, None)?;
            assert!(converged, "{:?}", alg);
            assert!(iterations > 1 && iterations <= mpopt.pf.max_it_fd);
            for (a, b) in v.iter().zip(&nr.v) {
                assert!((a - b).norm() < 1e-6, "{:?}: {} != {}", alg, a, b);
            }
        }
        Ok(())
    }

    #[test]
    fn iteration_limit_is_not_an_error() -> Result<()> {
        let (mpc, _) = ext_to_int(&case9())?;
        let (y_bus, _, _) = make_ybus(mpc.base_mva, &mpc.bus, &mpc.branch)?;
        let s_bus = make_sbus(mpc.base_mva, &mpc.bus, &mpc.gen, None);
        let (_, pv, pq) = bus_types(&mpc.bus, &mpc.gen)?;
        let v0 = initial_voltage(&mpc.bus, &mpc.gen);
        let mut mpopt = MPOpt::default();
        mpopt.pf.max_it_fd = 1;

        let (b_p, b_pp) = make_b(mpc.base_mva, &mpc.bus, &mpc.branch, Alg::FDXB)?;
        let (_, converged, iterations) =
            fdpf(&y_bus, &s_bus, &v0, &b_p, &b_pp, &pv, &pq, &SparseLU, &mpopt, None)?;
        assert!(!converged);
        assert_eq!(iterations, 1);
        Ok(())
    }
}
