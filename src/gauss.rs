use anyhow::Result;
use num_complex::Complex64;
use sprs::CsMat;

use crate::math::{abs, norm_inf};
use crate::mpopt::MPOpt;
use crate::newton::ProgressMonitor;
use crate::sbus::power_mismatch;

/// Computes `Ybus(k,:) * V` and returns it with the diagonal `Ybus(k,k)`.
fn row_injection(y_bus: &CsMat<Complex64>, v: &[Complex64], k: usize) -> (Complex64, Complex64) {
    let mut i_k = Complex64::default();
    let mut y_kk = Complex64::default();
    if let Some(row) = y_bus.outer_view(k) {
        for (j, &y) in row.iter() {
            i_k += y * v[j];
            if j == k {
                y_kk = y;
            }
        }
    }
    (i_k, y_kk)
}

/// Solves the power flow using a Gauss-Seidel method.
///
/// Buses are updated one at a time using the latest voltages, PQ buses
/// first and then PV buses. The reactive injection of each PV bus is
/// taken from the current voltages before its update and its magnitude
/// is reset to the set point in `v0` afterwards. Returns the final
/// voltages, the convergence flag and the number of iterations.
pub fn gausspf(
    y_bus: &CsMat<Complex64>,
    s_bus: &[Complex64],
    v0: &[Complex64],
    pv: &[usize],
    pq: &[usize],
    mpopt: &MPOpt,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<(Vec<Complex64>, bool, usize)> {
    let pvpq = [pv, pq].concat();

    let tol = mpopt.pf.tolerance;
    let max_it = mpopt.pf.max_it_gs;

    // rows are visited one bus at a time
    let y_bus = y_bus.to_csr();

    let mut converged = false;
    let mut i = 0;
    let mut v = v0.to_vec();
    let vm = abs(&v);
    let mut s_bus = s_bus.to_vec();

    let mismatch = |v: &[Complex64], s_bus: &[Complex64]| -> f64 {
        let mis = power_mismatch(&y_bus, v, s_bus);
        let f: Vec<f64> = pvpq
            .iter()
            .map(|&k| mis[k].re)
            .chain(pq.iter().map(|&k| mis[k].im))
            .collect();
        norm_inf(&f)
    };

    let norm_f = mismatch(&v, &s_bus);
    if let Some(pm) = progress {
        pm.update(i, norm_f);
    }
    if norm_f < tol {
        converged = true;
        log::info!("Gauss-Seidel power flow converged in 0 iterations.");
    }

    while !converged && i < max_it {
        i += 1;

        // update voltage at PQ buses
        for &k in pq {
            let (i_k, y_kk) = row_injection(&y_bus, &v, k);
            let v_k = v[k];
            v[k] += ((s_bus[k] / v_k).conj() - i_k) / y_kk;
        }

        // update voltage at PV buses
        for &k in pv {
            let (i_k, y_kk) = row_injection(&y_bus, &v, k);
            s_bus[k].im = (v[k] * i_k.conj()).im;
            let v_k = v[k];
            v[k] += ((s_bus[k] / v_k).conj() - i_k) / y_kk;
        }
        for &k in pv {
            let vm_k = v[k].norm();
            v[k] *= vm[k] / vm_k;
        }

        let norm_f = mismatch(&v, &s_bus);
        if let Some(pm) = progress {
            pm.update(i, norm_f);
        }
        log::trace!("iteration {}: max mismatch {:e}", i, norm_f);
        if norm_f.is_nan() {
            log::info!("Gauss-Seidel power flow failed: NaN in mismatch");
            break;
        }
        if norm_f < tol {
            converged = true;
            log::info!("Gauss-Seidel power flow converged in {} iterations.", i);
        }
    }

    if !converged {
        log::info!("Gauss-Seidel power flow did not converge in {} iterations.", i);
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
    use crate::ybus::make_ybus;

    #[test]
    fn matches_newton() -> Result<()> {
        let (mpc, _) = ext_to_int(&case9())?;
        let (y_bus, _, _) = make_ybus(mpc.base_mva, &mpc.bus, &mpc.branch)?;
        let s_bus = make_sbus(mpc.base_mva, &mpc.bus, &mpc.gen, None);
        let (_, pv, pq) = bus_types(&mpc.bus, &mpc.gen)?;
        let v0 = initial_voltage(&mpc.bus, &mpc.gen);
        let mpopt = MPOpt::default();

        let nr = newtonpf(&y_bus, &s_bus, &v0, &pv, &pq, &SparseLU, &mpopt, None)?;
        assert!(nr.converged());

        let (v, converged, iterations) = gausspf(&y_bus, &s_bus, &v0, &pv, &pq, &mpopt, None)?;
        assert!(converged);
        assert!(iterations > nr.iterations);
        for (a, b) in v.iter().zip(&nr.v) {
            assert!((a - b).norm() < 1e-6, "{} != {}", a, b);
        }

        // generator voltage set points are held
        for &k in &pv {
            assert!((v[k].norm() - v0[k].norm()).abs() < 1e-12);
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
        mpopt.pf.max_it_gs = 3;

        let (_, converged, iterations) = gausspf(&y_bus, &s_bus, &v0, &pv, &pq, &mpopt, None)?;
        assert!(!converged);
        assert_eq!(iterations, 3);
        Ok(())
    }
}
