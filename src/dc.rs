use anyhow::Result;
use sprs::{CsMat, TriMat};
use std::f64::consts::PI;

use crate::math::{norm_inf, select as select_vec};
use crate::mpc::{Branch, Bus};
use crate::sparse::{mul_vec, mul_vec_t, select, transpose};
use crate::traits::LinearSolver;
use crate::ybus::check_bus_numbering;

/// Linearized power flow `B * Va = P`.
///
/// Angles of the `ref_` buses are held at their values in `va0` (radians)
/// and the remaining angles are found with a single linear solve. A
/// singular system or angles beyond 1e5 radians clear the success flag.
pub fn dc_pf(
    b_mat: &CsMat<f64>,
    p_bus: &[f64],
    va0: &[f64],
    ref_: &[usize],
    pv: &[usize],
    pq: &[usize],
    lin_solver: &dyn LinearSolver,
) -> Result<(Vec<f64>, bool)> {
    let va_max = 1e5;

    let mut va = va0.to_vec();
    let mut success = true;

    // B[pvpq, pvpq] * Va[pvpq] = P[pvpq] - B[pvpq, ref] * Va0[ref]
    let pvpq = [pv, pq].concat();
    let b_pvpq = select(b_mat, Some(&pvpq), Some(&pvpq));
    let b_ref = select(b_mat, Some(&pvpq), Some(ref_));
    let p_ref = mul_vec(&b_ref, &select_vec(va0, ref_));

    let rhs: Vec<f64> = pvpq
        .iter()
        .zip(p_ref)
        .map(|(&i, p_ref)| p_bus[i] - p_ref)
        .collect();

    match lin_solver.solve(&b_pvpq, &rhs) {
        Ok(va_pvpq) => {
            pvpq.iter()
                .zip(va_pvpq)
                .for_each(|(&j, va_j)| va[j] = va_j);
        }
        Err(err) => {
            log::info!("DC power flow failed: {}", err);
            success = false;
        }
    }

    if !(norm_inf(&va) <= va_max) {
        success = false;
    }

    Ok((va, success))
}

/// DC network matrices `(Bbus, Bf, Pbusinj, Pfinj)`, in p.u.
///
/// Bus injections and from end branch flows are linear in the voltage
/// angles:
///
/// ```text
/// P  = Bbus * Va + Pbusinj
/// Pf = Bf * Va + Pfinj
/// ```
///
/// Requires internal (consecutive, zero based) bus numbering.
pub fn make_b_dc(
    bus: &[Bus],
    branch: &[Branch],
) -> Result<(CsMat<f64>, CsMat<f64>, Vec<f64>, Vec<f64>)> {
    check_bus_numbering(bus, branch)?;

    let (rows, cols) = (branch.len(), bus.len());
    let nnz = 2 * branch.len();

    let mut b_f = TriMat::with_capacity((rows, cols), nnz);
    // Cft = Cf - Ct
    let mut c_ft = TriMat::with_capacity((rows, cols), nnz);

    // series susceptance over tap ratio
    fn br_b(br: &Branch) -> f64 {
        if !br.is_on() {
            return 0.0;
        }
        let tap = if br.tap == 0.0 { 1.0 } else { br.tap };
        1.0 / (br.x * tap)
    }
    for (i, br) in branch.iter().enumerate() {
        let b = br_b(br);

        let (f, t) = (br.from_bus, br.to_bus);

        b_f.add_triplet(i, f, b);
        b_f.add_triplet(i, t, -b);

        c_ft.add_triplet(i, f, 1.0);
        c_ft.add_triplet(i, t, -1.0);
    }
    let b_f: CsMat<f64> = b_f.to_csr();
    let c_ft: CsMat<f64> = c_ft.to_csr();

    let b_bus = &transpose(&c_ft) * &b_f;

    // phase shifters inject at the from bus and withdraw at the to bus
    let pfinj: Vec<f64> = branch
        .iter()
        .map(|br| -br_b(br) * br.shift * PI / 180.0)
        .collect();
    let pbusinj = mul_vec_t(&c_ft, &pfinj);

    Ok((b_bus, b_f, pbusinj, pfinj))
}
