use num_complex::Complex64;
use sprs::CsMat;

use crate::math::J;
use crate::mpc::{Bus, Gen};
use crate::sparse::{mul_vec, scale, spdiag};
use crate::traits::Conj;

/// Builds the vector of complex bus power injections.
///
/// Returns the vector of complex bus power injections, that is, generation
/// minus load. Power is expressed in per unit. If `sg` is provided, it is
/// a complex ng x 1 vector of generator power injections in p.u., and
/// overrides the PG and QG columns in `gen`, using `gen` only for
/// connectivity information.
pub fn make_sbus(
    base_mva: f64,
    bus: &[Bus],
    gen: &[Gen],
    sg: Option<&[Complex64]>,
) -> Vec<Complex64> {
    let nb = bus.len();
    let base_mva = Complex64::new(base_mva, 0.0);

    // Form net complex bus power injection vector
    // (power injected by generators + power injected by loads).
    let mut s_bus = vec![Complex64::default(); nb];

    if let Some(sg) = sg {
        gen.iter()
            .zip(sg)
            .filter(|(g, _)| g.is_on())
            .for_each(|(g, s_pu)| {
                s_bus[g.bus] += s_pu;
            });
    } else {
        gen.iter().filter(|g| g.is_on()).for_each(|g| {
            s_bus[g.bus] += Complex64::new(g.pg, g.qg) / base_mva;
        });
    }

    bus.iter()
        .filter(|b| b.pd != 0.0 || b.qd != 0.0)
        .for_each(|b| {
            s_bus[b.i] -= Complex64::new(b.pd, b.qd) / base_mva;
        });

    s_bus
}

/// Computes partial derivatives of power injection w.r.t. voltage.
///
/// Returns two matrices containing partial derivatives of the complex bus
/// power injections w.r.t voltage angle and voltage magnitude
/// respectively (for all buses).
pub fn d_sbus_d_v(
    y_bus: &CsMat<Complex64>,
    v: &[Complex64],
) -> (CsMat<Complex64>, CsMat<Complex64>) {
    let i_bus = mul_vec(y_bus, v);

    let diag_v = spdiag(v);
    let diag_i_bus = spdiag(&i_bus);
    let diag_v_norm = spdiag(
        &v.iter()
            .map(|v| *v / v.norm())
            .collect::<Vec<Complex64>>(),
    );

    // dSbus/dVa = 1j * diagV * conj(diagIbus - Ybus * diagV)
    // dSbus/dVm = diagV * conj(Ybus * diagVnorm) + conj(diagIbus) * diagVnorm
    let d_sbus_d_va = scale(&(&diag_v * &(&diag_i_bus - &(y_bus * &diag_v)).conj()), J);
    let d_sbus_d_vm =
        &(&diag_v * &(y_bus * &diag_v_norm).conj()) + &(&diag_i_bus.conj() * &diag_v_norm);

    (d_sbus_d_va, d_sbus_d_vm)
}

/// Complex power mismatch `V .* conj(Ybus * V) - Sbus`.
pub fn power_mismatch(
    y_bus: &CsMat<Complex64>,
    v: &[Complex64],
    s_bus: &[Complex64],
) -> Vec<Complex64> {
    let i_bus = mul_vec(y_bus, v);
    v.iter()
        .zip(i_bus)
        .zip(s_bus)
        .map(|((v, i), s)| v * i.conj() - s)
        .collect()
}
