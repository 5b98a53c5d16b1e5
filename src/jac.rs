use anyhow::Result;
use num_complex::Complex64;
use sprs::CsMat;

use crate::bus_types::bus_types;
use crate::debug::{format_polar_vec, format_sparse};
use crate::mpc::{Bus, Gen, MPC};
use crate::sbus::d_sbus_d_v;
use crate::sparse::{imag, real, select};

/// Builds the initial voltage vector from the bus data, using the
/// generator setpoint magnitude at PV and slack buses.
pub fn initial_voltage(bus: &[Bus], gen: &[Gen]) -> Vec<Complex64> {
    let mut v: Vec<Complex64> = bus
        .iter()
        .map(|b| Complex64::from_polar(b.vm, b.va.to_radians()))
        .collect();

    for g in gen.iter().filter(|g| g.is_on()) {
        let gbus = g.bus;
        if bus[gbus].is_pv() || bus[gbus].is_ref() {
            v[gbus] = v[gbus] * (g.vg / v[gbus].norm());
        }
    }
    v
}

/// Assembles `[J11 J12; J21 J22]` from the injection derivatives, with
/// P rows and angle columns over `pvpq` and Q rows and magnitude columns
/// over `pq`.
#[allow(non_snake_case)]
pub(crate) fn jacobian(
    dSbus_dVa: &CsMat<Complex64>,
    dSbus_dVm: &CsMat<Complex64>,
    pvpq: &[usize],
    pq: &[usize],
) -> CsMat<f64> {
    let j11 = real(&select(dSbus_dVa, Some(pvpq), Some(pvpq)));
    let j12 = real(&select(dSbus_dVm, Some(pvpq), Some(pq)));
    let j21 = imag(&select(dSbus_dVa, Some(pq), Some(pvpq)));
    let j22 = imag(&select(dSbus_dVm, Some(pq), Some(pq)));

    sprs::bmat(&[
        [Some(j11.view()), Some(j12.view())],
        [Some(j21.view()), Some(j22.view())],
    ])
}

/// Forms the power flow Jacobian.
///
/// Input is a case in internal ordering and its bus admittance matrix.
/// If the `full_jac` argument is true, it returns the full Jacobian
/// (sensitivities of all bus injections w.r.t all voltage angles/magnitudes)
/// as opposed to the reduced version used in the Newton power flow updates.
/// The units for all quantities are in per unit with radians for voltage
/// angles.
#[allow(non_snake_case)]
pub fn make_jac(mpc: &MPC, Ybus: &CsMat<Complex64>, full_jac: bool) -> Result<CsMat<f64>> {
    let V = initial_voltage(&mpc.bus, &mpc.gen);
    log::debug!("V0: {}", format_polar_vec(&V));

    // build Jacobian
    let (dSbus_dVa, dSbus_dVm) = d_sbus_d_v(Ybus, &V);

    let J = if full_jac {
        let all: Vec<usize> = (0..mpc.bus.len()).collect();
        jacobian(&dSbus_dVa, &dSbus_dVm, &all, &all)
    } else {
        // get bus index lists of each type of bus
        let (_, pv, pq) = bus_types(&mpc.bus, &mpc.gen)?;
        let pv_pq = [pv, pq.clone()].concat();
        jacobian(&dSbus_dVa, &dSbus_dVm, &pv_pq, &pq)
    };
    log::trace!("J:\n{}", format_sparse(&J));

    Ok(J)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::case9;
    use crate::ext_to_int::ext_to_int;
    use crate::ybus::make_ybus;

    #[test]
    fn dimensions() -> Result<()> {
        let (mpc, _) = ext_to_int(&case9())?;
        let (y_bus, _, _) = make_ybus(mpc.base_mva, &mpc.bus, &mpc.branch)?;

        let j = make_jac(&mpc, &y_bus, false)?;
        assert_eq!((j.rows(), j.cols()), (14, 14));

        let j = make_jac(&mpc, &y_bus, true)?;
        assert_eq!((j.rows(), j.cols()), (18, 18));
        Ok(())
    }
}
