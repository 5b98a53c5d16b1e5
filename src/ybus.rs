use num_complex::Complex64;
use sprs::{CsMat, TriMat};

use crate::error::PowersError;
use crate::mpc::{Branch, Bus};

/// Checks that buses are numbered `0..nb` in order and that every branch
/// connects two of them.
pub fn check_bus_numbering(bus: &[Bus], branch: &[Branch]) -> Result<(), PowersError> {
    if let Some((position, b)) = bus.iter().enumerate().find(|(k, b)| b.i != *k) {
        return Err(PowersError::NonConsecutiveBus {
            position,
            number: b.i,
        });
    }
    let nb = bus.len();
    for (i, br) in branch.iter().enumerate() {
        if br.from_bus >= nb {
            return Err(PowersError::UnknownBus {
                branch: i,
                bus: br.from_bus,
            });
        }
        if br.to_bus >= nb {
            return Err(PowersError::UnknownBus {
                branch: i,
                bus: br.to_bus,
            });
        }
    }
    Ok(())
}

/// Builds the bus admittance matrix and branch admittance matrices.
///
/// Returns the full bus admittance matrix (i.e. for all buses) and the
/// matrices `Yf` and `Yt` which, when multiplied by a complex voltage
/// vector, yield the vector currents injected into each line from the
/// "from" and "to" buses respectively of each line. Does appropriate
/// conversions to p.u. Requires consecutive bus numbering from 0
/// (i.e. internal ordering).
pub fn make_ybus(
    base_mva: f64,
    bus: &[Bus],
    branch: &[Branch],
) -> Result<(CsMat<Complex64>, CsMat<Complex64>, CsMat<Complex64>), PowersError> {
    check_bus_numbering(bus, branch)?;

    let nb = bus.len();
    let nl = branch.len();

    // For each branch, compute the elements of the branch admittance matrix where:
    //
    //      | If |   | Yff  Yft |   | Vf |
    //      |    | = |          | * |    |
    //      | It |   | Ytf  Ytt |   | Vt |
    let mut y_bus = TriMat::with_capacity((nb, nb), 4 * nl + nb);
    let mut y_f = TriMat::with_capacity((nl, nb), 2 * nl);
    let mut y_t = TriMat::with_capacity((nl, nb), 2 * nl);

    for (i, br) in branch.iter().enumerate() {
        let y_s = br.y_s(); // series admittance
        let b_c = if br.is_on() { br.b } else { 0.0 }; // line charging susceptance
        let tap = br.tap(); // includes phase shifters

        let y_tt = y_s + Complex64::new(0.0, b_c / 2.0);
        let y_ff = y_tt / (tap * tap.conj());
        let y_ft = -y_s / tap.conj();
        let y_tf = -y_s / tap;

        let (f, t) = (br.from_bus, br.to_bus);

        y_f.add_triplet(i, f, y_ff);
        y_f.add_triplet(i, t, y_ft);

        y_t.add_triplet(i, f, y_tf);
        y_t.add_triplet(i, t, y_tt);

        y_bus.add_triplet(f, f, y_ff);
        y_bus.add_triplet(f, t, y_ft);
        y_bus.add_triplet(t, f, y_tf);
        y_bus.add_triplet(t, t, y_tt);
    }

    // If Psh is the real power consumed by the shunt at V = 1.0 p.u.
    // and Qsh is the reactive power injected by the shunt at V = 1.0 p.u.
    // then Psh - j Qsh = V * conj(Ysh * V) = conj(Ysh) = Gs - j Bs,
    // i.e. Ysh = Psh + j Qsh.
    for (i, b) in bus.iter().enumerate() {
        let y_sh = b.y_sh(base_mva);
        if y_sh != Complex64::default() {
            y_bus.add_triplet(i, i, y_sh);
        }
    }

    Ok((y_bus.to_csr(), y_f.to_csr(), y_t.to_csr()))
}
