use std::collections::HashSet;

use crate::error::PowersError;
use crate::mpc::{Bus, Gen};

/// Builds index lists for each type of bus (REF, PV, PQ).
///
/// Generators with "out-of-service" status are treated as PQ buses with
/// zero generation (regardless of Pg/Qg values in gen). Expects `bus` and
/// `gen` have been converted to use internal consecutive bus numbering.
///
/// If no reference bus with an in-service generator exists, the first PV
/// bus is used as the reference. It is an error if there is none.
pub fn bus_types(
    bus: &[Bus],
    gen: &[Gen],
) -> Result<(Vec<usize>, Vec<usize>, Vec<usize>), PowersError> {
    // Buses with generators that are ON.
    let bus_gen_status = gen
        .iter()
        .filter(|g| g.is_on())
        .map(|g| g.bus)
        .collect::<HashSet<usize>>();

    // Form index lists for slack, PV, and PQ buses.
    let mut refbus = bus
        .iter()
        .filter(|b| b.is_ref() && bus_gen_status.contains(&b.i))
        .map(|b| b.i)
        .collect::<Vec<usize>>();
    let mut pv = bus
        .iter()
        .filter(|b| b.is_pv() && bus_gen_status.contains(&b.i))
        .map(|b| b.i)
        .collect::<Vec<usize>>();
    let pq = bus
        .iter()
        .filter(|b| b.is_pq() || !bus_gen_status.contains(&b.i))
        .map(|b| b.i)
        .collect::<Vec<usize>>();

    // pick a new reference bus if for some reason there is none (may have been shut down)
    if refbus.is_empty() {
        if pv.is_empty() {
            return Err(PowersError::NoReferenceBus);
        }
        let r = pv.remove(0); // use the first PV bus
        log::info!("no reference bus, using PV bus {} instead", r);
        refbus.push(r);
    }

    Ok((refbus, pv, pq))
}
