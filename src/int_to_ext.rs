use anyhow::{format_err, Result};

use crate::mpc::MPC;
use crate::order::Order;

/// Converts a case in internal numbering back to external numbering.
///
/// Returns a new case built from the data saved in `order`, with the
/// in-service elements replaced by those in `mpc` and their original bus
/// numbers restored.
pub fn int_to_ext(mpc: &MPC, order: &Order) -> Result<MPC> {
    if mpc.bus.len() != order.bus.status.on.len()
        || mpc.gen.len() != order.gen.on.len()
        || mpc.branch.len() != order.branch.on.len()
    {
        return Err(format_err!(
            "internal case ({} buses, {} gens, {} branches) does not match ordering ({}, {}, {})",
            mpc.bus.len(),
            mpc.gen.len(),
            mpc.branch.len(),
            order.bus.status.on.len(),
            order.gen.on.len(),
            order.branch.on.len()
        ));
    }
    let i2e = |i: usize| {
        order
            .bus
            .index
            .to_external(i)
            .ok_or_else(|| format_err!("internal bus index {} out of range", i))
    };

    let mut bus = order.external.bus.clone();
    let mut gen = order.external.gen.clone();
    let mut branch = order.external.branch.clone();

    for (b, &j) in mpc.bus.iter().zip(&order.bus.status.on) {
        bus[j] = b.clone();
        bus[j].i = i2e(b.i)?;
    }
    for (g, &j) in mpc.gen.iter().zip(&order.gen.on) {
        gen[j] = g.clone();
        gen[j].bus = i2e(g.bus)?;
    }
    for (br, &j) in mpc.branch.iter().zip(&order.branch.on) {
        branch[j] = br.clone();
        branch[j].from_bus = i2e(br.from_bus)?;
        branch[j].to_bus = i2e(br.to_bus)?;
    }

    Ok(MPC {
        base_mva: mpc.base_mva,
        bus,
        gen,
        branch,
        user: mpc.user.clone(),
    })
}
