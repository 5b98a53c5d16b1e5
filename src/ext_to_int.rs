use std::collections::HashSet;

use crate::error::PowersError;
use crate::mpc::MPC;
use crate::order::Order;

/// Converts a case from external to internal bus numbering.
///
/// Isolated buses, off-line generators and branches, and anything
/// connected to an isolated bus are removed. The remaining buses are
/// numbered consecutively from zero in their original order. The input
/// is not modified. The returned `Order` holds the mapping needed by
/// `int_to_ext`.
pub fn ext_to_int(mpc: &MPC) -> Result<(MPC, Order), PowersError> {
    let mut order = Order::new(&mpc.bus, &mpc.gen, &mpc.branch);

    // check for duplicate and unknown bus numbers
    let mut all = HashSet::with_capacity(mpc.bus.len());
    for b in &mpc.bus {
        if !all.insert(b.i) {
            return Err(PowersError::DuplicateBus(b.i));
        }
    }
    for (i, g) in mpc.gen.iter().enumerate() {
        if !all.contains(&g.bus) {
            return Err(PowersError::UnknownGenBus { gen: i, bus: g.bus });
        }
    }
    for (i, br) in mpc.branch.iter().enumerate() {
        if let Some(&bus) = [br.from_bus, br.to_bus].iter().find(|b| !all.contains(b)) {
            return Err(PowersError::UnknownBus { branch: i, bus });
        }
    }

    // determine which buses, branches, gens are connected & in-service
    let bs: HashSet<usize> = mpc
        .bus
        .iter()
        .filter(|b| !b.is_isolated())
        .map(|b| b.i)
        .collect();
    for (i, b) in mpc.bus.iter().enumerate() {
        if b.is_isolated() {
            order.bus.status.off.push(i);
        } else {
            order.bus.status.on.push(i);
        }
    }
    for (i, g) in mpc.gen.iter().enumerate() {
        if g.is_on() && bs.contains(&g.bus) {
            order.gen.on.push(i);
        } else {
            order.gen.off.push(i);
        }
    }
    for (i, br) in mpc.branch.iter().enumerate() {
        if br.is_on() && bs.contains(&br.from_bus) && bs.contains(&br.to_bus) {
            order.branch.on.push(i);
        } else {
            order.branch.off.push(i);
        }
    }

    // keep what is "in"
    let mut bus: Vec<_> = order.bus.status.on.iter().map(|&i| mpc.bus[i].clone()).collect();
    let mut gen: Vec<_> = order.gen.on.iter().map(|&i| mpc.gen[i].clone()).collect();
    let mut branch: Vec<_> = order.branch.on.iter().map(|&i| mpc.branch[i].clone()).collect();

    // apply consecutive bus numbering
    for b in bus.iter_mut() {
        b.i = order
            .bus
            .index
            .push(b.i)
            .ok_or(PowersError::DuplicateBus(b.i))?;
    }
    let e2i = |e: usize| order.bus.index.to_internal(e).unwrap_or(usize::MAX);
    for g in gen.iter_mut() {
        g.bus = e2i(g.bus);
    }
    for br in branch.iter_mut() {
        br.from_bus = e2i(br.from_bus);
        br.to_bus = e2i(br.to_bus);
    }

    log::debug!(
        "ext2int: {} of {} buses, {} of {} gens, {} of {} branches in service",
        bus.len(),
        mpc.bus.len(),
        gen.len(),
        mpc.gen.len(),
        branch.len(),
        mpc.branch.len()
    );

    let mpci = MPC {
        base_mva: mpc.base_mva,
        bus,
        gen,
        branch,
        user: mpc.user.clone(),
    };
    Ok((mpci, order))
}
