//! Built-in test systems.

use crate::mpc::{Branch, Bus, BusType, Gen, GenCost, MPC};

fn bus(i: usize, bus_type: BusType, pd: f64, qd: f64) -> Bus {
    Bus {
        i,
        bus_type,
        pd,
        qd,
        base_kv: 345.0,
        ..Default::default()
    }
}

fn gen(bus: usize, pg: f64, pmax: f64, cost: &[f64]) -> Gen {
    Gen {
        bus,
        pg,
        qmax: 300.0,
        qmin: -300.0,
        pmax,
        pmin: 10.0,
        pcost: Some(GenCost::polynomial(cost)),
        ..Default::default()
    }
}

fn line(from_bus: usize, to_bus: usize, r: f64, x: f64, b: f64, rate_a: f64) -> Branch {
    Branch {
        from_bus,
        to_bus,
        r,
        x,
        b,
        rate_a,
        rate_b: rate_a,
        rate_c: rate_a,
        ..Default::default()
    }
}

/// Power flow data for the 9 bus, 3 generator case from Chow's book
/// (WSCC), with quadratic generator costs. Buses are numbered from 1.
pub fn case9() -> MPC {
    use BusType::*;
    MPC {
        base_mva: 100.0,
        bus: vec![
            bus(1, REF, 0.0, 0.0),
            bus(2, PV, 0.0, 0.0),
            bus(3, PV, 0.0, 0.0),
            bus(4, PQ, 0.0, 0.0),
            bus(5, PQ, 90.0, 30.0),
            bus(6, PQ, 0.0, 0.0),
            bus(7, PQ, 100.0, 35.0),
            bus(8, PQ, 0.0, 0.0),
            bus(9, PQ, 125.0, 50.0),
        ],
        gen: vec![
            gen(1, 0.0, 250.0, &[0.11, 5.0, 150.0]),
            gen(2, 163.0, 300.0, &[0.085, 1.2, 600.0]),
            gen(3, 85.0, 270.0, &[0.1225, 1.0, 335.0]),
        ],
        branch: vec![
            line(1, 4, 0.0, 0.0576, 0.0, 250.0),
            line(4, 5, 0.017, 0.092, 0.158, 250.0),
            line(5, 6, 0.039, 0.17, 0.358, 150.0),
            line(3, 6, 0.0, 0.0586, 0.0, 300.0),
            line(6, 7, 0.0119, 0.1008, 0.209, 150.0),
            line(7, 8, 0.0085, 0.072, 0.149, 250.0),
            line(8, 2, 0.0, 0.0625, 0.0, 250.0),
            line(8, 9, 0.032, 0.161, 0.306, 250.0),
            line(9, 4, 0.01, 0.085, 0.176, 250.0),
        ],
        user: None,
    }
}

/// As `case9` but with quadratic reactive power costs.
pub fn case9q() -> MPC {
    let mut mpc = case9();
    let qcost = [[0.2, 0.0, 0.0], [0.05, 0.0, 0.0], [0.3, 0.0, 0.0]];
    for (g, c) in mpc.gen.iter_mut().zip(qcost) {
        g.qcost = Some(GenCost::polynomial(&c));
    }
    mpc
}

/// Lossless two bus system: a slack bus feeding `pd` MW through a single
/// line of reactance `x`.
pub fn case2(pd: f64, x: f64) -> MPC {
    MPC {
        base_mva: 100.0,
        bus: vec![bus(1, BusType::REF, 0.0, 0.0), bus(2, BusType::PQ, pd, 0.0)],
        gen: vec![gen(1, 0.0, 250.0, &[0.0, 1.0, 0.0])],
        branch: vec![line(1, 2, 0.0, x, 0.0, 0.0)],
        user: None,
    }
}
