use anyhow::Result;

use super::*;
use crate::cases::{case9, case9q};
use crate::lu::SparseLU;
use crate::mpc::UserExtension;
use crate::mpopt::FlowLim;
use crate::sparse::sparse;

fn assert_near(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() < tol,
        "expected {} got {}",
        expected,
        actual
    );
}

fn dc() -> MPOpt {
    MPOpt {
        dc: true,
        ..Default::default()
    }
}

/// Total generation minus total load and branch losses, in MW.
fn p_imbalance(case: &MPC) -> f64 {
    let pg: f64 = case.gen.iter().filter(|g| g.is_on()).map(|g| g.pg).sum();
    let pd: f64 = case.bus.iter().map(|b| b.pd).sum();
    let loss: f64 = case.branch.iter().map(|br| br.pf + br.pt).sum();
    pg - pd - loss
}

#[test]
fn ac_case9() -> Result<()> {
    let r = runopf(&case9(), &MPOpt::default(), &SparseLU)?;
    assert!(r.success);
    assert_eq!(r.exitflag, ExitFlag::Converged);
    assert_near(r.f, 5296.69, 1e-2);
    for (g, pg) in r.case.gen.iter().zip([89.80, 134.32, 94.19]) {
        assert_near(g.pg, pg, 1e-2);
    }
    assert_near(p_imbalance(&r.case), 0.0, 1e-4);

    // price at each generator bus is its marginal cost
    let costs = [[0.11, 5.0], [0.085, 1.2], [0.1225, 1.0]];
    for (g, c) in r.case.gen.iter().zip(costs) {
        let bus = &r.case.bus[g.bus - 1];
        assert_near(bus.lam_p, 2.0 * c[0] * g.pg + c[1], 1e-2);
        assert!(g.mu_pmax.abs() < 1e-4 && g.mu_pmin.abs() < 1e-4);
    }
    for b in &r.case.bus {
        assert!(b.vm <= b.vmax + 1e-6 && b.vm >= b.vmin - 1e-6);
    }
    assert_near(r.case.bus[0].va, 0.0, 1e-8);
    assert!(r.iterations > 0 && r.history.len() == r.iterations + 1);
    Ok(())
}

#[test]
fn ac_reactive_costs() -> Result<()> {
    let r = runopf(&case9q(), &MPOpt::default(), &SparseLU)?;
    assert!(r.success);
    let base = runopf(&case9(), &MPOpt::default(), &SparseLU)?;
    assert!(r.f > base.f);

    // marginal reactive cost 2 * 0.2 * Qg at the first generator bus
    let g = &r.case.gen[0];
    assert_near(r.case.bus[0].lam_q, 0.4 * g.qg, 1e-2);
    Ok(())
}

#[test]
fn dc_case9() -> Result<()> {
    let r = runopf(&case9(), &dc(), &SparseLU)?;
    assert!(r.success);
    let pg: Vec<f64> = r.case.gen.iter().map(|g| g.pg).collect();
    assert_near(pg.iter().sum(), 315.0, 1e-4);

    // lossless and uncongested: a single price equal to every marginal cost
    let costs = [[0.11, 5.0], [0.085, 1.2], [0.1225, 1.0]];
    let lam = r.case.bus[0].lam_p;
    for (p, c) in pg.iter().zip(costs) {
        assert_near(2.0 * c[0] * p + c[1], lam, 1e-3);
    }
    for b in &r.case.bus {
        assert_near(b.lam_p, lam, 1e-3);
        assert_eq!(b.vm, 1.0);
    }
    let f: f64 = r
        .case
        .gen
        .iter()
        .filter_map(|g| g.pcost.as_ref().map(|c| totcost(c, g.pg)))
        .sum();
    assert_near(r.f, f, 1e-4);
    assert_near(r.f, 5216.03, 0.1);
    for br in &r.case.branch {
        assert_eq!(br.pf, -br.pt);
    }

    let ac = runopf(&case9(), &MPOpt::default(), &SparseLU)?;
    assert!(r.f < ac.f);
    Ok(())
}

#[test]
fn ac_flow_limit() -> Result<()> {
    let mut mpc = case9();
    mpc.branch[0].rate_a = 80.0;
    let unconstrained = runopf(&case9(), &MPOpt::default(), &SparseLU)?;

    for flow_lim in [FlowLim::S, FlowLim::P, FlowLim::I] {
        let mut mpopt = MPOpt::default();
        mpopt.opf.flow_lim = flow_lim;
        let r = runopf(&mpc, &mpopt, &SparseLU)?;
        assert!(r.success, "{:?}", flow_lim);
        assert!(r.f >= unconstrained.f - 1e-6);
        let br = &r.case.branch[0];
        let sf = br.pf.hypot(br.qf);
        match flow_lim {
            FlowLim::S => {
                assert!(sf <= 80.0 + 1e-3);
                assert!(br.mu_sf > 0.0);
                assert!(r.f > unconstrained.f);
            }
            FlowLim::P => {
                assert!(br.pf <= 80.0 + 1e-3);
                assert!(r.f > unconstrained.f);
            }
            FlowLim::I => assert!(br.mu_sf >= 0.0),
        }
    }
    Ok(())
}

#[test]
fn dc_flow_limit() -> Result<()> {
    let mut mpc = case9();
    mpc.branch[0].rate_a = 80.0;
    let r = runopf(&mpc, &dc(), &SparseLU)?;
    assert!(r.success);
    let br = &r.case.branch[0];
    assert_near(br.pf, 80.0, 1e-3);
    assert!(br.mu_sf > 0.0);
    assert!(br.mu_st.abs() < 1e-4);

    // congestion separates prices
    let lam: Vec<f64> = r.case.bus.iter().map(|b| b.lam_p).collect();
    assert!((lam[0] - lam[3]).abs() > 1e-2);
    assert_near(r.case.gen.iter().map(|g| g.pg).sum(), 315.0, 1e-4);
    Ok(())
}

#[test]
fn angle_difference_limit() -> Result<()> {
    let mut mpc = case9();
    mpc.branch[0].ang_max = 2.0;

    for mpopt in [MPOpt::default(), dc()] {
        let r = runopf(&mpc, &mpopt, &SparseLU)?;
        assert!(r.success);
        let diff = r.case.bus[0].va - r.case.bus[3].va;
        assert!(diff <= 2.0 + 1e-4);
        assert!(r.case.branch[0].mu_ang_max > 0.0);
        assert!(r.case.branch[0].mu_ang_min.abs() < 1e-4);

        let mut ignore = mpopt.clone();
        ignore.opf.ignore_ang_lim = true;
        let r = runopf(&mpc, &ignore, &SparseLU)?;
        assert!(r.case.bus[0].va - r.case.bus[3].va > 2.0);
    }
    Ok(())
}

fn pg_sum_limit(nx: usize, cols: [usize; 2], limit: f64) -> UserExtension {
    UserExtension {
        a: Some(sparse((1, nx), &[0, 0], &cols, &[1.0, 1.0])),
        l: vec![f64::NEG_INFINITY],
        u: vec![limit],
        ..Default::default()
    }
}

#[test]
fn user_constraint_binds() -> Result<()> {
    // x = [Va(9), Vm(9), Pg(3), Qg(3)]
    let mut mpc = case9();
    mpc.user = Some(pg_sum_limit(24, [18, 19], 2.0));
    let r = runopf(&mpc, &MPOpt::default(), &SparseLU)?;
    assert!(r.success);
    let (pg1, pg2) = (r.case.gen[0].pg, r.case.gen[1].pg);
    assert!(pg1 + pg2 <= 200.0 + 1e-3);
    assert_near(pg1 + pg2, 200.0, 1e-2);
    assert!(r.lambda.mu_u.last().map_or(false, |&mu| mu > 0.0));

    // x = [Va(9), Pg(3)]
    let mut mpc = case9();
    mpc.user = Some(pg_sum_limit(12, [9, 10], 2.0));
    let r = runopf(&mpc, &dc(), &SparseLU)?;
    assert!(r.success);
    assert_near(r.case.gen[0].pg + r.case.gen[1].pg, 200.0, 1e-3);
    assert_near(r.case.gen[2].pg, 115.0, 1e-3);
    Ok(())
}

#[test]
fn malformed_user_constraints() {
    let mut mpc = case9();
    mpc.user = Some(pg_sum_limit(23, [18, 19], 2.0));
    assert!(runopf(&mpc, &MPOpt::default(), &SparseLU).is_err());

    let mut mpc = case9();
    mpc.user = Some(pg_sum_limit(24, [9, 10], 2.0));
    assert!(runopf(&mpc, &dc(), &SparseLU).is_err());
}

#[test]
fn user_variable_and_cost() -> Result<()> {
    // z >= Pg3 - 0.9 penalized at 1000 $/p.u.
    let mut mpc = case9();
    mpc.user = Some(UserExtension {
        a: Some(sparse((1, 13), &[0, 0], &[11, 12], &[1.0, -1.0])),
        l: vec![f64::NEG_INFINITY],
        u: vec![0.9],
        nz: 1,
        zl: vec![0.0],
        n: Some(sparse((1, 13), &[0], &[12], &[1.0])),
        cw: vec![1000.0],
        ..Default::default()
    });
    let r = runopf(&mpc, &dc(), &SparseLU)?;
    assert!(r.success);
    let pg3 = r.case.gen[2].pg;
    assert!(pg3 <= 90.0 + 1e-2);
    assert_near(r.x[12], (pg3 / 100.0 - 0.9).max(0.0), 1e-5);
    Ok(())
}

#[test]
fn piecewise_linear_costs() -> Result<()> {
    // single segment, identical to a linear polynomial
    let mut lin = case9();
    lin.gen[0].pcost = Some(GenCost::polynomial(&[5.0, 100.0]));
    let mut pwl = case9();
    pwl.gen[0].pcost = Some(GenCost::pw_linear(&[(0.0, 100.0), (250.0, 1350.0)]));

    let a = runopf(&lin, &MPOpt::default(), &SparseLU)?;
    let b = runopf(&pwl, &MPOpt::default(), &SparseLU)?;
    assert!(a.success && b.success);
    assert_near(a.f, b.f, 1e-6);
    assert_near(a.case.gen[0].pg, b.case.gen[0].pg, 1e-6);

    // three collinear points need a cost variable
    let mut pwl3 = case9();
    pwl3.gen[0].pcost = Some(GenCost::pw_linear(&[
        (0.0, 100.0),
        (100.0, 600.0),
        (250.0, 1350.0),
    ]));
    for mpopt in [MPOpt::default(), dc()] {
        let a = runopf(&lin, &mpopt, &SparseLU)?;
        let c = runopf(&pwl3, &mpopt, &SparseLU)?;
        assert!(c.success);
        assert_near(a.f, c.f, 1e-5 * a.f.abs());
        assert_near(a.case.gen[0].pg, c.case.gen[0].pg, 1e-2);
    }
    Ok(())
}

#[test]
fn dc_cubic_cost() -> Result<()> {
    let mut mpc = case9();
    mpc.gen[1].pcost = Some(GenCost::polynomial(&[1e-4, 0.085, 1.2, 600.0]));
    let r = runopf(&mpc, &dc(), &SparseLU)?;
    assert!(r.success);
    assert_near(r.case.gen.iter().map(|g| g.pg).sum(), 315.0, 1e-4);

    // the interpolated cost is an upper bound on the convex cubic
    let pg2 = r.case.gen[1].pg;
    let cost2 = polycost(&GenCost::polynomial(&[1e-4, 0.085, 1.2, 600.0]), pg2, 0);
    let others: f64 = [0usize, 2]
        .iter()
        .filter_map(|&i| r.case.gen[i].pcost.as_ref().map(|c| totcost(c, r.case.gen[i].pg)))
        .sum();
    assert!(r.f >= others + cost2 - 1e-3);
    Ok(())
}

#[test]
fn out_of_service_generator() -> Result<()> {
    let mut mpc = case9();
    mpc.gen[2].status = false;
    mpc.gen[2].pg = 85.0;
    for mpopt in [MPOpt::default(), dc()] {
        let r = runopf(&mpc, &mpopt, &SparseLU)?;
        assert!(r.success);
        assert_eq!(r.case.gen[2].pg, 0.0);
        assert_eq!(r.case.gen[2].mu_pmax, 0.0);
        assert!(r.case.gen[0].pg + r.case.gen[1].pg >= 315.0 - 1e-4);
    }
    Ok(())
}
