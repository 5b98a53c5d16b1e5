use std::f64::consts::PI;

use anyhow::Result;
use sprs::{CsMat, TriMat};

use crate::bus_types::bus_types;
use crate::dc::make_b_dc;
use crate::ips::{qp, IpsSolution};
use crate::mpc::{CostModel, Gen, GenCost, MPC};
use crate::mpopt::MPOpt;
use crate::opf::costs::{poly2pwl, UserCost};
use crate::opf::{
    add_user_constraints, add_user_vars, angle_bounds, clear_branch_results, initial_point,
    log_solution, make_aang, make_ay, GenCosts, OpfModel,
};
use crate::sparse::{mul_vec, scale, select, sparse};
use crate::traits::LinearSolver;

/// Quadratic objective `1/2 x'Hx + c'x + k` of the DC OPF.
fn quadratic_cost(
    base_mva: f64,
    pcost: &[GenCost],
    om: &OpfModel,
    user: Option<&UserCost>,
) -> (CsMat<f64>, Vec<f64>, f64) {
    let nx = om.nx();
    let pg0 = om.var("Pg").map_or(0, |v| v.i0);
    let mut h = TriMat::new((nx, nx));
    let mut c = vec![0.0; nx];
    let mut k = 0.0;

    for (i, cost) in pcost.iter().enumerate() {
        if cost.model != CostModel::Polynomial {
            continue;
        }
        // pad to [c2, c1, c0]
        let n = cost.cost.len();
        let mut q = [0.0; 3];
        q[3 - n..].copy_from_slice(&cost.cost);
        h.add_triplet(pg0 + i, pg0 + i, 2.0 * q[0] * base_mva * base_mva);
        c[pg0 + i] = q[1] * base_mva;
        k += q[2];
    }
    if let Some(y) = om.var("y") {
        c[y.range()].iter_mut().for_each(|c| *c = 1.0);
    }
    let h: CsMat<f64> = h.to_csr();

    match user {
        Some(user) => {
            let (hu, cu, ku) = user.quadratic();
            c.iter_mut().zip(cu).for_each(|(c, cu)| *c += cu);
            (&h + &hu, c, k + ku)
        }
        None => (h, c, k),
    }
}

/// Solves the DC OPF for a case in internal numbering and writes the
/// solution into it.
pub(super) fn dc_opf(mpc: &mut MPC, mpopt: &MPOpt, solver: &dyn LinearSolver) -> Result<IpsSolution> {
    let base_mva = mpc.base_mva;
    let (nb, ng) = (mpc.bus.len(), mpc.gen.len());
    let (refs, _, _) = bus_types(&mpc.bus, &mpc.gen)?;

    // reactive power costs are ignored
    let mut costs = GenCosts::new(&mpc.gen)?;
    for (i, c) in costs.p.iter_mut().enumerate() {
        if c.model == CostModel::Polynomial && c.cost.len() > 3 {
            let g = &mpc.gen[i];
            log::debug!("gen {}: order {} cost approximated as piecewise linear", i, c.cost.len() - 1);
            *c = poly2pwl(c, g.pmin, g.pmax, mpopt.opf.pwl_points);
        }
    }
    let cost_of: Vec<Option<&GenCost>> = costs.p.iter().map(Some).collect();
    let ny = costs.p.iter().filter(|c| c.is_pwl()).count();

    // variables
    let mut om = OpfModel::default();
    let (va, val, vau) = angle_bounds(&mpc.bus, &refs);
    om.add_vars("Va", va, val, vau)?;
    let pu = |f: &dyn Fn(&Gen) -> f64| -> Vec<f64> {
        mpc.gen.iter().map(|g| f(g) / base_mva).collect()
    };
    om.add_vars("Pg", pu(&|g| g.pg), pu(&|g| g.pmin), pu(&|g| g.pmax))?;
    if ny > 0 {
        om.add_vars(
            "y",
            vec![0.0; ny],
            vec![f64::NEG_INFINITY; ny],
            vec![f64::INFINITY; ny],
        )?;
    }
    add_user_vars(&mut om, mpc)?;

    // power balance: B * Va - Cg * Pg = -(Pd + Gs) / base - Pbusinj
    let (b_mat, b_f, pbusinj, pfinj) = make_b_dc(&mpc.bus, &mpc.branch)?;
    let gen_bus: Vec<usize> = mpc.gen.iter().map(|g| g.bus).collect();
    let neg_cg = sparse((nb, ng), &gen_bus, &(0..ng).collect::<Vec<_>>(), &vec![-1.0; ng]);
    let bmis: Vec<f64> = mpc
        .bus
        .iter()
        .zip(&pbusinj)
        .map(|(b, inj)| -(b.pd + b.gs) / base_mva - inj)
        .collect();
    om.add_lin_constraints("Pmis", sprs::hstack(&[b_mat.view(), neg_cg.view()]), bmis.clone(), bmis, &["Va", "Pg"])?;

    // branch flow limits
    let il: Vec<usize> = mpc
        .branch
        .iter()
        .enumerate()
        .filter(|(_, br)| br.rate_a != 0.0 && br.rate_a < 1e10)
        .map(|(i, _)| i)
        .collect();
    if !il.is_empty() {
        let bf_il = select(&b_f, Some(&il), None);
        let rate: Vec<f64> = il.iter().map(|&i| mpc.branch[i].rate_a / base_mva).collect();
        let upf = il.iter().zip(&rate).map(|(&i, r)| r - pfinj[i]).collect();
        let upt = il.iter().zip(&rate).map(|(&i, r)| r + pfinj[i]).collect();
        let lower = vec![f64::NEG_INFINITY; il.len()];
        om.add_lin_constraints("Pf", bf_il.clone(), lower.clone(), upf, &["Va"])?;
        om.add_lin_constraints("Pt", scale(&bf_il, -1.0), lower, upt, &["Va"])?;
    }

    let (aang, lang, uang, iang) = make_aang(nb, &mpc.branch, mpopt.opf.ignore_ang_lim);
    if aang.rows() > 0 {
        om.add_lin_constraints("ang", aang, lang, uang, &["Va"])?;
    }
    if ny > 0 {
        let (ay, by) = make_ay(base_mva, &cost_of);
        om.add_lin_constraints("ycon", ay, vec![f64::NEG_INFINITY; by.len()], by, &["Pg", "y"])?;
    }
    add_user_constraints(&mut om, mpc, &["Va", "Pg", "y", "z"])?;

    let user = match &mpc.user {
        Some(user) => UserCost::new(user, om.nx())?,
        None => None,
    };
    let (h, c, k) = quadratic_cost(base_mva, &costs.p, &om, user.as_ref());

    // solve
    let va_ref = mpc.bus[refs[0]].va * PI / 180.0;
    let y0 = GenCosts::y0(costs.p.iter().filter(|c| c.is_pwl()));
    let (x0, xmin, xmax) = initial_point(&om, va_ref, y0);
    let (a, l, u) = om.linear_constraints();

    let mut s = qp(
        Some(&h),
        &c,
        a.as_ref(),
        &l,
        &u,
        &xmin,
        &xmax,
        &x0,
        &mpopt.opf.ips,
        solver,
    )?;
    s.f += k;
    log_solution(&s);

    // update solution data
    let range = |name: &str| om.var(name).map_or(0..0, |v| v.range());
    let va = &s.x[range("Va")];
    let pg = &s.x[range("Pg")];
    for (i, b) in mpc.bus.iter_mut().enumerate() {
        b.vm = 1.0;
        b.va = va[i] * 180.0 / PI;
    }
    for (i, g) in mpc.gen.iter_mut().enumerate() {
        g.pg = pg[i] * base_mva;
    }
    let pf = mul_vec(&b_f, va);
    for (i, br) in mpc.branch.iter_mut().enumerate() {
        clear_branch_results(br);
        br.pf = (pf[i] + pfinj[i]) * base_mva;
        br.pt = -br.pf;
    }

    // multipliers
    let lam = &s.lambda;
    if let Some(pmis) = om.lin("Pmis") {
        for (i, b) in mpc.bus.iter_mut().enumerate() {
            let r = pmis.i0 + i;
            b.lam_p = (lam.mu_u[r] - lam.mu_l[r]) / base_mva;
            b.lam_q = 0.0;
            b.mu_vmax = 0.0;
            b.mu_vmin = 0.0;
        }
    }
    if let (Some(rf), Some(rt)) = (om.lin("Pf"), om.lin("Pt")) {
        for (k, &i) in il.iter().enumerate() {
            mpc.branch[i].mu_sf = lam.mu_u[rf.i0 + k] / base_mva;
            mpc.branch[i].mu_st = lam.mu_u[rt.i0 + k] / base_mva;
        }
    }
    let pg_ix = range("Pg");
    for (i, g) in mpc.gen.iter_mut().enumerate() {
        g.mu_pmax = lam.upper[pg_ix.start + i] / base_mva;
        g.mu_pmin = lam.lower[pg_ix.start + i] / base_mva;
        g.mu_qmax = 0.0;
        g.mu_qmin = 0.0;
    }
    if let Some(ang) = om.lin("ang") {
        for (k, &i) in iang.iter().enumerate() {
            mpc.branch[i].mu_ang_min = lam.mu_l[ang.i0 + k] * PI / 180.0;
            mpc.branch[i].mu_ang_max = lam.mu_u[ang.i0 + k] * PI / 180.0;
        }
    }

    Ok(s)
}
