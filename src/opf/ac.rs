use std::f64::consts::PI;
use std::ops::Range;

use anyhow::Result;
use num_complex::Complex64;
use sprs::{CsMat, TriMat};

use crate::bus_types::bus_types;
use crate::d2::{d2_aibr_d_v2, d2_apbr_d_v2, d2_asbr_d_v2, d2_sbus_d_v2, Hessian};
use crate::dbr::{d_abr_d_v, d_ibr_d_v, d_sbr_d_v, BranchDerivatives};
use crate::ips::{nlp, HessianFunction, IpsSolution, NonlinearConstraint, ObjectiveFunction};
use crate::math::polar;
use crate::mpc::{Branch, Bus, Gen, GenCost, MPC};
use crate::mpopt::{FlowLim, MPOpt};
use crate::opf::costs::{polycost, UserCost};
use crate::opf::{
    add_user_constraints, add_user_vars, angle_bounds, clear_branch_results, initial_point,
    log_solution, make_aang, make_apq, make_avl, make_ay, GenCosts, OpfModel,
};
use crate::sbus::{d_sbus_d_v, make_sbus, power_mismatch};
use crate::sparse::{complex, imag, mul_vec, real, scale, select, sparse, transpose};
use crate::traits::LinearSolver;
use crate::ybus::make_ybus;

/// Objective of the AC OPF: polynomial costs of Pg and Qg in MW and
/// MVAr, the sum of the piecewise linear cost variables and the user
/// defined cost.
pub(super) struct AcCost {
    base_mva: f64,
    pcost: Vec<GenCost>,
    qcost: Vec<Option<GenCost>>,
    pg: Range<usize>,
    qg: Range<usize>,
    y: Range<usize>,
    user: Option<UserCost>,
    nx: usize,
}

impl ObjectiveFunction for AcCost {
    fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
        let base = self.base_mva;
        let mut f = 0.0;
        let mut df = vec![0.0; self.nx];

        for (i, c) in self.pcost.iter().enumerate() {
            let p = x[self.pg.start + i] * base;
            f += polycost(c, p, 0);
            df[self.pg.start + i] = polycost(c, p, 1) * base;
        }
        for (i, c) in self.qcost.iter().enumerate() {
            if let Some(c) = c {
                let q = x[self.qg.start + i] * base;
                f += polycost(c, q, 0);
                df[self.qg.start + i] = polycost(c, q, 1) * base;
            }
        }

        f += x[self.y.clone()].iter().sum::<f64>();
        df[self.y.clone()].iter_mut().for_each(|d| *d = 1.0);

        if let Some(user) = &self.user {
            let (fu, dfu) = user.eval(x);
            f += fu;
            df.iter_mut().zip(dfu).for_each(|(d, du)| *d += du);
        }
        (f, df)
    }

    fn d2f(&self, x: &[f64]) -> CsMat<f64> {
        let base2 = self.base_mva * self.base_mva;
        let mut tri = TriMat::new((self.nx, self.nx));
        for (i, c) in self.pcost.iter().enumerate() {
            let j = self.pg.start + i;
            tri.add_triplet(j, j, polycost(c, x[j] * self.base_mva, 2) * base2);
        }
        for (i, c) in self.qcost.iter().enumerate() {
            if let Some(c) = c {
                let j = self.qg.start + i;
                tri.add_triplet(j, j, polycost(c, x[j] * self.base_mva, 2) * base2);
            }
        }
        let d2f: CsMat<f64> = tri.to_csr();
        match &self.user {
            Some(user) => &d2f + &user.hessian(),
            None => d2f,
        }
    }
}

/// AC OPF callbacks: cost, power balance and branch flow constraints,
/// and the Hessian of the Lagrangian.
pub(super) struct AcOpf<'a> {
    base_mva: f64,
    bus: &'a [Bus],
    gen: &'a [Gen],
    y_bus: CsMat<Complex64>,
    /// Rows of the constrained branches.
    branch: Vec<Branch>,
    yf: CsMat<Complex64>,
    yt: CsMat<Complex64>,
    cf: CsMat<Complex64>,
    ct: CsMat<Complex64>,
    /// Squared flow limits (p.u.).
    flow_max: Vec<f64>,
    flow_lim: FlowLim,
    va: Range<usize>,
    vm: Range<usize>,
    cost: AcCost,
}

impl<'a> AcOpf<'a> {
    fn voltage(&self, x: &[f64]) -> Vec<Complex64> {
        polar(&x[self.vm.clone()], &x[self.va.clone()])
    }

    /// Flows constrained by the limits, with their derivatives.
    fn flows(&self, v: &[Complex64]) -> BranchDerivatives {
        match self.flow_lim {
            FlowLim::I => d_ibr_d_v(&self.yf, &self.yt, v),
            FlowLim::S => d_sbr_d_v(&self.branch, &self.yf, &self.yt, v),
            FlowLim::P => {
                let d = d_sbr_d_v(&self.branch, &self.yf, &self.yt, v);
                let re = |m: &CsMat<Complex64>| complex(&real(m));
                let re_v = |s: &[Complex64]| s.iter().map(|s| Complex64::new(s.re, 0.0)).collect::<Vec<_>>();
                BranchDerivatives {
                    df_dva: re(&d.df_dva),
                    df_dvm: re(&d.df_dvm),
                    dt_dva: re(&d.dt_dva),
                    dt_dvm: re(&d.dt_dvm),
                    f: re_v(&d.f),
                    t: re_v(&d.t),
                }
            }
        }
    }

    fn nl2(&self) -> usize {
        self.branch.len()
    }
}

impl<'a> ObjectiveFunction for AcOpf<'a> {
    fn f(&self, x: &[f64]) -> (f64, Vec<f64>) {
        self.cost.f(x)
    }

    fn d2f(&self, x: &[f64]) -> CsMat<f64> {
        self.cost.d2f(x)
    }
}

fn add_block(tri: &mut TriMat<f64>, i0: usize, j0: usize, a: &CsMat<f64>) {
    for (&v, (i, j)) in a.iter() {
        tri.add_triplet(i0 + i, j0 + j, v);
    }
}

impl<'a> NonlinearConstraint for AcOpf<'a> {
    fn gh(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>, CsMat<f64>, CsMat<f64>) {
        let nx = self.cost.nx;
        let (nb, ng, nl2) = (self.bus.len(), self.gen.len(), self.nl2());
        let (pg, qg) = (&x[self.cost.pg.clone()], &x[self.cost.qg.clone()]);
        let v = self.voltage(x);

        // power balance
        let sg: Vec<Complex64> = pg.iter().zip(qg).map(|(&p, &q)| Complex64::new(p, q)).collect();
        let s_bus = make_sbus(self.base_mva, self.bus, self.gen, Some(&sg));
        let mis = power_mismatch(&self.y_bus, &v, &s_bus);
        let g: Vec<f64> = mis.iter().map(|m| m.re).chain(mis.iter().map(|m| m.im)).collect();

        let (ds_dva, ds_dvm) = d_sbus_d_v(&self.y_bus, &v);
        let gen_bus: Vec<usize> = self.gen.iter().map(|g| g.bus).collect();
        let neg_cg = sparse((nb, ng), &gen_bus, &(0..ng).collect::<Vec<_>>(), &vec![-1.0; ng]);

        let mut dg = TriMat::new((2 * nb, nx));
        add_block(&mut dg, 0, self.va.start, &real(&ds_dva));
        add_block(&mut dg, 0, self.vm.start, &real(&ds_dvm));
        add_block(&mut dg, 0, self.cost.pg.start, &neg_cg);
        add_block(&mut dg, nb, self.va.start, &imag(&ds_dva));
        add_block(&mut dg, nb, self.vm.start, &imag(&ds_dvm));
        add_block(&mut dg, nb, self.cost.qg.start, &neg_cg);
        let dg: CsMat<f64> = dg.to_csr();

        // branch flow limits
        let mut dh = TriMat::new((2 * nl2, nx));
        let h = if nl2 > 0 {
            let d = self.flows(&v);
            let (df_dva, df_dvm, dt_dva, dt_dvm) = d_abr_d_v(&d);
            add_block(&mut dh, 0, self.va.start, &df_dva);
            add_block(&mut dh, 0, self.vm.start, &df_dvm);
            add_block(&mut dh, nl2, self.va.start, &dt_dva);
            add_block(&mut dh, nl2, self.vm.start, &dt_dvm);
            let over = |s: &[Complex64]| {
                s.iter()
                    .zip(&self.flow_max)
                    .map(|(s, fmax)| s.norm_sqr() - fmax)
                    .collect::<Vec<f64>>()
            };
            [over(&d.f), over(&d.t)].concat()
        } else {
            Vec::new()
        };
        let dh: CsMat<f64> = dh.to_csr();

        (h, g, transpose(&dh), transpose(&dg))
    }
}

impl<'a> HessianFunction for AcOpf<'a> {
    fn hess(&self, x: &[f64], lam: &[f64], mu: &[f64], cost_mult: f64) -> CsMat<f64> {
        let nx = self.cost.nx;
        let (nb, nl2) = (self.bus.len(), self.nl2());
        let v = self.voltage(x);

        // power balance
        let as_complex = |l: &[f64]| l.iter().map(|&l| Complex64::new(l, 0.0)).collect::<Vec<_>>();
        let gp = d2_sbus_d_v2(&self.y_bus, &v, &as_complex(&lam[..nb]));
        let gq = d2_sbus_d_v2(&self.y_bus, &v, &as_complex(&lam[nb..2 * nb]));
        let combine = |p: &CsMat<Complex64>, q: &CsMat<Complex64>| &real(p) + &imag(q);

        let mut d2 = TriMat::new((nx, nx));
        let (a0, v0) = (self.va.start, self.vm.start);
        let add_hessian = |d2: &mut TriMat<f64>, h: &Hessian<f64>| {
            add_block(d2, a0, a0, &h.aa);
            add_block(d2, a0, v0, &h.av);
            add_block(d2, v0, a0, &h.va);
            add_block(d2, v0, v0, &h.vv);
        };
        let d2g = Hessian {
            aa: combine(&gp.aa, &gq.aa),
            av: combine(&gp.av, &gq.av),
            va: combine(&gp.va, &gq.va),
            vv: combine(&gp.vv, &gq.vv),
        };
        add_hessian(&mut d2, &d2g);

        // branch flow limits
        if nl2 > 0 {
            let (mu_f, mu_t) = (&mu[..nl2], &mu[nl2..2 * nl2]);
            let (hf, ht) = match self.flow_lim {
                FlowLim::I => {
                    let d = d_ibr_d_v(&self.yf, &self.yt, &v);
                    (
                        d2_aibr_d_v2(&d.df_dva, &d.df_dvm, &d.f, &self.yf, &v, mu_f),
                        d2_aibr_d_v2(&d.dt_dva, &d.dt_dvm, &d.t, &self.yt, &v, mu_t),
                    )
                }
                FlowLim::S => {
                    let d = d_sbr_d_v(&self.branch, &self.yf, &self.yt, &v);
                    (
                        d2_asbr_d_v2(&d.df_dva, &d.df_dvm, &d.f, &self.cf, &self.yf, &v, mu_f),
                        d2_asbr_d_v2(&d.dt_dva, &d.dt_dvm, &d.t, &self.ct, &self.yt, &v, mu_t),
                    )
                }
                FlowLim::P => {
                    let d = d_sbr_d_v(&self.branch, &self.yf, &self.yt, &v);
                    (
                        d2_apbr_d_v2(&d.df_dva, &d.df_dvm, &d.f, &self.cf, &self.yf, &v, mu_f),
                        d2_apbr_d_v2(&d.dt_dva, &d.dt_dvm, &d.t, &self.ct, &self.yt, &v, mu_t),
                    )
                }
            };
            add_hessian(&mut d2, &hf);
            add_hessian(&mut d2, &ht);
        }

        let d2: CsMat<f64> = d2.to_csr();
        &scale(&self.cost.d2f(x), cost_mult) + &d2
    }
}

/// Branch-bus connection matrix of the given ends.
fn connection(ends: &[usize], nb: usize) -> CsMat<Complex64> {
    let n = ends.len();
    sparse(
        (n, nb),
        &(0..n).collect::<Vec<_>>(),
        ends,
        &vec![Complex64::new(1.0, 0.0); n],
    )
}

/// Solves the AC OPF for a case in internal numbering and writes the
/// solution into it.
pub(super) fn ac_opf(mpc: &mut MPC, mpopt: &MPOpt, solver: &dyn LinearSolver) -> Result<IpsSolution> {
    let base_mva = mpc.base_mva;
    let nb = mpc.bus.len();
    let (refs, _, _) = bus_types(&mpc.bus, &mpc.gen)?;
    let costs = GenCosts::new(&mpc.gen)?;

    // variables
    let mut om = OpfModel::default();
    let (va, val, vau) = angle_bounds(&mpc.bus, &refs);
    om.add_vars("Va", va, val, vau)?;

    let mut vm: Vec<f64> = mpc.bus.iter().map(|b| b.vm).collect();
    for g in &mpc.gen {
        vm[g.bus] = g.vg;
    }
    om.add_vars(
        "Vm",
        vm,
        mpc.bus.iter().map(|b| b.vmin).collect(),
        mpc.bus.iter().map(|b| b.vmax).collect(),
    )?;
    let pu = |f: &dyn Fn(&Gen) -> f64| -> Vec<f64> { mpc.gen.iter().map(|g| f(g) / base_mva).collect() };
    om.add_vars("Pg", pu(&|g| g.pg), pu(&|g| g.pmin), pu(&|g| g.pmax))?;
    om.add_vars("Qg", pu(&|g| g.qg), pu(&|g| g.qmin), pu(&|g| g.qmax))?;

    let cost_of: Vec<Option<&GenCost>> = costs
        .p
        .iter()
        .map(Some)
        .chain(costs.q.iter().map(|c| c.as_ref()))
        .collect();
    let ny = cost_of.iter().flatten().filter(|c| c.is_pwl()).count();
    if ny > 0 {
        om.add_vars(
            "y",
            vec![0.0; ny],
            vec![f64::NEG_INFINITY; ny],
            vec![f64::INFINITY; ny],
        )?;
    }
    add_user_vars(&mut om, mpc)?;

    // nonlinear constraints
    let il: Vec<usize> = mpc
        .branch
        .iter()
        .enumerate()
        .filter(|(_, br)| br.rate_a != 0.0 && br.rate_a < 1e10)
        .map(|(i, _)| i)
        .collect();
    let nl2 = il.len();
    om.add_nln_eq("Pmis", nb);
    om.add_nln_eq("Qmis", nb);
    om.add_nln_ineq("Sf", nl2);
    om.add_nln_ineq("St", nl2);

    // linear constraints
    let (apqh, ubpqh, apql, ubpql) = make_apq(base_mva, &mpc.gen)?;
    let (avl, lvl, uvl, _) = make_avl(&mpc.gen)?;
    let (aang, lang, uang, iang) = make_aang(nb, &mpc.branch, mpopt.opf.ignore_ang_lim);
    for (name, a, l, u) in [
        ("PQh", apqh, vec![f64::NEG_INFINITY; ubpqh.len()], ubpqh),
        ("PQl", apql, vec![f64::NEG_INFINITY; ubpql.len()], ubpql),
        ("vl", avl, lvl, uvl),
    ] {
        if a.rows() > 0 {
            om.add_lin_constraints(name, a, l, u, &["Pg", "Qg"])?;
        }
    }
    if aang.rows() > 0 {
        om.add_lin_constraints("ang", aang, lang, uang, &["Va"])?;
    }
    if ny > 0 {
        let (ay, by) = make_ay(base_mva, &cost_of);
        om.add_lin_constraints("ycon", ay, vec![f64::NEG_INFINITY; by.len()], by, &["Pg", "Qg", "y"])?;
    }
    add_user_constraints(&mut om, mpc, &["Va", "Vm", "Pg", "Qg", "y", "z"])?;

    let nx = om.nx();
    let range = |name: &str| om.var(name).map_or(0..0, |v| v.range());
    let user = match &mpc.user {
        Some(user) => UserCost::new(user, nx)?,
        None => None,
    };

    // callbacks
    let (y_bus, yf, yt) = make_ybus(base_mva, &mpc.bus, &mpc.branch)?;
    let branch: Vec<Branch> = il.iter().map(|&i| mpc.branch[i].clone()).collect();
    let f_bus: Vec<usize> = branch.iter().map(|br| br.from_bus).collect();
    let t_bus: Vec<usize> = branch.iter().map(|br| br.to_bus).collect();
    let problem = AcOpf {
        base_mva,
        bus: &mpc.bus,
        gen: &mpc.gen,
        yf: select(&yf, Some(&il), None),
        yt: select(&yt, Some(&il), None),
        cf: connection(&f_bus, nb),
        ct: connection(&t_bus, nb),
        flow_max: branch.iter().map(|br| (br.rate_a / base_mva).powi(2)).collect(),
        flow_lim: mpopt.opf.flow_lim,
        branch,
        y_bus,
        va: range("Va"),
        vm: range("Vm"),
        cost: AcCost {
            base_mva,
            pcost: costs.p.clone(),
            qcost: costs.q.clone(),
            pg: range("Pg"),
            qg: range("Qg"),
            y: range("y"),
            user,
            nx,
        },
    };

    // solve
    let va_ref = mpc.bus[refs[0]].va * PI / 180.0;
    let y0 = GenCosts::y0(cost_of.iter().flatten().cloned().filter(|c| c.is_pwl()));
    let (x0, xmin, xmax) = initial_point(&om, va_ref, y0);
    let (a, l, u) = om.linear_constraints();
    let mut opt = mpopt.opf.ips.clone();
    opt.cost_mult = mpopt.opf.cost_mult;

    let s = nlp(
        &problem,
        &x0,
        a.as_ref(),
        &l,
        &u,
        &xmin,
        &xmax,
        Some(&problem),
        Some(&problem),
        &opt,
        solver,
    )?;
    log_solution(&s);

    // update solution data
    let x = &s.x;
    let (va, vm) = (&x[range("Va")], &x[range("Vm")]);
    let (pg, qg) = (&x[range("Pg")], &x[range("Qg")]);
    let v = polar(vm, va);

    for (i, b) in mpc.bus.iter_mut().enumerate() {
        b.va = va[i] * 180.0 / PI;
        b.vm = vm[i];
    }
    for (i, g) in mpc.gen.iter_mut().enumerate() {
        g.pg = pg[i] * base_mva;
        g.qg = qg[i] * base_mva;
        g.vg = vm[g.bus];
    }
    let i_f = mul_vec(&yf, &v);
    let i_t = mul_vec(&yt, &v);
    for (i, br) in mpc.branch.iter_mut().enumerate() {
        clear_branch_results(br);
        let sf = v[br.from_bus] * i_f[i].conj() * base_mva;
        let st = v[br.to_bus] * i_t[i].conj() * base_mva;
        br.pf = sf.re;
        br.qf = sf.im;
        br.pt = st.re;
        br.qt = st.im;
    }

    // multipliers
    let lam = &s.lambda;
    if let (Some(pmis), Some(qmis)) = (om.nln_eq("Pmis"), om.nln_eq("Qmis")) {
        for (i, b) in mpc.bus.iter_mut().enumerate() {
            b.lam_p = lam.eqnonlin[pmis.i0 + i] / base_mva;
            b.lam_q = lam.eqnonlin[qmis.i0 + i] / base_mva;
        }
    }
    let vm_ix = range("Vm");
    for (i, b) in mpc.bus.iter_mut().enumerate() {
        b.mu_vmax = lam.upper[vm_ix.start + i];
        b.mu_vmin = lam.lower[vm_ix.start + i];
    }
    let (pg_ix, qg_ix) = (range("Pg"), range("Qg"));
    for (i, g) in mpc.gen.iter_mut().enumerate() {
        g.mu_pmax = lam.upper[pg_ix.start + i] / base_mva;
        g.mu_pmin = lam.lower[pg_ix.start + i] / base_mva;
        g.mu_qmax = lam.upper[qg_ix.start + i] / base_mva;
        g.mu_qmin = lam.lower[qg_ix.start + i] / base_mva;
    }
    // from the squared flow limit to u/MVA
    for (k, &i) in il.iter().enumerate() {
        let br = &mut mpc.branch[i];
        let scale = 2.0 * br.rate_a / base_mva / base_mva;
        br.mu_sf = lam.ineqnonlin[k] * scale;
        br.mu_st = lam.ineqnonlin[nl2 + k] * scale;
    }
    if let Some(ang) = om.lin("ang") {
        for (k, &i) in iang.iter().enumerate() {
            mpc.branch[i].mu_ang_min = lam.mu_l[ang.i0 + k] * PI / 180.0;
            mpc.branch[i].mu_ang_max = lam.mu_u[ang.i0 + k] * PI / 180.0;
        }
    }

    Ok(s)
}
