use anyhow::Result;
use num_complex::Complex64;
use sprs::CsMat;
use std::f64::consts::PI;
use std::time::{Duration, Instant};

use crate::bus_types::bus_types;
use crate::dc::{dc_pf, make_b_dc};
use crate::ext_to_int::ext_to_int;
use crate::int_to_ext::int_to_ext;
use crate::jac::initial_voltage;
use crate::math::EPS;
use crate::mpc::{Branch, Bus, BusType, Gen, MPC};
use crate::error::PowersError;
use crate::fd::{fdpf, make_b};
use crate::gauss::gausspf;
use crate::mpopt::{Alg, GenQLimits, MPOpt};
use crate::newton::{newtonpf, LogProgress};
use crate::sbus::make_sbus;
use crate::sparse::{mul_vec, select};
use crate::traits::LinearSolver;
use crate::ybus::make_ybus;

/// Result of `runpf`.
#[derive(Debug, Clone)]
pub struct PfResult {
    /// Solved case in external numbering.
    pub case: MPC,
    pub success: bool,
    /// Total number of iterations over all solves.
    pub iterations: usize,
    /// Elapsed time.
    pub et: Duration,
}

/// Runs an AC or DC power flow. The AC algorithm is selected by
/// `mpopt.pf.algorithm`.
///
/// The input case is converted to internal numbering, solved and
/// converted back. Results of out-of-service generators and branches
/// are zeroed. Failure to converge is reported through
/// `PfResult::success`.
pub fn runpf(casedata: &MPC, mpopt: &MPOpt, linsol: &dyn LinearSolver) -> Result<PfResult> {
    // convert to internal indexing
    let (mpc, order) = ext_to_int(casedata)?;
    let base_mva = mpc.base_mva;
    let (mut bus, mut gen, mut branch) = (mpc.bus, mpc.gen, mpc.branch);

    let t0 = Instant::now();
    let (success, iterations) = if bus.is_empty() {
        log::info!("Power flow not valid: case contains no connected buses");
        (false, 0)
    } else {
        // get bus index lists of each type of bus
        let (ref_, pv, pq) = bus_types(&bus, &gen)?;

        if mpopt.dc {
            log::info!(" -- DC Power Flow");
            let success = dc_solve(
                base_mva,
                &mut bus,
                &mut gen,
                &mut branch,
                (&ref_[..], &pv[..], &pq[..]),
                linsol,
            )?;
            (success, 1)
        } else {
            let name = match mpopt.pf.algorithm {
                Alg::NR => "Newton",
                Alg::FDXB => "fast-decoupled, XB",
                Alg::FDBX => "fast-decoupled, BX",
                Alg::GS => "Gauss-Seidel",
            };
            log::info!(" -- AC Power Flow ({})", name);
            ac_solve(
                base_mva,
                &mut bus,
                &mut gen,
                &mut branch,
                (ref_, pv, pq),
                linsol,
                mpopt,
            )?
        }
    };
    let et = t0.elapsed();

    if success {
        log::info!("Converged in {:.2} seconds", et.as_secs_f64());
    } else {
        log::info!("Did not converge ({:.2} seconds)", et.as_secs_f64());
    }

    // convert back to original bus numbering
    let internal = MPC {
        base_mva,
        bus,
        gen,
        branch,
        user: mpc.user,
    };
    let mut case = int_to_ext(&internal, &order)?;

    // zero out result fields of out-of-service gens & branches
    for &i in &order.gen.off {
        case.gen[i].pg = 0.0;
        case.gen[i].qg = 0.0;
    }
    for &i in &order.branch.off {
        let br = &mut case.branch[i];
        br.pf = 0.0;
        br.qf = 0.0;
        br.pt = 0.0;
        br.qt = 0.0;
    }

    Ok(PfResult {
        case,
        success,
        iterations,
        et,
    })
}

type BusLists<'a> = (&'a [usize], &'a [usize], &'a [usize]);

fn dc_solve(
    base_mva: f64,
    bus: &mut [Bus],
    gen: &mut [Gen],
    branch: &mut [Branch],
    (ref_, pv, pq): BusLists,
    linsol: &dyn LinearSolver,
) -> Result<bool> {
    // initial state
    let va0: Vec<f64> = bus.iter().map(|b| b.va * PI / 180.0).collect();

    // build B matrices and phase shift injections
    let (b_mat, b_f, pbusinj, pfinj) = make_b_dc(bus, branch)?;

    // compute complex bus power injections (generation - load)
    // adjusted for phase shifters and real shunts
    let s_bus = make_sbus(base_mva, bus, gen, None);
    let p_bus: Vec<f64> = bus
        .iter()
        .enumerate()
        .map(|(i, b)| s_bus[i].re - pbusinj[i] - b.gs / base_mva)
        .collect();

    let (va, success) = dc_pf(&b_mat, &p_bus, &va0, ref_, pv, pq, linsol)?;

    // update data matrices with solution
    let p_f = mul_vec(&b_f, &va);
    for (i, br) in branch.iter_mut().enumerate() {
        br.pf = (p_f[i] + pfinj[i]) * base_mva;
        br.pt = -br.pf;
        br.qf = 0.0;
        br.qt = 0.0;
    }
    for (b, va) in bus.iter_mut().zip(&va) {
        b.vm = 1.0;
        b.va = va * 180.0 / PI;
    }

    // update Pg for slack generator (1st gen at ref bus)
    // (note: other gens at ref bus are accounted for in Pbus)
    //      Pg = Pinj + Pload + Gs
    //      newPg = oldPg + newPinj - oldPinj
    let p_ref = mul_vec(&select(&b_mat, Some(ref_), None), &va);
    for (&r, p_ref) in ref_.iter().zip(p_ref) {
        if let Some(g) = gen.iter_mut().find(|g| g.is_on() && g.bus == r) {
            g.pg += (p_ref - p_bus[r]) * base_mva;
        }
    }

    Ok(success)
}

fn ac_solve(
    base_mva: f64,
    bus: &mut Vec<Bus>,
    gen: &mut Vec<Gen>,
    branch: &mut Vec<Branch>,
    (mut ref_, mut pv, mut pq): (Vec<usize>, Vec<usize>, Vec<usize>),
    linsol: &dyn LinearSolver,
    mpopt: &MPOpt,
) -> Result<(bool, usize)> {
    let qlim = mpopt.pf.enforce_q_limits != GenQLimits::IgnoreLimits;

    // initial state
    let mut v0 = initial_voltage(bus, gen);

    // save index and angle of original reference bus
    let ref0 = ref_[0];
    let va_ref0 = bus[ref0].va;
    let mut limited: Vec<usize> = Vec::new(); // indices of gens @ Q lims
    let mut fixed_qg = vec![0.0; gen.len()]; // Qg of gens at Q limits

    // build admittance matrices
    let (y_bus, y_f, y_t) = make_ybus(base_mva, bus, branch)?;

    let mut success;
    let mut iterations = 0;
    loop {
        // compute complex bus power injections (generation - load)
        let s_bus = make_sbus(base_mva, bus, gen, None);

        // run the power flow
        let alg = mpopt.pf.algorithm;
        let (v, converged, its) = match alg {
            Alg::NR => {
                let nr = newtonpf(&y_bus, &s_bus, &v0, &pv, &pq, linsol, mpopt, Some(&LogProgress))?;
                let converged = nr.converged();
                (nr.v, converged, nr.iterations)
            }
            Alg::FDXB | Alg::FDBX => {
                let (b_p, b_pp) = make_b(base_mva, bus, branch, alg)?;
                fdpf(&y_bus, &s_bus, &v0, &b_p, &b_pp, &pv, &pq, linsol, mpopt, Some(&LogProgress))?
            }
            Alg::GS => gausspf(&y_bus, &s_bus, &v0, &pv, &pq, mpopt, Some(&LogProgress))?,
        };
        success = converged;
        iterations += its;

        // update data matrices with solution
        let (b, g, br) = pfsoln(base_mva, bus, gen, branch, &y_bus, &y_f, &y_t, &v, &ref_);
        *bus = b;
        *gen = g;
        *branch = br;

        if !(success && qlim) {
            break; // once is enough
        }

        // find gens with violated Q constraints
        let mut mx: Vec<usize> = (0..gen.len())
            .filter(|&i| gen[i].is_on() && gen[i].qg > gen[i].qmax)
            .collect();
        let mut mn: Vec<usize> = (0..gen.len())
            .filter(|&i| gen[i].is_on() && gen[i].qg < gen[i].qmin)
            .collect();

        if mx.is_empty() && mn.is_empty() {
            break; // no more generator Q limits violated
        }

        // first check for INFEASIBILITY
        let remaining: Vec<usize> = (0..gen.len())
            .filter(|&i| gen[i].is_on() && matches!(bus[gen[i].bus].bus_type, BusType::PV | BusType::REF))
            .collect();
        if remaining.iter().all(|i| mx.contains(i) || mn.contains(i)) {
            log::info!(
                "All {} remaining gens exceed their Q limits: INFEASIBLE PROBLEM",
                remaining.len()
            );
            success = false;
            break;
        }

        // one at a time?
        if mpopt.pf.enforce_q_limits == GenQLimits::OneAtATime {
            // find largest violation
            let worst = mx
                .iter()
                .map(|&i| (i, gen[i].qg - gen[i].qmax, true))
                .chain(mn.iter().map(|&i| (i, gen[i].qmin - gen[i].qg, false)))
                .fold(None, |acc: Option<(usize, f64, bool)>, c| match acc {
                    Some(a) if a.1 >= c.1 => Some(a),
                    _ => Some(c),
                });
            if let Some((k, _, upper)) = worst {
                if upper {
                    mx = vec![k];
                    mn.clear();
                } else {
                    mx.clear();
                    mn = vec![k];
                }
            }
        }

        // save corresponding limit values
        for &i in &mx {
            fixed_qg[i] = gen[i].qmax;
            log::info!("Gen {} at upper Q limit, converting to PQ bus", i);
        }
        for &i in &mn {
            fixed_qg[i] = gen[i].qmin;
            log::info!("Gen {} at lower Q limit, converting to PQ bus", i);
        }
        let newly = [mx, mn].concat();

        // convert to PQ bus
        for &i in &newly {
            let g = &mut gen[i];
            g.qg = fixed_qg[i];
            g.status = false; // temporarily turn off gen,
            let b = &mut bus[g.bus]; // (adjusting load accordingly)
            b.pd -= g.pg;
            b.qd -= g.qg;
            b.bus_type = BusType::PQ;
        }

        limited.extend(newly);

        // update bus index lists of each type of bus
        let ref_prev = ref_[0];
        (ref_, pv, pq) = match bus_types(bus, gen) {
            Ok(types) => types,
            Err(PowersError::NoReferenceBus) => {
                log::info!("No generator left to regulate voltage: INFEASIBLE PROBLEM");
                success = false;
                break;
            }
            Err(err) => return Err(err.into()),
        };
        if ref_[0] != ref_prev {
            log::info!("Bus {} is new slack bus", ref_[0]);
        }

        v0 = v;
    }

    if !limited.is_empty() {
        // restore injections from limited gens
        for &i in &limited {
            let g = &mut gen[i];
            g.qg = fixed_qg[i];
            let b = &mut bus[g.bus];
            b.pd += g.pg;
            b.qd += g.qg;
            g.status = true;
        }

        // adjust voltage angles to make original ref bus correct
        if ref_[0] != ref0 {
            let shift = va_ref0 - bus[ref0].va;
            bus.iter_mut().for_each(|b| b.va += shift);
        }
    }

    Ok((success, iterations))
}

/// Updates bus, gen and branch data with the power flow solution.
///
/// Bus voltages are set from `v`. Reactive power output is computed
/// for all on-line generators and divided between the generators at
/// each bus in proportion to their reactive ranges. Buses with a zero
/// total range split it equally. The first generator at each reference
/// bus takes up the slack active power. Branch flows are computed from
/// the branch admittance matrices.
#[allow(clippy::too_many_arguments)]
pub fn pfsoln(
    base_mva: f64,
    bus0: &[Bus],
    gen0: &[Gen],
    branch0: &[Branch],
    y_bus: &CsMat<Complex64>,
    y_f: &CsMat<Complex64>,
    y_t: &CsMat<Complex64>,
    v: &[Complex64],
    ref_: &[usize],
) -> (Vec<Bus>, Vec<Gen>, Vec<Branch>) {
    let (mut bus, mut gen, mut branch) = (bus0.to_vec(), gen0.to_vec(), branch0.to_vec());
    let nb = bus.len();

    // update bus voltages
    for (b, v) in bus.iter_mut().zip(v) {
        b.vm = v.norm();
        b.va = v.arg() * 180.0 / PI;
    }

    // compute total injected bus powers
    let i_bus = mul_vec(y_bus, v);
    let s_inj = |k: usize| v[k] * i_bus[k].conj();

    // update Qg for all gens
    let on: Vec<usize> = (0..gen.len()).filter(|&i| gen[i].is_on()).collect();
    gen.iter_mut().for_each(|g| g.qg = 0.0);
    for &i in &on {
        let k = gen[i].bus;
        gen[i].qg = s_inj(k).im * base_mva + bus[k].qd; // inj Q + local Qd
    }

    // ...at this point any buses with more than one generator will have
    // the total Q dispatch for the bus assigned to each generator. This
    // must be split between them. We do it first equally, then in proportion
    // to the reactive range of the generator.
    let mut ngb = vec![0usize; nb];
    on.iter().for_each(|&i| ngb[gen[i].bus] += 1);
    for &i in &on {
        gen[i].qg /= ngb[gen[i].bus] as f64;
    }

    // finite proxy for infinite limits, sum over all gens at the bus of
    // abs(Qg) plus any finite Q limits
    let mut m = vec![0.0; nb];
    for &i in &on {
        let g = &gen[i];
        m[g.bus] += g.qg.abs()
            + [g.qmax, g.qmin]
                .iter()
                .filter(|q| q.is_finite())
                .map(|q| q.abs())
                .sum::<f64>();
    }
    let proxy = |q: f64, m: f64| {
        if q.is_infinite() {
            m.copysign(q)
        } else {
            q
        }
    };
    let limits: Vec<(f64, f64)> = on
        .iter()
        .map(|&i| {
            let g = &gen[i];
            (proxy(g.qmin, m[g.bus]), proxy(g.qmax, m[g.bus]))
        })
        .collect();

    let mut qg_tot = vec![0.0; nb];
    let mut qg_min = vec![0.0; nb];
    let mut qg_max = vec![0.0; nb];
    for (&i, &(qmin, qmax)) in on.iter().zip(&limits) {
        let k = gen[i].bus;
        qg_tot[k] += gen[i].qg;
        qg_min[k] += qmin;
        qg_max[k] += qmax;
    }

    // divide proportionally, gens at buses with zero Qg range keep
    // the equal share
    for (&i, &(qmin, qmax)) in on.iter().zip(&limits) {
        let k = gen[i].bus;
        if qg_min[k] == qg_max[k] {
            continue;
        }
        let share = (qg_tot[k] - qg_min[k]) / (qg_max[k] - qg_min[k] + EPS); // avoid div by 0
        gen[i].qg = qmin + share * (qmax - qmin);
    }

    // update Pg for slack gens
    for &r in ref_ {
        let refgen: Vec<usize> = on.iter().copied().filter(|&i| gen[i].bus == r).collect();
        if let Some((&first, others)) = refgen.split_first() {
            let pg_o: f64 = others.iter().map(|&i| gen[i].pg).sum();
            // inj P + local Pd, less what is generated by other gens at this bus
            gen[first].pg = s_inj(r).re * base_mva + bus[r].pd - pg_o;
        }
    }

    // update/compute branch power flows
    let i_f = mul_vec(y_f, v);
    let i_t = mul_vec(y_t, v);
    for (l, br) in branch.iter_mut().enumerate() {
        if br.is_on() {
            let s_f = v[br.from_bus] * i_f[l].conj() * base_mva; // complex power at "from" bus
            let s_t = v[br.to_bus] * i_t[l].conj() * base_mva; // complex power injected at "to" bus
            br.pf = s_f.re;
            br.qf = s_f.im;
            br.pt = s_t.re;
            br.qt = s_t.im;
        } else {
            br.pf = 0.0;
            br.qf = 0.0;
            br.pt = 0.0;
            br.qt = 0.0;
        }
    }

    (bus, gen, branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{case2, case9};
    use crate::lu::SparseLU;
    use anyhow::Result;

    fn assert_near(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() < tol,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[test]
    fn case9_ac() -> Result<()> {
        let res = runpf(&case9(), &MPOpt::default(), &SparseLU)?;
        assert!(res.success);
        assert!(res.iterations > 0 && res.iterations <= 10);

        let gen = &res.case.gen;
        assert_near(gen[0].pg, 71.95, 0.01);
        assert_near(gen[0].qg, 24.07, 0.01);
        assert_near(gen[1].pg, 163.0, 1e-9);
        assert_near(gen[1].qg, 14.46, 0.01);
        assert_near(gen[2].qg, -3.65, 0.01);

        // external numbering is kept
        assert_eq!(res.case.bus[4].i, 5);
        assert_near(res.case.bus[0].va, 0.0, 1e-12);

        // total losses are positive and flows balance at bus 4
        let br = &res.case.branch;
        assert!(br.iter().all(|br| br.pf + br.pt >= -1e-9));
        let injection = -br[0].pt - br[1].pf - br[8].pt;
        assert_near(injection, 0.0, 1e-6);
        Ok(())
    }

    /// Case9 with the bus 1 generator replaced by one generator per
    /// `(qmin, qmax)` pair.
    fn split_case(limits: &[(f64, f64)]) -> MPC {
        let mut mpc = case9();
        let g0 = mpc.gen.remove(0);
        for &(qmin, qmax) in limits.iter().rev() {
            let mut g = g0.clone();
            g.qmin = qmin;
            g.qmax = qmax;
            mpc.gen.insert(0, g);
        }
        mpc
    }

    #[test]
    fn reactive_power_split() -> Result<()> {
        let cases: &[(&[(f64, f64)], &[f64])] = &[
            (&[(20.0, 20.0)], &[24.07]),
            (&[(10.0, 10.0), (0.0, 50.0)], &[10.0, 14.07]),
            (&[(10.0, 10.0), (-50.0, -50.0)], &[12.03, 12.03]),
            (&[(0.0, 50.0), (0.0, 100.0)], &[8.02, 16.05]),
            (&[(-50.0, 0.0), (50.0, 150.0)], &[-41.98, 66.05]),
        ];
        for (limits, expected) in cases {
            let res = runpf(&split_case(limits), &MPOpt::default(), &SparseLU)?;
            assert!(res.success);
            for (g, &q) in res.case.gen.iter().zip(expected.iter()) {
                assert_near(g.qg, q, 0.01);
            }
        }
        Ok(())
    }

    #[test]
    fn slack_shared_between_gens() -> Result<()> {
        let mut mpc = split_case(&[(-300.0, 300.0), (-300.0, 300.0)]);
        mpc.gen[1].pg = 30.0;
        let res = runpf(&mpc, &MPOpt::default(), &SparseLU)?;
        assert_near(res.case.gen[0].pg + res.case.gen[1].pg, 71.95, 0.01);
        assert_near(res.case.gen[1].pg, 30.0, 1e-9);
        Ok(())
    }

    #[test]
    fn dc_matches_lossless_ac() -> Result<()> {
        let (pd, x) = (1.0, 0.1);
        let p = pd / 100.0;
        let mpc = case2(pd, x);

        let dc = runpf(
            &mpc,
            &MPOpt {
                dc: true,
                ..Default::default()
            },
            &SparseLU,
        )?;
        assert!(dc.success);
        let th_dc = -dc.case.bus[1].va.to_radians();
        assert_near(th_dc, p * x, 1e-12);
        assert_near(dc.case.branch[0].pf, pd, 1e-9);
        assert_near(dc.case.branch[0].pt, -pd, 1e-9);
        assert_near(dc.case.gen[0].pg, pd, 1e-9);

        let ac = runpf(&mpc, &MPOpt::default(), &SparseLU)?;
        assert!(ac.success);
        let th_ac = -ac.case.bus[1].va.to_radians();
        // zero reactive load, so V2 = cos(th) and P = sin(2 th) / 2x
        assert_near((2.0 * th_ac).sin() / (2.0 * x), p, 1e-6);
        assert_near(ac.case.bus[1].vm, th_ac.cos(), 1e-6);

        assert_near(th_ac, th_dc, 1e-6);
        Ok(())
    }

    #[test]
    fn dc_case9() -> Result<()> {
        let mpopt = MPOpt {
            dc: true,
            ..Default::default()
        };
        let res = runpf(&case9(), &mpopt, &SparseLU)?;
        assert!(res.success);
        assert_eq!(res.iterations, 1);

        // lossless, so generation equals load
        let pg: f64 = res.case.gen.iter().map(|g| g.pg).sum();
        assert_near(pg, 315.0, 1e-6);
        assert!(res.case.bus.iter().all(|b| b.vm == 1.0));
        Ok(())
    }

    #[test]
    fn islands() -> Result<()> {
        let mut mpc = case9();
        let other = case9();
        mpc.bus.extend(other.bus.into_iter().map(|b| Bus { i: b.i + 10, ..b }));
        mpc.gen.extend(other.gen.into_iter().map(|g| Gen { bus: g.bus + 10, ..g }));
        mpc.branch.extend(other.branch.into_iter().map(|br| Branch {
            from_bus: br.from_bus + 10,
            to_bus: br.to_bus + 10,
            ..br
        }));

        let res = runpf(&mpc, &MPOpt::default(), &SparseLU)?;
        assert!(res.success);
        for k in 0..9 {
            let (a, b) = (&res.case.bus[k], &res.case.bus[k + 9]);
            assert_near(a.va, b.va, 1e-9);
            assert_near(a.vm, b.vm, 1e-9);
        }
        Ok(())
    }

    #[test]
    fn out_of_service_zeroed() -> Result<()> {
        let mut mpc = case9();
        mpc.branch[2].status = false;
        mpc.branch[2].pf = 5.0;
        let res = runpf(&mpc, &MPOpt::default(), &SparseLU)?;
        assert!(res.success);
        assert_eq!(res.case.branch[2].pf, 0.0);
        assert_eq!(res.case.branch.len(), 9);
        Ok(())
    }

    fn qlim_opt(q: GenQLimits) -> MPOpt {
        let mut mpopt = MPOpt::default();
        mpopt.pf.enforce_q_limits = q;
        mpopt
    }

    #[test]
    fn q_limits_enforced() -> Result<()> {
        let mut mpc = case9();
        mpc.gen[1].qmax = 10.0;

        let res = runpf(&mpc, &qlim_opt(GenQLimits::Simultaneous), &SparseLU)?;
        assert!(res.success);
        assert_eq!(res.case.gen[1].qg, 10.0);
        assert!(res.case.gen[1].status);
        assert_eq!(res.case.bus[1].bus_type, BusType::PQ);
        assert!(res.case.bus[1].vm < 1.0);

        // load restored
        assert_eq!(res.case.bus[1].pd, 0.0);
        assert_eq!(res.case.bus[1].qd, 0.0);
        Ok(())
    }

    #[test]
    fn q_limits_keep_original_reference_angle() -> Result<()> {
        let mut mpc = case9();
        mpc.gen[0].qmax = 20.0;

        let res = runpf(&mpc, &qlim_opt(GenQLimits::OneAtATime), &SparseLU)?;
        assert!(res.success);
        assert_eq!(res.case.gen[0].qg, 20.0);
        assert_near(res.case.bus[0].va, 0.0, 1e-9);
        assert!(res.iterations > 0);
        Ok(())
    }

    #[test]
    fn q_limits_infeasible() -> Result<()> {
        let mut mpc = case2(50.0, 0.1);
        mpc.gen[0].qmax = -1.0;

        let res = runpf(&mpc, &qlim_opt(GenQLimits::Simultaneous), &SparseLU)?;
        assert!(!res.success);
        Ok(())
    }

    #[test]
    fn q_limits_all_gens_violated() -> Result<()> {
        let mut mpc = case9();
        for g in mpc.gen.iter_mut() {
            g.qmax = -50.0;
            g.qmin = -60.0;
        }

        for q in [GenQLimits::Simultaneous, GenQLimits::OneAtATime] {
            let res = runpf(&mpc, &qlim_opt(q), &SparseLU)?;
            assert!(!res.success, "{:?}", q);
            // no gen was converted
            assert!(res.case.gen.iter().all(|g| g.status));
            assert_eq!(res.case.bus[0].bus_type, BusType::REF);
        }
        Ok(())
    }

    #[test]
    fn alternative_algorithms_match_newton() -> Result<()> {
        let mpc = case9();
        let nr = runpf(&mpc, &MPOpt::default(), &SparseLU)?;
        assert!(nr.success);

        for alg in [Alg::FDXB, Alg::FDBX, Alg::GS] {
            let mut mpopt = MPOpt::default();
            mpopt.pf.algorithm = alg;
            let res = runpf(&mpc, &mpopt, &SparseLU)?;
            assert!(res.success, "{:?}", alg);

            for (a, b) in res.case.bus.iter().zip(&nr.case.bus) {
                assert_near(a.vm, b.vm, 1e-6);
                assert_near(a.va, b.va, 1e-4);
            }
            for (a, b) in res.case.gen.iter().zip(&nr.case.gen) {
                assert_near(a.pg, b.pg, 1e-4);
                assert_near(a.qg, b.qg, 1e-4);
            }
            assert_near(res.case.gen[0].pg, 71.95, 0.01);
        }
        Ok(())
    }

    #[test]
    fn q_limits_with_fast_decoupled() -> Result<()> {
        let mut mpc = case9();
        mpc.gen[1].qmax = 10.0;

        let mut mpopt = qlim_opt(GenQLimits::Simultaneous);
        mpopt.pf.algorithm = Alg::FDXB;
        let res = runpf(&mpc, &mpopt, &SparseLU)?;
        assert!(res.success);
        assert_eq!(res.case.gen[1].qg, 10.0);
        assert_eq!(res.case.bus[1].bus_type, BusType::PQ);
        Ok(())
    }
}
