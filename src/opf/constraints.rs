//! Linear constraint blocks of the OPF problem.

use std::f64::consts::PI;

use anyhow::Result;
use sprs::{CsMat, TriMat};

use crate::error::PowersError;
use crate::mpc::{Branch, Gen, GenCost};
use crate::sparse::zeros;

/// Constraints on the cost variables of piecewise linear costs.
///
/// `costs[i]` is the cost applied to column `i` of the generator output
/// block (`[Pg]` for DC, `[Pg, Qg]` for AC). Each piecewise linear cost
/// adds one `y` variable and, for every segment `k` with slope `m`, the
/// row `m * base * x_i - y <= m * p_k - c_k`. The returned matrix spans
/// the output block followed by the `y` variables.
pub fn make_ay(base_mva: f64, costs: &[Option<&GenCost>]) -> (CsMat<f64>, Vec<f64>) {
    let nc = costs.len();
    let ipwl: Vec<(usize, &GenCost)> = costs
        .iter()
        .enumerate()
        .filter_map(|(i, c)| (*c).filter(|c| c.is_pwl()).map(|c| (i, c)))
        .collect();
    let ny = ipwl.len();
    let nrows: usize = ipwl.iter().map(|(_, c)| c.n_cost() - 1).sum();

    let mut ay = TriMat::with_capacity((nrows, nc + ny), 2 * nrows);
    let mut by = Vec::with_capacity(nrows);
    let mut k = 0;
    for (j, (i, cost)) in ipwl.iter().enumerate() {
        for seg in cost.points().windows(2) {
            let ((p1, c1), (p2, c2)) = (seg[0], seg[1]);
            let m = (c2 - c1) / (p2 - p1);
            ay.add_triplet(k, *i, m * base_mva);
            ay.add_triplet(k, nc + j, -1.0);
            by.push(m * p1 - c1);
            k += 1;
        }
    }
    (ay.to_csr(), by)
}

/// Generators whose PQ capability curve cuts into the upper and lower
/// box constraints respectively.
fn has_pq_cap(gen: &[Gen]) -> Result<(Vec<usize>, Vec<usize>), PowersError> {
    let mut upper = Vec::new();
    let mut lower = Vec::new();
    for (i, g) in gen.iter().enumerate() {
        if g.pc1 == g.pc2 {
            continue;
        }
        if g.pc1 > g.pc2 {
            return Err(PowersError::InvalidGenData {
                gen: i,
                reason: "capability curve has Pc1 > Pc2".to_string(),
            });
        }
        let at_pmax = |q1: f64, q2: f64| q1 + (g.pmax - g.pc1) * (q2 - q1) / (g.pc2 - g.pc1);
        if at_pmax(g.qc1max, g.qc2max) < g.qmax {
            upper.push(i);
        }
        if at_pmax(g.qc1min, g.qc2min) > g.qmin {
            lower.push(i);
        }
    }
    Ok((upper, lower))
}

/// Linear PQ capability constraints `A * [Pg; Qg] <= u`, returned as
/// `(Apqh, ubpqh, Apql, ubpql)` for the upper and lower curves.
///
/// Rows are normalized so that the multipliers are in u/p.u.
#[allow(clippy::type_complexity)]
pub fn make_apq(
    base_mva: f64,
    gen: &[Gen],
) -> Result<(CsMat<f64>, Vec<f64>, CsMat<f64>, Vec<f64>), PowersError> {
    let ng = gen.len();
    let (ipqh, ipql) = has_pq_cap(gen)?;

    let build = |ix: &[usize], row: &dyn Fn(&Gen) -> (f64, f64, f64)| {
        let mut a = TriMat::with_capacity((ix.len(), 2 * ng), 2 * ix.len());
        let mut ub = Vec::with_capacity(ix.len());
        for (k, &i) in ix.iter().enumerate() {
            let (dp, dq, b) = row(&gen[i]);
            let norm = dp.hypot(dq);
            a.add_triplet(k, i, dp / norm);
            a.add_triplet(k, ng + i, dq / norm);
            ub.push(b / norm / base_mva);
        }
        (a.to_csr(), ub)
    };

    // line through (Pc1, Qc1max) and (Pc2, Qc2max)
    let (apqh, ubpqh) = build(&ipqh, &|g: &Gen| {
        let (dp, dq) = (g.qc1max - g.qc2max, g.pc2 - g.pc1);
        (dp, dq, dp * g.pc1 + dq * g.qc1max)
    });
    // line through (Pc1, Qc1min) and (Pc2, Qc2min)
    let (apql, ubpql) = build(&ipql, &|g: &Gen| {
        let (dp, dq) = (g.qc2min - g.qc1min, g.pc1 - g.pc2);
        (dp, dq, dp * g.pc1 + dq * g.qc1min)
    });

    Ok((apqh, ubpqh, apql, ubpql))
}

/// Branch voltage angle difference limits `l <= Va_f - Va_t <= u`.
///
/// A zero limit, or one at or beyond +/-360 degrees, is unconstrained.
/// Returns `(Aang, lang, uang, iang)` where `iang` are the limited
/// branches.
pub fn make_aang(
    nb: usize,
    branch: &[Branch],
    ignore_ang_lim: bool,
) -> (CsMat<f64>, Vec<f64>, Vec<f64>, Vec<usize>) {
    if ignore_ang_lim {
        return (zeros(0, nb), Vec::new(), Vec::new(), Vec::new());
    }
    let iang: Vec<usize> = branch
        .iter()
        .enumerate()
        .filter(|(_, br)| {
            (br.ang_min != 0.0 && br.ang_min > -360.0) || (br.ang_max != 0.0 && br.ang_max < 360.0)
        })
        .map(|(i, _)| i)
        .collect();

    let nang = iang.len();
    let mut a = TriMat::with_capacity((nang, nb), 2 * nang);
    let mut l = vec![f64::NEG_INFINITY; nang];
    let mut u = vec![f64::INFINITY; nang];
    for (k, &i) in iang.iter().enumerate() {
        let br = &branch[i];
        a.add_triplet(k, br.from_bus, 1.0);
        a.add_triplet(k, br.to_bus, -1.0);
        if br.ang_min != 0.0 {
            l[k] = br.ang_min * PI / 180.0;
        }
        if br.ang_max != 0.0 {
            u[k] = br.ang_max * PI / 180.0;
        }
    }
    (a.to_csr(), l, u, iang)
}

/// Constant power factor constraints for dispatchable loads,
/// `Avl * [Pg; Qg] = 0`.
///
/// The power factor is given by `Pmin` and whichever of `Qmin`/`Qmax` is
/// non-zero. Returns `(Avl, lvl, uvl, ivl)`.
pub fn make_avl(
    gen: &[Gen],
) -> Result<(CsMat<f64>, Vec<f64>, Vec<f64>, Vec<usize>), PowersError> {
    let ng = gen.len();
    let ivl: Vec<usize> = gen
        .iter()
        .enumerate()
        .filter(|(_, g)| g.is_load() && (g.qmin != 0.0 || g.qmax != 0.0))
        .map(|(i, _)| i)
        .collect();

    let nvl = ivl.len();
    let mut a = TriMat::with_capacity((nvl, 2 * ng), 2 * nvl);
    for (k, &i) in ivl.iter().enumerate() {
        let g = &gen[i];
        if g.qmin != 0.0 && g.qmax != 0.0 {
            return Err(PowersError::InvalidGenData {
                gen: i,
                reason: "either Qmin or Qmax must be zero for a dispatchable load".to_string(),
            });
        }
        let qlim = if g.qmin == 0.0 { g.qmax } else { g.qmin };
        let theta = qlim.atan2(g.pmin);
        a.add_triplet(k, i, theta.sin());
        a.add_triplet(k, ng + i, -theta.cos());
    }
    Ok((a.to_csr(), vec![0.0; nvl], vec![0.0; nvl], ivl))
}
