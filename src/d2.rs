//! Second derivatives of bus injections and branch flows.
//!
//! Each function returns the four blocks of the Hessian of a weighted sum
//! `lam' * F(V)` w.r.t. voltage angle (a) and magnitude (v). Column `i` of
//! block `ab` is the derivative w.r.t. `b_i` of `dF/da' * lam`.

use num_complex::Complex64;
use sprs::CsMat;

use crate::math::J;
use crate::sparse::{ctranspose, mul_vec, real, scale, spdiag, transpose, zeros};
use crate::traits::Conj;

/// Hessian blocks `[aa, av; va, vv]`.
pub struct Hessian<N> {
    pub aa: CsMat<N>,
    pub av: CsMat<N>,
    pub va: CsMat<N>,
    pub vv: CsMat<N>,
}

fn inv_abs(v: &[Complex64]) -> CsMat<Complex64> {
    spdiag(&v.iter().map(|v| Complex64::new(1.0 / v.norm(), 0.0)).collect::<Vec<_>>())
}

/// Computes 2nd derivatives of power injection w.r.t. voltage.
pub fn d2_sbus_d_v2(
    y_bus: &CsMat<Complex64>,
    v: &[Complex64],
    lam: &[Complex64],
) -> Hessian<Complex64> {
    let i_bus = mul_vec(y_bus, v);
    let diag_lam = spdiag(lam);
    let diag_v = spdiag(v);

    let a = spdiag(&lam.iter().zip(v).map(|(l, v)| l * v).collect::<Vec<_>>());
    let b = y_bus * &diag_v;
    let c = &a * &b.conj();
    let d = &ctranspose(y_bus) * &diag_v;
    let e = &diag_v.conj() * &(&(&d * &diag_lam) - &spdiag(&mul_vec(&d, lam)));
    let f = &c - &(&a * &spdiag(&i_bus.conj()));
    let g = inv_abs(v);

    let gaa = &e + &f;
    let gva = scale(&(&g * &(&e - &f)), J);
    let gav = transpose(&gva);
    let gvv = &(&g * &(&c + &transpose(&c))) * &g;

    Hessian {
        aa: gaa,
        av: gav,
        va: gva,
        vv: gvv,
    }
}

/// Computes 2nd derivatives of complex branch power flow w.r.t. voltage.
///
/// `c_br` is the branch-bus connection matrix for the relevant end and
/// `y_br` the matching admittance matrix (`Yf` or `Yt`).
pub fn d2_sbr_d_v2(
    c_br: &CsMat<Complex64>,
    y_br: &CsMat<Complex64>,
    v: &[Complex64],
    lam: &[Complex64],
) -> Hessian<Complex64> {
    let diag_lam = spdiag(lam);
    let diag_v = spdiag(v);

    let a = &(&ctranspose(y_br) * &diag_lam) * c_br;
    let b = &(&diag_v.conj() * &a) * &diag_v;
    let d = spdiag(
        &mul_vec(&a, v)
            .iter()
            .zip(v)
            .map(|(av, v)| av * v.conj())
            .collect::<Vec<_>>(),
    );
    let e = spdiag(
        &mul_vec(&transpose(&a), &v.to_vec().conj())
            .iter()
            .zip(v)
            .map(|(av, v)| av * v)
            .collect::<Vec<_>>(),
    );
    let bt = transpose(&b);
    let f = &b + &bt;
    let g = inv_abs(v);

    let haa = &(&f - &d) - &e;
    let hva = scale(&(&g * &(&(&(&b - &bt) - &d) + &e)), J);
    let hav = transpose(&hva);
    let hvv = &(&g * &f) * &g;

    Hessian {
        aa: haa,
        av: hav,
        va: hva,
        vv: hvv,
    }
}

/// Computes 2nd derivatives of complex branch current w.r.t. voltage.
pub fn d2_ibr_d_v2(y_br: &CsMat<Complex64>, v: &[Complex64], lam: &[Complex64]) -> Hessian<Complex64> {
    let nb = v.len();
    let ytl = mul_vec(&transpose(y_br), lam);

    let haa = spdiag(&ytl.iter().zip(v).map(|(y, v)| -y * v).collect::<Vec<_>>());
    let hva = scale(&(&haa * &inv_abs(v)), -J);

    Hessian {
        aa: haa,
        av: hva.clone(),
        va: hva,
        vv: zeros(nb, nb),
    }
}

/// Real Hessian of `lam' * |F|^2` from the complex second derivatives
/// of the flow `F` and its first derivatives.
fn d2_abs_squared(
    h: Hessian<Complex64>,
    df_dva: &CsMat<Complex64>,
    df_dvm: &CsMat<Complex64>,
    lam: &[f64],
) -> Hessian<f64> {
    let diag_lam = spdiag(&lam.iter().map(|&l| Complex64::new(l, 0.0)).collect::<Vec<_>>());
    let quad = |x: &CsMat<Complex64>, y: &CsMat<Complex64>| &(&transpose(x) * &diag_lam) * &y.conj();
    let twice_real = |a: &CsMat<Complex64>, b: CsMat<Complex64>| scale(&real(&(a + &b)), 2.0);

    Hessian {
        aa: twice_real(&h.aa, quad(df_dva, df_dva)),
        av: twice_real(&h.av, quad(df_dva, df_dvm)),
        va: twice_real(&h.va, quad(df_dvm, df_dva)),
        vv: twice_real(&h.vv, quad(df_dvm, df_dvm)),
    }
}

/// Computes 2nd derivatives of |complex power flow|^2 w.r.t. voltage.
pub fn d2_asbr_d_v2(
    dsbr_dva: &CsMat<Complex64>,
    dsbr_dvm: &CsMat<Complex64>,
    sbr: &[Complex64],
    c_br: &CsMat<Complex64>,
    y_br: &CsMat<Complex64>,
    v: &[Complex64],
    lam: &[f64],
) -> Hessian<f64> {
    let lam_s: Vec<Complex64> = sbr.iter().zip(lam).map(|(s, &l)| s.conj() * l).collect();
    let h = d2_sbr_d_v2(c_br, y_br, v, &lam_s);
    d2_abs_squared(h, dsbr_dva, dsbr_dvm, lam)
}

/// Computes 2nd derivatives of |complex current|^2 w.r.t. voltage.
pub fn d2_aibr_d_v2(
    dibr_dva: &CsMat<Complex64>,
    dibr_dvm: &CsMat<Complex64>,
    ibr: &[Complex64],
    y_br: &CsMat<Complex64>,
    v: &[Complex64],
    lam: &[f64],
) -> Hessian<f64> {
    let lam_i: Vec<Complex64> = ibr.iter().zip(lam).map(|(i, &l)| i.conj() * l).collect();
    let h = d2_ibr_d_v2(y_br, v, &lam_i);
    d2_abs_squared(h, dibr_dva, dibr_dvm, lam)
}

/// Computes 2nd derivatives of (real power flow)^2 w.r.t. voltage.
pub fn d2_apbr_d_v2(
    dsbr_dva: &CsMat<Complex64>,
    dsbr_dvm: &CsMat<Complex64>,
    sbr: &[Complex64],
    c_br: &CsMat<Complex64>,
    y_br: &CsMat<Complex64>,
    v: &[Complex64],
    lam: &[f64],
) -> Hessian<f64> {
    let lam_p: Vec<Complex64> = sbr
        .iter()
        .zip(lam)
        .map(|(s, &l)| Complex64::new(s.re * l, 0.0))
        .collect();
    let h = d2_sbr_d_v2(c_br, y_br, v, &lam_p);

    let diag_lam = spdiag(lam);
    let (dp_dva, dp_dvm) = (real(dsbr_dva), real(dsbr_dvm));
    let quad = |x: &CsMat<f64>, y: &CsMat<f64>| &(&transpose(x) * &diag_lam) * y;
    let twice = |a: &CsMat<Complex64>, b: CsMat<f64>| scale(&(&real(a) + &b), 2.0);

    Hessian {
        aa: twice(&h.aa, quad(&dp_dva, &dp_dva)),
        av: twice(&h.av, quad(&dp_dva, &dp_dvm)),
        va: twice(&h.va, quad(&dp_dvm, &dp_dva)),
        vv: twice(&h.vv, quad(&dp_dvm, &dp_dvm)),
    }
}
