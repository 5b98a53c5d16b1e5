use num_complex::Complex64;
use sprs::CsMat;

use crate::math::J;
use crate::mpc::Branch;
use crate::sparse::{imag, mul_vec, real, scale, sparse, spdiag};
use crate::traits::Conj;

/// Partial derivatives of a branch quantity (complex power or current)
/// at both ends of each branch, with the quantity itself.
pub struct BranchDerivatives {
    pub df_dva: CsMat<Complex64>,
    pub df_dvm: CsMat<Complex64>,
    pub dt_dva: CsMat<Complex64>,
    pub dt_dvm: CsMat<Complex64>,
    /// Value at the "from" end.
    pub f: Vec<Complex64>,
    /// Value at the "to" end.
    pub t: Vec<Complex64>,
}

/// Computes partial derivatives of branch power flows w.r.t. voltage
/// angle and magnitude.
///
/// `yf` and `yt` may hold a subset of the branch rows, in which case
/// `branch` must be the matching subset.
pub fn d_sbr_d_v(
    branch: &[Branch],
    yf: &CsMat<Complex64>,
    yt: &CsMat<Complex64>,
    v: &[Complex64],
) -> BranchDerivatives {
    let nl = branch.len();
    let nb = v.len();
    let f: Vec<usize> = branch.iter().map(|br| br.from_bus).collect();
    let t: Vec<usize> = branch.iter().map(|br| br.to_bus).collect();
    let il: Vec<usize> = (0..nl).collect();

    let i_f = mul_vec(yf, v);
    let i_t = mul_vec(yt, v);

    let v_norm: Vec<Complex64> = v.iter().map(|v| *v / v.norm()).collect();
    let diag_v = spdiag(v);
    let diag_v_norm = spdiag(&v_norm);

    let diag_if = spdiag(&i_f);
    let diag_it = spdiag(&i_t);
    let diag_vf = spdiag(&f.iter().map(|&i| v[i]).collect::<Vec<_>>());
    let diag_vt = spdiag(&t.iter().map(|&i| v[i]).collect::<Vec<_>>());

    let sel = |ix: &[usize], x: &[Complex64]| {
        sparse(
            (nl, nb),
            &il,
            ix,
            &ix.iter().map(|&i| x[i]).collect::<Vec<_>>(),
        )
    };

    // dSf/dVa = 1j * (conj(diagIf) * sparse(1:nl, f, V(f)) - diagVf * conj(Yf * diagV))
    // dSf/dVm = diagVf * conj(Yf * diagVnorm) + conj(diagIf) * sparse(1:nl, f, Vnorm(f))
    let df_dva = scale(
        &(&(&diag_if.conj() * &sel(&f, v)) - &(&diag_vf * &(yf * &diag_v).conj())),
        J,
    );
    let df_dvm = &(&diag_vf * &(yf * &diag_v_norm).conj()) + &(&diag_if.conj() * &sel(&f, &v_norm));

    let dt_dva = scale(
        &(&(&diag_it.conj() * &sel(&t, v)) - &(&diag_vt * &(yt * &diag_v).conj())),
        J,
    );
    let dt_dvm = &(&diag_vt * &(yt * &diag_v_norm).conj()) + &(&diag_it.conj() * &sel(&t, &v_norm));

    // compute power flow vectors
    let sf = f.iter().zip(&i_f).map(|(&i, c)| v[i] * c.conj()).collect();
    let st = t.iter().zip(&i_t).map(|(&i, c)| v[i] * c.conj()).collect();

    BranchDerivatives {
        df_dva,
        df_dvm,
        dt_dva,
        dt_dvm,
        f: sf,
        t: st,
    }
}

/// Computes partial derivatives of branch currents w.r.t. voltage angle
/// and magnitude.
pub fn d_ibr_d_v(yf: &CsMat<Complex64>, yt: &CsMat<Complex64>, v: &[Complex64]) -> BranchDerivatives {
    let v_norm: Vec<Complex64> = v.iter().map(|v| *v / v.norm()).collect();
    let diag_jv = spdiag(&v.iter().map(|v| J * *v).collect::<Vec<_>>());
    let diag_v_norm = spdiag(&v_norm);

    BranchDerivatives {
        df_dva: yf * &diag_jv,
        df_dvm: yf * &diag_v_norm,
        dt_dva: yt * &diag_jv,
        dt_dvm: yt * &diag_v_norm,
        f: mul_vec(yf, v),
        t: mul_vec(yt, v),
    }
}

/// Partial derivatives of squared flow magnitudes w.r.t. voltage angle
/// and magnitude, as `(dAf_dVa, dAf_dVm, dAt_dVa, dAt_dVm)`.
///
/// The flows may be complex powers or currents, so the same function
/// serves apparent power and current limits.
pub fn d_abr_d_v(d: &BranchDerivatives) -> (CsMat<f64>, CsMat<f64>, CsMat<f64>, CsMat<f64>) {
    // dAf/dx = 2 * (diag(real(Sf)) * real(dSf/dx) + diag(imag(Sf)) * imag(dSf/dx))
    let d_abs = |s: &[Complex64], ds: &CsMat<Complex64>| {
        let re = spdiag(&s.iter().map(|s| 2.0 * s.re).collect::<Vec<f64>>());
        let im = spdiag(&s.iter().map(|s| 2.0 * s.im).collect::<Vec<f64>>());
        &(&re * &real(ds)) + &(&im * &imag(ds))
    };
    (
        d_abs(&d.f, &d.df_dva),
        d_abs(&d.f, &d.df_dvm),
        d_abs(&d.t, &d.dt_dva),
        d_abs(&d.t, &d.dt_dvm),
    )
}
