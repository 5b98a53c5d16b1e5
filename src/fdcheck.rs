//! Central difference checks of analytic derivatives.

use num_complex::Complex64;
use sprs::CsMat;

use crate::sparse::{complex, to_dense};

const STEP: f64 = 1e-6;

#[derive(Clone, Copy)]
pub(crate) enum VoltageCoord {
    Angle,
    Magnitude,
}

/// A non-flat voltage profile with distinct magnitudes and angles.
pub(crate) fn test_voltage(n: usize) -> Vec<Complex64> {
    (0..n)
        .map(|k| {
            let k = k as f64;
            Complex64::from_polar(1.0 + 0.03 * (1.7 * k).sin(), 0.12 * (1.3 * k).cos())
        })
        .collect()
}

/// Copy of `v` with the angle or magnitude of bus `k` moved by `h`.
pub(crate) fn perturbed(v: &[Complex64], k: usize, h: f64, coord: VoltageCoord) -> Vec<Complex64> {
    let mut v = v.to_vec();
    let (vm, va) = (v[k].norm(), v[k].arg());
    v[k] = match coord {
        VoltageCoord::Angle => Complex64::from_polar(vm, va + h),
        VoltageCoord::Magnitude => Complex64::from_polar(vm + h, va),
    };
    v
}

/// Asserts that column `k` of `analytic` matches the central difference
/// of `f(k, ±h)` for every `k < ncols`.
pub(crate) fn assert_jacobian<F>(analytic: &CsMat<Complex64>, f: F, ncols: usize, tol: f64)
where
    F: Fn(usize, f64) -> Vec<Complex64>,
{
    assert_eq!(analytic.cols(), ncols);
    let a = to_dense(analytic);
    for k in 0..ncols {
        let fp = f(k, STEP);
        let fm = f(k, -STEP);
        assert_eq!(fp.len(), analytic.rows());
        for i in 0..fp.len() {
            let fd = (fp[i] - fm[i]) / (2.0 * STEP);
            let err = (fd - a[i][k]).norm();
            assert!(
                err <= tol * (1.0 + a[i][k].norm()),
                "entry ({}, {}): analytic {} numeric {}",
                i,
                k,
                a[i][k],
                fd
            );
        }
    }
}

pub(crate) fn assert_jacobian_real<F>(analytic: &CsMat<f64>, f: F, ncols: usize, tol: f64)
where
    F: Fn(usize, f64) -> Vec<f64>,
{
    assert_jacobian(
        &complex(analytic),
        |k, h| f(k, h).iter().map(|&v| Complex64::new(v, 0.0)).collect(),
        ncols,
        tol,
    )
}
