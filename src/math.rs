// Copyright (c) 2022-2024, Richard Lincoln. All rights reserved.

use num_complex::Complex64;

pub const J: Complex64 = Complex64 { re: 0.0, im: 1.0 };

/// Machine epsilon, as used by the split of constraint rows and
/// the proportional reactive power allocation.
pub const EPS: f64 = f64::EPSILON;

#[macro_export]
macro_rules! cmplx {
    () => {
        num_complex::Complex64::new(0.0, 0.0)
    };
    ($arg1:expr) => {
        num_complex::Complex64::new($arg1, 0.0)
    };
    ($arg1:expr, $arg2:expr) => {
        num_complex::Complex64::new($arg1, $arg2)
    };
}

/// Computes the infinity norm: `max(abs(a))`. Zero for an empty slice.
pub fn norm_inf(a: &[f64]) -> f64 {
    a.iter().fold(0.0, |max, v| {
        let absv = v.abs();
        if absv > max || absv.is_nan() {
            absv
        } else {
            max
        }
    })
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

/// Largest element of `a`, or `None` if empty.
pub fn max(a: &[f64]) -> Option<f64> {
    a.iter().cloned().reduce(f64::max)
}

pub fn any_nan(a: &[f64]) -> bool {
    a.iter().any(|v| v.is_nan())
}

pub fn select<T: Copy>(a: &[T], ix: &[usize]) -> Vec<T> {
    ix.iter().map(|&i| a[i]).collect()
}

pub fn polar(vm: &[f64], va: &[f64]) -> Vec<Complex64> {
    vm.iter()
        .zip(va)
        .map(|(&m, &a)| Complex64::from_polar(m, a))
        .collect()
}

pub fn arg(v: &[Complex64]) -> Vec<f64> {
    v.iter().map(|z| z.arg()).collect()
}

pub fn abs(v: &[Complex64]) -> Vec<f64> {
    v.iter().map(|z| z.norm()).collect()
}
