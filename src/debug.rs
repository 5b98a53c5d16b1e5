use num_complex::Complex64;
use pretty_dtoa::{dtoa, FmtFloatConfig};
use sprs::CsMat;
use std::f64::consts::PI;

const FLOAT_CONFIG: FmtFloatConfig = FmtFloatConfig::default()
    .add_point_zero(false)
    .max_significant_digits(9);

fn fmt(v: f64) -> String {
    dtoa(v, FLOAT_CONFIG)
}

pub fn format_f64_vec(v: &[f64]) -> String {
    let a: Vec<String> = v.iter().map(|f| fmt(*f)).collect();
    format!("[{}]", a.join(", "))
}

fn format_complex(z: &Complex64) -> String {
    format!(
        "{}{}j{}",
        fmt(z.re),
        if z.im.signum() < 0.0 { "-" } else { "+" },
        fmt(z.im.abs())
    )
}

pub fn format_rect_vec(v: &[Complex64]) -> String {
    let a: Vec<String> = v.iter().map(format_complex).collect();
    format!("[{}]", a.join(", "))
}

fn format_polar(z: &Complex64) -> String {
    format!(
        "{}\u{2220}{}\u{00B0}",
        fmt(z.norm()),
        fmt(z.arg() * 180.0 / PI)
    )
}

pub fn format_polar_vec(v: &[Complex64]) -> String {
    let a: Vec<String> = v.iter().map(format_polar).collect();
    format!("[{}]", a.join(", "))
}

/// Lists the non-zeros of `a` as `(row, col) value` lines.
pub fn format_sparse(a: &CsMat<f64>) -> String {
    let mut lines = vec![format!("{}x{}, nnz={}", a.rows(), a.cols(), a.nnz())];
    for (&v, (i, j)) in a.iter() {
        lines.push(format!("  ({}, {}) {}", i, j, fmt(v)));
    }
    lines.join("\n")
}
