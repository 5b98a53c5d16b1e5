use num_complex::Complex64;
use num_traits::Zero;
use sprs::{CsMat, TriMat};
use std::ops::{Add, Mul};

use crate::traits::Conj;

/// Element types handled by the triplet based helpers below.
pub trait Scalar: Copy + Zero + Add<Output = Self> + Mul<Output = Self> + Default {}

impl Scalar for f64 {}
impl Scalar for Complex64 {}

/// Builds a sparse diagonal matrix from `d`.
pub fn spdiag<N: Scalar>(d: &[N]) -> CsMat<N> {
    let n = d.len();
    let tri = TriMat::from_triplets((n, n), (0..n).collect(), (0..n).collect(), d.to_vec());
    tri.to_csr()
}

/// Builds a CSR matrix from triplets. Duplicate entries are summed.
pub fn sparse<N: Scalar>(
    shape: (usize, usize),
    row_inds: &[usize],
    col_inds: &[usize],
    data: &[N],
) -> CsMat<N> {
    let tri = TriMat::from_triplets(shape, row_inds.to_vec(), col_inds.to_vec(), data.to_vec());
    tri.to_csr()
}

pub fn zeros<N: Scalar>(rows: usize, cols: usize) -> CsMat<N> {
    CsMat::zero((rows, cols))
}

/// Computes `a * x`.
pub fn mul_vec<N: Scalar>(a: &CsMat<N>, x: &[N]) -> Vec<N> {
    let mut y = vec![N::zero(); a.rows()];
    for (&v, (i, j)) in a.iter() {
        y[i] = y[i] + v * x[j];
    }
    y
}

/// Computes `a' * x` without forming the transpose.
pub fn mul_vec_t<N: Scalar>(a: &CsMat<N>, x: &[N]) -> Vec<N> {
    let mut y = vec![N::zero(); a.cols()];
    for (&v, (i, j)) in a.iter() {
        y[j] = y[j] + v * x[i];
    }
    y
}

pub fn transpose<N: Scalar>(a: &CsMat<N>) -> CsMat<N> {
    a.transpose_view().to_csr()
}

/// Conjugate (Hermitian) transpose.
pub fn ctranspose(a: &CsMat<Complex64>) -> CsMat<Complex64> {
    transpose(a).conj()
}

pub fn real(a: &CsMat<Complex64>) -> CsMat<f64> {
    a.map(|v| v.re)
}

pub fn imag(a: &CsMat<Complex64>) -> CsMat<f64> {
    a.map(|v| v.im)
}

pub fn scale<N: Scalar>(a: &CsMat<N>, s: N) -> CsMat<N> {
    a.map(|&v| v * s)
}

/// Promotes a real matrix to a complex one.
pub fn complex(a: &CsMat<f64>) -> CsMat<Complex64> {
    a.map(|&v| Complex64::new(v, 0.0))
}

/// Extracts the sub-matrix `a(rows, cols)`. `None` selects everything
/// along that dimension. Indexes may repeat.
pub fn select<N: Scalar>(a: &CsMat<N>, rows: Option<&[usize]>, cols: Option<&[usize]>) -> CsMat<N> {
    let row_map = index_map(a.rows(), rows);
    let col_map = index_map(a.cols(), cols);
    let nr = rows.map_or(a.rows(), |r| r.len());
    let nc = cols.map_or(a.cols(), |c| c.len());

    let mut tri = TriMat::new((nr, nc));
    for (&v, (i, j)) in a.iter() {
        for &ii in &row_map[i] {
            for &jj in &col_map[j] {
                tri.add_triplet(ii, jj, v);
            }
        }
    }
    tri.to_csr()
}

fn index_map(n: usize, ix: Option<&[usize]>) -> Vec<Vec<usize>> {
    match ix {
        None => (0..n).map(|i| vec![i]).collect(),
        Some(ix) => {
            let mut map = vec![Vec::new(); n];
            ix.iter().enumerate().for_each(|(k, &i)| map[i].push(k));
            map
        }
    }
}

/// Places `a` into a zero matrix of `shape` with its top-left corner at
/// `(i0, j0)`.
pub fn embed<N: Scalar>(shape: (usize, usize), i0: usize, j0: usize, a: &CsMat<N>) -> CsMat<N> {
    let mut tri = TriMat::with_capacity(shape, a.nnz());
    for (&v, (i, j)) in a.iter() {
        tri.add_triplet(i0 + i, j0 + j, v);
    }
    tri.to_csr()
}

/// Dense copy, row-major. Intended for small matrices and tests.
pub fn to_dense<N: Scalar>(a: &CsMat<N>) -> Vec<Vec<N>> {
    let mut d = vec![vec![N::zero(); a.cols()]; a.rows()];
    for (&v, (i, j)) in a.iter() {
        d[i][j] = d[i][j] + v;
    }
    d
}
