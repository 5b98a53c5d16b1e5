use num_complex::Complex64;
use sprs::CsMat;

/// Solves sparse linear systems `A x = b`.
pub trait LinearSolver {
    fn solve(&self, a_mat: &CsMat<f64>, b: &[f64]) -> anyhow::Result<Vec<f64>>;
}

pub trait Conj {
    fn conj(&self) -> Self;
}

impl Conj for CsMat<Complex64> {
    fn conj(&self) -> Self {
        self.map(|v| v.conj())
    }
}

impl Conj for Vec<Complex64> {
    fn conj(&self) -> Self {
        self.iter().map(|v| v.conj()).collect()
    }
}
