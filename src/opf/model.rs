use anyhow::{format_err, Result};
use sprs::{CsMat, TriMat};

use crate::error::PowersError;

/// A named block of optimization variables.
#[derive(Debug, Clone)]
pub struct VarSet {
    pub name: String,
    /// Index of the first variable in the full vector.
    pub i0: usize,
    pub n: usize,
    pub v0: Vec<f64>,
    pub vl: Vec<f64>,
    pub vu: Vec<f64>,
}

impl VarSet {
    /// Index range of the set in the full vector.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.i0..self.i0 + self.n
    }
}

/// A named block of rows, linear or nonlinear.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSet {
    pub i0: usize,
    pub n: usize,
}

impl RowSet {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.i0..self.i0 + self.n
    }
}

#[derive(Debug, Clone)]
struct LinearBlock {
    name: String,
    rows: RowSet,
    a: CsMat<f64>,
    l: Vec<f64>,
    u: Vec<f64>,
    /// Variable sets spanned by the columns of `a`, in order.
    vs: Vec<String>,
}

/// Optimization model of an OPF problem.
///
/// Variables are added in named sets that are concatenated in the
/// order they were added. Linear constraint blocks are defined over a
/// list of variable sets and are placed into the full `A` matrix when
/// the problem is assembled.
#[derive(Debug, Clone, Default)]
pub struct OpfModel {
    var: Vec<VarSet>,
    lin: Vec<LinearBlock>,
    nle: Vec<(String, RowSet)>,
    nli: Vec<(String, RowSet)>,
}

impl OpfModel {
    pub fn add_vars(&mut self, name: &str, v0: Vec<f64>, vl: Vec<f64>, vu: Vec<f64>) -> Result<()> {
        let n = v0.len();
        for (what, v) in [("vl", &vl), ("vu", &vu)] {
            if v.len() != n {
                return Err(PowersError::LengthMismatch {
                    what: format!("{} of {}", what, name),
                    actual: v.len(),
                    expected: n,
                }
                .into());
            }
        }
        self.var.push(VarSet {
            name: name.to_string(),
            i0: self.nx(),
            n,
            v0,
            vl,
            vu,
        });
        Ok(())
    }

    /// Adds the constraints `l <= A * x(vs) <= u`.
    pub fn add_lin_constraints(
        &mut self,
        name: &str,
        a: CsMat<f64>,
        l: Vec<f64>,
        u: Vec<f64>,
        vs: &[&str],
    ) -> Result<()> {
        let mut nv = 0;
        for v in vs {
            nv += self
                .var(v)
                .ok_or_else(|| format_err!("{}: unknown variable set {}", name, v))?
                .n;
        }
        if a.cols() != nv {
            return Err(PowersError::DimensionMismatch {
                what: format!("A of {}", name),
                actual: a.cols(),
                expected: nv,
            }
            .into());
        }
        for (what, v) in [("l", &l), ("u", &u)] {
            if v.len() != a.rows() {
                return Err(PowersError::LengthMismatch {
                    what: format!("{} of {}", what, name),
                    actual: v.len(),
                    expected: a.rows(),
                }
                .into());
            }
        }
        self.lin.push(LinearBlock {
            name: name.to_string(),
            rows: RowSet {
                i0: self.n_lin(),
                n: a.rows(),
            },
            a,
            l,
            u,
            vs: vs.iter().map(|v| v.to_string()).collect(),
        });
        Ok(())
    }

    /// Adds `n` nonlinear equality constraints.
    pub fn add_nln_eq(&mut self, name: &str, n: usize) {
        let i0 = self.nle.iter().map(|(_, r)| r.n).sum();
        self.nle.push((name.to_string(), RowSet { i0, n }));
    }

    /// Adds `n` nonlinear inequality constraints.
    pub fn add_nln_ineq(&mut self, name: &str, n: usize) {
        let i0 = self.nli.iter().map(|(_, r)| r.n).sum();
        self.nli.push((name.to_string(), RowSet { i0, n }));
    }

    pub fn var(&self, name: &str) -> Option<&VarSet> {
        self.var.iter().find(|v| v.name == name)
    }

    pub fn lin(&self, name: &str) -> Option<RowSet> {
        self.lin.iter().find(|b| b.name == name).map(|b| b.rows)
    }

    pub fn nln_eq(&self, name: &str) -> Option<RowSet> {
        self.nle.iter().find(|(n, _)| n == name).map(|(_, r)| *r)
    }

    pub fn nln_ineq(&self, name: &str) -> Option<RowSet> {
        self.nli.iter().find(|(n, _)| n == name).map(|(_, r)| *r)
    }

    /// Number of variables, zero for an unknown set.
    pub fn n_var(&self, name: &str) -> usize {
        self.var(name).map_or(0, |v| v.n)
    }

    pub fn nx(&self) -> usize {
        self.var.iter().map(|v| v.n).sum()
    }

    pub fn n_lin(&self) -> usize {
        self.lin.iter().map(|b| b.rows.n).sum()
    }

    pub fn n_nln_eq(&self) -> usize {
        self.nle.iter().map(|(_, r)| r.n).sum()
    }

    pub fn n_nln_ineq(&self) -> usize {
        self.nli.iter().map(|(_, r)| r.n).sum()
    }

    /// Initial values and bounds of the full variable vector.
    pub fn params_var(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let v0 = self.var.iter().flat_map(|v| v.v0.iter().cloned()).collect();
        let vl = self.var.iter().flat_map(|v| v.vl.iter().cloned()).collect();
        let vu = self.var.iter().flat_map(|v| v.vu.iter().cloned()).collect();
        (v0, vl, vu)
    }

    /// Assembles the full linear constraint matrix and bounds. `A` is
    /// `None` when no linear constraints were added.
    pub fn linear_constraints(&self) -> (Option<CsMat<f64>>, Vec<f64>, Vec<f64>) {
        let (nlin, nx) = (self.n_lin(), self.nx());
        if nlin == 0 {
            return (None, Vec::new(), Vec::new());
        }
        let mut a = TriMat::new((nlin, nx));
        let mut l = Vec::with_capacity(nlin);
        let mut u = Vec::with_capacity(nlin);
        for b in &self.lin {
            let cols: Vec<usize> = b
                .vs
                .iter()
                .filter_map(|name| self.var(name))
                .flat_map(|v| v.range())
                .collect();
            for (&v, (i, j)) in b.a.iter() {
                a.add_triplet(b.rows.i0 + i, cols[j], v);
            }
            l.extend_from_slice(&b.l);
            u.extend_from_slice(&b.u);
        }
        (Some(a.to_csr()), l, u)
    }
}
