use sprs::CsMat;

/// Objective function of a nonlinear program.
pub trait ObjectiveFunction {
    /// Evaluates the objective and its gradient at `x`.
    fn f(&self, x: &[f64]) -> (f64, Vec<f64>);

    /// Hessian of the objective. Only called when the problem has no
    /// nonlinear constraints.
    fn d2f(&self, x: &[f64]) -> CsMat<f64>;
}

/// Nonlinear constraints `h(x) <= 0` and `g(x) = 0`.
pub trait NonlinearConstraint {
    /// Returns `(h, g, dh, dg)` where `dh` and `dg` are the transposed
    /// Jacobians (nx x nh and nx x ng).
    fn gh(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>, CsMat<f64>, CsMat<f64>);
}

/// Hessian of the Lagrangian.
pub trait HessianFunction {
    /// Evaluates `d2f * cost_mult + sum(lam .* d2g) + sum(mu .* d2h)` where
    /// `lam` and `mu` are the multipliers on the nonlinear equality and
    /// inequality constraints respectively.
    fn hess(&self, x: &[f64], lam: &[f64], mu: &[f64], cost_mult: f64) -> CsMat<f64>;
}
