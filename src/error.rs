use thiserror::Error;

/// Precondition and numerical errors raised before or during a solve.
///
/// Non-convergence is not an error: it is reported through the
/// `success`/`converged` fields of the result types.
#[derive(Debug, Error, PartialEq)]
pub enum PowersError {
    #[error("bus {position} has number {number}: buses must be numbered consecutively from 0")]
    NonConsecutiveBus { position: usize, number: usize },

    #[error("branch {branch} references unknown bus {bus}")]
    UnknownBus { branch: usize, bus: usize },

    #[error("generator {gen} references unknown bus {bus}")]
    UnknownGenBus { gen: usize, bus: usize },

    #[error("bus number {0} appears more than once")]
    DuplicateBus(usize),

    #[error("no reference bus and no PV bus to promote")]
    NoReferenceBus,

    #[error("{what} has {actual} columns, expected {expected}")]
    DimensionMismatch {
        what: String,
        actual: usize,
        expected: usize,
    },

    #[error("{what} has length {actual}, expected {expected}")]
    LengthMismatch {
        what: String,
        actual: usize,
        expected: usize,
    },

    #[error("singular matrix")]
    SingularMatrix,

    #[error("linear solver: {0}")]
    LinearSolve(String),

    #[error("nonlinear constraints require a hessian function")]
    MissingHessian,

    #[error("generator {gen}: {reason}")]
    InvalidCost { gen: usize, reason: String },

    #[error("generator {gen}: {reason}")]
    InvalidGenData { gen: usize, reason: String },
}
