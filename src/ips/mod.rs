//! Primal-dual interior point method for nonlinear programming.

mod nlp;
mod options;
mod qp;
mod traits;

pub use nlp::*;
pub use options::*;
pub use qp::*;
pub use traits::*;
