mod bus_types;
mod d2;
mod dbr;
mod dc;
mod error;
mod ext_to_int;
mod fd;
mod gauss;
mod int_to_ext;
mod jac;
mod lu;
mod math;
mod mpc;
mod mpopt;
mod newton;
mod order;
mod pf;
mod sbus;
mod traits;
mod ybus;

pub mod cases;
pub mod debug;
pub mod ips;
pub mod opf;
pub mod sparse;

#[cfg(test)]
mod fdcheck;

pub use bus_types::*;
pub use cases::*;
pub use d2::*;
pub use dbr::*;
pub use dc::*;
pub use error::*;
pub use ext_to_int::*;
pub use fd::*;
pub use gauss::*;
pub use int_to_ext::*;
pub use jac::*;
pub use lu::*;
pub use mpc::*;
pub use mpopt::*;
pub use newton::*;
pub use opf::{runopf, OpfResult};
pub use order::*;
pub use pf::*;
pub use sbus::*;
pub use traits::*;
pub use ybus::*;
