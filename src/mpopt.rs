use clap::ValueEnum;

use crate::ips::IpsOpt;

/// AC power flow algorithm.
#[derive(Debug, PartialEq, Copy, Clone, Default, ValueEnum)]
pub enum Alg {
    /// Newton's method.
    #[default]
    NR = 0,
    /// Fast-Decoupled method (BX version).
    FDBX = 1,
    /// Fast-Decoupled method (XB version).
    FDXB = 2,
    /// Gauss-Seidel method.
    GS = 3,
}

#[derive(Debug, PartialEq, Copy, Clone, Default, ValueEnum)]
pub enum GenQLimits {
    #[default]
    IgnoreLimits = 0,
    /// Simultaneous bus type conversion.
    Simultaneous = 1,
    /// One-at-a-time bus type conversion.
    OneAtATime = 2,
}

/// Quantity constrained by branch flow limits.
#[derive(Debug, PartialEq, Copy, Clone, Default, ValueEnum)]
pub enum FlowLim {
    /// Apparent power.
    #[default]
    S,
    /// Real power.
    P,
    /// Current magnitude.
    I,
}

#[derive(Debug, Clone, Default)]
pub struct MPOpt {
    /// Linearized DC power flow that assumes lossless branches,
    /// 1pu voltages and small voltage angle differences.
    pub dc: bool,

    pub pf: PFOpt,
    pub opf: OPFOpt,
}

#[derive(Debug, Clone)]
pub struct PFOpt {
    /// AC power flow algorithm. Default is Newton's method.
    pub algorithm: Alg,

    /// Termination tolerance on per unit P & Q mismatch. Default value is 1e-8.
    pub tolerance: f64,

    /// Maximum number of iterations for Newton's method. Default value is 10.
    pub max_it_nr: usize,

    /// Maximum number of iterations for fast decoupled method. Default value is 30.
    pub max_it_fd: usize,

    /// Maximum number of iterations for Gauss-Seidel method. Default value is 1000.
    pub max_it_gs: usize,

    /// Enforce gen reactive power limits at expense of |V|.
    pub enforce_q_limits: GenQLimits,
}

impl Default for PFOpt {
    fn default() -> Self {
        Self {
            algorithm: Alg::NR,
            tolerance: 1e-8,
            max_it_nr: 10,
            max_it_fd: 30,
            max_it_gs: 1000,
            enforce_q_limits: GenQLimits::IgnoreLimits,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OPFOpt {
    /// Quantity to use for branch flow limits.
    pub flow_lim: FlowLim,

    /// Ignore angle difference limits for branches even if specified.
    pub ignore_ang_lim: bool,

    /// Cost scaling applied by the AC OPF. Default value is 1e-4.
    pub cost_mult: f64,

    /// Number of evenly spaced points used to convert polynomial costs
    /// of order > 2 to piecewise linear costs for the DC OPF.
    pub pwl_points: usize,

    /// Interior point solver options.
    pub ips: IpsOpt,
}

impl Default for OPFOpt {
    fn default() -> Self {
        Self {
            flow_lim: FlowLim::S,
            ignore_ang_lim: false,
            cost_mult: 1e-4,
            pwl_points: 10,
            ips: IpsOpt::default(),
        }
    }
}
