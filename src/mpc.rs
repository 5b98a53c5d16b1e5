use num_complex::Complex64;
use sprs::CsMat;
use std::f64::consts::PI;

/// MPC is a MATPOWER case that models a power system as a directed graph
/// structure.
#[derive(Clone, Debug)]
pub struct MPC {
    /// System MVA base used for converting power into per-unit quantities.
    /// Default value is 100.
    pub base_mva: f64,

    /// Power system nodes, including static loads and shunts.
    pub bus: Vec<Bus>,

    /// Generators and dispatchable loads.
    pub gen: Vec<Gen>,

    /// Transmission lines/cables and transformers.
    pub branch: Vec<Branch>,

    /// Optional user defined OPF variables, constraints and costs.
    pub user: Option<UserExtension>,
}

impl Default for MPC {
    fn default() -> Self {
        Self {
            base_mva: 100.0,
            bus: Vec::default(),
            gen: Vec::default(),
            branch: Vec::default(),
            user: None,
        }
    }
}

#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub enum BusType {
    /// Fixed active and reactive power.
    #[default]
    PQ = 1,
    /// Fixed voltage magnitude and active power.
    PV = 2,
    /// Reference voltage angle. Slack active and reactive power.
    REF = 3,
    /// Isolated bus.
    NONE = 4,
}

/// Bus is a node in the power system graph structure.
/// Static loads and shunts are included in the Bus definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Bus {
    /// Bus number.
    pub i: usize,

    pub bus_type: BusType,

    /// Real power demand (MW).
    pub pd: f64,

    /// Reactive power demand (MVAr).
    pub qd: f64,

    /// Shunt conductance (MW at V = 1.0 p.u.).
    pub gs: f64,

    /// Shunt susceptance (MVAr at V = 1.0 p.u.).
    pub bs: f64,

    /// Area number, 1-100.
    pub area: usize,

    /// Voltage magnitude (p.u.).
    pub vm: f64,

    /// Voltage angle (degrees).
    pub va: f64,

    /// Base voltage (kV).
    pub base_kv: f64,

    /// Loss zone (1-999).
    pub zone: usize,

    /// Maximum voltage magnitude (p.u.).
    pub vmax: f64,

    /// Minimum voltage magnitude (p.u.).
    pub vmin: f64,

    /// Lagrange multiplier on real power mismatch (u/MW).
    pub lam_p: f64,

    /// Lagrange multiplier on reactive power mismatch (u/MVAr).
    pub lam_q: f64,

    /// Kuhn-Tucker multiplier on upper voltage limit (u/p.u.).
    pub mu_vmax: f64,

    /// Kuhn-Tucker multiplier on lower voltage limit (u/p.u.).
    pub mu_vmin: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            i: 0,
            bus_type: BusType::PQ,
            pd: 0.0,
            qd: 0.0,
            gs: 0.0,
            bs: 0.0,
            area: 1,
            vm: 1.0,
            va: 0.0,
            base_kv: 0.0,
            zone: 1,
            vmax: 1.1,
            vmin: 0.9,
            lam_p: 0.0,
            lam_q: 0.0,
            mu_vmax: 0.0,
            mu_vmin: 0.0,
        }
    }
}

impl Bus {
    pub fn is_pq(&self) -> bool {
        self.bus_type == BusType::PQ
    }
    pub fn is_pv(&self) -> bool {
        self.bus_type == BusType::PV
    }
    pub fn is_ref(&self) -> bool {
        self.bus_type == BusType::REF
    }
    pub fn is_isolated(&self) -> bool {
        self.bus_type == BusType::NONE
    }

    pub(crate) fn y_sh(&self, base_mva: f64) -> Complex64 {
        Complex64::new(self.gs, self.bs) / Complex64::new(base_mva, 0.0)
    }
}

/// Gen is a generator or dispatchable load.
#[derive(Clone, Debug, PartialEq)]
pub struct Gen {
    /// Bus number.
    pub bus: usize,

    /// Real power output (MW).
    pub pg: f64,

    /// Reactive power output (MVAr).
    pub qg: f64,

    /// Maximum reactive power output (MVAr).
    pub qmax: f64,

    /// Minimum reactive power output (MVAr).
    pub qmin: f64,

    /// Voltage magnitude setpoint (p.u.).
    pub vg: f64,

    /// Total MVA base of this machine, defaults to base_mva.
    pub mbase: f64,

    pub status: bool,

    /// Maximum real power output (MW).
    pub pmax: f64,

    /// Minimum real power output (MW).
    pub pmin: f64,

    /// Lower real power output of PQ capability curve (MW).
    pub pc1: f64,

    /// Upper real power output of PQ capability curve (MW).
    pub pc2: f64,

    /// Minimum reactive power output at Pc1 (MVAr).
    pub qc1min: f64,

    /// Maximum reactive power output at Pc1 (MVAr).
    pub qc1max: f64,

    /// Minimum reactive power output at Pc2 (MVAr).
    pub qc2min: f64,

    /// Maximum reactive power output at Pc2 (MVAr).
    pub qc2max: f64,

    /// Ramp rate for load following/AGC (MW/min).
    pub ramp_agc: f64,

    /// Ramp rate for 10 minute reserves (MW).
    pub ramp_10: f64,

    /// Ramp rate for 30 minute reserves (MW).
    pub ramp_30: f64,

    /// Ramp rate for reactive power (2 sec timescale) (MVAr/min).
    pub ramp_q: f64,

    /// Area participation factor.
    pub apf: f64,

    /// Kuhn-Tucker multiplier on upper Pg limit (u/MW).
    pub mu_pmax: f64,

    /// Kuhn-Tucker multiplier on lower Pg limit (u/MW).
    pub mu_pmin: f64,

    /// Kuhn-Tucker multiplier on upper Qg limit (u/MVAr).
    pub mu_qmax: f64,

    /// Kuhn-Tucker multiplier on lower Qg limit (u/MVAr).
    pub mu_qmin: f64,

    /// Real power cost function.
    pub pcost: Option<GenCost>,

    /// Reactive power cost function.
    pub qcost: Option<GenCost>,
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            bus: 0,
            pg: 0.0,
            qg: 0.0,
            qmax: 9999.0,
            qmin: -9999.0,
            vg: 1.0,
            mbase: 100.0,
            status: true,
            pmax: 9999.0,
            pmin: 0.0,
            pc1: 0.0,
            pc2: 0.0,
            qc1min: 0.0,
            qc1max: 0.0,
            qc2min: 0.0,
            qc2max: 0.0,
            ramp_agc: 0.0,
            ramp_10: 0.0,
            ramp_30: 0.0,
            ramp_q: 0.0,
            apf: 0.0,
            mu_pmax: 0.0,
            mu_pmin: 0.0,
            mu_qmax: 0.0,
            mu_qmin: 0.0,
            pcost: None,
            qcost: None,
        }
    }
}

impl Gen {
    pub fn is_on(&self) -> bool {
        self.status
    }
    pub fn is_off(&self) -> bool {
        !self.status
    }

    /// Checks for dispatchable loads.
    pub fn is_load(&self) -> bool {
        self.pmin < 0.0 && self.pmax == 0.0
    }
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub enum CostModel {
    /// Piecewise linear cost model defined by breakpoints.
    PwLinear = 1,
    Polynomial = 2,
}

/// GenCost defines a generator cost function.
#[derive(Clone, Debug, PartialEq)]
pub struct GenCost {
    /// Cost model.
    pub model: CostModel,

    /// Startup cost in US dollars.
    pub startup: f64,

    /// Shutdown cost in US dollars.
    pub shutdown: f64,

    /// parameters defining total cost function f(p),
    /// units of f and p are $/hr and MW (or MVAr), respectively.
    ///
    /// PW_LINEAR: p0, f0, p1, f1, ..., pn, fn
    /// where p0 < p1 < ... < pn and the cost f(p) is defined by
    /// the coordinates (p0,f0), (p1,f1), ..., (pn,fn) of the
    /// end/break-points of the piecewise linear cost function
    ///
    /// POLYNOMIAL: cn, ..., c1, c0
    /// n+1 coefficients of an n-th order polynomial cost function,
    /// starting with highest order, where cost is
    /// f(p) = cn*p^n + ... + c1*p + c0
    pub cost: Vec<f64>,
}

impl GenCost {
    pub fn polynomial(cost: &[f64]) -> Self {
        Self {
            model: CostModel::Polynomial,
            startup: 0.0,
            shutdown: 0.0,
            cost: cost.to_vec(),
        }
    }

    /// Piecewise linear cost through the (p, f) breakpoints.
    pub fn pw_linear(points: &[(f64, f64)]) -> Self {
        Self {
            model: CostModel::PwLinear,
            startup: 0.0,
            shutdown: 0.0,
            cost: points.iter().flat_map(|&(p, f)| [p, f]).collect(),
        }
    }

    /// Number of polynomial coefficients or breakpoints.
    pub fn n_cost(&self) -> usize {
        match self.model {
            CostModel::Polynomial => self.cost.len(),
            CostModel::PwLinear => self.cost.len() / 2,
        }
    }

    pub fn is_pwl(&self) -> bool {
        self.model == CostModel::PwLinear
    }

    /// Breakpoints of a piecewise linear cost.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.cost.chunks_exact(2).map(|c| (c[0], c[1])).collect()
    }
}

/// Branch represents either a transmission line/cable or a two winding
/// transformer.
#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    /// From bus number.
    pub from_bus: usize,

    /// To bus number.
    pub to_bus: usize,

    /// Resistance (p.u.).
    pub r: f64,

    /// Reactance (p.u.).
    pub x: f64,

    /// Total line charging susceptance (p.u.).
    pub b: f64,

    /// MVA rating A (long term rating).
    pub rate_a: f64,

    /// MVA rating B (short term rating).
    pub rate_b: f64,

    /// MVA rating C (emergency rating).
    pub rate_c: f64,

    /// Transformer off nominal tap ratio.
    pub tap: f64,

    /// Transformer phase shift angle (degrees).
    pub shift: f64,

    /// Initial branch status.
    pub status: bool,

    /// Minimum angle difference, angle(Vf) - angle(Vt) (degrees).
    pub ang_min: f64,

    /// Maximum angle difference, angle(Vf) - angle(Vt) (degrees).
    pub ang_max: f64,

    /// Real power injected at "from" bus end (MW).
    pub pf: f64,

    /// Reactive power injected at "from" bus end (MVAr).
    pub qf: f64,

    /// Real power injected at "to" bus end (MW).
    pub pt: f64,

    /// Reactive power injected at "to" bus end (MVAr).
    pub qt: f64,

    /// Kuhn-Tucker multiplier on MVA limit at "from" bus (u/MVA).
    pub mu_sf: f64,

    /// Kuhn-Tucker multiplier on MVA limit at "to" bus (u/MVA).
    pub mu_st: f64,

    /// Kuhn-Tucker multiplier lower angle difference limit (u/degree).
    pub mu_ang_min: f64,

    /// Kuhn-Tucker multiplier upper angle difference limit (u/degree).
    pub mu_ang_max: f64,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            from_bus: 0,
            to_bus: 0,
            r: 0.0,
            x: 0.0,
            b: 0.0,
            rate_a: 0.0,
            rate_b: 0.0,
            rate_c: 0.0,
            tap: 0.0,
            shift: 0.0,
            status: true,
            ang_min: -360.0,
            ang_max: 360.0,
            pf: 0.0,
            qf: 0.0,
            pt: 0.0,
            qt: 0.0,
            mu_sf: 0.0,
            mu_st: 0.0,
            mu_ang_min: 0.0,
            mu_ang_max: 0.0,
        }
    }
}

impl Branch {
    pub fn is_on(&self) -> bool {
        self.status
    }

    /// Series admittance, zero when out of service.
    pub(crate) fn y_s(&self) -> Complex64 {
        if !self.status {
            Complex64::new(0.0, 0.0)
        } else {
            Complex64::new(1.0, 0.0) / Complex64::new(self.r, self.x)
        }
    }

    /// Complex tap ratio including any phase shift.
    pub(crate) fn tap(&self) -> Complex64 {
        let t = if self.tap == 0.0 { 1.0 } else { self.tap }; // default tap ratio = 1
        Complex64::from_polar(t, self.shift * PI / 180.0)
    }
}

/// User supplied extension of the OPF problem.
///
/// Columns of `a` and `n` index the full optimization vector in internal
/// ordering: `[Va, Vm, Pg, Qg, y, z]` for AC and `[Va, Pg, y, z]` for DC,
/// where `y` are the piecewise linear cost variables and `z` the `nz`
/// variables defined here.
#[derive(Clone, Debug)]
pub struct UserExtension {
    /// Linear constraints `l <= A x <= u`.
    pub a: Option<CsMat<f64>>,
    pub l: Vec<f64>,
    pub u: Vec<f64>,

    /// Number of extra variables.
    pub nz: usize,
    pub z0: Vec<f64>,
    pub zl: Vec<f64>,
    pub zu: Vec<f64>,

    /// Cost term `1/2 w'Hw + Cw'w` with `w = N x - rh`.
    pub n: Option<CsMat<f64>>,
    pub h: Option<CsMat<f64>>,
    pub cw: Vec<f64>,
    pub rh: Vec<f64>,
}

impl Default for UserExtension {
    fn default() -> Self {
        Self {
            a: None,
            l: Vec::new(),
            u: Vec::new(),
            nz: 0,
            z0: Vec::new(),
            zl: Vec::new(),
            zu: Vec::new(),
            n: None,
            h: None,
            cw: Vec::new(),
            rh: Vec::new(),
        }
    }
}
