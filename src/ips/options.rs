use derive_builder::Builder;

/// Interior point solver options.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(default, build_fn(validate = "Self::validate"))]
pub struct IpsOpt {
    /// Termination tolerance for feasibility condition.
    pub feastol: f64,

    /// Termination tolerance for gradient condition.
    pub gradtol: f64,

    /// Termination tolerance for complementarity condition.
    pub comptol: f64,

    /// Termination tolerance for cost condition.
    pub costtol: f64,

    /// Maximum number of iterations.
    pub max_it: usize,

    /// Maximum number of step-size reductions if step-control is on.
    pub max_red: usize,

    /// Use step-size control.
    pub step_control: bool,

    /// Cost multiplier used to scale the objective function for improved
    /// conditioning. Only applied to the objective and the multipliers
    /// reported in the result are unscaled.
    pub cost_mult: f64,
}

impl Default for IpsOpt {
    fn default() -> Self {
        Self {
            feastol: 1e-6,
            gradtol: 1e-6,
            comptol: 1e-6,
            costtol: 1e-6,
            max_it: 150,
            max_red: 20,
            step_control: false,
            cost_mult: 1.0,
        }
    }
}

impl IpsOptBuilder {
    fn validate(&self) -> Result<(), String> {
        let positive = [
            ("feastol", self.feastol),
            ("gradtol", self.gradtol),
            ("comptol", self.comptol),
            ("costtol", self.costtol),
            ("cost_mult", self.cost_mult),
        ];
        for (name, value) in positive {
            if let Some(v) = value {
                if !(v > 0.0) {
                    return Err(format!("{} must be positive, got {}", name, v));
                }
            }
        }
        if self.max_it == Some(0) {
            return Err("max_it must be non-zero".to_string());
        }
        Ok(())
    }
}
