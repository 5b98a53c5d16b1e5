use anyhow::{format_err, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use powers_opf::{
    case2, case9, case9q, runopf, runpf, Alg, FlowLim, GenQLimits, MPOpt, SparseLU, MPC,
};

/// Power flow simulation and optimization.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Power Flow
    #[clap(name = "pf")]
    PowerFlow(PfArgs),

    /// Optimal Power Flow
    #[clap(name = "opf")]
    OPF(OpfArgs),
}

/// Built-in test systems.
#[derive(Copy, Clone, ValueEnum)]
enum CaseName {
    Case9,
    Case9q,
    Case2,
}

#[derive(Args)]
struct PfArgs {
    /// Test system to solve.
    #[arg(long, value_enum, default_value_t = CaseName::Case9)]
    case: CaseName,

    /// Linearized DC power flow.
    #[arg(long, default_value_t = false)]
    pub dc: bool,

    /// AC power flow algorithm.
    #[arg(long, value_enum)]
    pub alg: Option<Alg>,

    /// Termination tolerance on per unit P & Q mismatch.
    #[arg(long)]
    pub tol: Option<f64>,

    /// Maximum number of iterations.
    #[arg(long)]
    pub max_it: Option<usize>,

    /// Enforce gen reactive power limits at expense of |V|.
    #[arg(long, value_enum)]
    pub qlim: Option<GenQLimits>,
}

#[derive(Args)]
struct OpfArgs {
    /// Test system to solve.
    #[arg(long, value_enum, default_value_t = CaseName::Case9)]
    case: CaseName,

    /// DC optimal power flow.
    #[arg(long, default_value_t = false)]
    pub dc: bool,

    /// Quantity limited by branch flow constraints.
    #[arg(long, value_enum)]
    pub flow_lim: Option<FlowLim>,

    /// Ignore branch angle difference limits.
    #[arg(long, default_value_t = false)]
    pub ignore_ang_lim: bool,

    /// Maximum number of interior point iterations.
    #[arg(long)]
    pub max_it: Option<usize>,
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_level(false)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match execute(&cli) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    }
}

fn load(name: CaseName) -> MPC {
    match name {
        CaseName::Case9 => case9(),
        CaseName::Case9q => case9q(),
        CaseName::Case2 => case2(100.0, 0.1),
    }
}

fn execute(cli: &Cli) -> Result<()> {
    let mut mpopt = MPOpt::default();
    let solver = SparseLU;

    match &cli.command {
        Commands::PowerFlow(args) => {
            mpopt.dc = args.dc;
            if let Some(alg) = args.alg {
                mpopt.pf.algorithm = alg;
            }
            if let Some(tol) = args.tol {
                mpopt.pf.tolerance = tol;
            }
            if let Some(max_it) = args.max_it {
                match mpopt.pf.algorithm {
                    Alg::NR => mpopt.pf.max_it_nr = max_it,
                    Alg::FDBX | Alg::FDXB => mpopt.pf.max_it_fd = max_it,
                    Alg::GS => mpopt.pf.max_it_gs = max_it,
                }
            }
            if let Some(qlim) = args.qlim {
                mpopt.pf.enforce_q_limits = qlim;
            }

            let r = runpf(&load(args.case), &mpopt, &solver)?;
            if !r.success {
                return Err(format_err!("power flow did not succeed"));
            }
            print_case(&r.case);
        }
        Commands::OPF(args) => {
            mpopt.dc = args.dc;
            mpopt.opf.ignore_ang_lim = args.ignore_ang_lim;
            if let Some(flow_lim) = args.flow_lim {
                mpopt.opf.flow_lim = flow_lim;
            }
            if let Some(max_it) = args.max_it {
                mpopt.opf.ips.max_it = max_it;
            }

            let r = runopf(&load(args.case), &mpopt, &solver)?;
            if !r.success {
                return Err(format_err!("optimal power flow did not succeed"));
            }
            println!("Objective Function Value = {:.2} $/hr", r.f);
            print_case(&r.case);
        }
    }
    Ok(())
}

fn print_case(mpc: &MPC) {
    println!();
    println!(" Bus   Vm (pu)  Va (deg)   Pd (MW) Qd (MVAr)  lam P     lam Q");
    for b in &mpc.bus {
        println!(
            "{:4} {:9.3} {:9.3} {:9.2} {:9.2} {:9.3} {:9.3}",
            b.i, b.vm, b.va, b.pd, b.qd, b.lam_p, b.lam_q
        );
    }
    println!();
    println!(" Gen  Bus   Pg (MW) Qg (MVAr)");
    for (i, g) in mpc.gen.iter().enumerate() {
        println!("{:4} {:4} {:9.2} {:9.2}", i + 1, g.bus, g.pg, g.qg);
    }
    println!();
    println!(" Brnch From   To   Pf (MW) Qf (MVAr)   Pt (MW) Qt (MVAr)");
    for (i, br) in mpc.branch.iter().enumerate() {
        println!(
            "{:6} {:4} {:4} {:9.2} {:9.2} {:9.2} {:9.2}",
            i + 1,
            br.from_bus,
            br.to_bus,
            br.pf,
            br.qf,
            br.pt,
            br.qt
        );
    }
}
