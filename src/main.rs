//! irdrop - static IR-drop analyzer
//!
//! Solves the supply voltage of every node of one power or ground net.
//!
//! # Usage
//!
//! ```bash
//! irdrop chip.pdn --net VDD --vsrc bumps.csv --out ir.rpt --error-file floating.log
//! irdrop chip.pdn --net VSS --connectivity-only
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use irdrop_core::{
    error::{IrError, Result},
    solver::{DEFAULT_BUMP_PITCH_UM, DEFAULT_NODE_DENSITY_FACTOR},
    Design, IrSolver, IrSolverConfig, SolverKind,
};
use tracing_subscriber::EnvFilter;

/// Static IR-drop analyzer for power-delivery networks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the design file (.pdn)
    #[arg(value_name = "DESIGN_FILE")]
    design_file: PathBuf,

    /// Supply net to analyze
    #[arg(short, long)]
    net: String,

    /// Voltage source locations (x_um, y_um, size_um[, voltage])
    #[arg(long, value_name = "FILE")]
    vsrc: Option<PathBuf>,

    /// Analysis corner
    #[arg(long)]
    corner: Option<String>,

    /// Per-instance voltage report
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Floating / unconnected node log
    #[arg(long, value_name = "FILE")]
    error_file: Option<PathBuf>,

    /// Run electromigration analysis, writing the report here
    #[arg(long, value_name = "FILE")]
    em: Option<PathBuf>,

    /// SPICE netlist of the mesh
    #[arg(long, value_name = "FILE")]
    spice: Option<PathBuf>,

    /// Bump pitch in x (um)
    #[arg(long, default_value_t = DEFAULT_BUMP_PITCH_UM)]
    bump_pitch_x: f64,

    /// Bump pitch in y (um)
    #[arg(long, default_value_t = DEFAULT_BUMP_PITCH_UM)]
    bump_pitch_y: f64,

    /// Bottom-level node spacing (um); overrides the density factor
    #[arg(long)]
    node_density: Option<f64>,

    /// Node spacing as bump pitch divided by this factor
    #[arg(long, default_value_t = DEFAULT_NODE_DENSITY_FACTOR)]
    node_density_factor: f64,

    /// Supply voltage override, repeatable
    #[arg(long = "net-voltage", value_name = "NET=VOLTS", value_parser = parse_net_voltage)]
    net_voltages: Vec<(String, f64)>,

    /// Linear solver
    #[arg(long, value_enum, default_value_t = SolverKind::Auto)]
    solver: SolverKind,

    /// Only check grid connectivity; no voltage or power needed
    #[arg(long)]
    connectivity_only: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_net_voltage(arg: &str) -> std::result::Result<(String, f64), String> {
    let (net, volts) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NET=VOLTS, got '{}'", arg))?;
    let volts = irdrop_core::dsl::parse_value(volts.trim()).ok_or_else(|| format!("invalid voltage '{}'", volts))?;
    Ok((net.trim().to_string(), volts))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn config_from_args(args: &Args) -> IrSolverConfig {
    let mut config = IrSolverConfig::new(&args.net)
        .with_bump_pitch(args.bump_pitch_x, args.bump_pitch_y)
        .with_node_density_factor(args.node_density_factor)
        .with_solver(args.solver);
    if let Some(path) = &args.vsrc {
        config = config.with_source_file(path);
    }
    if let Some(corner) = &args.corner {
        config = config.with_corner(corner);
    }
    if let Some(path) = &args.out {
        config = config.with_report_file(path);
    }
    if let Some(path) = &args.error_file {
        config = config.with_error_file(path);
    }
    if let Some(path) = &args.em {
        config = config.with_em_report(path);
    }
    if let Some(path) = &args.spice {
        config = config.with_spice_file(path);
    }
    if let Some(density) = args.node_density {
        config = config.with_node_density(density);
    }
    for (net, volts) in &args.net_voltages {
        config = config.with_net_voltage(net, *volts);
    }
    config
}

fn run(args: &Args) -> Result<bool> {
    let text = std::fs::read_to_string(&args.design_file).map_err(|e| IrError::read(&args.design_file, e))?;
    let design = Design::parse(&text)?;
    let mut solver = IrSolver::new(&design, &design, config_from_args(args));

    if args.connectivity_only {
        let report = solver.connection_test()?;
        println!(
            "{}: {} nodes, {} source nodes, {} unconnected",
            args.net,
            report.nodes,
            report.sources,
            report.unconnected.len()
        );
        return Ok(report.is_connected());
    }

    let result = solver.solve()?;
    println!("Net                 : {}", result.net);
    println!("Supply voltage      : {:.4e} V", result.nominal_voltage);
    println!("Worst-case voltage  : {:.4e} V", result.worst_voltage);
    println!("Average voltage     : {:.4e} V", result.average_voltage);
    println!("Worst-case IR drop  : {:.4e} V", result.worst_drop);
    println!("Max current         : {:.4e} A", result.max_current);
    println!("Average current     : {:.4e} A", result.average_current);
    println!("Resistors           : {}", result.num_resistors);
    println!("Nodes               : {}", result.num_nodes);
    if let Some(violations) = result.em_violations {
        println!("EM violations       : {}", violations);
    }
    if !result.is_complete() {
        println!("Floating nodes      : {}", result.floating.len());
    }
    Ok(result.is_complete())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
