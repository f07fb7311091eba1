//! Main IR solver interface.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, info_span, warn};

use super::connectivity::{check_connection, check_connectivity, ConnectionReport};
use super::current::{inject_currents, Injection};
use super::linear::{solve_voltages, LinearOptions, SolveStats, SolverKind};
use super::sources::{attach_sources, collect_sources, resolve_voltage, SourceData, SourcePlan};
use super::{
    DEFAULT_BUMP_PITCH_UM, DEFAULT_BUMP_SIZE_UM, DEFAULT_MAX_ITERATIONS, DEFAULT_NODE_DENSITY_FACTOR,
    DEFAULT_TOLERANCE,
};
use crate::design::{LayoutProvider, Net, NetKind, ParasiticsProvider, PowerProvider};
use crate::dsl::{parse_source_file, SourceEntry};
use crate::error::{IrError, Result};
use crate::mesh::{GMat, MeshBuilder, Node, NodeIdx};
use crate::report::{self, InstanceVoltage};

/// Configuration for the IR solver.
#[derive(Debug, Clone)]
pub struct IrSolverConfig {
    /// Supply net to analyze.
    pub net: String,
    /// Voltage source location file (µm).
    pub source_file: Option<PathBuf>,
    /// In-memory source locations; used when no file is given.
    pub sources: Vec<SourceEntry>,
    /// Per-instance voltage report.
    pub report_file: Option<PathBuf>,
    /// Floating / unconnected node log.
    pub error_file: Option<PathBuf>,
    /// Electromigration report; written only with `em_analysis`.
    pub em_file: Option<PathBuf>,
    /// SPICE netlist of the mesh.
    pub spice_file: Option<PathBuf>,
    pub em_analysis: bool,
    /// Bump pitch in x and y (µm).
    pub bump_pitch_um: (f64, f64),
    /// Side of a synthesized bump contact (µm).
    pub bump_size_um: f64,
    /// Absolute bottom-level node spacing (µm); overrides the factor.
    pub node_density_um: Option<f64>,
    /// Node spacing as bump pitch divided by this factor.
    pub node_density_factor: f64,
    /// Supply voltage overrides keyed by net name.
    pub net_voltages: HashMap<String, f64>,
    /// Analysis corner for power and supply lookup.
    pub corner: Option<String>,
    pub solver: SolverKind,
    /// Relative residual target for the iterative solver.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Whether a missing source voltage is fatal.
    pub require_voltage: bool,
}

impl Default for IrSolverConfig {
    fn default() -> Self {
        Self {
            net: String::new(),
            source_file: None,
            sources: Vec::new(),
            report_file: None,
            error_file: None,
            em_file: None,
            spice_file: None,
            em_analysis: false,
            bump_pitch_um: (DEFAULT_BUMP_PITCH_UM, DEFAULT_BUMP_PITCH_UM),
            bump_size_um: DEFAULT_BUMP_SIZE_UM,
            node_density_um: None,
            node_density_factor: DEFAULT_NODE_DENSITY_FACTOR,
            net_voltages: HashMap::new(),
            corner: None,
            solver: SolverKind::Auto,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            require_voltage: true,
        }
    }
}

impl IrSolverConfig {
    /// Create a configuration for `net` with default values.
    pub fn new(net: impl Into<String>) -> Self {
        Self {
            net: net.into(),
            ..Self::default()
        }
    }

    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceEntry>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_report_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_file = Some(path.into());
        self
    }

    pub fn with_error_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_file = Some(path.into());
        self
    }

    /// Enable electromigration analysis, writing the report to `path`.
    pub fn with_em_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.em_analysis = true;
        self.em_file = Some(path.into());
        self
    }

    pub fn with_em_analysis(mut self, enabled: bool) -> Self {
        self.em_analysis = enabled;
        self
    }

    pub fn with_spice_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.spice_file = Some(path.into());
        self
    }

    /// Set the bump pitch (µm).
    pub fn with_bump_pitch(mut self, x_um: f64, y_um: f64) -> Self {
        self.bump_pitch_um = (x_um, y_um);
        self
    }

    pub fn with_bump_size(mut self, size_um: f64) -> Self {
        self.bump_size_um = size_um;
        self
    }

    /// Set the absolute node spacing (µm).
    pub fn with_node_density(mut self, density_um: f64) -> Self {
        self.node_density_um = Some(density_um);
        self
    }

    /// Set the node spacing as bump pitch / `factor`.
    pub fn with_node_density_factor(mut self, factor: f64) -> Self {
        self.node_density_factor = factor;
        self
    }

    /// Override the supply voltage of `net`.
    pub fn with_net_voltage(mut self, net: impl Into<String>, voltage: f64) -> Self {
        self.net_voltages.insert(net.into(), voltage);
        self
    }

    pub fn with_corner(mut self, corner: impl Into<String>) -> Self {
        self.corner = Some(corner.into());
        self
    }

    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// Set the conjugate gradient tolerance and iteration cap.
    ///
    /// - 1e-10 (default): matches the direct solver to well below a microvolt
    /// - 1e-6: fast, fine for sign-off screening of large grids
    pub fn with_tolerance(mut self, tolerance: f64, max_iterations: usize) -> Self {
        self.tolerance = tolerance;
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_require_voltage(mut self, require: bool) -> Self {
        self.require_voltage = require;
        self
    }

    /// Reject values no analysis can run with.
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;

        if self.net.is_empty() {
            return Err(IrError::config("no net to analyze"));
        }
        if !positive(self.bump_pitch_um.0) || !positive(self.bump_pitch_um.1) {
            return Err(IrError::config(format!(
                "bump pitch must be positive, got {} x {} um",
                self.bump_pitch_um.0, self.bump_pitch_um.1
            )));
        }
        if !(self.bump_size_um.is_finite() && self.bump_size_um >= 0.0) {
            return Err(IrError::config(format!("invalid bump size {} um", self.bump_size_um)));
        }
        if let Some(d) = self.node_density_um {
            if !positive(d) {
                return Err(IrError::config(format!("node density must be positive, got {} um", d)));
            }
        }
        if !positive(self.node_density_factor) {
            return Err(IrError::config(format!(
                "node density factor must be positive, got {}",
                self.node_density_factor
            )));
        }
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(IrError::config(format!("solver tolerance must be in (0, 1), got {}", self.tolerance)));
        }
        if self.max_iterations == 0 {
            return Err(IrError::config("solver iteration cap must be at least 1"));
        }
        if let Some((net, v)) = self.net_voltages.iter().find(|(_, v)| !v.is_finite()) {
            return Err(IrError::config(format!("voltage override for '{}' is not finite: {}", net, v)));
        }
        Ok(())
    }

    /// Bottom-level node spacing in µm.
    pub fn node_density_um(&self) -> f64 {
        self.node_density_um
            .unwrap_or(self.bump_pitch_um.0 / self.node_density_factor)
    }

    fn linear_options(&self) -> LinearOptions {
        LinearOptions {
            kind: self.solver,
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
        }
    }
}

/// Outcome of one solve.
#[derive(Debug, Clone)]
pub struct IrResult {
    pub net: String,
    /// Resolved supply voltage of the net
    pub nominal_voltage: f64,
    /// Lowest voltage (highest on a ground net) among loaded bottom-level nodes
    pub worst_voltage: f64,
    pub average_voltage: f64,
    /// `|nominal - worst|`
    pub worst_drop: f64,
    /// Largest current magnitude injected at one node (A)
    pub max_current: f64,
    /// Mean current magnitude over loaded nodes (A)
    pub average_current: f64,
    /// Signed sum of injected currents (A)
    pub total_current: f64,
    pub num_nodes: usize,
    pub num_resistors: usize,
    pub num_sources: usize,
    /// Loaded nodes with no path to a source; their voltage is NaN
    pub floating: Vec<NodeIdx>,
    pub instance_voltages: Vec<InstanceVoltage>,
    /// Electromigration violations, when analyzed
    pub em_violations: Option<usize>,
    pub stats: SolveStats,
}

impl IrResult {
    /// Whether every loaded node reached a source.
    pub fn is_complete(&self) -> bool {
        self.floating.is_empty()
    }
}

/// The IR-drop solver for one supply net.
///
/// The mesh and all electrical state are rebuilt on every [`IrSolver::solve`]
/// call; nothing carries over between calls.
pub struct IrSolver<'a> {
    layout: &'a dyn LayoutProvider,
    power: &'a dyn PowerProvider,
    parasitics: Option<&'a dyn ParasiticsProvider>,
    config: IrSolverConfig,
    cancel: Arc<AtomicBool>,
    /// Mesh of the last run; kept after a solver failure for diagnosis
    gmat: Option<GMat>,
    sources: Vec<SourceData>,
    injection: Injection,
    result: Option<IrResult>,
}

impl<'a> IrSolver<'a> {
    pub fn new(layout: &'a dyn LayoutProvider, power: &'a dyn PowerProvider, config: IrSolverConfig) -> Self {
        Self {
            layout,
            power,
            parasitics: None,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            gmat: None,
            sources: Vec::new(),
            injection: Injection::default(),
            result: None,
        }
    }

    /// Use extracted segment resistances where available.
    pub fn with_parasitics(mut self, parasitics: &'a dyn ParasiticsProvider) -> Self {
        self.parasitics = Some(parasitics);
        self
    }

    /// Flag that aborts the pipeline at the next stage boundary.
    ///
    /// Setting it does not interrupt a factorization already running.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &IrSolverConfig {
        &self.config
    }

    /// Mesh of the last build, if any.
    pub fn gmat(&self) -> Option<&GMat> {
        self.gmat.as_ref()
    }

    pub fn sources(&self) -> &[SourceData] {
        &self.sources
    }

    /// Injected current per node of the last solve, zero at sources.
    pub fn current_vector(&self) -> Vec<f64> {
        self.gmat
            .as_ref()
            .map(|g| g.nodes().iter().map(|n| n.current).collect())
            .unwrap_or_default()
    }

    /// Instance-to-node mapping of the last solve.
    pub fn injection(&self) -> &Injection {
        &self.injection
    }

    pub fn result(&self) -> Option<&IrResult> {
        self.result.as_ref()
    }

    /// Bottom-level node spacing in DBU.
    pub fn minimum_resolution(&self) -> i64 {
        let dbu = self.layout.dbu_per_micron() as f64;
        ((self.config.node_density_um() * dbu).round() as i64).max(1)
    }

    fn checkpoint(&self, stage: &'static str) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            warn!(stage, "IR analysis cancelled");
            return Err(IrError::Cancelled { stage });
        }
        Ok(())
    }

    fn net(&self) -> Result<Net> {
        self.layout
            .net(&self.config.net)
            .cloned()
            .ok_or_else(|| IrError::UnknownNet {
                net: self.config.net.clone(),
            })
    }

    fn user_sources(&self) -> Result<Vec<SourceEntry>> {
        match &self.config.source_file {
            Some(path) => parse_source_file(path),
            None => Ok(self.config.sources.clone()),
        }
    }

    /// Mesh the net and attach its sources.
    fn build(&mut self, require_voltage: bool) -> Result<(Net, Option<f64>)> {
        self.gmat = None;
        self.sources.clear();
        self.injection = Injection::default();
        self.result = None;

        self.config.validate()?;
        let net = self.net()?;
        let nominal = resolve_voltage(&net, self.config.net_voltages.get(&net.name).copied(), require_voltage)?;
        let user = self.user_sources()?;

        self.checkpoint("meshing")?;
        let mut builder = MeshBuilder::new(self.layout, &self.config.net, self.minimum_resolution());
        if let Some(px) = self.parasitics {
            builder = builder.with_parasitics(px);
        }
        let mut gmat = builder.build()?;

        let dbu = self.layout.dbu_per_micron() as f64;
        let to_dbu = |um: f64| ((um * dbu).round() as i64).max(1);
        let plan = SourcePlan {
            level: gmat.top_level().unwrap_or(0),
            nominal,
            bump_pitch: (to_dbu(self.config.bump_pitch_um.0), to_dbu(self.config.bump_pitch_um.1)),
            bump_size: (self.config.bump_size_um * dbu).round() as i64,
            require_voltage,
        };
        let user = (!user.is_empty()).then_some(user.as_slice());
        let sources = collect_sources(self.layout, &net, user, &plan)?;
        let attached = attach_sources(&mut gmat, &sources)?;
        info!(
            net = %net.name,
            nodes = gmat.num_nodes(),
            resistors = gmat.num_resistors(),
            sources = sources.len(),
            source_nodes = attached.len(),
            "built power grid"
        );

        self.sources = sources;
        self.gmat = Some(gmat);
        Ok((net, nominal))
    }

    /// Run the full analysis.
    pub fn solve(&mut self) -> Result<&IrResult> {
        let _span = info_span!("ir_solve", net = %self.config.net).entered();

        let (net, nominal) = self.build(self.config.require_voltage)?;
        let nominal = nominal.ok_or_else(|| IrError::MissingVoltage { net: net.name.clone() })?;
        let supply = match net.kind {
            NetKind::Power => nominal,
            NetKind::Ground => self
                .power
                .supply_voltage(self.config.corner.as_deref())
                .ok_or_else(|| IrError::MissingVoltage { net: net.name.clone() })?,
        };

        self.checkpoint("current injection")?;
        let instances = self.power.instance_powers(self.config.corner.as_deref());
        let (injection, connectivity) = {
            let gmat = self.mesh_mut()?;
            let injection = inject_currents(gmat, &net, &instances, supply)?;
            (injection, check_connectivity(gmat, &net.name)?)
        };
        self.write_error_log(&connectivity.floating)?;

        self.checkpoint("solve")?;
        let options = self.config.linear_options();
        let solved = solve_voltages(self.mesh_mut()?, &connectivity.reachable, &options);
        let stats = match solved {
            Ok(stats) => stats,
            Err(e) => {
                if e.is_solver_failure() {
                    warn!(error = %e, "solver failed; mesh kept for diagnosis");
                    self.write_spice()?;
                }
                return Err(e);
            }
        };

        let gmat = self.mesh()?;
        let bottom = gmat.bottom_level();
        let on_bottom = |n: &&Node| Some(n.level) == bottom && !n.is_source() && n.voltage.is_finite();
        let mut voltages: Vec<f64> = gmat
            .nodes()
            .iter()
            .filter(on_bottom)
            .filter(|n| n.has_load())
            .map(|n| n.voltage)
            .collect();
        if voltages.is_empty() {
            voltages = gmat.nodes().iter().filter(on_bottom).map(|n| n.voltage).collect();
        }
        let worst_voltage = match (voltages.is_empty(), net.kind) {
            (true, _) => nominal,
            (false, NetKind::Power) => voltages.iter().copied().fold(f64::INFINITY, f64::min),
            (false, NetKind::Ground) => voltages.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        let average_voltage = if voltages.is_empty() {
            nominal
        } else {
            voltages.iter().sum::<f64>() / voltages.len() as f64
        };

        let loads: Vec<f64> = gmat.load_nodes().map(|n| n.current.abs()).collect();
        let max_current = loads.iter().copied().fold(0.0, f64::max);
        let average_current = if loads.is_empty() {
            0.0
        } else {
            loads.iter().sum::<f64>() / loads.len() as f64
        };

        let dbu = self.layout.dbu_per_micron();
        let instance_voltages = injection
            .taps
            .iter()
            .map(|tap| InstanceVoltage {
                name: tap.name.clone(),
                x_um: report::to_um(tap.loc.x, dbu),
                y_um: report::to_um(tap.loc.y, dbu),
                voltage: gmat.node(tap.node).voltage,
            })
            .collect();

        let mut result = IrResult {
            net: net.name.clone(),
            nominal_voltage: nominal,
            worst_voltage,
            average_voltage,
            worst_drop: (nominal - worst_voltage).abs(),
            max_current,
            average_current,
            total_current: injection.total_current,
            num_nodes: gmat.num_nodes(),
            num_resistors: gmat.num_resistors(),
            num_sources: gmat.source_nodes().count(),
            floating: connectivity.floating,
            instance_voltages,
            em_violations: None,
            stats,
        };
        info!(
            worst_voltage = result.worst_voltage,
            average_voltage = result.average_voltage,
            worst_drop = result.worst_drop,
            max_current = result.max_current,
            resistors = result.num_resistors,
            floating = result.floating.len(),
            "IR analysis complete"
        );

        self.injection = injection;
        self.write_reports(&mut result)?;
        self.result = Some(result);
        self.result
            .as_ref()
            .ok_or_else(|| IrError::config("no result recorded"))
    }

    /// Check that the grid forms one connected structure from a source.
    ///
    /// No voltage is required and no current is injected.
    pub fn connection_test(&mut self) -> Result<ConnectionReport> {
        let _span = info_span!("connection_test", net = %self.config.net).entered();

        self.build(false)?;
        self.checkpoint("connectivity")?;
        let report = check_connection(self.mesh()?, &self.config.net)?;
        self.write_error_log(&report.unconnected)?;
        if report.is_connected() {
            info!(nodes = report.nodes, "grid is fully connected");
        } else {
            warn!(
                unconnected = report.unconnected.len(),
                nodes = report.nodes,
                "grid is not fully connected"
            );
        }
        Ok(report)
    }

    /// Write the SPICE netlist of the current mesh, if configured.
    pub fn write_spice(&self) -> Result<()> {
        let (Some(path), Some(gmat)) = (&self.config.spice_file, &self.gmat) else {
            return Ok(());
        };
        report::write_to_file(path, |w| report::write_spice(gmat, &self.config.net, w))
    }

    fn mesh(&self) -> Result<&GMat> {
        self.gmat
            .as_ref()
            .ok_or_else(|| IrError::EmptyGrid { net: self.config.net.clone() })
    }

    fn mesh_mut(&mut self) -> Result<&mut GMat> {
        let net = self.config.net.clone();
        self.gmat.as_mut().ok_or(IrError::EmptyGrid { net })
    }

    fn write_error_log(&self, nodes: &[NodeIdx]) -> Result<()> {
        let (Some(path), Some(gmat)) = (&self.config.error_file, &self.gmat) else {
            return Ok(());
        };
        let dbu = self.layout.dbu_per_micron();
        report::write_to_file(path, |w| report::write_error_log(gmat, nodes, dbu, w))
    }

    fn write_reports(&self, result: &mut IrResult) -> Result<()> {
        if let Some(path) = &self.config.report_file {
            report::write_to_file(path, |w| report::write_ir_report(&result.instance_voltages, w))?;
        }
        self.write_spice()?;

        if self.config.em_analysis {
            let gmat = self.mesh()?;
            let segments = report::em_segments(gmat, self.layout.layers(), self.layout.dbu_per_micron());
            let violations = segments.iter().filter(|s| s.is_violation()).count();
            if let Some(path) = &self.config.em_file {
                report::write_to_file(path, |w| report::write_em_report(gmat, &segments, w).map(|_| ()))?;
            }
            if violations > 0 {
                warn!(violations, "electromigration limits exceeded");
            }
            result.em_violations = Some(violations);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{Design, Point};
    use approx::assert_relative_eq;

    /// One M1 stripe: source at the left end, a 1 W load at the right end.
    const STRIPE: &str = "\
.layer M1 level=1 res=0.1
.net VDD power 1.0
.wire VDD M1 0 0 100 1
.inst load 90 0 110 0 1.0
";

    fn stripe_config() -> IrSolverConfig {
        IrSolverConfig::new("VDD")
            .with_node_density(1.0)
            .with_sources(vec![SourceEntry {
                x_um: 0.0,
                y_um: 0.0,
                size_um: 0.0,
                voltage: None,
            }])
    }

    /// Two-level grid fed by bumps.
    const GRID: &str = "\
.units 1000
.die 0 0 200000 200000
.layer M1 level=1 res=0.08 via_res=0.5 em=0.01
.layer M2 level=2 res=0.02
.net VDD power 1.1
.net VSS ground
.supply 1.1
.wire VDD M1 0 50000 200000 50400
.wire VDD M1 0 150000 200000 150400
.wire VDD M2 50000 0 50800 200000
.wire VDD M2 150000 0 150800 200000
.via VDD M1 M2 cut(50100 50100 50700 50300)
.via VDD M1 M2 cut(150100 50100 150700 50300)
.via VDD M1 M2 cut(50100 150100 50700 150300)
.via VDD M1 M2 cut(150100 150100 150700 150300)
.wire VSS M1 0 100000 200000 100400
.wire VSS M2 100000 0 100800 200000
.via VSS M1 M2 cut(100100 100100 100700 100300)
.inst u1 20000 40000 30000 60000 0.01
.inst u2 100000 140000 110000 160000 0.02
.inst u3 180000 40000 190000 60000 0.015
";

    fn grid_config(net: &str) -> IrSolverConfig {
        IrSolverConfig::new(net).with_bump_pitch(100.0, 100.0).with_node_density(10.0)
    }

    #[test]
    fn test_single_segment_example() {
        let design = Design::parse(STRIPE).unwrap();
        let mut solver = IrSolver::new(&design, &design, stripe_config());
        let result = solver.solve().unwrap().clone();

        let gmat = solver.gmat().unwrap();
        assert_eq!(result.num_resistors, 1);
        assert_relative_eq!(gmat.edges()[0].resistance(), 10.0, epsilon = 1e-12);
        let a = gmat.find_node(1, Point::new(0, 0)).unwrap();
        let b = gmat.find_node(1, Point::new(100, 0)).unwrap();
        assert_eq!(gmat.node(a).voltage, 1.0);
        assert_relative_eq!(gmat.node(b).voltage, -9.0, epsilon = 1e-9);
        assert_relative_eq!(result.worst_voltage, -9.0, epsilon = 1e-9);
        assert_relative_eq!(result.worst_drop, 10.0, epsilon = 1e-9);
        assert_relative_eq!(result.max_current, 1.0);
        assert_eq!(solver.current_vector(), vec![0.0, -1.0]);
    }

    #[test]
    fn test_sources_keep_their_voltage() {
        let design = Design::parse(GRID).unwrap();
        let mut solver = IrSolver::new(&design, &design, grid_config("VDD"));
        let result = solver.solve().unwrap().clone();
        assert!(result.num_sources > 0);
        assert!(result.is_complete());

        let gmat = solver.gmat().unwrap();
        for node in gmat.source_nodes() {
            assert_eq!(node.voltage, 1.1);
        }
        assert!(result.worst_voltage < 1.1);
        assert!(result.worst_voltage <= result.average_voltage);
        assert_relative_eq!(result.worst_drop, 1.1 - result.worst_voltage, epsilon = 1e-12);
    }

    #[test]
    fn test_kirchhoff_current_balance() {
        let design = Design::parse(GRID).unwrap();
        let mut solver = IrSolver::new(&design, &design, grid_config("VDD"));
        let result = solver.solve().unwrap().clone();
        let gmat = solver.gmat().unwrap();

        // current delivered by sources through their resistors
        let mut delivered = 0.0;
        for edge in gmat.edges() {
            let (a, b) = (gmat.node(edge.a), gmat.node(edge.b));
            match (a.is_source(), b.is_source()) {
                (true, false) => delivered += (a.voltage - b.voltage) * edge.conductance,
                (false, true) => delivered += (b.voltage - a.voltage) * edge.conductance,
                _ => {}
            }
        }
        let drawn = -result.total_current;
        assert_relative_eq!(drawn, (0.01 + 0.02 + 0.015) / 1.1, epsilon = 1e-12);
        assert_relative_eq!(delivered, drawn, epsilon = 1e-9);
    }

    #[test]
    fn test_ground_net_rises_above_zero() {
        let design = Design::parse(GRID).unwrap();
        let mut solver = IrSolver::new(&design, &design, grid_config("VSS"));
        let result = solver.solve().unwrap().clone();
        assert_eq!(result.nominal_voltage, 0.0);
        assert!(result.worst_voltage > 0.0);
        assert!(result.total_current > 0.0);
    }

    #[test]
    fn test_solve_is_idempotent() {
        let design = Design::parse(GRID).unwrap();
        let mut solver = IrSolver::new(&design, &design, grid_config("VDD"));
        let first = solver.solve().unwrap().clone();
        let v1: Vec<f64> = solver.gmat().unwrap().nodes().iter().map(|n| n.voltage).collect();
        let second = solver.solve().unwrap().clone();
        let v2: Vec<f64> = solver.gmat().unwrap().nodes().iter().map(|n| n.voltage).collect();

        assert_eq!(first.num_nodes, second.num_nodes);
        assert_eq!(first.num_resistors, second.num_resistors);
        assert_eq!(first.worst_voltage, second.worst_voltage);
        assert_eq!(v1, v2);
    }

    #[test]
    fn test_direct_and_iterative_agree() {
        let design = Design::parse(GRID).unwrap();
        let direct = IrSolver::new(&design, &design, grid_config("VDD").with_solver(SolverKind::Direct))
            .solve()
            .map(|r| r.worst_voltage)
            .unwrap();
        let cg = IrSolver::new(
            &design,
            &design,
            grid_config("VDD").with_solver(SolverKind::ConjugateGradient),
        )
        .solve()
        .map(|r| r.worst_voltage)
        .unwrap();
        assert_relative_eq!(direct, cg, epsilon = 1e-8);
    }

    #[test]
    fn test_floating_island_is_nan_with_warning() {
        let text = format!("{STRIPE}.wire VDD M1 0 500 100 501\n.inst lost 90 500 110 500 0.5\n");
        let design = Design::parse(&text).unwrap();
        let mut solver = IrSolver::new(&design, &design, stripe_config());
        let result = solver.solve().unwrap().clone();

        assert_eq!(result.floating.len(), 1);
        assert!(!result.is_complete());
        let gmat = solver.gmat().unwrap();
        assert!(gmat.node(result.floating[0]).voltage.is_nan());
        let lost = result.instance_voltages.iter().find(|r| r.name == "lost").unwrap();
        assert!(lost.voltage.is_nan());
        assert_relative_eq!(result.worst_voltage, -9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bump_fallback_on_small_die() {
        // One bump over the whole die captures both stripe nodes.
        let design = Design::parse(STRIPE).unwrap();
        let mut solver = IrSolver::new(&design, &design, IrSolverConfig::new("VDD").with_node_density(1.0));
        let result = solver.solve().unwrap().clone();
        assert_eq!(solver.sources().len(), 1);
        assert_eq!(result.num_sources, 2);
        assert_eq!(result.stats.unknowns, 0);
        assert_eq!(result.worst_voltage, 1.0);
        assert_eq!(solver.injection().on_sources, 1);
    }

    #[test]
    fn test_configuration_errors_before_meshing() {
        let design = Design::parse(STRIPE).unwrap();
        let err = IrSolver::new(&design, &design, IrSolverConfig::new("VDD").with_bump_pitch(0.0, 10.0))
            .solve()
            .map(|_| ())
            .unwrap_err();
        assert!(err.is_config());

        let err = IrSolver::new(&design, &design, IrSolverConfig::new("GND"))
            .solve()
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, IrError::UnknownNet { .. }));

        let text = ".layer M1 level=1 res=0.1\n.net VDD power\n.wire VDD M1 0 0 100 1\n";
        let design = Design::parse(text).unwrap();
        let mut solver = IrSolver::new(&design, &design, stripe_config());
        assert!(matches!(solver.solve(), Err(IrError::MissingVoltage { .. })));
        assert!(solver.gmat().is_none());

        let mut solver = IrSolver::new(&design, &design, stripe_config().with_net_voltage("VDD", 0.8));
        assert!(solver.solve().is_ok());
    }

    #[test]
    fn test_cancel_before_solve() {
        let design = Design::parse(GRID).unwrap();
        let mut solver = IrSolver::new(&design, &design, grid_config("VDD"));
        solver.cancel_handle().store(true, Ordering::Relaxed);
        assert!(matches!(solver.solve(), Err(IrError::Cancelled { .. })));
        assert!(solver.result().is_none());
    }

    #[test]
    fn test_connection_test_without_voltage() {
        let text = "\
.layer M1 level=1 res=0.1 via_res=1
.layer M2 level=2 res=0.1
.net VDD power
.wire VDD M1 0 0 1000 10
.wire VDD M2 500 0 510 1000
.wire VDD M2 800 0 810 1000
.via VDD M1 M2 cut(502 2 508 8)
";
        let design = Design::parse(text).unwrap();
        let config = IrSolverConfig::new("VDD")
            .with_node_density(0.5)
            .with_sources(vec![SourceEntry {
                x_um: 0.505,
                y_um: 1.0,
                size_um: 0.0,
                voltage: None,
            }]);
        let mut solver = IrSolver::new(&design, &design, config);
        let report = solver.connection_test().unwrap();
        // the M2 stripe at x=805 has no via
        assert!(!report.is_connected());
        assert!(report
            .unconnected
            .iter()
            .all(|idx| solver.gmat().unwrap().node(*idx).loc.x == 805));
    }

    #[test]
    fn test_em_analysis_flags_violations() {
        // Source mid-wire, 10 mA load at the right end: only the five right
        // segments carry current, 0.01 A/um against a 0.005 A/um limit.
        let text = "\
.units 1000
.layer M1 level=1 res=0.1 em=0.005
.net VDD power 1.1
.wire VDD M1 0 0 100000 1000
.inst load 99000 0 100000 1000 0.011
";
        let design = Design::parse(text).unwrap();
        let path = std::env::temp_dir().join(format!("irdrop_em_{}.rpt", std::process::id()));
        let config = IrSolverConfig::new("VDD")
            .with_node_density(10.0)
            .with_sources(vec![SourceEntry {
                x_um: 50.0,
                y_um: 0.5,
                size_um: 1.0,
                voltage: None,
            }])
            .with_em_report(&path);
        let mut solver = IrSolver::new(&design, &design, config);
        let result = solver.solve().unwrap();
        assert_eq!(result.em_violations, Some(5));

        let report = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let rows: Vec<&str> = report.lines().skip(2).collect();
        assert_eq!(rows.len(), 10);
        assert!(rows[..5].iter().all(|r| r.ends_with("VIOLATION")));
        assert!(rows[5..].iter().all(|r| r.ends_with(", ok")));
    }

    #[test]
    fn test_em_analysis_on_grid() {
        let design = Design::parse(GRID).unwrap();
        let config = grid_config("VDD").with_em_analysis(true);
        let mut solver = IrSolver::new(&design, &design, config);
        let result = solver.solve().unwrap().clone();
        let segments = report::em_segments(solver.gmat().unwrap(), design.layers(), design.dbu_per_micron());
        let expected = segments.iter().filter(|s| s.is_violation()).count();
        assert_eq!(result.em_violations, Some(expected));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(IrSolverConfig::new("VDD").validate().is_ok());
        assert!(IrSolverConfig::new("").validate().is_err());
        assert!(IrSolverConfig::new("VDD").with_node_density(-1.0).validate().is_err());
        assert!(IrSolverConfig::new("VDD").with_node_density_factor(0.0).validate().is_err());
        assert!(IrSolverConfig::new("VDD").with_tolerance(0.0, 10).validate().is_err());
        assert!(IrSolverConfig::new("VDD").with_tolerance(1e-8, 0).validate().is_err());
        assert_relative_eq!(IrSolverConfig::new("VDD").node_density_um(), 28.0);
    }
}
