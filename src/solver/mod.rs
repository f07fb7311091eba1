//! Static IR-drop solver.
//!
//! This module turns a meshed supply net into node voltages.
//!
//! ## Nodal analysis
//!
//! With resistor conductances `g` and injected node currents `J`, Kirchhoff's
//! current law at every non-source node gives
//!
//! ```text
//! sum over neighbours j of g_ij * (V_i - V_j) = J_i
//! ```
//!
//! i.e. `G V = J` with `G` the graph Laplacian. Source nodes have a fixed
//! voltage and are moved to the right-hand side, leaving the symmetric
//! positive-definite system `G' V' = J'`.
//!
//! ## Pipeline
//!
//! 1. Mesh the net ([`crate::mesh::MeshBuilder`])
//! 2. Resolve and attach voltage sources ([`sources`])
//! 3. Inject instance currents ([`current`])
//! 4. Check connectivity ([`connectivity`])
//! 5. Solve and extract results ([`linear`], [`IrSolver`])

pub mod connectivity;
pub mod current;
mod ir_solver;
pub mod linear;
pub mod sources;

pub use connectivity::{ConnectionReport, ConnectivityReport, Reach};
pub use current::{InstanceTap, Injection};
pub use ir_solver::{IrResult, IrSolver, IrSolverConfig};
pub use linear::{LinearOptions, SolveStats, SolverKind};
pub use sources::{SourceData, SourceKind};

/// Relative residual target for the conjugate gradient solver.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Iteration cap for the conjugate gradient solver.
pub const DEFAULT_MAX_ITERATIONS: usize = 20_000;

/// Largest system `SolverKind::Auto` hands to the direct solver.
///
/// Past a few thousand unknowns Jacobi-preconditioned CG beats the sparse
/// Cholesky factor on meshed grids, even under the RCM ordering.
pub const AUTO_DIRECT_LIMIT: usize = 4_000;

/// Default bump pitch in both directions (µm).
pub const DEFAULT_BUMP_PITCH_UM: f64 = 140.0;

/// Default side of a synthesized bump contact (µm).
pub const DEFAULT_BUMP_SIZE_UM: f64 = 10.0;

/// Default divisor turning bump pitch into node density.
pub const DEFAULT_NODE_DENSITY_FACTOR: f64 = 5.0;
