//! # IR Drop Core
//!
//! Static IR-drop analysis for chip power-delivery networks.
//!
//! This library provides:
//! - A line-oriented design format for supply-net geometry, technology and power
//! - Geometry-to-mesh translation of wires and vias into a resistor network
//! - Voltage source resolution from source files, pins or a bump grid
//! - Sparse nodal analysis of the mesh (direct or iterative)
//! - IR, electromigration and SPICE artifacts
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`dsl`] - Parser for the design format and voltage source files
//! - [`design`] - Physical design data and the collaborator traits
//! - [`mesh`] - Resistor mesh of a supply net
//! - [`solver`] - Source attachment, current injection, connectivity and solving
//! - [`report`] - Output artifacts
//!
//! ## Usage
//!
//! ### Native CLI
//!
//! ```bash
//! irdrop chip.pdn --net VDD --vsrc bumps.csv --out ir.rpt --spice grid.sp
//! ```
//!
//! ### Library
//!
//! ```no_run
//! use irdrop_core::{Design, IrSolver, IrSolverConfig};
//!
//! let design = Design::parse(&std::fs::read_to_string("chip.pdn")?)?;
//! let config = IrSolverConfig::new("VDD").with_bump_pitch(140.0, 140.0);
//! let mut solver = IrSolver::new(&design, &design, config);
//! let result = solver.solve()?;
//! println!("worst voltage: {:.4} V", result.worst_voltage);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Analysis Method
//!
//! For the analyzed net:
//!
//! 1. Discretize wires into nodes and join them with `R = rho * L / W`
//! 2. Join levels with via resistors, parallel cuts combined
//! 3. Fix source nodes at the supply voltage
//! 4. Inject `P / V` at the node under each instance
//! 5. Solve `G V = J` on the reduced (non-source) system
//!
//! Voltages are absolute. Loads on a power net draw current out of the mesh,
//! so node voltages sit below the supply; on a ground net they sit above 0 V.

pub mod design;
pub mod dsl;
pub mod error;
pub mod mesh;
pub mod report;
pub mod solver;

// Re-export main types for convenience
pub use design::{Design, LayoutProvider, ParasiticsProvider, PowerProvider};
pub use error::{IrError, Result};
pub use mesh::GMat;
pub use solver::{IrResult, IrSolver, IrSolverConfig, SolverKind};
