//! Resistor mesh of a supply net.
//!
//! The mesh is a graph of nodes (points on routing levels) joined by
//! resistors (wire segments and via junctions). [`MeshBuilder`] derives it
//! from layout geometry; [`GMat`] owns the nodes, the resistors and the
//! per-node electrical state (sources, injected currents, solved voltages).

mod builder;
mod gmat;
mod locator;
mod node;
mod vias;

pub use builder::MeshBuilder;
pub use gmat::{GMat, LevelSeeds};
pub use locator::NodeLocator;
pub use node::{Edge, EdgeKind, Node, NodeEnclosure, NodeIdx};
pub use vias::{via_cuts, ViaCut};
