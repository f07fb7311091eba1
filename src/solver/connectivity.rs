//! Mesh connectivity checks.
//!
//! Both checks share one breadth-first traversal over the resistor graph.
//! The full check seeds it with every source node and looks for floating
//! loads; the connection test seeds it with the first source only and
//! verifies that a single structure spans the whole mesh.

use std::collections::VecDeque;

use tracing::warn;

use crate::error::{IrError, Result};
use crate::mesh::{GMat, NodeIdx};

/// Where the traversal starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// Every source node
    AllSources,
    /// The lowest-indexed source node only
    FirstSource,
}

/// Nodes reachable through resistors from the selected sources.
pub fn reachable(gmat: &GMat, reach: Reach) -> Vec<bool> {
    let mut seen = vec![false; gmat.num_nodes()];
    let mut queue: VecDeque<NodeIdx> = gmat.source_nodes().map(|n| n.idx).collect();
    if reach == Reach::FirstSource {
        queue.truncate(1);
    }
    for idx in &queue {
        seen[idx.0] = true;
    }

    while let Some(idx) = queue.pop_front() {
        for edge in gmat.incident(idx) {
            if edge.conductance <= 0.0 {
                continue;
            }
            let next = edge.other(idx);
            if !seen[next.0] {
                seen[next.0] = true;
                queue.push_back(next);
            }
        }
    }
    seen
}

/// Result of the full connectivity check.
#[derive(Debug, Clone)]
pub struct ConnectivityReport {
    pub reachable: Vec<bool>,
    /// Current-drawing nodes no source reaches
    pub floating: Vec<NodeIdx>,
    pub reachable_loads: usize,
}

impl ConnectivityReport {
    pub fn is_fully_connected(&self) -> bool {
        self.floating.is_empty()
    }

    pub fn is_reachable(&self, idx: NodeIdx) -> bool {
        self.reachable[idx.0]
    }
}

/// Check that current-drawing nodes reach a source.
///
/// Floating loads are warnings. No source at all, or loads none of which is
/// reachable, is a global connectivity failure.
pub fn check_connectivity(gmat: &GMat, net: &str) -> Result<ConnectivityReport> {
    if gmat.source_nodes().next().is_none() {
        return Err(IrError::NoSources { net: net.to_string() });
    }

    let reachable = reachable(gmat, Reach::AllSources);
    let mut floating = Vec::new();
    let mut reachable_loads = 0;
    for node in gmat.load_nodes() {
        if reachable[node.idx.0] {
            reachable_loads += 1;
        } else {
            warn!(
                node = %node.name(),
                current = node.current,
                "floating node: current drawn with no path to a voltage source"
            );
            floating.push(node.idx);
        }
    }

    if reachable_loads == 0 && !floating.is_empty() {
        return Err(IrError::Disconnected { loads: floating.len() });
    }

    Ok(ConnectivityReport {
        reachable,
        floating,
        reachable_loads,
    })
}

/// Result of the connection test.
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub nodes: usize,
    pub sources: usize,
    /// Nodes not reached from the first source, sources included
    pub unconnected: Vec<NodeIdx>,
}

impl ConnectionReport {
    pub fn is_connected(&self) -> bool {
        self.unconnected.is_empty()
    }
}

/// Cheap pre-flight: does one connected structure, anchored at a source,
/// span every node of the mesh?
pub fn check_connection(gmat: &GMat, net: &str) -> Result<ConnectionReport> {
    let sources = gmat.source_nodes().count();
    if sources == 0 {
        return Err(IrError::NoSources { net: net.to_string() });
    }

    let reachable = reachable(gmat, Reach::FirstSource);
    let unconnected: Vec<NodeIdx> = gmat
        .nodes()
        .iter()
        .filter(|n| !reachable[n.idx.0])
        .map(|n| n.idx)
        .collect();
    for idx in unconnected.iter().take(20) {
        warn!(node = %gmat.node(*idx).name(), "node not connected to the grid");
    }

    Ok(ConnectionReport {
        nodes: gmat.num_nodes(),
        sources,
        unconnected,
    })
}
