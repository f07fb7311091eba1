//! Mesh node and resistor types.

use std::fmt;

use crate::design::{Point, Rect};

/// Dense index of a node in the conductance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub usize);

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Metal overlap around a via junction on one level, measured from the
/// node location outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeEnclosure {
    pub dx_lo: i64,
    pub dy_lo: i64,
    pub dx_hi: i64,
    pub dy_hi: i64,
}

impl NodeEnclosure {
    /// Enclosure of `landing` as seen from `loc`. Sides that do not reach
    /// past the location are clamped to zero.
    pub fn around(loc: Point, landing: &Rect) -> Self {
        Self {
            dx_lo: (loc.x - landing.x_min).max(0),
            dy_lo: (loc.y - landing.y_min).max(0),
            dx_hi: (landing.x_max - loc.x).max(0),
            dy_hi: (landing.y_max - loc.y).max(0),
        }
    }

    pub fn merge(&self, other: &NodeEnclosure) -> NodeEnclosure {
        NodeEnclosure {
            dx_lo: self.dx_lo.max(other.dx_lo),
            dy_lo: self.dy_lo.max(other.dy_lo),
            dx_hi: self.dx_hi.max(other.dx_hi),
            dy_hi: self.dy_hi.max(other.dy_hi),
        }
    }

    /// Landing pad rectangle when placed at `loc`.
    pub fn pad(&self, loc: Point) -> Rect {
        Rect {
            x_min: loc.x - self.dx_lo,
            y_min: loc.y - self.dy_lo,
            x_max: loc.x + self.dx_hi,
            y_max: loc.y + self.dy_hi,
        }
    }

    /// Largest extent on any side.
    pub fn reach(&self) -> i64 {
        self.dx_lo.max(self.dy_lo).max(self.dx_hi).max(self.dy_hi)
    }
}

/// A mesh node: one point of one routing level.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub idx: NodeIdx,
    pub loc: Point,
    pub level: u32,
    pub enclosure: NodeEnclosure,
    /// Fixed voltage when the node is a source
    pub source: Option<f64>,
    /// Current injected into the node (negative for loads on a power net)
    pub current: f64,
    /// Solved voltage; NaN until solved or when unreachable
    pub voltage: f64,
}

impl Node {
    pub fn new(idx: NodeIdx, loc: Point, level: u32, enclosure: NodeEnclosure) -> Self {
        Self {
            idx,
            loc,
            level,
            enclosure,
            source: None,
            current: 0.0,
            voltage: f64::NAN,
        }
    }

    pub fn is_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn has_load(&self) -> bool {
        self.current != 0.0
    }

    /// Stable name used in netlists and reports.
    pub fn name(&self) -> String {
        format!("n{}_{}_{}", self.level, self.loc.x, self.loc.y)
    }
}

/// What a resistor models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeKind {
    /// Wire segment on `level`; `width` sums parallel shapes (DBU)
    Wire { level: u32, width: i64 },
    /// Via junction above `bottom`; `cuts` sums parallel cuts
    Via { bottom: u32, cuts: u32 },
}

/// A resistor between two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub a: NodeIdx,
    pub b: NodeIdx,
    pub conductance: f64,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn resistance(&self) -> f64 {
        1.0 / self.conductance
    }

    /// The node on the other side of `node`.
    pub fn other(&self, node: NodeIdx) -> NodeIdx {
        if self.a == node {
            self.b
        } else {
            self.a
        }
    }

    /// Add a parallel resistor of the same kind.
    pub(crate) fn combine(&mut self, conductance: f64, kind: EdgeKind) {
        self.conductance += conductance;
        self.kind = match (self.kind, kind) {
            (EdgeKind::Wire { level, width }, EdgeKind::Wire { width: w2, .. }) => {
                EdgeKind::Wire { level, width: width + w2 }
            }
            (EdgeKind::Via { bottom, cuts }, EdgeKind::Via { cuts: c2, .. }) => {
                EdgeKind::Via { bottom, cuts: cuts + c2 }
            }
            (existing, _) => existing,
        };
    }
}
