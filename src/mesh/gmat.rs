//! Conductance matrix builder: the node arena and its resistors.

use std::collections::{BTreeMap, HashMap};

use super::locator::NodeLocator;
use super::node::{Edge, EdgeKind, Node, NodeEnclosure, NodeIdx};
use crate::design::{Point, Rect};
use crate::error::{IrError, Result};

/// Node positions of one level, as produced by mesh construction.
pub type LevelSeeds = (u32, Vec<(Point, NodeEnclosure)>);

/// Resistor mesh of one supply net.
///
/// Nodes are stored in an arena addressed by [`NodeIdx`], ordered by level
/// and then by location so that rebuilding from the same geometry always
/// yields the same indices. Resistors between the same pair of nodes are
/// merged by adding conductances.
#[derive(Debug, Clone)]
pub struct GMat {
    nodes: Vec<Node>,
    lookup: HashMap<(u32, Point), NodeIdx>,
    locators: BTreeMap<u32, NodeLocator>,
    edges: Vec<Edge>,
    edge_lookup: HashMap<(NodeIdx, NodeIdx), usize>,
    adjacency: Vec<Vec<usize>>,
    cell: i64,
}

impl GMat {
    /// Create the node arena from per-level seeds.
    ///
    /// `cell` is the bucket size of the per-level spatial index.
    pub fn new(mut seeds: Vec<LevelSeeds>, cell: i64) -> Self {
        seeds.sort_by_key(|(level, _)| *level);

        let mut nodes = Vec::new();
        let mut lookup = HashMap::new();
        for (level, mut points) in seeds {
            points.sort_by_key(|(p, _)| *p);
            points.dedup_by(|next, kept| {
                if next.0 == kept.0 {
                    kept.1 = kept.1.merge(&next.1);
                    true
                } else {
                    false
                }
            });
            for (loc, enclosure) in points {
                let idx = NodeIdx(nodes.len());
                lookup.insert((level, loc), idx);
                nodes.push(Node::new(idx, loc, level, enclosure));
            }
        }

        let mut per_level: BTreeMap<u32, Vec<(Point, NodeIdx)>> = BTreeMap::new();
        for node in &nodes {
            per_level
                .entry(node.level)
                .or_default()
                .push((node.loc, node.idx));
        }
        let locators = per_level
            .into_iter()
            .map(|(level, pts)| (level, NodeLocator::new(pts, cell)))
            .collect();

        let adjacency = vec![Vec::new(); nodes.len()];
        Self {
            nodes,
            lookup,
            locators,
            edges: Vec::new(),
            edge_lookup: HashMap::new(),
            adjacency,
            cell,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct resistors.
    pub fn num_resistors(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx.0]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Resistors incident to `idx`.
    pub fn incident(&self, idx: NodeIdx) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency[idx.0].iter().map(move |&e| &self.edges[e])
    }

    /// Neighbor nodes of `idx` with the resistance towards each.
    pub fn neighbors(&self, idx: NodeIdx) -> impl Iterator<Item = (NodeIdx, f64)> + '_ {
        self.incident(idx).map(move |e| (e.other(idx), e.resistance()))
    }

    pub fn degree(&self, idx: NodeIdx) -> usize {
        self.adjacency[idx.0].len()
    }

    /// Exact lookup of a node by level and location.
    pub fn find_node(&self, level: u32, loc: Point) -> Option<NodeIdx> {
        self.lookup.get(&(level, loc)).copied()
    }

    /// Nearest node on `level`.
    pub fn nearest_node(&self, level: u32, loc: Point) -> Option<NodeIdx> {
        self.locators.get(&level)?.nearest(loc)
    }

    /// Nodes of `level` whose location lies in `rect`.
    pub fn nodes_in(&self, level: u32, rect: &Rect) -> Vec<NodeIdx> {
        self.locators
            .get(&level)
            .map(|l| l.within(rect))
            .unwrap_or_default()
    }

    /// Levels that carry nodes, lowest first.
    pub fn levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.locators.keys().copied()
    }

    pub fn bottom_level(&self) -> Option<u32> {
        self.locators.keys().next().copied()
    }

    pub fn top_level(&self) -> Option<u32> {
        self.locators.keys().next_back().copied()
    }

    /// Add a resistor between two nodes.
    ///
    /// The resistance must be finite and strictly positive; anything else is
    /// a geometry-consistency error.
    pub fn add_resistor(&mut self, a: NodeIdx, b: NodeIdx, resistance: f64, kind: EdgeKind) -> Result<()> {
        if !(resistance.is_finite() && resistance > 0.0) || a == b {
            let (na, nb) = (self.node(a), self.node(b));
            return Err(IrError::InvalidResistance {
                level: na.level,
                x0: na.loc.x,
                y0: na.loc.y,
                x1: nb.loc.x,
                y1: nb.loc.y,
                value: resistance,
            });
        }

        let key = if a < b { (a, b) } else { (b, a) };
        let conductance = 1.0 / resistance;
        if let Some(&e) = self.edge_lookup.get(&key) {
            self.edges[e].combine(conductance, kind);
            return Ok(());
        }

        let e = self.edges.len();
        self.edges.push(Edge {
            a: key.0,
            b: key.1,
            conductance,
            kind,
        });
        self.edge_lookup.insert(key, e);
        self.adjacency[a.0].push(e);
        self.adjacency[b.0].push(e);
        Ok(())
    }

    /// Rebuild the mesh without nodes that no resistor touches.
    pub fn without_isolated(self) -> Self {
        let kept: Vec<bool> = self.adjacency.iter().map(|adj| !adj.is_empty()).collect();
        if kept.iter().all(|k| *k) {
            return self;
        }

        let mut seeds: BTreeMap<u32, Vec<(Point, NodeEnclosure)>> = BTreeMap::new();
        for node in self.nodes.iter().filter(|n| kept[n.idx.0]) {
            seeds
                .entry(node.level)
                .or_default()
                .push((node.loc, node.enclosure));
        }

        let mut compact = GMat::new(seeds.into_iter().collect(), self.cell);
        for edge in &self.edges {
            let (na, nb) = (self.node(edge.a), self.node(edge.b));
            // Both ends survive because the edge touches them.
            if let (Some(a), Some(b)) = (
                compact.find_node(na.level, na.loc),
                compact.find_node(nb.level, nb.loc),
            ) {
                let key = if a < b { (a, b) } else { (b, a) };
                let e = compact.edges.len();
                compact.edges.push(Edge {
                    a: key.0,
                    b: key.1,
                    ..edge.clone()
                });
                compact.edge_lookup.insert(key, e);
                compact.adjacency[a.0].push(e);
                compact.adjacency[b.0].push(e);
            }
        }
        compact
    }

    /// Clear sources, currents and voltages while keeping the topology.
    pub fn reset_state(&mut self) {
        for node in &mut self.nodes {
            node.source = None;
            node.current = 0.0;
            node.voltage = f64::NAN;
        }
    }

    /// Current-drawing nodes.
    pub fn load_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(|n| n.has_load())
    }

    /// Fixed-voltage nodes.
    pub fn source_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(|n| n.is_source())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_mesh() -> GMat {
        let pts = vec![
            (Point::new(100, 0), NodeEnclosure::default()),
            (Point::new(0, 0), NodeEnclosure::default()),
            (Point::new(200, 0), NodeEnclosure::default()),
        ];
        GMat::new(vec![(2, vec![(Point::new(0, 0), NodeEnclosure::default())]), (1, pts)], 50)
    }

    #[test]
    fn test_node_order_is_level_then_location() {
        let g = line_mesh();
        assert_eq!(g.num_nodes(), 4);
        assert_eq!(g.node(NodeIdx(0)).loc, Point::new(0, 0));
        assert_eq!(g.node(NodeIdx(1)).loc, Point::new(100, 0));
        assert_eq!(g.node(NodeIdx(3)).level, 2);
        assert_eq!(g.bottom_level(), Some(1));
        assert_eq!(g.top_level(), Some(2));
    }

    #[test]
    fn test_duplicate_seeds_merge_enclosures() {
        let enc = NodeEnclosure {
            dx_lo: 5,
            dy_lo: 0,
            dx_hi: 0,
            dy_hi: 0,
        };
        let g = GMat::new(
            vec![(1, vec![(Point::new(0, 0), NodeEnclosure::default()), (Point::new(0, 0), enc)])],
            10,
        );
        assert_eq!(g.num_nodes(), 1);
        assert_eq!(g.node(NodeIdx(0)).enclosure.dx_lo, 5);
    }

    #[test]
    fn test_parallel_resistors_merge() {
        let mut g = line_mesh();
        let kind = EdgeKind::Wire { level: 1, width: 10 };
        g.add_resistor(NodeIdx(0), NodeIdx(1), 10.0, kind).unwrap();
        g.add_resistor(NodeIdx(1), NodeIdx(0), 10.0, kind).unwrap();
        assert_eq!(g.num_resistors(), 1);
        assert!((g.edges()[0].resistance() - 5.0).abs() < 1e-12);
        assert_eq!(g.edges()[0].kind, EdgeKind::Wire { level: 1, width: 20 });
        assert_eq!(g.degree(NodeIdx(0)), 1);
    }

    #[test]
    fn test_non_positive_resistance_is_fatal() {
        let mut g = line_mesh();
        let kind = EdgeKind::Wire { level: 1, width: 10 };
        assert!(matches!(
            g.add_resistor(NodeIdx(0), NodeIdx(1), 0.0, kind),
            Err(IrError::InvalidResistance { .. })
        ));
        assert!(g.add_resistor(NodeIdx(0), NodeIdx(1), -1.0, kind).is_err());
        assert!(g.add_resistor(NodeIdx(0), NodeIdx(1), f64::INFINITY, kind).is_err());
    }

    #[test]
    fn test_without_isolated_reindexes() {
        let mut g = line_mesh();
        let kind = EdgeKind::Wire { level: 1, width: 10 };
        g.add_resistor(NodeIdx(1), NodeIdx(2), 10.0, kind).unwrap();
        let g = g.without_isolated();
        assert_eq!(g.num_nodes(), 2);
        assert_eq!(g.num_resistors(), 1);
        assert_eq!(g.node(NodeIdx(0)).loc, Point::new(100, 0));
        assert_eq!(g.neighbors(NodeIdx(0)).next().map(|(n, _)| n), Some(NodeIdx(1)));
        assert_eq!(g.top_level(), Some(1));
    }

    #[test]
    fn test_nearest_and_window() {
        let g = line_mesh();
        assert_eq!(g.nearest_node(1, Point::new(160, 30)), Some(NodeIdx(2)));
        assert_eq!(g.nodes_in(1, &Rect::new(50, -1, 250, 1)), vec![NodeIdx(1), NodeIdx(2)]);
        assert_eq!(g.nearest_node(7, Point::new(0, 0)), None);
    }
}
