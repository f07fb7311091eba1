//! Geometry-to-mesh translation.
//!
//! Turns the special wires and vias of one supply net into a [`GMat`]:
//!
//! 1. Vias are split into junctions ([`via_cuts`]).
//! 2. Every level gets nodes at via junctions, at wire ends and at sampling
//!    points along each wire. Sampling is densest on the bottom level and
//!    coarsens by one density step per level above it. Sampling points
//!    inside a blocking macro are dropped.
//! 3. Consecutive nodes along each wire are joined by
//!    `sheet_resistance * length / width`; via junctions by
//!    `via_resistance / cuts`.
//!
//! Levels and wires are independent, so steps 1 to 3 run on the rayon pool;
//! node indices are assigned afterwards in level/location order.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::{debug, info_span};

use super::gmat::{GMat, LevelSeeds};
use super::node::{EdgeKind, NodeEnclosure, NodeIdx};
use super::vias::{via_cuts, ViaCut};
use crate::design::{Direction, Layer, LayoutProvider, Macro, ParasiticsProvider, Point, Rect};
use crate::error::{IrError, Result};

/// Builds the resistor mesh of one net.
pub struct MeshBuilder<'a> {
    layout: &'a dyn LayoutProvider,
    parasitics: Option<&'a dyn ParasiticsProvider>,
    net: &'a str,
    node_density: i64,
}

/// A resistor computed for a wire, before it is added to the mesh.
type PendingResistor = (NodeIdx, NodeIdx, f64, EdgeKind);

impl<'a> MeshBuilder<'a> {
    /// `node_density` is the bottom-level sampling pitch in DBU.
    pub fn new(layout: &'a dyn LayoutProvider, net: &'a str, node_density: i64) -> Self {
        Self {
            layout,
            parasitics: None,
            net,
            node_density,
        }
    }

    /// Use extracted segment resistances where the engine has them.
    pub fn with_parasitics(mut self, parasitics: &'a dyn ParasiticsProvider) -> Self {
        self.parasitics = Some(parasitics);
        self
    }

    /// Build the mesh. Nodes no resistor touches are dropped.
    pub fn build(&self) -> Result<GMat> {
        let _span = info_span!("build_mesh", net = self.net).entered();

        if self.node_density <= 0 {
            return Err(IrError::config(format!(
                "node density must be positive, got {} DBU",
                self.node_density
            )));
        }

        let layers: HashMap<u32, &Layer> = self.layout.layers().iter().map(|l| (l.level, l)).collect();

        let mut shapes: BTreeMap<u32, Vec<Rect>> = BTreeMap::new();
        for wire in self.layout.wires(self.net) {
            if !layers.contains_key(&wire.level) {
                return Err(IrError::UnknownLayer {
                    layer: format!("level {}", wire.level),
                });
            }
            shapes.entry(wire.level).or_default().push(wire.rect);
        }
        let (bottom, top) = match (shapes.keys().next(), shapes.keys().next_back()) {
            (Some(&b), Some(&t)) => (b, t),
            _ => {
                return Err(IrError::EmptyGrid {
                    net: self.net.to_string(),
                });
            }
        };

        let no_shapes: Vec<Rect> = Vec::new();
        let cuts: Vec<ViaCut> = self
            .layout
            .vias(self.net)
            .par_iter()
            .map(|via| {
                let bot = shapes.get(&via.bottom).unwrap_or(&no_shapes);
                let top = shapes.get(&via.top).unwrap_or(&no_shapes);
                via_cuts(via, bot, top)
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        for cut in &cuts {
            for level in [cut.bottom, cut.top] {
                if !layers.contains_key(&level) {
                    return Err(IrError::UnknownLayer {
                        layer: format!("level {}", level),
                    });
                }
            }
        }

        let blockers: Vec<&Macro> = self.layout.macros().iter().collect();
        let mut levels: Vec<u32> = shapes.keys().copied().collect();
        for cut in &cuts {
            for level in [cut.bottom, cut.top] {
                if !levels.contains(&level) {
                    levels.push(level);
                }
            }
        }
        levels.sort_unstable();

        let seeds: Vec<LevelSeeds> = levels
            .par_iter()
            .map(|&level| {
                let step = self.node_density * (1 + i64::from(level.saturating_sub(bottom)));
                let wires = shapes.get(&level).map(Vec::as_slice).unwrap_or(&[]);
                (level, self.level_seeds(level, step, wires, &cuts, &blockers))
            })
            .collect();

        let mut gmat = GMat::new(seeds, self.node_density);
        debug!(
            nodes = gmat.num_nodes(),
            bottom, top, junctions = cuts.len(), "placed mesh nodes"
        );

        let wire_list: Vec<(u32, Rect)> = shapes
            .iter()
            .flat_map(|(&level, rects)| rects.iter().map(move |r| (level, *r)))
            .collect();
        // Widest landing pad per level bounds the wire search window.
        let mut reach: HashMap<u32, i64> = HashMap::new();
        for node in gmat.nodes() {
            let r = reach.entry(node.level).or_default();
            *r = (*r).max(node.enclosure.reach());
        }
        let wire_resistors: Vec<Vec<PendingResistor>> = wire_list
            .par_iter()
            .map(|&(level, rect)| {
                let margin = reach.get(&level).copied().unwrap_or(0);
                self.wire_resistors(&gmat, layers[&level], rect, margin)
            })
            .collect();

        for (a, b, r, kind) in wire_resistors.into_iter().flatten() {
            gmat.add_resistor(a, b, r, kind)?;
        }

        for cut in &cuts {
            let (Some(a), Some(b)) = (
                gmat.find_node(cut.bottom, cut.loc),
                gmat.find_node(cut.top, cut.loc),
            ) else {
                continue;
            };
            let r = layers[&cut.bottom].via_resistance / f64::from(cut.cuts.max(1));
            gmat.add_resistor(
                a,
                b,
                r,
                EdgeKind::Via {
                    bottom: cut.bottom,
                    cuts: cut.cuts,
                },
            )?;
        }

        let before = gmat.num_nodes();
        let gmat = gmat.without_isolated();
        if gmat.num_nodes() == 0 {
            return Err(IrError::EmptyGrid {
                net: self.net.to_string(),
            });
        }
        debug!(
            dropped = before - gmat.num_nodes(),
            resistors = gmat.num_resistors(),
            "mesh connected"
        );
        Ok(gmat)
    }

    fn level_seeds(
        &self,
        level: u32,
        step: i64,
        wires: &[Rect],
        cuts: &[ViaCut],
        blockers: &[&Macro],
    ) -> Vec<(Point, NodeEnclosure)> {
        let mut points = Vec::new();

        for cut in cuts {
            if cut.bottom == level {
                points.push((cut.loc, cut.bottom_enclosure));
            } else if cut.top == level {
                points.push((cut.loc, cut.top_enclosure));
            }
        }

        let blocked = |p: Point| {
            blockers
                .iter()
                .any(|m| m.blocks(self.net, level) && m.rect.contains_strictly(p))
        };

        for rect in wires {
            let center = rect.center();
            let direction = rect.direction();
            let (lo, hi) = match direction {
                Direction::Horizontal => (rect.x_min, rect.x_max),
                Direction::Vertical => (rect.y_min, rect.y_max),
            };
            let at = |t: i64| match direction {
                Direction::Horizontal => Point::new(t, center.y),
                Direction::Vertical => Point::new(center.x, t),
            };

            points.push((at(lo), NodeEnclosure::default()));
            points.push((at(hi), NodeEnclosure::default()));

            let mut s = lo.div_euclid(step) * step;
            if s <= lo {
                s += step;
            }
            while s < hi {
                let p = at(s);
                if !blocked(p) {
                    points.push((p, NodeEnclosure::default()));
                }
                s += step;
            }
        }

        points
    }

    /// Resistors along one wire, joining its nodes in order.
    fn wire_resistors(&self, gmat: &GMat, layer: &Layer, rect: Rect, reach: i64) -> Vec<PendingResistor> {
        let direction = rect.direction();
        let (width, axis_lo, axis_hi, perp_lo, perp_hi) = match direction {
            Direction::Horizontal => (rect.dy(), rect.x_min, rect.x_max, rect.y_min, rect.y_max),
            Direction::Vertical => (rect.dx(), rect.y_min, rect.y_max, rect.x_min, rect.x_max),
        };
        let rho = layer.sheet_resistance;

        let window = rect.bloat(reach);

        // (axis, perp, pad resistance, node), clamped onto the wire.
        let mut on_wire: Vec<(i64, i64, f64, NodeIdx)> = gmat
            .nodes_in(layer.level, &window)
            .into_iter()
            .filter_map(|idx| {
                let node = gmat.node(idx);
                let pad = node.enclosure.pad(node.loc);
                if !rect.contains(node.loc) && !pad.intersects(&rect) {
                    return None;
                }
                let (axis, perp) = match direction {
                    Direction::Horizontal => (node.loc.x, node.loc.y),
                    Direction::Vertical => (node.loc.y, node.loc.x),
                };
                let (pad_along, pad_across) = match direction {
                    Direction::Horizontal => (pad.dx(), pad.dy()),
                    Direction::Vertical => (pad.dy(), pad.dx()),
                };
                let axis_c = axis.clamp(axis_lo, axis_hi);
                let perp_c = perp.clamp(perp_lo, perp_hi);
                // Current leaving the pad sideways crosses `gap` of pad metal.
                let pad_r = rho * (perp - perp_c).abs() as f64 / pad_along.max(1) as f64
                    + rho * (axis - axis_c).abs() as f64 / pad_across.max(1) as f64;
                Some((axis_c, perp_c, pad_r, idx))
            })
            .collect();
        on_wire.sort_by(|x, y| (x.0, x.1, x.3).cmp(&(y.0, y.1, y.3)));

        let kind = EdgeKind::Wire {
            level: layer.level,
            width,
        };
        on_wire
            .windows(2)
            .map(|pair| {
                let (a0, p0, pad0, n0) = pair[0];
                let (a1, p1, pad1, n1) = pair[1];
                let extracted = self.parasitics.and_then(|px| {
                    px.segment_resistance(self.net, layer.level, gmat.node(n0).loc, gmat.node(n1).loc)
                });
                let r = extracted.unwrap_or_else(|| {
                    let length = (a1 - a0).abs() + (p1 - p0).abs();
                    rho * length as f64 / width as f64 + pad0 + pad1
                });
                (n0, n1, r, kind)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Design;
    use approx::assert_relative_eq;

    fn build(text: &str, density: i64) -> Result<GMat> {
        let design = Design::parse(text)?;
        MeshBuilder::new(&design, "VDD", density).with_parasitics(&design).build()
    }

    const HEADER: &str = "\
.layer M1 level=1 res=0.1 via_res=2
.layer M2 level=2 res=0.05 via_res=1
.layer M3 level=3 res=0.02
.net VDD power 1.0
";

    #[test]
    fn test_straight_wire_gives_one_resistor() {
        let g = build(&format!("{HEADER}.wire VDD M1 0 0 100 1\n"), 1000).unwrap();
        assert_eq!(g.num_nodes(), 2);
        assert_eq!(g.num_resistors(), 1);
        assert_relative_eq!(g.edges()[0].resistance(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sampling_splits_wire_evenly() {
        let g = build(&format!("{HEADER}.wire VDD M1 0 0 1000 10\n"), 250).unwrap();
        // 0, 250, 500, 750, 1000
        assert_eq!(g.num_nodes(), 5);
        assert_eq!(g.num_resistors(), 4);
        let total: f64 = g.edges().iter().map(|e| e.resistance()).sum();
        assert_relative_eq!(total, 0.1 * 1000.0 / 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_vertical_wire_samples_along_y() {
        let g = build(&format!("{HEADER}.wire VDD M1 0 0 10 1000\n"), 250).unwrap();
        assert_eq!(g.num_nodes(), 5);
        for y in [0, 250, 500, 750, 1000] {
            assert!(g.find_node(1, Point::new(5, y)).is_some(), "missing node at y={}", y);
        }
        let total: f64 = g.edges().iter().map(|e| e.resistance()).sum();
        assert_relative_eq!(total, 0.1 * 1000.0 / 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_upper_levels_sample_coarser() {
        let text = format!("{HEADER}.wire VDD M1 0 0 1200 10\n.wire VDD M2 0 100 1200 110\n");
        let g = build(&text, 200).unwrap();
        let m1 = g.nodes().iter().filter(|n| n.level == 1).count();
        let m2 = g.nodes().iter().filter(|n| n.level == 2).count();
        assert_eq!(m1, 7);
        assert_eq!(m2, 4);
    }

    #[test]
    fn test_via_joins_levels() {
        let text = format!(
            "{HEADER}.wire VDD M1 0 0 1000 10\n.wire VDD M2 500 0 510 1000\n.via VDD M1 M2 cut(502 2 508 8)\n"
        );
        let g = build(&text, 10_000).unwrap();
        let via = g
            .edges()
            .iter()
            .find(|e| matches!(e.kind, EdgeKind::Via { .. }))
            .unwrap();
        assert_relative_eq!(via.resistance(), 2.0, epsilon = 1e-12);
        let a = g.node(via.a);
        let b = g.node(via.b);
        assert_eq!(a.loc, Point::new(505, 5));
        assert_eq!((a.level, b.level), (1, 2));
    }

    #[test]
    fn test_repeated_vias_combine_in_parallel() {
        let text = format!(
            "{HEADER}.wire VDD M1 0 0 1000 10\n.wire VDD M2 500 0 510 1000\n\
             .via VDD M1 M2 cut(502 2 508 8)\n.via VDD M1 M2 cut(502 2 508 8)\n"
        );
        let g = build(&text, 10_000).unwrap();
        let vias: Vec<_> = g
            .edges()
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::Via { .. }))
            .collect();
        assert_eq!(vias.len(), 1);
        assert!(vias[0].resistance() < 2.0);
        assert_relative_eq!(vias[0].resistance(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_macro_blocks_sampling_unless_pass_through() {
        let wire = ".wire VDD M1 0 0 1000 10\n";
        let blocked = build(&format!("{HEADER}{wire}.macro ram 100 -50 900 50 level=1\n"), 100).unwrap();
        // only samples on the macro edge survive: 0, 100, 900, 1000
        assert_eq!(blocked.num_nodes(), 4);

        let open = build(&format!("{HEADER}{wire}.macro ram 100 -50 900 50 level=1 pass=VDD\n"), 100).unwrap();
        assert_eq!(open.num_nodes(), 11);
    }

    #[test]
    fn test_parasitic_overrides_geometry() {
        let text = format!("{HEADER}.wire VDD M1 0 0 100 1\n.parasitic VDD M1 0 0 100 0 3.5\n");
        let g = build(&text, 1000).unwrap();
        assert_relative_eq!(g.edges()[0].resistance(), 3.5, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_sheet_resistance_is_fatal() {
        let text = ".layer M1 level=1 res=0\n.net VDD power 1\n.wire VDD M1 0 0 100 1\n";
        assert!(matches!(build(text, 1000), Err(IrError::InvalidResistance { .. })));
    }

    #[test]
    fn test_missing_via_resistance_is_fatal() {
        let text = format!(
            "{HEADER}.wire VDD M2 0 0 1000 10\n.wire VDD M3 500 0 510 1000\n.via VDD M2 M3 cut(502 2 508 8)\n"
        );
        // M2 has via_res=1, so the M2-M3 via is fine
        assert!(build(&text, 10_000).is_ok());
        let text = format!(
            "{HEADER}.wire VDD M3 0 0 1000 10\n.layer M4 level=4 res=0.01\n.wire VDD M4 500 0 510 1000\n.via VDD M3 M4 cut(502 2 508 8)\n"
        );
        assert!(matches!(build(&text, 10_000), Err(IrError::InvalidResistance { .. })));
    }

    #[test]
    fn test_empty_net_is_fatal() {
        assert!(matches!(build(HEADER, 1000), Err(IrError::EmptyGrid { .. })));
    }

    #[test]
    fn test_pad_reaches_neighbouring_wire() {
        // The landing pad spans the gap between the cut and the M1 stripe.
        let text = format!(
            "{HEADER}.wire VDD M1 0 0 1000 10\n.wire VDD M2 500 0 510 1000\n\
             .via VDD M1 M2 cut(502 20 508 26) bot(500 0 510 30) top(500 0 510 30)\n"
        );
        let g = build(&text, 10_000).unwrap();
        let m1_nodes: Vec<_> = g.nodes().iter().filter(|n| n.level == 1).collect();
        assert_eq!(m1_nodes.len(), 3);
        let via_node = g.find_node(1, Point::new(505, 23)).unwrap();
        assert_eq!(g.degree(via_node), 3);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let text = format!(
            "{HEADER}.wire VDD M1 0 0 1000 10\n.wire VDD M1 0 500 1000 510\n.wire VDD M2 500 0 510 1000\n\
             .via VDD M1 M2 cut(502 2 508 8)\n.via VDD M1 M2 cut(502 502 508 508)\n"
        );
        let g1 = build(&text, 100).unwrap();
        let g2 = build(&text, 100).unwrap();
        assert_eq!(g1.num_nodes(), g2.num_nodes());
        assert_eq!(g1.edges(), g2.edges());
        let key = |g: &GMat| g.nodes().iter().map(|n| (n.level, n.loc, n.enclosure)).collect::<Vec<_>>();
        assert_eq!(key(&g1), key(&g2));
    }
}
