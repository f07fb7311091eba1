//! Electromigration check on solved branch currents.

use std::collections::HashMap;
use std::io::{self, Write};

use super::to_um;
use crate::design::Layer;
use crate::mesh::{EdgeKind, GMat, NodeIdx};

/// Current through one resistor of the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct EmSegment {
    pub from: NodeIdx,
    pub to: NodeIdx,
    pub kind: EdgeKind,
    /// Branch current magnitude (A)
    pub current: f64,
    /// A/µm of width for wires, A/cut for vias
    pub density: f64,
    pub limit: Option<f64>,
}

impl EmSegment {
    pub fn is_violation(&self) -> bool {
        self.limit.is_some_and(|limit| self.density > limit)
    }
}

/// Branch currents of every resistor with both ends solved.
pub fn em_segments(gmat: &GMat, layers: &[Layer], dbu_per_micron: i64) -> Vec<EmSegment> {
    let by_level: HashMap<u32, &Layer> = layers.iter().map(|l| (l.level, l)).collect();

    gmat.edges()
        .iter()
        .filter_map(|edge| {
            let va = gmat.node(edge.a).voltage;
            let vb = gmat.node(edge.b).voltage;
            if !(va.is_finite() && vb.is_finite()) {
                return None;
            }
            let current = ((va - vb) * edge.conductance).abs();
            let (density, limit) = match edge.kind {
                EdgeKind::Wire { level, width } => (
                    current / to_um(width.max(1), dbu_per_micron),
                    by_level.get(&level).and_then(|l| l.em_limit),
                ),
                EdgeKind::Via { bottom, cuts } => (
                    current / f64::from(cuts.max(1)),
                    by_level.get(&bottom).and_then(|l| l.via_em_limit),
                ),
            };
            Some(EmSegment {
                from: edge.a,
                to: edge.b,
                kind: edge.kind,
                current,
                density,
                limit,
            })
        })
        .collect()
}

/// Write the EM report, violations first. Returns the violation count.
pub fn write_em_report<W: Write>(gmat: &GMat, segments: &[EmSegment], writer: &mut W) -> io::Result<usize> {
    let mut ordered: Vec<&EmSegment> = segments.iter().collect();
    ordered.sort_by(|a, b| {
        b.is_violation()
            .cmp(&a.is_violation())
            .then(b.density.total_cmp(&a.density))
    });
    let violations = ordered.iter().filter(|s| s.is_violation()).count();

    writeln!(writer, "# {} segment(s), {} violation(s)", segments.len(), violations)?;
    writeln!(writer, "Segment, Node 1, Node 2, Current, Density, Limit, Status")?;
    for seg in ordered {
        let label = match seg.kind {
            EdgeKind::Wire { level, .. } => format!("wire M{}", level),
            EdgeKind::Via { bottom, .. } => format!("via V{}", bottom),
        };
        let limit = seg.limit.map_or_else(|| "-".to_string(), |l| format!("{:e}", l));
        writeln!(
            writer,
            "{}, {}, {}, {:e}, {:e}, {}, {}",
            label,
            gmat.node(seg.from).name(),
            gmat.node(seg.to).name(),
            seg.current,
            seg.density,
            limit,
            if seg.is_violation() { "VIOLATION" } else { "ok" }
        )?;
    }
    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Point;
    use crate::mesh::NodeEnclosure;
    use approx::assert_relative_eq;

    fn layer(level: u32, em: Option<f64>, via_em: Option<f64>) -> Layer {
        Layer {
            name: format!("M{}", level),
            level,
            sheet_resistance: 0.1,
            via_resistance: 1.0,
            em_limit: em,
            via_em_limit: via_em,
        }
    }

    fn solved() -> GMat {
        let mut g = GMat::new(
            vec![
                (1, vec![(Point::new(0, 0), NodeEnclosure::default()), (Point::new(100, 0), NodeEnclosure::default())]),
                (2, vec![(Point::new(100, 0), NodeEnclosure::default())]),
            ],
            100,
        );
        g.add_resistor(NodeIdx(0), NodeIdx(1), 10.0, EdgeKind::Wire { level: 1, width: 2000 })
            .unwrap();
        g.add_resistor(NodeIdx(1), NodeIdx(2), 1.0, EdgeKind::Via { bottom: 1, cuts: 4 })
            .unwrap();
        g.node_mut(NodeIdx(0)).voltage = 1.0;
        g.node_mut(NodeIdx(1)).voltage = 0.9;
        g.node_mut(NodeIdx(2)).voltage = 0.9;
        g
    }

    #[test]
    fn test_densities_per_width_and_per_cut() {
        let g = solved();
        let segs = em_segments(&g, &[layer(1, Some(0.004), Some(1.0))], 1000);
        assert_eq!(segs.len(), 2);
        // 0.1 V over 10 ohm through 2 um
        assert_relative_eq!(segs[0].current, 0.01, epsilon = 1e-12);
        assert_relative_eq!(segs[0].density, 0.005, epsilon = 1e-12);
        assert!(segs[0].is_violation());
        assert_relative_eq!(segs[1].current, 0.0);
        assert!(!segs[1].is_violation());
    }

    #[test]
    fn test_report_counts_violations() {
        let g = solved();
        let segs = em_segments(&g, &[layer(1, Some(0.004), None)], 1000);
        let mut out = Vec::new();
        let violations = write_em_report(&g, &segs, &mut out).unwrap();
        assert_eq!(violations, 1);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[2].starts_with("wire M1"));
        assert!(lines[2].ends_with("VIOLATION"));
        assert!(lines[3].contains(", -, ok"));
    }

    #[test]
    fn test_unsolved_edges_skipped() {
        let mut g = solved();
        g.node_mut(NodeIdx(2)).voltage = f64::NAN;
        assert_eq!(em_segments(&g, &[], 1000).len(), 1);
    }
}
