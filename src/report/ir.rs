//! IR-drop report and error log.

use std::io::{self, Write};

use super::to_um;
use crate::mesh::{GMat, NodeIdx};

/// Voltage seen by one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceVoltage {
    pub name: String,
    pub x_um: f64,
    pub y_um: f64,
    /// NaN when the instance node is floating
    pub voltage: f64,
}

/// Write the per-instance voltage report.
///
/// Format:
/// ```text
/// Instance name, X location, Y location, Voltage
/// u1, 10.000, 20.000, 1.098765e0
/// ```
pub fn write_ir_report<W: Write>(rows: &[InstanceVoltage], writer: &mut W) -> io::Result<()> {
    writeln!(writer, "Instance name, X location, Y location, Voltage")?;
    for row in rows {
        writeln!(
            writer,
            "{}, {:.3}, {:.3}, {:e}",
            row.name, row.x_um, row.y_um, row.voltage
        )?;
    }
    Ok(())
}

/// Write the nodes that failed a connectivity check.
pub fn write_error_log<W: Write>(
    gmat: &GMat,
    nodes: &[NodeIdx],
    dbu_per_micron: i64,
    writer: &mut W,
) -> io::Result<()> {
    if nodes.is_empty() {
        writeln!(writer, "# all nodes connected")?;
        return Ok(());
    }

    writeln!(writer, "# {} node(s) not connected to a voltage source", nodes.len())?;
    writeln!(writer, "Node, Level, X location, Y location, Current")?;
    for &idx in nodes {
        let node = gmat.node(idx);
        writeln!(
            writer,
            "{}, {}, {:.3}, {:.3}, {:e}",
            node.name(),
            node.level,
            to_um(node.loc.x, dbu_per_micron),
            to_um(node.loc.y, dbu_per_micron),
            node.current
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Point;
    use crate::mesh::NodeEnclosure;

    #[test]
    fn test_ir_report_rows() {
        let rows = vec![
            InstanceVoltage {
                name: "u1".into(),
                x_um: 1.5,
                y_um: 2.0,
                voltage: 0.95,
            },
            InstanceVoltage {
                name: "u2".into(),
                x_um: 0.0,
                y_um: 0.0,
                voltage: f64::NAN,
            },
        ];
        let mut out = Vec::new();
        write_ir_report(&rows, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "u1, 1.500, 2.000, 9.5e-1");
        assert!(lines[2].ends_with("NaN"));
    }

    #[test]
    fn test_error_log_lists_nodes() {
        let pts = vec![(Point::new(2000, 500), NodeEnclosure::default())];
        let mut g = GMat::new(vec![(1, pts)], 100);
        g.node_mut(NodeIdx(0)).current = -0.5;

        let mut out = Vec::new();
        write_error_log(&g, &[NodeIdx(0)], 1000, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("n1_2000_500, 1, 2.000, 0.500, -5e-1"));

        let mut out = Vec::new();
        write_error_log(&g, &[], 1000, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "# all nodes connected\n");
    }
}
