//! SPICE netlist of the resistor mesh.

use std::io::{self, Write};

use crate::mesh::{EdgeKind, GMat};

/// Write the mesh, its sources and its loads as a DC netlist.
///
/// Node names follow [`crate::mesh::Node::name`]. Loads become current
/// sources pushing the injected current into their node.
pub fn write_spice<W: Write>(gmat: &GMat, net: &str, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "* IR drop mesh of net {}", net)?;
    writeln!(
        writer,
        "* {} nodes, {} resistors",
        gmat.num_nodes(),
        gmat.num_resistors()
    )?;

    for (i, edge) in gmat.edges().iter().enumerate() {
        let tag = match edge.kind {
            EdgeKind::Wire { level, .. } => format!("wire M{}", level),
            EdgeKind::Via { bottom, cuts } => format!("via V{} x{}", bottom, cuts),
        };
        writeln!(
            writer,
            "R{} {} {} {:e} ; {}",
            i,
            gmat.node(edge.a).name(),
            gmat.node(edge.b).name(),
            edge.resistance(),
            tag
        )?;
    }

    for (i, node) in gmat.source_nodes().enumerate() {
        if let Some(v) = node.source {
            writeln!(writer, "V{} {} 0 {:e}", i, node.name(), v)?;
        }
    }

    for (i, node) in gmat.load_nodes().enumerate() {
        // current flows from 0 through the source into the node
        writeln!(writer, "I{} 0 {} {:e}", i, node.name(), node.current)?;
    }

    writeln!(writer, ".OP")?;
    writeln!(writer, ".END")?;
    Ok(())
}
