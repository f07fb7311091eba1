//! Voltage source resolution and snapping.
//!
//! Sources come from one of three places, in order of precedence: a user
//! source file, the chip pins of the net, or a bump grid synthesized over the
//! die. Each source is then attached to the top routing level of the mesh.

use std::fmt;

use tracing::{debug, warn};

use crate::design::{LayoutProvider, Net, NetKind, Point, Rect};
use crate::dsl::SourceEntry;
use crate::error::{IrError, Result};
use crate::mesh::{GMat, NodeIdx};

/// Voltages closer than this are the same source value.
const VOLTAGE_EPSILON: f64 = 1e-12;

/// Where a source location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Read from a voltage source file
    UserSpecified,
    /// A chip I/O pin of the net
    Pin,
    /// One bump of a synthesized uniform grid
    BumpGrid,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::UserSpecified => write!(f, "user"),
            SourceKind::Pin => write!(f, "pin"),
            SourceKind::BumpGrid => write!(f, "bump"),
        }
    }
}

/// A resolved voltage source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceData {
    pub x: i64,
    pub y: i64,
    /// Side of the contact square (DBU)
    pub size: i64,
    pub voltage: f64,
    pub level: u32,
    pub kind: SourceKind,
}

impl SourceData {
    pub fn user_specified(&self) -> bool {
        self.kind == SourceKind::UserSpecified
    }

    pub fn loc(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Contact square of the source.
    pub fn contact(&self) -> Rect {
        Rect::centered(self.loc(), self.size)
    }
}

/// Nominal voltage of `net`: per-net override, then the declared net
/// voltage, then 0 V for a ground net.
///
/// With `require_voltage` an unresolvable or non-positive power-net voltage
/// is a configuration error.
pub fn resolve_voltage(net: &Net, voltage_override: Option<f64>, require_voltage: bool) -> Result<Option<f64>> {
    let voltage = voltage_override.or(net.voltage).or(match net.kind {
        NetKind::Ground => Some(0.0),
        NetKind::Power => None,
    });

    match voltage {
        Some(v) if !v.is_finite() => Err(IrError::config(format!("voltage of net '{}' is not finite", net.name))),
        Some(v) if require_voltage && net.kind == NetKind::Power && v <= 0.0 => Err(IrError::config(format!(
            "supply voltage of power net '{}' must be positive, got {} V",
            net.name, v
        ))),
        None if require_voltage => Err(IrError::MissingVoltage { net: net.name.clone() }),
        other => Ok(other),
    }
}

/// Source placement settings, all lengths in DBU.
#[derive(Debug, Clone, Copy)]
pub struct SourcePlan {
    pub level: u32,
    pub nominal: Option<f64>,
    pub bump_pitch: (i64, i64),
    pub bump_size: i64,
    pub require_voltage: bool,
}

/// Collect the sources of `net`.
///
/// User entries (µm) win over pins, and pins over the synthesized bump grid.
pub fn collect_sources(
    layout: &dyn LayoutProvider,
    net: &Net,
    user: Option<&[SourceEntry]>,
    plan: &SourcePlan,
) -> Result<Vec<SourceData>> {
    let dbu = layout.dbu_per_micron() as f64;
    let to_dbu = |um: f64| (um * dbu).round() as i64;

    let voltage_for = |explicit: Option<f64>| -> Result<f64> {
        match explicit.or(plan.nominal) {
            Some(v) => {
                if plan.require_voltage && net.kind == NetKind::Power && v <= 0.0 {
                    return Err(IrError::config(format!(
                        "source voltage on power net '{}' must be positive, got {} V",
                        net.name, v
                    )));
                }
                Ok(v)
            }
            None if plan.require_voltage => Err(IrError::MissingVoltage { net: net.name.clone() }),
            // Connectivity-only runs never read the value.
            None => Ok(0.0),
        }
    };

    if let Some(entries) = user.filter(|e| !e.is_empty()) {
        return entries
            .iter()
            .map(|e| {
                Ok(SourceData {
                    x: to_dbu(e.x_um),
                    y: to_dbu(e.y_um),
                    size: to_dbu(e.size_um),
                    voltage: voltage_for(e.voltage)?,
                    level: plan.level,
                    kind: SourceKind::UserSpecified,
                })
            })
            .collect();
    }

    let pins = layout.pins(&net.name);
    if !pins.is_empty() {
        let voltage = voltage_for(None)?;
        return Ok(pins
            .iter()
            .map(|pin| {
                let c = pin.rect.center();
                SourceData {
                    x: c.x,
                    y: c.y,
                    size: pin.rect.dx().max(pin.rect.dy()),
                    voltage,
                    level: plan.level,
                    kind: SourceKind::Pin,
                }
            })
            .collect());
    }

    let voltage = voltage_for(None)?;
    let bumps = bump_grid(layout.die_area(), plan.bump_pitch)?;
    debug!(count = bumps.len(), "synthesized bump grid");
    Ok(bumps
        .into_iter()
        .map(|p| SourceData {
            x: p.x,
            y: p.y,
            size: plan.bump_size,
            voltage,
            level: plan.level,
            kind: SourceKind::BumpGrid,
        })
        .collect())
}

/// Bump locations at `pitch`, centered in `die`.
pub fn bump_grid(die: Rect, pitch: (i64, i64)) -> Result<Vec<Point>> {
    let (px, py) = pitch;
    if px <= 0 || py <= 0 {
        return Err(IrError::config(format!("bump pitch must be positive, got {} x {} DBU", px, py)));
    }

    let axis = |lo: i64, span: i64, pitch: i64| -> Vec<i64> {
        let count = (span / pitch).max(1);
        let start = lo + (span - (count - 1) * pitch) / 2;
        (0..count).map(|i| start + i * pitch).collect()
    };
    let xs = axis(die.x_min, die.dx(), px);
    let ys = axis(die.y_min, die.dy(), py);

    Ok(ys
        .iter()
        .flat_map(|&y| xs.iter().map(move |&x| Point::new(x, y)))
        .collect())
}

/// Mark mesh nodes as fixed-voltage sources.
///
/// A source takes every node of its level inside its contact square, or the
/// nearest one when the square holds none. Returns the distinct source nodes.
pub fn attach_sources(gmat: &mut GMat, sources: &[SourceData]) -> Result<Vec<NodeIdx>> {
    let mut attached = Vec::new();

    for src in sources {
        let mut targets = gmat.nodes_in(src.level, &src.contact());
        if targets.is_empty() {
            match gmat.nearest_node(src.level, src.loc()) {
                Some(idx) => targets.push(idx),
                None => {
                    warn!(x = src.x, y = src.y, level = src.level, "source has no mesh level to attach to");
                    continue;
                }
            }
        }

        for idx in targets {
            let node = gmat.node_mut(idx);
            match node.source {
                Some(v) if (v - src.voltage).abs() > VOLTAGE_EPSILON => {
                    return Err(IrError::ConflictingSources {
                        x: node.loc.x,
                        y: node.loc.y,
                        first: v,
                        second: src.voltage,
                    });
                }
                Some(_) => {}
                None => {
                    node.source = Some(src.voltage);
                    node.current = 0.0;
                    attached.push(idx);
                }
            }
        }
    }

    attached.sort_unstable();
    Ok(attached)
}
