//! Physical design data consumed by the analyzer.
//!
//! The solver never talks to a layout or timing database directly. It sees
//! three collaborator traits:
//!
//! - [`LayoutProvider`] - supply-net wires, vias, macros, pins and layer technology
//! - [`PowerProvider`] - per-instance power for an analysis corner
//! - [`ParasiticsProvider`] - extracted segment resistances, when available
//!
//! [`Design`] implements all three from the design text format in [`crate::dsl`].

mod types;

use std::collections::{HashMap, HashSet};

pub use types::*;

use crate::dsl::DesignAst;
use crate::error::{IrError, Result};

/// Default database units per micron when the design does not say.
pub const DEFAULT_DBU_PER_MICRON: i64 = 1000;

/// Layout database view of the supply nets.
pub trait LayoutProvider: Sync {
    /// Database units per micron.
    fn dbu_per_micron(&self) -> i64;

    /// Die outline, used to synthesize bump grids.
    fn die_area(&self) -> Rect;

    /// Look up a supply net by name.
    fn net(&self, name: &str) -> Option<&Net>;

    /// Routing layer technology, in any order.
    fn layers(&self) -> &[Layer];

    /// Special-wire shapes of `net`.
    fn wires(&self, net: &str) -> &[Wire];

    /// Via instances of `net`.
    fn vias(&self, net: &str) -> &[Via];

    /// Placed macros of the design.
    fn macros(&self) -> &[Macro];

    /// Chip-level I/O terminals of `net`.
    fn pins(&self, net: &str) -> &[Pin];
}

/// Power analysis engine view.
pub trait PowerProvider {
    /// Total power of every leaf instance at `corner` (default corner when `None`).
    fn instance_powers(&self, corner: Option<&str>) -> Vec<InstancePower>;

    /// Supply voltage of the analyzed domain at `corner`.
    fn supply_voltage(&self, corner: Option<&str>) -> Option<f64>;
}

/// Parasitics engine view.
pub trait ParasiticsProvider: Sync {
    /// Extracted resistance between two points on one level, if known.
    fn segment_resistance(&self, net: &str, level: u32, a: Point, b: Point) -> Option<f64>;
}

type SegmentKey = (String, u32, Point, Point);

fn segment_key(net: &str, level: u32, a: Point, b: Point) -> SegmentKey {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    (net.to_string(), level, lo, hi)
}

/// In-memory design built from design text.
#[derive(Debug, Clone, Default)]
pub struct Design {
    pub dbu_per_micron: i64,
    pub die: Rect,
    pub layers: Vec<Layer>,
    pub nets: Vec<Net>,
    pub wires: HashMap<String, Vec<Wire>>,
    pub vias: HashMap<String, Vec<Via>>,
    pub macros: Vec<Macro>,
    pub pins: HashMap<String, Vec<Pin>>,
    pub instances: Vec<InstancePower>,
    /// Per-corner power overrides keyed by (instance, corner)
    pub corner_powers: HashMap<(String, String), f64>,
    /// Supply voltage per corner; `None` is the default corner
    pub supplies: HashMap<Option<String>, f64>,
    parasitics: HashMap<SegmentKey, f64>,
}

impl Design {
    /// Build a design from a parsed AST, resolving layer and net names.
    pub fn from_ast(ast: DesignAst) -> Result<Self> {
        let mut design = Design {
            dbu_per_micron: ast.dbu_per_micron.unwrap_or(DEFAULT_DBU_PER_MICRON),
            supplies: ast.supplies,
            ..Default::default()
        };

        let mut layer_levels: HashMap<String, u32> = HashMap::new();
        let mut used_levels = HashSet::new();
        for def in ast.layers {
            let level = def
                .params
                .get("level")
                .copied()
                .filter(|l| *l >= 1.0 && l.fract() == 0.0)
                .ok_or_else(|| IrError::parse(def.line, format!("layer '{}' needs an integer level >= 1", def.name)))?
                as u32;
            let sheet_resistance = *def
                .params
                .get("res")
                .ok_or_else(|| IrError::parse(def.line, format!("layer '{}' needs res=<ohm/sq>", def.name)))?;
            if layer_levels.contains_key(&def.name) || !used_levels.insert(level) {
                return Err(IrError::parse(def.line, format!("duplicate layer '{}' (level {})", def.name, level)));
            }
            layer_levels.insert(def.name.clone(), level);
            design.layers.push(Layer {
                name: def.name,
                level,
                sheet_resistance,
                via_resistance: def.params.get("via_res").copied().unwrap_or(0.0),
                em_limit: def.params.get("em").copied(),
                via_em_limit: def.params.get("via_em").copied(),
            });
        }
        design.layers.sort_by_key(|l| l.level);

        let resolve_layer = |name: &str| {
            layer_levels
                .get(name)
                .copied()
                .ok_or_else(|| IrError::UnknownLayer {
                    layer: name.to_string(),
                })
        };

        for def in ast.nets {
            let kind = NetKind::from_str(&def.kind).ok_or_else(|| {
                IrError::parse(def.line, format!("net kind must be power or ground, got '{}'", def.kind))
            })?;
            if design.nets.iter().any(|n| n.name == def.name) {
                return Err(IrError::parse(def.line, format!("duplicate net '{}'", def.name)));
            }
            design.nets.push(Net {
                name: def.name,
                kind,
                voltage: def.voltage,
            });
        }

        let net_names: HashSet<String> = design.nets.iter().map(|n| n.name.clone()).collect();
        let check_net = |net: &str| {
            if net_names.contains(net) {
                Ok(())
            } else {
                Err(IrError::UnknownNet {
                    net: net.to_string(),
                })
            }
        };

        let mut bbox: Option<Rect> = None;
        for def in ast.wires {
            check_net(&def.net)?;
            let level = resolve_layer(&def.layer)?;
            bbox = Some(bbox.map_or(def.rect, |b| b.merge(&def.rect)));
            design.wires.entry(def.net).or_default().push(Wire {
                level,
                rect: def.rect,
            });
        }

        for def in ast.vias {
            check_net(&def.net)?;
            let bottom = resolve_layer(&def.bottom)?;
            let top = resolve_layer(&def.top)?;
            let params = match (def.params.get("rows"), def.params.get("cols")) {
                (None, None) => None,
                (rows, cols) => Some(ViaParams {
                    rows: rows.copied().unwrap_or(1.0).max(1.0) as u32,
                    cols: cols.copied().unwrap_or(1.0).max(1.0) as u32,
                }),
            };
            design.vias.entry(def.net).or_default().push(Via {
                bottom: bottom.min(top),
                top: bottom.max(top),
                cuts: def.cuts,
                bottom_enclosure: def.bottom_enclosure,
                top_enclosure: def.top_enclosure,
                params,
            });
        }

        let lowest_level = design.layers.first().map(|l| l.level).unwrap_or(1);
        for def in ast.macros {
            design.macros.push(Macro {
                name: def.name,
                rect: def.rect,
                max_level: def.level.unwrap_or(lowest_level),
                pass_through: def.pass_through,
            });
        }

        for def in ast.pins {
            check_net(&def.net)?;
            let level = resolve_layer(&def.layer)?;
            design.pins.entry(def.net).or_default().push(Pin {
                level,
                rect: def.rect,
            });
        }

        let mut inst_names = HashSet::new();
        for def in ast.instances {
            if !inst_names.insert(def.name.clone()) {
                return Err(IrError::parse(def.line, format!("duplicate instance '{}'", def.name)));
            }
            for net in &def.nets {
                check_net(net)?;
            }
            bbox = Some(bbox.map_or(def.rect, |b| b.merge(&def.rect)));
            design.instances.push(InstancePower {
                name: def.name,
                bbox: def.rect,
                nets: def.nets,
                power: def.power,
            });
        }

        for def in ast.corner_powers {
            if !inst_names.contains(&def.instance) {
                return Err(IrError::parse(def.line, format!("unknown instance '{}'", def.instance)));
            }
            design
                .corner_powers
                .insert((def.instance, def.corner), def.power);
        }

        for def in ast.parasitics {
            check_net(&def.net)?;
            let level = resolve_layer(&def.layer)?;
            let a = Point::new(def.from.0, def.from.1);
            let b = Point::new(def.to.0, def.to.1);
            design
                .parasitics
                .insert(segment_key(&def.net, level, a, b), def.resistance);
        }

        design.die = ast.die.or(bbox).unwrap_or_default();
        Ok(design)
    }

    /// Parse design text and build the design in one step.
    pub fn parse(input: &str) -> Result<Self> {
        Self::from_ast(crate::dsl::parse(input)?)
    }

    /// Find a layer by routing level.
    pub fn layer(&self, level: u32) -> Option<&Layer> {
        self.layers.iter().find(|l| l.level == level)
    }
}

impl LayoutProvider for Design {
    fn dbu_per_micron(&self) -> i64 {
        self.dbu_per_micron
    }

    fn die_area(&self) -> Rect {
        self.die
    }

    fn net(&self, name: &str) -> Option<&Net> {
        self.nets.iter().find(|n| n.name == name)
    }

    fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn wires(&self, net: &str) -> &[Wire] {
        self.wires.get(net).map(Vec::as_slice).unwrap_or(&[])
    }

    fn vias(&self, net: &str) -> &[Via] {
        self.vias.get(net).map(Vec::as_slice).unwrap_or(&[])
    }

    fn macros(&self) -> &[Macro] {
        &self.macros
    }

    fn pins(&self, net: &str) -> &[Pin] {
        self.pins.get(net).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl PowerProvider for Design {
    fn instance_powers(&self, corner: Option<&str>) -> Vec<InstancePower> {
        self.instances
            .iter()
            .map(|inst| {
                let power = corner
                    .and_then(|c| self.corner_powers.get(&(inst.name.clone(), c.to_string())))
                    .copied()
                    .unwrap_or(inst.power);
                InstancePower {
                    power,
                    ..inst.clone()
                }
            })
            .collect()
    }

    fn supply_voltage(&self, corner: Option<&str>) -> Option<f64> {
        corner
            .and_then(|c| self.supplies.get(&Some(c.to_string())))
            .or_else(|| self.supplies.get(&None))
            .copied()
    }
}

impl ParasiticsProvider for Design {
    fn segment_resistance(&self, net: &str, level: u32, a: Point, b: Point) -> Option<f64> {
        if self.parasitics.is_empty() {
            return None;
        }
        self.parasitics.get(&segment_key(net, level, a, b)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "\
.units 1000
.layer M1 level=1 res=0.1 via_res=2
.layer M2 level=2 res=0.05
.net VDD power 1.1
.net VSS ground
.supply 1.1
.supply 0.9 corner=ss
.wire VDD M1 0 0 1000 10
.via VDD M1 M2 cut(0 0 10 10)
.pin VDD M2 0 0 10 10
.inst u1 0 0 100 100 1m
.power u1 ss 2m
.parasitic VDD M1 1000 5 0 5 0.5
";

    #[test]
    fn test_from_ast_resolves_layers() {
        let design = Design::parse(SMALL).unwrap();
        assert_eq!(design.layers().len(), 2);
        assert_eq!(design.wires("VDD")[0].level, 1);
        assert_eq!(design.vias("VDD")[0].top, 2);
        assert_eq!(design.pins("VDD")[0].level, 2);
        assert!(design.wires("VSS").is_empty());
        assert_eq!(design.net("VSS").unwrap().kind, NetKind::Ground);
    }

    #[test]
    fn test_corner_power_override() {
        let design = Design::parse(SMALL).unwrap();
        assert_eq!(design.instance_powers(None)[0].power, 1e-3);
        assert_eq!(design.instance_powers(Some("ss"))[0].power, 2e-3);
        assert_eq!(design.instance_powers(Some("ff"))[0].power, 1e-3);
        assert_eq!(design.supply_voltage(Some("ss")), Some(0.9));
        assert_eq!(design.supply_voltage(Some("ff")), Some(1.1));
    }

    #[test]
    fn test_parasitic_lookup_is_direction_free() {
        let design = Design::parse(SMALL).unwrap();
        let r = design.segment_resistance("VDD", 1, Point::new(0, 5), Point::new(1000, 5));
        assert_eq!(r, Some(0.5));
        assert_eq!(design.segment_resistance("VDD", 2, Point::new(0, 5), Point::new(1000, 5)), None);
    }

    #[test]
    fn test_unknown_layer_is_rejected() {
        let err = Design::parse(".net VDD power\n.wire VDD M9 0 0 1 1").unwrap_err();
        assert!(matches!(err, IrError::UnknownLayer { .. }));
    }

    #[test]
    fn test_unknown_net_is_rejected() {
        let err = Design::parse(".layer M1 level=1 res=0.1\n.wire VDD M1 0 0 1 1").unwrap_err();
        assert!(matches!(err, IrError::UnknownNet { .. }));
    }

    #[test]
    fn test_die_defaults_to_shape_bbox() {
        let design = Design::parse(SMALL).unwrap();
        assert_eq!(design.die_area(), Rect::new(0, 0, 1000, 100));
    }
}
