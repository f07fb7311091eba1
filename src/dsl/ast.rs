//! Syntax tree for the power-grid design text.
//!
//! Records keep layer and net references as names; [`crate::design::Design::from_ast`]
//! resolves them against the declared technology.

use std::collections::HashMap;

use crate::design::Rect;

/// Complete parsed design description.
#[derive(Debug, Clone, Default)]
pub struct DesignAst {
    /// Database units per micron (`.units`)
    pub dbu_per_micron: Option<i64>,
    /// Die outline (`.die`)
    pub die: Option<Rect>,
    pub layers: Vec<LayerDef>,
    pub nets: Vec<NetDef>,
    /// Supply voltage per corner; the `None` key is the default corner
    pub supplies: HashMap<Option<String>, f64>,
    pub wires: Vec<WireDef>,
    pub vias: Vec<ViaDef>,
    pub macros: Vec<MacroDef>,
    pub pins: Vec<PinDef>,
    pub instances: Vec<InstDef>,
    pub corner_powers: Vec<CornerPowerDef>,
    pub parasitics: Vec<ParasiticDef>,
}

impl DesignAst {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `.layer <name> level=<n> res=<ohm/sq> [via_res=..] [em=..] [via_em=..]`
#[derive(Debug, Clone)]
pub struct LayerDef {
    pub name: String,
    pub params: HashMap<String, f64>,
    pub line: usize,
}

/// `.net <name> power|ground [<volts>]`
#[derive(Debug, Clone)]
pub struct NetDef {
    pub name: String,
    pub kind: String,
    pub voltage: Option<f64>,
    pub line: usize,
}

/// `.wire <net> <layer> <rect>`
#[derive(Debug, Clone)]
pub struct WireDef {
    pub net: String,
    pub layer: String,
    pub rect: Rect,
    pub line: usize,
}

/// `.via <net> <bot> <top> cut(..)... [bot(..)] [top(..)] [rows= cols=]`
#[derive(Debug, Clone)]
pub struct ViaDef {
    pub net: String,
    pub bottom: String,
    pub top: String,
    pub cuts: Vec<Rect>,
    pub bottom_enclosure: Option<Rect>,
    pub top_enclosure: Option<Rect>,
    pub params: HashMap<String, f64>,
    pub line: usize,
}

/// `.macro <name> <rect> [level=<n>] [pass=<net>]...`
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub rect: Rect,
    pub level: Option<u32>,
    pub pass_through: Vec<String>,
    pub line: usize,
}

/// `.pin <net> <layer> <rect>`
#[derive(Debug, Clone)]
pub struct PinDef {
    pub net: String,
    pub layer: String,
    pub rect: Rect,
    pub line: usize,
}

/// `.inst <name> <rect> <power> [net=<net>]...`
#[derive(Debug, Clone)]
pub struct InstDef {
    pub name: String,
    pub rect: Rect,
    pub power: f64,
    pub nets: Vec<String>,
    pub line: usize,
}

/// `.power <inst> <corner> <power>`
#[derive(Debug, Clone)]
pub struct CornerPowerDef {
    pub instance: String,
    pub corner: String,
    pub power: f64,
    pub line: usize,
}

/// `.parasitic <net> <layer> <ax> <ay> <bx> <by> <ohms>`
#[derive(Debug, Clone)]
pub struct ParasiticDef {
    pub net: String,
    pub layer: String,
    pub from: (i64, i64),
    pub to: (i64, i64),
    pub resistance: f64,
    pub line: usize,
}
