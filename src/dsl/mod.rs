//! Text formats consumed by the analyzer.
//!
//! The design text is a line-oriented description of a power grid: layer
//! technology, supply nets, special wires and vias, macros, I/O pins and
//! per-instance power. It stands in for the layout, power and parasitics
//! databases a full flow would query.
//!
//! # Grammar Overview
//!
//! ```text
//! design    = { line }
//! line      = comment | directive | empty
//! comment   = ('#' | ';') { any_char }
//! directive = '.' name { argument }
//! argument  = number | identifier | key '=' value | key '(' rect ')'
//! rect      = int int int int
//! ```
//!
//! # Directives
//!
//! | Directive | Syntax |
//! |-----------|--------|
//! | .units | `.units <dbu_per_micron>` |
//! | .die | `.die <x0> <y0> <x1> <y1>` |
//! | .layer | `.layer <name> level=<n> res=<ohm/sq> [via_res=<ohm>] [em=<A/um>] [via_em=<A>]` |
//! | .net | `.net <name> power\|ground [<volts>]` |
//! | .supply | `.supply <volts> [corner=<name>]` |
//! | .wire | `.wire <net> <layer> <x0> <y0> <x1> <y1>` |
//! | .via | `.via <net> <bot> <top> cut(..)... [bot(..)] [top(..)] [rows=<n> cols=<n>]` |
//! | .macro | `.macro <name> <x0> <y0> <x1> <y1> [level=<n>] [pass=<net>]` |
//! | .pin | `.pin <net> <layer> <x0> <y0> <x1> <y1>` |
//! | .inst | `.inst <name> <x0> <y0> <x1> <y1> <watts> [net=<net>]` |
//! | .power | `.power <inst> <corner> <watts>` |
//! | .parasitic | `.parasitic <net> <layer> <ax> <ay> <bx> <by> <ohms>` |
//!
//! # Example
//!
//! ```text
//! .units 1000
//! .layer M1 level=1 res=0.1 via_res=1.5
//! .layer M2 level=2 res=0.05
//! .net VDD power 1.1
//! .wire VDD M1 0 0 100000 1000
//! .wire VDD M2 50000 0 51000 100000
//! .via VDD M1 M2 cut(50300 300 50700 700)
//! .inst u1 10000 0 12000 2000 1m
//! ```

mod ast;
mod lexer;
mod parser;
mod vsrc;

pub use ast::*;
pub use lexer::{parse_value, Lexer, Token, TokenKind};
pub use parser::Parser;
pub use vsrc::{parse_source_file, parse_sources, SourceEntry};

use crate::error::{IrError, Result};

/// Parse design text into an AST.
pub fn parse(input: &str) -> Result<DesignAst> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer);
    parser.parse()
}

/// Parse a design file.
pub fn parse_file(path: &std::path::Path) -> Result<DesignAst> {
    let content = std::fs::read_to_string(path).map_err(|e| IrError::read(path, e))?;
    parse(&content)
}
