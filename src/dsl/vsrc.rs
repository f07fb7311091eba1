//! Reader for user voltage-source location files.
//!
//! Each non-empty line is `x, y, size[, voltage]` with locations and contact
//! size in microns. Lines starting with `#` are ignored.

use super::lexer::parse_value;
use crate::error::{IrError, Result};

/// One user-specified source location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceEntry {
    pub x_um: f64,
    pub y_um: f64,
    pub size_um: f64,
    pub voltage: Option<f64>,
}

/// Parse voltage source text.
pub fn parse_sources(input: &str) -> Result<Vec<SourceEntry>> {
    let mut entries = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .collect();
        if fields.len() < 3 || fields.len() > 4 {
            return Err(IrError::InvalidSourceEntry {
                line,
                message: format!("expected 'x, y, size[, voltage]', got {} fields", fields.len()),
            });
        }

        let number = |field: &str| {
            parse_value(field).ok_or_else(|| IrError::InvalidSourceEntry {
                line,
                message: format!("invalid number '{}'", field),
            })
        };

        let size_um = number(fields[2])?;
        if size_um < 0.0 {
            return Err(IrError::InvalidSourceEntry {
                line,
                message: "contact size must not be negative".to_string(),
            });
        }

        entries.push(SourceEntry {
            x_um: number(fields[0])?,
            y_um: number(fields[1])?,
            size_um,
            voltage: fields.get(3).map(|f| number(f)).transpose()?,
        });
    }

    Ok(entries)
}

/// Read and parse a voltage source file.
pub fn parse_source_file(path: &std::path::Path) -> Result<Vec<SourceEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| IrError::read(path, e))?;
    parse_sources(&content)
}
