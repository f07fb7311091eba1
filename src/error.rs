//! Error types for the IR-drop analyzer.
//!
//! This module provides a unified error type [`IrError`] that covers every
//! failure the pipeline can hit: reading the design and source files,
//! configuration problems, geometry that cannot be turned into a consistent
//! resistor mesh, global connectivity failures and solver breakdowns.

use std::path::Path;

use thiserror::Error;

/// Result type alias using [`IrError`].
pub type Result<T> = std::result::Result<T, IrError>;

/// Unified error type for all IR analysis operations.
#[derive(Error, Debug)]
pub enum IrError {
    // ============ Design Text Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Malformed line in a voltage source file
    #[error("Invalid voltage source entry at line {line}: {message}")]
    InvalidSourceEntry { line: usize, message: String },

    // ============ Configuration Errors ============
    /// The analyzed net does not exist in the layout
    #[error("Net '{net}' not found in the design")]
    UnknownNet { net: String },

    /// Layer name or routing level not present in the technology
    #[error("Unknown layer '{layer}'")]
    UnknownLayer { layer: String },

    /// No voltage could be resolved for a source
    #[error("No voltage available for sources of net '{net}' (set a per-net voltage or a supply)")]
    MissingVoltage { net: String },

    /// Two sources pin the same mesh node to different voltages
    #[error("Conflicting source voltages at ({x}, {y}): {first} V vs {second} V")]
    ConflictingSources {
        x: i64,
        y: i64,
        first: f64,
        second: f64,
    },

    /// Generic configuration problem (density, pitch, tolerance, ...)
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Geometry Errors ============
    /// A computed resistance is zero, negative or not finite
    #[error("Invalid resistance {value:.3e} ohm on level {level} between ({x0}, {y0}) and ({x1}, {y1})")]
    InvalidResistance {
        level: u32,
        x0: i64,
        y0: i64,
        x1: i64,
        y1: i64,
        value: f64,
    },

    /// A via cut has no metal to land on
    #[error("Via at ({x}, {y}) has no enclosure on level {level}")]
    UnmappableEnclosure { x: i64, y: i64, level: u32 },

    /// Via record joining layers that are not adjacent
    #[error("Via at ({x}, {y}) spans non-adjacent levels {bottom} and {top}")]
    NonAdjacentVia { x: i64, y: i64, bottom: u32, top: u32 },

    /// The net carries no routing on any layer
    #[error("Net '{net}' has no power-grid wires")]
    EmptyGrid { net: String },

    // ============ Connectivity Errors ============
    /// Nothing fixes the grid voltage
    #[error("No voltage sources could be attached to net '{net}'")]
    NoSources { net: String },

    /// Current is drawn but no loaded node reaches a source
    #[error("None of the {loads} current-drawing nodes is connected to a voltage source")]
    Disconnected { loads: usize },

    // ============ Solver Errors ============
    /// Factorization of the reduced conductance matrix failed
    #[error("Conductance matrix factorization failed ({unknowns} unknowns): {message}")]
    FactorizationFailed { unknowns: usize, message: String },

    /// Iterative solve did not reach the requested tolerance
    #[error("Conjugate gradient did not converge after {iterations} iterations (residual: {residual:.2e})")]
    ConvergenceFailure { iterations: usize, residual: f64 },

    /// Analysis was cancelled between pipeline stages
    #[error("IR analysis cancelled before {stage}")]
    Cancelled { stage: &'static str },

    // ============ I/O Errors ============
    /// Error reading an input file
    #[error("Failed to read '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing an output artifact
    #[error("Failed to write '{path}': {source}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl IrError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a file read error for `path`
    pub fn read(path: &Path, source: std::io::Error) -> Self {
        Self::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }

    /// Create a file write error for `path`
    pub fn write(path: &Path, source: std::io::Error) -> Self {
        Self::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }

    /// Whether this error is a configuration problem caught before meshing.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnknownNet { .. }
                | Self::UnknownLayer { .. }
                | Self::MissingVoltage { .. }
                | Self::ConflictingSources { .. }
                | Self::InvalidConfig { .. }
                | Self::InvalidSourceEntry { .. }
        )
    }

    /// Whether this error comes from the linear solve rather than the model.
    pub fn is_solver_failure(&self) -> bool {
        matches!(
            self,
            Self::FactorizationFailed { .. } | Self::ConvergenceFailure { .. }
        )
    }
}
