//! Output artifacts for the analyzer.
//!
//! Every writer takes any [`Write`] sink; [`write_to_file`] wraps one in a
//! buffered file with path context on failure.

mod em;
mod ir;
mod spice;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub use em::{em_segments, write_em_report, EmSegment};
pub use ir::{write_error_log, write_ir_report, InstanceVoltage};
pub use spice::write_spice;

use crate::error::{IrError, Result};

/// Create `path` and hand a buffered writer to `write`.
pub fn write_to_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let file = File::create(path).map_err(|e| IrError::write(path, e))?;
    let mut out = BufWriter::new(file);
    write(&mut out)
        .and_then(|_| out.flush())
        .map_err(|e| IrError::write(path, e))
}

/// DBU to microns.
pub(crate) fn to_um(value: i64, dbu_per_micron: i64) -> f64 {
    value as f64 / dbu_per_micron.max(1) as f64
}
