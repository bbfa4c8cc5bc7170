use std::fs::File;
use std::path::Path;

use log::debug;
use memmap2::Mmap;

use super::fits::FitsTable;
use super::mat;
use super::model::DecodedDataset;
use crate::error::{GraphError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Container formats the receivers produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Mat,
    Fits,
}

/// Choose a decoder from the literal path suffix.
///
/// Matching is case-sensitive: `capture.MAT` is not a MAT file.
pub fn route(path: &str) -> Result<Format> {
    if path.ends_with(".mat") {
        Ok(Format::Mat)
    } else if path.ends_with(".fits") {
        Ok(Format::Fits)
    } else {
        Err(GraphError::UnrecognizedFormat(format!(
            "no decoder for {path}"
        )))
    }
}

/// A decoded capture. FITS tables borrow the input buffer.
#[derive(Debug, Clone)]
pub enum Decoded<'a> {
    Mat(DecodedDataset),
    Fits(FitsTable<'a>),
}

/// Decode `bytes` with the decoder for `format`.
pub fn decode(format: Format, bytes: &[u8]) -> Result<Decoded<'_>> {
    debug!("decoding {} bytes as {format:?}", bytes.len());
    Ok(match format {
        Format::Mat => Decoded::Mat(mat::decode(bytes)?),
        Format::Fits => Decoded::Fits(FitsTable::parse(bytes)?),
    })
}

/// Map a capture file read-only.
pub fn map_file(path: &Path) -> std::io::Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: the map is read-only and the file is not modified while the
    // pipeline runs over it.
    unsafe { Mmap::map(&file) }
}
