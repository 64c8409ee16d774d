//! File intake.
//!
//! Files are memory-mapped read-only and copied once into a shared [`Bytes`]
//! buffer, which every region and search result then refers to by offset.
//! A size limit keeps hostile inputs from exhausting memory.

pub mod error;

use crate::core::ParsedFile;
use crate::detect::detect_with_options;
use crate::formats::ParseOptions;
use crate::io::error::{IoError, Result};
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

/// Resource limits for file intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Load a whole file, refusing anything larger than `limits.max_file_size`.
pub fn load_file<P: AsRef<Path>>(path: P, limits: &IOLimits) -> Result<Bytes> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(IoError::NotAFile {
            path: path.display().to_string(),
        });
    }
    let file_size = metadata.len();

    debug!(
        path = %path.display(),
        size = file_size,
        limits.max_file_size = limits.max_file_size,
        "loading file"
    );

    if file_size > limits.max_file_size {
        warn!(
            path = %path.display(),
            size = file_size,
            limit = limits.max_file_size,
            "File is too large"
        );
        return Err(IoError::FileTooLarge {
            limit: limits.max_file_size,
            found: file_size,
        });
    }

    // memmap cannot map empty files
    if file_size == 0 {
        return Ok(Bytes::new());
    }
    // Safety: read-only map of a regular file, copied out before the map is dropped.
    let map = unsafe { Mmap::map(&file)? };
    Ok(Bytes::copy_from_slice(&map))
}

/// Load and parse a file, using its file name as the display name.
pub fn parse_path<P: AsRef<Path>>(
    path: P,
    limits: &IOLimits,
    options: &ParseOptions,
) -> Result<ParsedFile> {
    let path = path.as_ref();
    let data = load_file(path, limits)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(detect_with_options(data, &name, options))
}
