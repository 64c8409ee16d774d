//! Format detection and the total parse entry point.
//!
//! Detection looks only at leading signature bytes. Anything unrecognized is
//! handed to the PE parser, which rejects it with a descriptive error, so every
//! input yields a renderable [`ParsedFile`].

use crate::core::{FileFormat, Palette, ParsedFile};
use crate::formats::elf::types::ELF_MAGIC;
use crate::formats::macho::types::{
    FAT_CIGAM, FAT_CIGAM_64, FAT_MAGIC, FAT_MAGIC_64, MH_CIGAM, MH_CIGAM_64, MH_MAGIC, MH_MAGIC_64,
};
use crate::formats::media::png::PNG_SIGNATURE;
use crate::formats::pe::types::DOS_SIGNATURE;
use crate::formats::utils::ReadExt;
use crate::formats::{parse_as, ParseOptions};
use bytes::Bytes;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const FTYP: &[u8; 4] = b"ftyp";

impl FileFormat {
    /// Pick a parser from the leading bytes. Executable magics win over media
    /// signatures; `None` means nothing matched.
    pub fn sniff(data: &[u8]) -> Option<FileFormat> {
        if data.len() < 4 {
            return None;
        }
        if data.read_u16_le_at(0) == Some(DOS_SIGNATURE) {
            return Some(FileFormat::Pe);
        }
        if data.starts_with(ELF_MAGIC) {
            return Some(FileFormat::Elf);
        }
        match data.read_u32_be_at(0)? {
            MH_MAGIC | MH_CIGAM | MH_MAGIC_64 | MH_CIGAM_64 => return Some(FileFormat::MachO),
            FAT_MAGIC | FAT_CIGAM | FAT_MAGIC_64 | FAT_CIGAM_64 => {
                return Some(FileFormat::FatMachO)
            }
            _ => {}
        }
        if data.starts_with(&PNG_SIGNATURE) {
            return Some(FileFormat::Png);
        }
        if data.starts_with(&JPEG_SOI) {
            return Some(FileFormat::Jpeg);
        }
        if data.read_slice_at(4, 4) == Some(FTYP.as_slice()) {
            return Some(FileFormat::Isobmff);
        }
        None
    }
}

/// Detect and parse `data` with default options.
pub fn detect(data: Bytes, name: &str, palette: Palette) -> ParsedFile {
    detect_with_options(data, name, &ParseOptions::with_palette(palette))
}

/// Detect and parse `data`. Never panics: a panic inside a parser is caught
/// and reported as an invalid file.
pub fn detect_with_options(data: Bytes, name: &str, options: &ParseOptions) -> ParsedFile {
    let sniffed = FileFormat::sniff(&data);
    let format = sniffed.unwrap_or(FileFormat::Pe);
    if sniffed.is_none() {
        warn!(name, size = data.len(), "no known signature; falling back to PE");
    }

    let shared = data.clone();
    let result = panic::catch_unwind(AssertUnwindSafe(|| parse_as(format, shared, name, options)));
    let parsed = match result {
        Ok(parsed) => parsed,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(name, %format, %reason, "parser panicked");
            ParsedFile {
                name: name.to_string(),
                size: data.len() as u64,
                data,
                regions: Vec::new(),
                sections: Vec::new(),
                format,
                is_valid: false,
                error: Some(format!("Internal parser failure: {}", reason)),
            }
        }
    };

    info!(
        name,
        format = %parsed.format,
        valid = parsed.is_valid,
        regions = parsed.region_count(),
        sections = parsed.sections.len(),
        "detected"
    );
    parsed
}

/// Parse several independent inputs in parallel.
pub fn detect_many(inputs: Vec<(String, Bytes)>, options: &ParseOptions) -> Vec<ParsedFile> {
    inputs
        .into_par_iter()
        .map(|(name, data)| detect_with_options(data, &name, options))
        .collect()
}
