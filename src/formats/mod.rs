//! Per-format structural parsers.
//!
//! Each parser walks a byte slice and emits a [`Layout`]: the region forest,
//! the flattened section table and the first fatal problem it hit. Lower-level
//! problems are logged and absorbed so the rest of the file still shows up.

pub mod elf;
pub mod macho;
pub mod media;
pub mod overlay;
pub mod pe;
pub mod utils;

use crate::core::region::clamp_tree;
use crate::core::{FileFormat, Palette, ParsedFile, Region, SectionMetadata};
use crate::error::ParseError;
use bytes::Bytes;
use tracing::{debug, warn};
use utils::{Endian, ReadExt};

/// How Mach-O segment data regions are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachOOptions {
    /// Omit a segment's data region when its file offset lies inside the
    /// header + load-command span (`__TEXT` usually starts at offset 0).
    pub skip_segment_data_in_header: bool,
}

impl Default for MachOOptions {
    fn default() -> Self {
        Self {
            skip_segment_data_in_header: true,
        }
    }
}

/// Parse options
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub palette: Palette,
    pub macho: MachOOptions,
    /// Maximum nesting depth for ISOBMFF container boxes.
    pub max_box_depth: usize,
    /// Emit an "Overlay" region for bytes past the last known structure (PE, ELF).
    pub analyze_overlay: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            palette: Palette::Dark,
            macho: MachOOptions::default(),
            max_box_depth: 32,
            analyze_overlay: true,
        }
    }
}

impl ParseOptions {
    pub fn with_palette(palette: Palette) -> Self {
        Self {
            palette,
            ..Self::default()
        }
    }
}

/// Raw output of one format parser.
#[derive(Debug, Default)]
pub struct Layout {
    pub regions: Vec<Region>,
    pub sections: Vec<SectionMetadata>,
    /// First fatal problem; `None` means the file parsed cleanly.
    pub error: Option<ParseError>,
}

impl Layout {
    /// Record a fatal problem. Only the first one is kept.
    pub fn fail(&mut self, error: ParseError) {
        warn!(%error, "parse aborted");
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// Run the parser for `format` and wrap the result into a [`ParsedFile`].
pub fn parse_as(
    format: FileFormat,
    data: Bytes,
    name: &str,
    options: &ParseOptions,
) -> ParsedFile {
    debug!(%format, name, size = data.len(), "parsing");
    let layout = match format {
        FileFormat::Pe => pe::parse(&data, options),
        FileFormat::Elf => elf::parse(&data, options),
        FileFormat::MachO => macho::parse(&data, options),
        FileFormat::FatMachO => macho::fat::parse(&data, options),
        FileFormat::Png => media::png::parse(&data),
        FileFormat::Jpeg => media::jpeg::parse(&data),
        FileFormat::Isobmff => media::isobmff::parse(&data, options),
    };
    finish(format, data, name, options.palette, layout)
}

pub(crate) fn finish(
    format: FileFormat,
    data: Bytes,
    name: &str,
    palette: Palette,
    layout: Layout,
) -> ParsedFile {
    let Layout {
        mut regions,
        sections,
        error,
    } = layout;

    let size = data.len() as u64;
    for region in &mut regions {
        clamp_tree(region, 0, size);
    }
    regions.sort_by_key(|r| r.offset);
    palette.paint(&mut regions);

    ParsedFile {
        name: name.to_string(),
        size,
        data,
        regions,
        sections,
        format,
        is_valid: error.is_none(),
        error: error.map(|e| e.to_string()),
    }
}

/// Fixed-width unsigned integer at `offset`, widened to `u64`.
pub(crate) fn read_uint(data: &[u8], offset: usize, size: u64, endian: Endian) -> Option<u64> {
    match size {
        1 => data.read_u8_at(offset).map(u64::from),
        2 => data.read_u16_at(offset, endian).map(u64::from),
        4 => data.read_u32_at(offset, endian).map(u64::from),
        8 => data.read_u64_at(offset, endian),
        _ => None,
    }
}

/// Decode a run of integer fields described as `(name, relative offset, width)`.
///
/// Fields that do not fit in the buffer are dropped; fields whose width is
/// not 1/2/4/8 become value-less byte ranges.
pub(crate) fn int_fields(
    data: &[u8],
    base: u64,
    fields: &[(&str, u64, u64)],
    endian: Endian,
) -> Vec<Region> {
    let mut out = Vec::with_capacity(fields.len());
    for &(name, rel, size) in fields {
        let offset = base.saturating_add(rel);
        if offset.saturating_add(size) > data.len() as u64 {
            break;
        }
        let region = match read_uint(data, offset as usize, size, endian) {
            Some(value) => Region::field(name, offset, size, value),
            None => Region::new(name, offset, size, crate::core::RegionKind::Field),
        };
        out.push(region);
    }
    out
}

/// Attach a description to the named field, if present.
pub(crate) fn describe(fields: &mut [Region], name: &str, description: impl Into<String>) {
    if let Some(field) = fields.iter_mut().find(|f| f.name == name) {
        let description = description.into();
        if !description.is_empty() {
            field.description = Some(description);
        }
    }
}

/// Replace the named field's value with decoded text (names, brands, UUIDs).
pub(crate) fn set_text(fields: &mut [Region], name: &str, text: impl Into<String>) {
    if let Some(field) = fields.iter_mut().find(|f| f.name == name) {
        field.value = Some(crate::core::RegionValue::Text(text.into()));
    }
}

/// Integer value of the named field.
pub(crate) fn field_value(fields: &[Region], name: &str) -> Option<u64> {
    fields
        .iter()
        .find(|f| f.name == name)
        .and_then(|f| f.value.as_ref())
        .and_then(|v| v.as_int())
}
