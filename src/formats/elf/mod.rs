//! ELF (Executable and Linkable Format) layout parser
//!
//! The identification block picks class and byte order; everything after it
//! is decoded with that endianness and widened to `u64`.

pub mod headers;
pub mod sections;
pub mod segments;
pub mod types;

use crate::error::ParseError;
use crate::formats::{overlay, Layout, ParseOptions};
use tracing::debug;
pub use types::*;

/// Parse an ELF image into a [`Layout`].
pub fn parse(data: &[u8], options: &ParseOptions) -> Layout {
    let mut layout = Layout::default();
    if let Err(e) = parse_into(data, &mut layout) {
        layout.fail(e);
    }
    if layout.error.is_none() && options.analyze_overlay {
        if let Some(region) = overlay::overlay_region(data, &layout.regions) {
            debug!(offset = region.offset, size = region.size, "elf overlay");
            layout.regions.push(region);
        }
    }
    layout
}

fn parse_into(data: &[u8], layout: &mut Layout) -> Result<(), ParseError> {
    let header = headers::parse_header(data)?;
    layout.regions.push(headers::header_region(data, &header));

    let phdrs = segments::parse_program_headers(data, &header);
    let shdrs = sections::parse_section_headers(data, &header);
    debug!(
        class = header.class.name(),
        segments = phdrs.len(),
        sections = shdrs.len(),
        "elf tables"
    );

    if !phdrs.is_empty() {
        layout
            .regions
            .push(segments::program_table_region(data, &header, &phdrs));
    }
    if !shdrs.is_empty() {
        layout
            .regions
            .push(sections::section_table_region(data, &header, &shdrs));
    }

    if shdrs.is_empty() {
        // Stripped of section headers: fall back to segments for data and mapping.
        for ph in &phdrs {
            if let Some(region) = segments::segment_data_region(data, ph) {
                layout.regions.push(region);
            }
        }
        layout
            .sections
            .extend(phdrs.iter().filter_map(segments::segment_metadata));
    } else {
        for sh in &shdrs {
            if let Some(region) = sections::section_data_region(data, sh) {
                layout.regions.push(region);
            }
        }
        layout
            .sections
            .extend(shdrs.iter().filter_map(sections::section_metadata));
        if layout.sections.is_empty() {
            layout
                .sections
                .extend(phdrs.iter().filter_map(segments::segment_metadata));
        }
    }

    Ok(())
}
