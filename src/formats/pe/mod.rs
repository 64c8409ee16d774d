//! Portable Executable layout parser.
//!
//! Walks DOS header → DOS stub (with Rich Header) → NT headers → section
//! table → section data → certificate table → overlay. Little-endian
//! throughout. A bad DOS magic or PE signature stops the walk with the
//! regions decoded so far.

pub mod headers;
pub mod rich;
pub mod sections;
pub mod types;

use crate::core::{Region, RegionKind};
use crate::error::ParseError;
use crate::formats::utils::{clamp_span, ReadExt};
use crate::formats::{overlay, Layout, ParseOptions};
use tracing::debug;
pub use types::*;

/// Parse a PE image into a [`Layout`].
pub fn parse(data: &[u8], options: &ParseOptions) -> Layout {
    let mut layout = Layout::default();
    if let Err(e) = parse_into(data, &mut layout) {
        layout.fail(e);
    }
    if layout.error.is_none() && options.analyze_overlay {
        if let Some(region) = overlay::overlay_region(data, &layout.regions) {
            debug!(offset = region.offset, size = region.size, "pe overlay");
            layout.regions.push(region);
        }
    }
    layout
}

fn parse_into(data: &[u8], layout: &mut Layout) -> Result<(), ParseError> {
    let dos = headers::parse_dos_header(data)?;
    layout.regions.push(headers::dos_header_region(data));

    let nt_offset = u64::from(dos.e_lfanew);
    if let Some(stub) = headers::dos_stub_region(data, nt_offset) {
        layout.regions.push(stub);
    }

    let nt = headers::parse_nt_headers(data, nt_offset)?;
    layout.regions.push(nt.region);

    let table_offset =
        nt_offset + 4 + COFF_HEADER_SIZE + u64::from(nt.file_header.size_of_optional_header);
    let section_headers = sections::parse_section_headers(
        data,
        table_offset,
        nt.file_header.number_of_sections,
    );
    debug!(
        declared = nt.file_header.number_of_sections,
        parsed = section_headers.len(),
        "pe section table"
    );

    if !section_headers.is_empty() {
        layout.regions.push(sections::section_table_region(
            data,
            table_offset,
            &section_headers,
        ));
    }
    for section in &section_headers {
        if let Some(region) = sections::section_data_region(data, section) {
            layout.regions.push(region);
        }
        layout.sections.push(sections::section_metadata(section));
    }

    if let Some(cert) = nt
        .optional_header
        .as_ref()
        .and_then(|h| h.directory(IMAGE_DIRECTORY_ENTRY_SECURITY))
        .and_then(|dir| certificate_region(data, dir))
    {
        layout.regions.push(cert);
    }

    Ok(())
}

/// The Authenticode certificate table. Its directory entry holds a file offset, not an RVA.
fn certificate_region(data: &[u8], dir: DataDirectory) -> Option<Region> {
    let offset = u64::from(dir.virtual_address);
    if dir.size == 0 || offset == 0 || offset >= data.len() as u64 {
        return None;
    }
    let size = clamp_span(data.len(), offset, u64::from(dir.size));
    let o = offset as usize;

    let mut region = Region::new("Certificate Table", offset, size, RegionKind::Record);
    if let (Some(length), Some(revision), Some(cert_type)) = (
        data.read_u32_le_at(o),
        data.read_u16_le_at(o + 4),
        data.read_u16_le_at(o + 6),
    ) {
        let type_name = match cert_type {
            0x0001 => "X.509",
            0x0002 => "PKCS#7 SignedData",
            0x0003 => "Reserved",
            0x0004 => "Terminal Server Protocol Stack",
            _ => "Unknown",
        };
        region = region
            .with_description(type_name)
            .with_detail("Revision", format!("{:#06x}", revision))
            .with_children(vec![
                Region::field("dwLength", offset, 4, length),
                Region::field("wRevision", offset + 4, 2, revision),
                Region::field("wCertificateType", offset + 6, 2, cert_type)
                    .with_description(type_name),
            ]);
    }
    Some(region)
}
