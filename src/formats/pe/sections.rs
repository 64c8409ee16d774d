//! PE section table and section data regions

use crate::core::{Region, RegionKind, SectionMetadata};
use crate::entropy::describe_entropy;
use crate::formats::int_fields;
use crate::formats::pe::types::*;
use crate::formats::utils::{clamp_span, flag_names, Endian, ReadExt};
use tracing::warn;

const SECTION_FIELDS: &[(&str, u64, u64)] = &[
    ("Name", 0, 8),
    ("VirtualSize", 8, 4),
    ("VirtualAddress", 12, 4),
    ("SizeOfRawData", 16, 4),
    ("PointerToRawData", 20, 4),
    ("PointerToRelocations", 24, 4),
    ("PointerToLinenumbers", 28, 4),
    ("NumberOfRelocations", 32, 2),
    ("NumberOfLinenumbers", 34, 2),
    ("Characteristics", 36, 4),
];

/// Parse up to `count` section headers starting at `offset`.
///
/// A table cut short by the end of the buffer yields the headers that fit.
pub fn parse_section_headers(data: &[u8], offset: u64, count: u16) -> Vec<SectionHeader> {
    let mut sections = Vec::with_capacity(count as usize);
    for i in 0..u64::from(count) {
        match read_section_header(data, offset + i * SECTION_HEADER_SIZE) {
            Some(h) => sections.push(h),
            None => {
                warn!(index = i, declared = count, "section table truncated");
                break;
            }
        }
    }
    sections
}

fn read_section_header(data: &[u8], at: u64) -> Option<SectionHeader> {
    let o = at as usize;
    data.read_slice_at(o, SECTION_HEADER_SIZE as usize)?;
    Some(SectionHeader {
        name: data.read_fixed_str_at(o, 8)?,
        virtual_size: data.read_u32_le_at(o + 8)?,
        virtual_address: data.read_u32_le_at(o + 12)?,
        size_of_raw_data: data.read_u32_le_at(o + 16)?,
        pointer_to_raw_data: data.read_u32_le_at(o + 20)?,
        characteristics: data.read_u32_le_at(o + 36)?,
        header_offset: at,
    })
}

/// The "Section Headers" table region.
pub fn section_table_region(data: &[u8], offset: u64, sections: &[SectionHeader]) -> Region {
    let size = sections.len() as u64 * SECTION_HEADER_SIZE;
    let entries = sections
        .iter()
        .map(|s| section_header_region(data, s))
        .collect();
    Region::new("Section Headers", offset, size, RegionKind::Header)
        .with_description(format!("{} sections", sections.len()))
        .with_children(entries)
}

fn section_header_region(data: &[u8], section: &SectionHeader) -> Region {
    let mut fields = int_fields(data, section.header_offset, SECTION_FIELDS, Endian::Little);
    if let Some(name) = fields.first_mut() {
        name.value = Some(section.name.clone().into());
    }
    let flags = flag_names(&section.flags());
    crate::formats::describe(&mut fields, "Characteristics", flags.clone());

    let mut region = Region::new(
        format!("Section Header: {}", section.name),
        section.header_offset,
        SECTION_HEADER_SIZE,
        RegionKind::TableEntry,
    )
    .with_detail("Virtual Address", format!("{:#x}", section.virtual_address))
    .with_detail("Virtual Size", format!("{:#x}", section.virtual_size))
    .with_detail("Raw Offset", format!("{:#x}", section.pointer_to_raw_data))
    .with_detail("Raw Size", format!("{:#x}", section.size_of_raw_data))
    .with_children(fields);
    if !flags.is_empty() {
        region = region.with_detail("Flags", flags);
    }
    region
}

/// File-backed bytes of one section, clamped to the buffer.
pub fn section_data_region(data: &[u8], section: &SectionHeader) -> Option<Region> {
    let offset = u64::from(section.pointer_to_raw_data);
    let declared = u64::from(section.size_of_raw_data);
    if declared == 0 || offset == 0 || offset >= data.len() as u64 {
        return None;
    }
    let size = clamp_span(data.len(), offset, declared);
    if size < declared {
        warn!(
            section = %section.name,
            declared,
            available = size,
            "section data truncated"
        );
    }

    let bytes = &data[offset as usize..(offset + size) as usize];
    let mut region = Region::new(
        format!("Section: {}", section.name),
        offset,
        size,
        RegionKind::Data,
    )
    .with_detail("Virtual Address", format!("{:#x}", section.virtual_address))
    .with_detail("Entropy", describe_entropy(bytes));
    let flags = flag_names(&section.flags());
    if !flags.is_empty() {
        region = region.with_description(flags);
    }
    Some(region)
}

/// Section metadata for offset ↔ RVA mapping.
pub fn section_metadata(section: &SectionHeader) -> SectionMetadata {
    SectionMetadata {
        name: section.name.clone(),
        virtual_address: u64::from(section.virtual_address),
        virtual_size: u64::from(section.mapped_size()),
        file_offset: u64::from(section.pointer_to_raw_data),
        file_size: u64::from(section.size_of_raw_data),
    }
}
