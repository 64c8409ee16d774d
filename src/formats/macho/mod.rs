//! Mach-O layout parser
//!
//! Thin (single-architecture) images are handled here; Fat/Universal
//! wrappers live in [`fat`] and reuse [`parse_into`] for each slice.

pub mod commands;
pub mod fat;
pub mod types;

use crate::core::{Region, RegionKind, SectionMetadata};
use crate::entropy::describe_entropy;
use crate::error::ParseError;
use crate::formats::utils::{clamp_span, flag_names, name_or_hex, ReadExt};
use crate::formats::{describe, int_fields, Layout, MachOOptions, ParseOptions};
use commands::LoadCommands;
use tracing::debug;
pub use types::*;

const HEADER_FIELDS: &[(&str, u64, u64)] = &[
    ("magic", 0, 4),
    ("cputype", 4, 4),
    ("cpusubtype", 8, 4),
    ("filetype", 12, 4),
    ("ncmds", 16, 4),
    ("sizeofcmds", 20, 4),
    ("flags", 24, 4),
    ("reserved", 28, 4),
];

/// Parse a thin Mach-O image into a [`Layout`].
pub fn parse(data: &[u8], options: &ParseOptions) -> Layout {
    let mut layout = Layout::default();
    if let Err(e) = parse_into(data, &options.macho, &mut layout) {
        layout.fail(e);
    }
    layout
}

/// Decode one Mach-O image. Offsets are relative to `data`.
pub fn parse_into(
    data: &[u8],
    options: &MachOOptions,
    layout: &mut Layout,
) -> Result<(), ParseError> {
    let header = parse_header(data)?;
    let commands = commands::parse_load_commands(data, &header);
    debug!(
        cpu = %header.cpu_label(),
        ncmds = header.ncmds,
        segments = commands.segments.len(),
        "mach-o header"
    );

    layout.regions.push(header_region(data, &header, &commands));
    if header.ncmds > 0 || header.sizeofcmds > 0 {
        layout.regions.push(commands.region);
    }

    for segment in &commands.segments {
        layout
            .regions
            .extend(segment_regions(data, &header, segment, options));
        layout.sections.extend(segment_metadata(segment));
    }
    Ok(())
}

/// Decode mach_header / mach_header_64.
pub fn parse_header(data: &[u8]) -> Result<MachHeader, ParseError> {
    let magic = data
        .read_u32_be_at(0)
        .ok_or_else(|| ParseError::truncated("Mach-O magic", 0, 4, data.len()))?;
    let (is_64, endian) = classify_magic(magic).ok_or_else(|| {
        ParseError::structural(0, format!("Invalid Mach-O magic {:#010x}", magic))
    })?;
    let size = if is_64 { HEADER64_SIZE } else { HEADER32_SIZE };
    if (data.len() as u64) < size {
        return Err(ParseError::truncated("Mach-O header", 0, size, data.len()));
    }

    let u32_at = |offset: usize| data.read_u32_at(offset, endian).unwrap_or(0);
    Ok(MachHeader {
        magic,
        is_64,
        endian,
        cputype: u32_at(4),
        cpusubtype: u32_at(8),
        filetype: u32_at(12),
        ncmds: u32_at(16),
        sizeofcmds: u32_at(20),
        flags: u32_at(24),
    })
}

fn header_region(data: &[u8], header: &MachHeader, commands: &LoadCommands) -> Region {
    let table = if header.is_64 {
        HEADER_FIELDS
    } else {
        &HEADER_FIELDS[..HEADER_FIELDS.len() - 1]
    };
    let cpu = header.cpu_label();
    let file_type = name_or_hex(file_type_name(header.filetype), header.filetype);
    let flags = flag_names(&header.header_flags());

    let mut fields = int_fields(data, 0, table, header.endian);
    describe(
        &mut fields,
        "magic",
        magic_name(header.magic).unwrap_or_default(),
    );
    describe(
        &mut fields,
        "cputype",
        name_or_hex(cpu_type_name(header.cputype), header.cputype),
    );
    describe(
        &mut fields,
        "cpusubtype",
        cpu_subtype_name(header.cputype, header.cpusubtype).unwrap_or_default(),
    );
    describe(&mut fields, "filetype", file_type.clone());
    describe(&mut fields, "flags", flags.clone());

    let mut region = Region::new("Mach-O Header", 0, header.size(), RegionKind::Header)
        .with_description(format!("{} {}", cpu, file_type))
        .with_detail("Architecture", if header.is_64 { "64-bit" } else { "32-bit" })
        .with_detail("Byte Order", header.endian.name())
        .with_detail("CPU", cpu)
        .with_detail("File Type", file_type)
        .with_detail("Load Commands", header.ncmds.to_string())
        .with_detail("Flags", flags);
    if let Some(entry) = commands.entry_offset {
        region = region.with_detail("Entry Offset", format!("{:#x}", entry));
    }
    if let Some(uuid) = &commands.uuid {
        region = region.with_detail("UUID", uuid.clone());
    }
    if !commands.dylibs.is_empty() {
        region = region.with_detail("Linked Libraries", commands.dylibs.len().to_string());
    }
    region.with_children(fields)
}

/// File-backed data for one segment.
///
/// When the segment begins inside the header + load-command span and the
/// policy says to skip it, its sections are emitted on their own instead.
fn segment_regions(
    data: &[u8],
    header: &MachHeader,
    segment: &Segment,
    options: &MachOOptions,
) -> Vec<Region> {
    if segment.filesize == 0 || segment.fileoff >= data.len() as u64 {
        return Vec::new();
    }
    let sections = segment
        .sections
        .iter()
        .filter_map(|section| section_data_region(data, section));

    if options.skip_segment_data_in_header && segment.fileoff < header.commands_end() {
        debug!(
            segment = %segment.segname,
            fileoff = segment.fileoff,
            "segment overlaps header; emitting sections only"
        );
        return sections.collect();
    }

    let size = clamp_span(data.len(), segment.fileoff, segment.filesize);
    vec![Region::new(
        format!("Segment: {}", segment.segname),
        segment.fileoff,
        size,
        RegionKind::Data,
    )
    .with_description(segment.protection())
    .with_detail("VM Address", format!("{:#x}", segment.vmaddr))
    .with_detail("VM Size", format!("{:#x}", segment.vmsize))
    .with_detail("Protection", segment.protection())
    .with_children(sections.collect())]
}

fn section_data_region(data: &[u8], section: &Section) -> Option<Region> {
    let offset = u64::from(section.offset);
    let declared = section.file_size();
    if declared == 0 || offset >= data.len() as u64 {
        return None;
    }
    let size = clamp_span(data.len(), offset, declared);
    let bytes = &data[offset as usize..(offset + size) as usize];
    Some(
        Region::new(
            format!("Section: {}", section.label()),
            offset,
            size,
            RegionKind::Data,
        )
        .with_description(section.type_label())
        .with_detail("Address", format!("{:#x}", section.addr))
        .with_detail("Entropy", describe_entropy(bytes)),
    )
}

/// Mapping entries: one per section, or the segment itself when it has none.
fn segment_metadata(segment: &Segment) -> Vec<SectionMetadata> {
    if segment.sections.is_empty() {
        if segment.vmsize == 0 && segment.filesize == 0 {
            return Vec::new();
        }
        return vec![SectionMetadata {
            name: segment.segname.clone(),
            virtual_address: segment.vmaddr,
            virtual_size: segment.vmsize,
            file_offset: segment.fileoff,
            file_size: segment.filesize,
        }];
    }
    segment
        .sections
        .iter()
        .map(|section| SectionMetadata {
            name: section.label(),
            virtual_address: section.addr,
            virtual_size: section.size,
            file_offset: u64::from(section.offset),
            file_size: section.file_size(),
        })
        .collect()
}
