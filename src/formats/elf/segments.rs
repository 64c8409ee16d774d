//! ELF program header table

use crate::core::{Region, RegionKind, SectionMetadata};
use crate::formats::elf::headers::entry_stride;
use crate::formats::elf::types::*;
use crate::formats::utils::{clamp_span, flag_names, ReadExt};
use crate::formats::{describe, int_fields, read_uint};
use tracing::warn;

const PHDR32_FIELDS: &[(&str, u64, u64)] = &[
    ("p_type", 0, 4),
    ("p_offset", 4, 4),
    ("p_vaddr", 8, 4),
    ("p_paddr", 12, 4),
    ("p_filesz", 16, 4),
    ("p_memsz", 20, 4),
    ("p_flags", 24, 4),
    ("p_align", 28, 4),
];

// 64-bit moves p_flags up next to p_type for alignment.
const PHDR64_FIELDS: &[(&str, u64, u64)] = &[
    ("p_type", 0, 4),
    ("p_flags", 4, 4),
    ("p_offset", 8, 8),
    ("p_vaddr", 16, 8),
    ("p_paddr", 24, 8),
    ("p_filesz", 32, 8),
    ("p_memsz", 40, 8),
    ("p_align", 48, 8),
];

fn phdr_fields(class: ElfClass) -> &'static [(&'static str, u64, u64)] {
    match class {
        ElfClass::Elf32 => PHDR32_FIELDS,
        ElfClass::Elf64 => PHDR64_FIELDS,
    }
}

/// Parse the program header table. A truncated table yields the entries that fit.
pub fn parse_program_headers(data: &[u8], header: &ElfHeader) -> Vec<ProgramHeader> {
    if header.e_phoff == 0 || header.e_phnum == 0 {
        return Vec::new();
    }
    let stride = entry_stride(header.e_phentsize, header.class.phdr_size());
    let fields = phdr_fields(header.class);
    let mut out = Vec::new();

    for index in 0..header.e_phnum as usize {
        let Some(at) = (index as u64)
            .checked_mul(stride)
            .and_then(|rel| header.e_phoff.checked_add(rel))
        else {
            break;
        };
        match read_program_header(data, header, fields, index, at) {
            Some(ph) => out.push(ph),
            None => {
                warn!(index, declared = header.e_phnum, "program header table truncated");
                break;
            }
        }
    }
    out
}

fn read_program_header(
    data: &[u8],
    header: &ElfHeader,
    fields: &[(&str, u64, u64)],
    index: usize,
    at: u64,
) -> Option<ProgramHeader> {
    data.read_slice_at(at as usize, header.class.phdr_size() as usize)?;
    let get = |name: &str| {
        fields
            .iter()
            .find(|(n, _, _)| *n == name)
            .and_then(|&(_, off, size)| read_uint(data, (at + off) as usize, size, header.endian))
    };
    Some(ProgramHeader {
        index,
        entry_offset: at,
        p_type: get("p_type")? as u32,
        p_flags: get("p_flags")? as u32,
        p_offset: get("p_offset")?,
        p_vaddr: get("p_vaddr")?,
        p_paddr: get("p_paddr")?,
        p_filesz: get("p_filesz")?,
        p_memsz: get("p_memsz")?,
        p_align: get("p_align")?,
    })
}

/// Interpreter path named by a `PT_INTERP` segment.
pub fn interpreter(data: &[u8], ph: &ProgramHeader) -> Option<String> {
    if ph.p_type != PT_INTERP || ph.p_filesz == 0 {
        return None;
    }
    let len = clamp_span(data.len(), ph.p_offset, ph.p_filesz);
    data.read_cstring_at(ph.p_offset as usize, len as usize)
        .filter(|s| !s.is_empty())
}

/// The "Program Headers" table region.
pub fn program_table_region(data: &[u8], header: &ElfHeader, phdrs: &[ProgramHeader]) -> Region {
    let stride = entry_stride(header.e_phentsize, header.class.phdr_size());
    let entries = phdrs
        .iter()
        .map(|ph| {
            let mut fields = int_fields(data, ph.entry_offset, phdr_fields(header.class), header.endian);
            describe(&mut fields, "p_type", ph.type_label());
            describe(&mut fields, "p_flags", flag_names(&ph.flags()));

            let mut region = Region::new(
                format!("Program Header {}: {}", ph.index, ph.type_label()),
                ph.entry_offset,
                stride,
                RegionKind::TableEntry,
            )
            .with_detail("Offset", format!("{:#x}", ph.p_offset))
            .with_detail("Virtual Address", format!("{:#x}", ph.p_vaddr))
            .with_detail("File Size", format!("{:#x}", ph.p_filesz))
            .with_detail("Memory Size", format!("{:#x}", ph.p_memsz))
            .with_detail("Flags", flag_names(&ph.flags()))
            .with_children(fields);
            if let Some(interp) = interpreter(data, ph) {
                region.description = Some(interp);
            }
            region
        })
        .collect();

    Region::new(
        "Program Headers",
        header.e_phoff,
        phdrs.len() as u64 * stride,
        RegionKind::Header,
    )
    .with_description(format!("{} segments", phdrs.len()))
    .with_children(entries)
}

/// Data region for a segment's file-backed bytes. Only used when a file has no section table.
pub fn segment_data_region(data: &[u8], ph: &ProgramHeader) -> Option<Region> {
    if ph.p_filesz == 0 || ph.p_offset >= data.len() as u64 {
        return None;
    }
    let size = clamp_span(data.len(), ph.p_offset, ph.p_filesz);
    let mut region = Region::new(
        format!("Segment {}: {}", ph.index, ph.type_label()),
        ph.p_offset,
        size,
        RegionKind::Data,
    )
    .with_detail("Virtual Address", format!("{:#x}", ph.p_vaddr))
    .with_detail("Flags", flag_names(&ph.flags()));
    if let Some(interp) = interpreter(data, ph) {
        region.description = Some(interp);
    }
    Some(region)
}

/// Mapping entry for a `PT_LOAD` segment.
pub fn segment_metadata(ph: &ProgramHeader) -> Option<SectionMetadata> {
    (ph.p_type == PT_LOAD).then(|| SectionMetadata {
        name: format!("LOAD[{}]", ph.index),
        virtual_address: ph.p_vaddr,
        virtual_size: ph.p_memsz,
        file_offset: ph.p_offset,
        file_size: ph.p_filesz,
    })
}
