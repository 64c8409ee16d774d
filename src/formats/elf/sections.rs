//! ELF section header table

use crate::core::{Region, RegionKind, SectionMetadata};
use crate::entropy::describe_entropy;
use crate::formats::elf::headers::entry_stride;
use crate::formats::elf::types::*;
use crate::formats::utils::{clamp_span, flag_names, name_or_hex, ReadExt};
use crate::formats::{describe, int_fields, read_uint};
use tracing::warn;

const SHDR32_FIELDS: &[(&str, u64, u64)] = &[
    ("sh_name", 0, 4),
    ("sh_type", 4, 4),
    ("sh_flags", 8, 4),
    ("sh_addr", 12, 4),
    ("sh_offset", 16, 4),
    ("sh_size", 20, 4),
    ("sh_link", 24, 4),
    ("sh_info", 28, 4),
    ("sh_addralign", 32, 4),
    ("sh_entsize", 36, 4),
];

const SHDR64_FIELDS: &[(&str, u64, u64)] = &[
    ("sh_name", 0, 4),
    ("sh_type", 4, 4),
    ("sh_flags", 8, 8),
    ("sh_addr", 16, 8),
    ("sh_offset", 24, 8),
    ("sh_size", 32, 8),
    ("sh_link", 40, 4),
    ("sh_info", 44, 4),
    ("sh_addralign", 48, 8),
    ("sh_entsize", 56, 8),
];

fn shdr_fields(class: ElfClass) -> &'static [(&'static str, u64, u64)] {
    match class {
        ElfClass::Elf32 => SHDR32_FIELDS,
        ElfClass::Elf64 => SHDR64_FIELDS,
    }
}

/// Parse the section header table and resolve names through `e_shstrndx`.
pub fn parse_section_headers(data: &[u8], header: &ElfHeader) -> Vec<SectionHeader> {
    if header.e_shoff == 0 || header.e_shnum == 0 {
        return Vec::new();
    }
    let stride = entry_stride(header.e_shentsize, header.class.shdr_size());
    let fields = shdr_fields(header.class);
    let mut out = Vec::new();

    let mut index: u64 = 0;
    while index < header.e_shnum {
        let Some(at) = index
            .checked_mul(stride)
            .and_then(|rel| header.e_shoff.checked_add(rel))
        else {
            break;
        };
        match read_section_header(data, header, fields, index as usize, at) {
            Some(sh) => out.push(sh),
            None => {
                warn!(index, declared = header.e_shnum, "section header table truncated");
                break;
            }
        }
        index += 1;
    }

    // Second pass: names come from the section-name string table.
    if let Some(strtab) = out.get(header.e_shstrndx as usize).cloned() {
        let table_start = strtab.sh_offset;
        let table_len = clamp_span(data.len(), table_start, strtab.sh_size);
        for section in &mut out {
            let rel = u64::from(section.sh_name);
            if rel < table_len {
                section.name = data
                    .read_cstring_at((table_start + rel) as usize, (table_len - rel) as usize)
                    .unwrap_or_default();
            }
        }
    } else if !out.is_empty() {
        warn!(index = header.e_shstrndx, "section name table index out of range");
    }

    out
}

fn read_section_header(
    data: &[u8],
    header: &ElfHeader,
    fields: &[(&str, u64, u64)],
    index: usize,
    at: u64,
) -> Option<SectionHeader> {
    data.read_slice_at(at as usize, header.class.shdr_size() as usize)?;
    let get = |name: &str| {
        fields
            .iter()
            .find(|(n, _, _)| *n == name)
            .and_then(|&(_, off, size)| read_uint(data, (at + off) as usize, size, header.endian))
    };
    Some(SectionHeader {
        index,
        entry_offset: at,
        name: String::new(),
        sh_name: get("sh_name")? as u32,
        sh_type: get("sh_type")? as u32,
        sh_flags: get("sh_flags")?,
        sh_addr: get("sh_addr")?,
        sh_offset: get("sh_offset")?,
        sh_size: get("sh_size")?,
        sh_link: get("sh_link")? as u32,
        sh_info: get("sh_info")? as u32,
        sh_addralign: get("sh_addralign")?,
        sh_entsize: get("sh_entsize")?,
    })
}

fn type_label(sh: &SectionHeader) -> String {
    name_or_hex(section_type_name(sh.sh_type), sh.sh_type)
}

/// The "Section Headers" table region.
pub fn section_table_region(data: &[u8], header: &ElfHeader, sections: &[SectionHeader]) -> Region {
    let stride = entry_stride(header.e_shentsize, header.class.shdr_size());
    let entries = sections
        .iter()
        .map(|sh| {
            let mut fields = int_fields(data, sh.entry_offset, shdr_fields(header.class), header.endian);
            describe(&mut fields, "sh_name", sh.name.clone());
            describe(&mut fields, "sh_type", type_label(sh));
            describe(&mut fields, "sh_flags", flag_names(&sh.flags()));

            Region::new(
                format!("Section Header: {}", sh.label()),
                sh.entry_offset,
                stride,
                RegionKind::TableEntry,
            )
            .with_description(type_label(sh))
            .with_detail("Type", type_label(sh))
            .with_detail("Address", format!("{:#x}", sh.sh_addr))
            .with_detail("Offset", format!("{:#x}", sh.sh_offset))
            .with_detail("Size", format!("{:#x}", sh.sh_size))
            .with_detail("Flags", flag_names(&sh.flags()))
            .with_children(fields)
        })
        .collect();

    Region::new(
        "Section Headers",
        header.e_shoff,
        sections.len() as u64 * stride,
        RegionKind::Header,
    )
    .with_description(format!("{} sections", sections.len()))
    .with_children(entries)
}

/// File-backed bytes of a section. `SHT_NOBITS` and `SHT_NULL` sections have none.
pub fn section_data_region(data: &[u8], sh: &SectionHeader) -> Option<Region> {
    let declared = sh.file_size();
    if declared == 0 || sh.sh_offset >= data.len() as u64 {
        return None;
    }
    let size = clamp_span(data.len(), sh.sh_offset, declared);
    if size < declared {
        warn!(section = %sh.label(), declared, available = size, "section data truncated");
    }
    let bytes = &data[sh.sh_offset as usize..(sh.sh_offset + size) as usize];

    Some(
        Region::new(
            format!("Section: {}", sh.label()),
            sh.sh_offset,
            size,
            RegionKind::Data,
        )
        .with_description(type_label(sh))
        .with_detail("Address", format!("{:#x}", sh.sh_addr))
        .with_detail("Entropy", describe_entropy(bytes)),
    )
}

/// Mapping entry for an `SHF_ALLOC` section.
pub fn section_metadata(sh: &SectionHeader) -> Option<SectionMetadata> {
    sh.is_alloc().then(|| SectionMetadata {
        name: sh.label(),
        virtual_address: sh.sh_addr,
        virtual_size: sh.sh_size,
        file_offset: sh.sh_offset,
        file_size: sh.file_size(),
    })
}
