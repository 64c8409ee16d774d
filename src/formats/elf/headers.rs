//! ELF header parsing

use crate::core::{Region, RegionKind};
use crate::error::ParseError;
use crate::formats::elf::types::*;
use crate::formats::utils::{name_or_hex, ReadExt};
use crate::formats::{describe, int_fields, read_uint};
use tracing::debug;

const IDENT_FIELDS: &[(&str, u64, u64)] = &[
    ("EI_MAG", 0, 4),
    ("EI_CLASS", 4, 1),
    ("EI_DATA", 5, 1),
    ("EI_VERSION", 6, 1),
    ("EI_OSABI", 7, 1),
    ("EI_ABIVERSION", 8, 1),
    ("EI_PAD", 9, 7),
];

const HEADER32_FIELDS: &[(&str, u64, u64)] = &[
    ("e_type", 16, 2),
    ("e_machine", 18, 2),
    ("e_version", 20, 4),
    ("e_entry", 24, 4),
    ("e_phoff", 28, 4),
    ("e_shoff", 32, 4),
    ("e_flags", 36, 4),
    ("e_ehsize", 40, 2),
    ("e_phentsize", 42, 2),
    ("e_phnum", 44, 2),
    ("e_shentsize", 46, 2),
    ("e_shnum", 48, 2),
    ("e_shstrndx", 50, 2),
];

const HEADER64_FIELDS: &[(&str, u64, u64)] = &[
    ("e_type", 16, 2),
    ("e_machine", 18, 2),
    ("e_version", 20, 4),
    ("e_entry", 24, 8),
    ("e_phoff", 32, 8),
    ("e_shoff", 40, 8),
    ("e_flags", 48, 4),
    ("e_ehsize", 52, 2),
    ("e_phentsize", 54, 2),
    ("e_phnum", 56, 2),
    ("e_shentsize", 58, 2),
    ("e_shnum", 60, 2),
    ("e_shstrndx", 62, 2),
];

fn header_fields(class: ElfClass) -> &'static [(&'static str, u64, u64)] {
    match class {
        ElfClass::Elf32 => HEADER32_FIELDS,
        ElfClass::Elf64 => HEADER64_FIELDS,
    }
}

/// Parse ELF header
pub fn parse_header(data: &[u8]) -> Result<ElfHeader, ParseError> {
    if data.len() < EI_NIDENT {
        return Err(ParseError::truncated(
            "ELF identification",
            0,
            EI_NIDENT as u64,
            data.len(),
        ));
    }
    if &data[0..4] != ELF_MAGIC {
        return Err(ParseError::structural(0, "Invalid ELF magic"));
    }
    let class = ElfClass::from_u8(data[4]).ok_or(ParseError::UnsupportedVariant {
        field: "EI_CLASS",
        value: u64::from(data[4]),
    })?;
    let endian = endian_from_u8(data[5]).ok_or(ParseError::UnsupportedVariant {
        field: "EI_DATA",
        value: u64::from(data[5]),
    })?;

    let header_size = class.header_size();
    if (data.len() as u64) < header_size {
        return Err(ParseError::truncated("ELF header", 0, header_size, data.len()));
    }

    let fields = header_fields(class);
    let get = |name: &str| -> u64 {
        fields
            .iter()
            .find(|(n, _, _)| *n == name)
            .and_then(|&(_, off, size)| read_uint(data, off as usize, size, endian))
            .unwrap_or(0)
    };

    let mut header = ElfHeader {
        class,
        endian,
        osabi: data[7],
        e_type: get("e_type") as u16,
        e_machine: get("e_machine") as u16,
        e_entry: get("e_entry"),
        e_phoff: get("e_phoff"),
        e_shoff: get("e_shoff"),
        e_flags: get("e_flags") as u32,
        e_ehsize: get("e_ehsize") as u16,
        e_phentsize: get("e_phentsize") as u16,
        e_phnum: get("e_phnum") as u32,
        e_shentsize: get("e_shentsize") as u16,
        e_shnum: get("e_shnum"),
        e_shstrndx: get("e_shstrndx") as u32,
    };
    resolve_extended_numbering(data, &mut header);
    Ok(header)
}

/// Counts that overflow 16 bits live in section header 0:
/// `sh_size` for e_shnum, `sh_link` for e_shstrndx, `sh_info` for e_phnum.
fn resolve_extended_numbering(data: &[u8], header: &mut ElfHeader) {
    let needs_shnum = header.e_shnum == 0;
    let needs_strndx = header.e_shstrndx == SHN_XINDEX;
    let needs_phnum = header.e_phnum == PN_XNUM;
    if header.e_shoff == 0 || !(needs_shnum || needs_strndx || needs_phnum) {
        return;
    }

    let base = header.e_shoff as usize;
    let endian = header.endian;
    let (size_off, link_off, info_off) = match header.class {
        ElfClass::Elf32 => (20, 24, 28),
        ElfClass::Elf64 => (32, 40, 44),
    };
    let word = header.class.word();

    if needs_shnum {
        if let Some(n) = base
            .checked_add(size_off)
            .and_then(|o| read_uint(data, o, word, endian))
        {
            debug!(count = n, "extended section count");
            header.e_shnum = n;
        }
    }
    if needs_strndx {
        if let Some(n) = base
            .checked_add(link_off)
            .and_then(|o| data.read_u32_at(o, endian))
        {
            header.e_shstrndx = n;
        }
    }
    if needs_phnum {
        if let Some(n) = base
            .checked_add(info_off)
            .and_then(|o| data.read_u32_at(o, endian))
        {
            header.e_phnum = n;
        }
    }
}

/// The "ELF Header" region, including the identification block.
pub fn header_region(data: &[u8], header: &ElfHeader) -> Region {
    let mut ident = int_fields(data, 0, IDENT_FIELDS, header.endian);
    if let Some(magic) = ident.first_mut() {
        magic.value = Some("\\x7fELF".into());
    }
    describe(&mut ident, "EI_CLASS", header.class.name());
    describe(&mut ident, "EI_DATA", header.endian.name());
    describe(
        &mut ident,
        "EI_OSABI",
        name_or_hex(osabi_name(header.osabi), header.osabi),
    );

    let type_name = name_or_hex(file_type_name(header.e_type), header.e_type);
    let machine = name_or_hex(machine_name(header.e_machine), header.e_machine);
    let mut fields = int_fields(data, 0, header_fields(header.class), header.endian);
    describe(&mut fields, "e_type", type_name.clone());
    describe(&mut fields, "e_machine", machine.clone());

    let mut children = vec![Region::new("e_ident", 0, EI_NIDENT as u64, RegionKind::Record)
        .with_children(ident)];
    children.extend(fields);

    Region::new("ELF Header", 0, header.class.header_size(), RegionKind::Header)
        .with_detail("Class", header.class.name())
        .with_detail("Data", header.endian.name())
        .with_detail("Type", type_name)
        .with_detail("Machine", machine)
        .with_detail("Entry Point", format!("{:#x}", header.e_entry))
        .with_children(children)
}

/// Bytes per table entry: the declared size, but never less than the fields we read.
pub fn entry_stride(declared: u16, minimum: u64) -> u64 {
    u64::from(declared).max(minimum)
}
