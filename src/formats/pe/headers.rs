//! PE header parsing

use crate::core::{Region, RegionKind};
use crate::error::ParseError;
use crate::formats::pe::types::*;
use crate::formats::utils::{flag_names, name_or_hex, Endian, ReadExt};
use crate::formats::{describe, int_fields};
use chrono::DateTime;

const DOS_FIELDS: &[(&str, u64, u64)] = &[
    ("e_magic", 0, 2),
    ("e_cblp", 2, 2),
    ("e_cp", 4, 2),
    ("e_crlc", 6, 2),
    ("e_cparhdr", 8, 2),
    ("e_minalloc", 10, 2),
    ("e_maxalloc", 12, 2),
    ("e_ss", 14, 2),
    ("e_sp", 16, 2),
    ("e_csum", 18, 2),
    ("e_ip", 20, 2),
    ("e_cs", 22, 2),
    ("e_lfarlc", 24, 2),
    ("e_ovno", 26, 2),
    ("e_res", 28, 8),
    ("e_oemid", 36, 2),
    ("e_oeminfo", 38, 2),
    ("e_res2", 40, 20),
    ("e_lfanew", 60, 4),
];

const COFF_FIELDS: &[(&str, u64, u64)] = &[
    ("Machine", 0, 2),
    ("NumberOfSections", 2, 2),
    ("TimeDateStamp", 4, 4),
    ("PointerToSymbolTable", 8, 4),
    ("NumberOfSymbols", 12, 4),
    ("SizeOfOptionalHeader", 16, 2),
    ("Characteristics", 18, 2),
];

const OPTIONAL32_FIELDS: &[(&str, u64, u64)] = &[
    ("Magic", 0, 2),
    ("MajorLinkerVersion", 2, 1),
    ("MinorLinkerVersion", 3, 1),
    ("SizeOfCode", 4, 4),
    ("SizeOfInitializedData", 8, 4),
    ("SizeOfUninitializedData", 12, 4),
    ("AddressOfEntryPoint", 16, 4),
    ("BaseOfCode", 20, 4),
    ("BaseOfData", 24, 4),
    ("ImageBase", 28, 4),
    ("SectionAlignment", 32, 4),
    ("FileAlignment", 36, 4),
    ("MajorOperatingSystemVersion", 40, 2),
    ("MinorOperatingSystemVersion", 42, 2),
    ("MajorImageVersion", 44, 2),
    ("MinorImageVersion", 46, 2),
    ("MajorSubsystemVersion", 48, 2),
    ("MinorSubsystemVersion", 50, 2),
    ("Win32VersionValue", 52, 4),
    ("SizeOfImage", 56, 4),
    ("SizeOfHeaders", 60, 4),
    ("CheckSum", 64, 4),
    ("Subsystem", 68, 2),
    ("DllCharacteristics", 70, 2),
    ("SizeOfStackReserve", 72, 4),
    ("SizeOfStackCommit", 76, 4),
    ("SizeOfHeapReserve", 80, 4),
    ("SizeOfHeapCommit", 84, 4),
    ("LoaderFlags", 88, 4),
    ("NumberOfRvaAndSizes", 92, 4),
];

// No BaseOfData; ImageBase and the stack/heap sizes widen to 8 bytes.
const OPTIONAL64_FIELDS: &[(&str, u64, u64)] = &[
    ("Magic", 0, 2),
    ("MajorLinkerVersion", 2, 1),
    ("MinorLinkerVersion", 3, 1),
    ("SizeOfCode", 4, 4),
    ("SizeOfInitializedData", 8, 4),
    ("SizeOfUninitializedData", 12, 4),
    ("AddressOfEntryPoint", 16, 4),
    ("BaseOfCode", 20, 4),
    ("ImageBase", 24, 8),
    ("SectionAlignment", 32, 4),
    ("FileAlignment", 36, 4),
    ("MajorOperatingSystemVersion", 40, 2),
    ("MinorOperatingSystemVersion", 42, 2),
    ("MajorImageVersion", 44, 2),
    ("MinorImageVersion", 46, 2),
    ("MajorSubsystemVersion", 48, 2),
    ("MinorSubsystemVersion", 50, 2),
    ("Win32VersionValue", 52, 4),
    ("SizeOfImage", 56, 4),
    ("SizeOfHeaders", 60, 4),
    ("CheckSum", 64, 4),
    ("Subsystem", 68, 2),
    ("DllCharacteristics", 70, 2),
    ("SizeOfStackReserve", 72, 8),
    ("SizeOfStackCommit", 80, 8),
    ("SizeOfHeapReserve", 88, 8),
    ("SizeOfHeapCommit", 96, 8),
    ("LoaderFlags", 104, 4),
    ("NumberOfRvaAndSizes", 108, 4),
];

const OPTIONAL32_SIZE: u64 = 96;
const OPTIONAL64_SIZE: u64 = 112;

/// Parse DOS header from data
pub fn parse_dos_header(data: &[u8]) -> Result<DosHeader, ParseError> {
    if data.len() < DOS_HEADER_SIZE {
        return Err(ParseError::truncated(
            "DOS header",
            0,
            DOS_HEADER_SIZE as u64,
            data.len(),
        ));
    }

    let e_magic = data
        .read_u16_le_at(0)
        .ok_or_else(|| ParseError::truncated("DOS header", 0, 2, data.len()))?;
    if e_magic != DOS_SIGNATURE {
        return Err(ParseError::structural(0, "Invalid DOS signature (expected MZ)"));
    }

    let e_lfanew = data
        .read_u32_le_at(60)
        .ok_or_else(|| ParseError::truncated("DOS header", 60, 4, data.len()))?;

    Ok(DosHeader { e_magic, e_lfanew })
}

pub fn dos_header_region(data: &[u8]) -> Region {
    let mut fields = int_fields(data, 0, DOS_FIELDS, Endian::Little);
    describe(&mut fields, "e_magic", "MZ");
    describe(&mut fields, "e_lfanew", "Offset of the NT headers");
    Region::new("DOS Header", 0, DOS_HEADER_SIZE as u64, RegionKind::Header).with_children(fields)
}

/// Bytes between the DOS header and the NT headers, if any.
pub fn dos_stub_region(data: &[u8], nt_offset: u64) -> Option<Region> {
    let start = DOS_HEADER_SIZE as u64;
    let end = nt_offset.min(data.len() as u64);
    if end <= start {
        return None;
    }
    let mut stub = Region::new("DOS Stub", start, end - start, RegionKind::Unclassified);
    if let Some(rich) = super::rich::rich_header_region(data, start as usize, end as usize) {
        stub.push_child(rich);
    }
    Some(stub)
}

/// Decoded NT headers plus the regions describing them.
pub struct NtHeaders {
    pub file_header: CoffHeader,
    pub optional_header: Option<OptionalHeader>,
    pub region: Region,
}

/// Parse PE signature, COFF header and optional header at `offset`.
///
/// A bad signature or a COFF header cut short by the end of the buffer is
/// fatal. Optional header problems only limit what gets decoded.
pub fn parse_nt_headers(data: &[u8], offset: u64) -> Result<NtHeaders, ParseError> {
    let start = offset as usize;
    let signature = data
        .read_slice_at(start, 4)
        .ok_or_else(|| ParseError::truncated("PE signature", offset, 4, data.len()))?;
    if signature != PE_SIGNATURE {
        return Err(ParseError::structural(
            offset,
            "Invalid PE signature (expected PE\\0\\0)",
        ));
    }

    let coff_offset = offset + 4;
    let file_header = parse_coff_header(data, coff_offset)?;
    let mut coff_fields = int_fields(data, coff_offset, COFF_FIELDS, Endian::Little);
    let machine_name = name_or_hex(file_header.machine.name(), file_header.machine_raw);
    describe(&mut coff_fields, "Machine", machine_name.clone());
    describe(
        &mut coff_fields,
        "TimeDateStamp",
        format_timestamp(file_header.time_date_stamp),
    );
    describe(
        &mut coff_fields,
        "Characteristics",
        flag_names(&FileCharacteristics::from_bits_truncate(
            file_header.characteristics,
        )),
    );

    let opt_offset = coff_offset + COFF_HEADER_SIZE;
    let opt_size = u64::from(file_header.size_of_optional_header);
    let nt_size = 4 + COFF_HEADER_SIZE + opt_size;
    let mut region = Region::new("NT Headers", offset, nt_size, RegionKind::Header)
        .with_detail("Machine", machine_name)
        .with_detail("Sections", file_header.number_of_sections.to_string());
    region.push_child(Region::field("Signature", offset, 4, "PE\\0\\0"));
    region.push_child(
        Region::new("File Header", coff_offset, COFF_HEADER_SIZE, RegionKind::Header)
            .with_children(coff_fields),
    );

    let mut optional_header = None;
    if opt_size > 0 {
        let (header, opt_region) = parse_optional_header(data, opt_offset, opt_size);
        if let Some(header) = &header {
            region.details.insert(
                "Format",
                if header.is_64bit() { "PE32+" } else { "PE32" },
            );
        }
        region.push_child(opt_region);
        optional_header = header;
    }

    Ok(NtHeaders {
        file_header,
        optional_header,
        region,
    })
}

/// Parse COFF header from data at offset
pub fn parse_coff_header(data: &[u8], offset: u64) -> Result<CoffHeader, ParseError> {
    let o = offset as usize;
    let truncated = || ParseError::truncated("COFF file header", offset, COFF_HEADER_SIZE, data.len());
    data.read_slice_at(o, COFF_HEADER_SIZE as usize)
        .ok_or_else(truncated)?;

    let machine_raw = data.read_u16_le_at(o).ok_or_else(truncated)?;
    Ok(CoffHeader {
        machine: Machine::from(machine_raw),
        machine_raw,
        number_of_sections: data.read_u16_le_at(o + 2).ok_or_else(truncated)?,
        time_date_stamp: data.read_u32_le_at(o + 4).ok_or_else(truncated)?,
        size_of_optional_header: data.read_u16_le_at(o + 16).ok_or_else(truncated)?,
        characteristics: data.read_u16_le_at(o + 18).ok_or_else(truncated)?,
    })
}

/// Parse the optional header and its data directories.
///
/// Never fails: an unknown magic yields an undecoded region, and a header
/// shorter than its fixed layout decodes only the fields that fit in `size`.
pub fn parse_optional_header(
    data: &[u8],
    offset: u64,
    size: u64,
) -> (Option<OptionalHeader>, Region) {
    let declared_end = offset.saturating_add(size).min(data.len() as u64) as usize;
    let view = data.get(..declared_end).unwrap_or(&[]);
    let region = Region::new("Optional Header", offset, size, RegionKind::Header);

    let Some(magic) = view.read_u16_le_at(offset as usize) else {
        return (None, region.with_description("Truncated"));
    };
    let (layout, fixed_size) = match magic {
        PE32_MAGIC => (OPTIONAL32_FIELDS, OPTIONAL32_SIZE),
        PE32PLUS_MAGIC => (OPTIONAL64_FIELDS, OPTIONAL64_SIZE),
        _ => {
            return (
                None,
                region
                    .with_description(format!("Unknown magic {:#06x}", magic))
                    .with_children(vec![Region::field("Magic", offset, 2, magic)]),
            )
        }
    };

    let mut fields = int_fields(view, offset, layout, Endian::Little);
    let get = |name: &str| crate::formats::field_value(&fields, name).unwrap_or(0);

    let subsystem_raw = get("Subsystem") as u16;
    let subsystem = Subsystem::from(subsystem_raw);
    let dll_characteristics = get("DllCharacteristics") as u16;
    let number_of_rva_and_sizes = get("NumberOfRvaAndSizes") as u32;
    let address_of_entry_point = get("AddressOfEntryPoint") as u32;
    let image_base = get("ImageBase");

    describe(
        &mut fields,
        "Magic",
        if magic == PE32PLUS_MAGIC { "PE32+" } else { "PE32" },
    );
    describe(
        &mut fields,
        "Subsystem",
        name_or_hex(subsystem.name(), subsystem_raw),
    );
    describe(
        &mut fields,
        "DllCharacteristics",
        flag_names(&DllCharacteristics::from_bits_truncate(dll_characteristics)),
    );

    // Data directories fill the rest of the declared optional header.
    let dir_base = offset + fixed_size;
    let declared = (number_of_rva_and_sizes as usize).min(MAX_DATA_DIRECTORIES);
    let fits = (size.saturating_sub(fixed_size) / 8) as usize;
    let mut data_directories = Vec::with_capacity(declared.min(fits));
    let mut dir_entries = Vec::new();
    for (index, name) in DATA_DIRECTORY_NAMES
        .iter()
        .enumerate()
        .take(declared.min(fits))
    {
        let entry_offset = dir_base + (index as u64) * 8;
        let (Some(rva), Some(dir_size)) = (
            view.read_u32_le_at(entry_offset as usize),
            view.read_u32_le_at(entry_offset as usize + 4),
        ) else {
            break;
        };
        let dir = DataDirectory {
            virtual_address: rva,
            size: dir_size,
        };
        data_directories.push(dir);
        if dir.is_present() {
            dir_entries.push(
                Region::new(*name, entry_offset, 8, RegionKind::TableEntry)
                    .with_detail("RVA", format!("{:#x}", rva))
                    .with_detail("Size", format!("{:#x}", dir_size))
                    .with_children(vec![
                        Region::field("VirtualAddress", entry_offset, 4, rva),
                        Region::field("Size", entry_offset + 4, 4, dir_size),
                    ]),
            );
        }
    }

    let mut region = region
        .with_detail("Entry Point", format!("{:#x}", address_of_entry_point))
        .with_detail("Image Base", format!("{:#x}", image_base))
        .with_children(fields);
    if size < fixed_size {
        region = region.with_description(format!(
            "Short header ({:#x} of {:#x} bytes)",
            size, fixed_size
        ));
    }
    if !data_directories.is_empty() {
        let span = data_directories.len() as u64 * 8;
        region.push_child(
            Region::new("Data Directories", dir_base, span, RegionKind::Record)
                .with_children(dir_entries),
        );
    }

    (
        Some(OptionalHeader {
            magic,
            address_of_entry_point,
            image_base,
            subsystem,
            dll_characteristics,
            number_of_rva_and_sizes,
            data_directories,
        }),
        region,
    )
}

/// Render a COFF timestamp as a UTC date.
pub fn format_timestamp(timestamp: u32) -> String {
    if timestamp == 0 {
        return "Not set".to_string();
    }
    match DateTime::from_timestamp(i64::from(timestamp), 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{:#x}", timestamp),
    }
}
