//! Load command walking and decoding

use crate::core::{Region, RegionKind};
use crate::formats::macho::types::*;
use crate::formats::utils::{flag_names, name_or_hex, to_usize, ReadExt};
use crate::formats::{describe, field_value, int_fields, set_text};
use tracing::{debug, warn};

type FieldTable = &'static [(&'static str, u64, u64)];

const COMMAND_FIELDS: FieldTable = &[("cmd", 0, 4), ("cmdsize", 4, 4)];

const SEGMENT32_FIELDS: FieldTable = &[
    ("segname", 8, 16),
    ("vmaddr", 24, 4),
    ("vmsize", 28, 4),
    ("fileoff", 32, 4),
    ("filesize", 36, 4),
    ("maxprot", 40, 4),
    ("initprot", 44, 4),
    ("nsects", 48, 4),
    ("flags", 52, 4),
];

const SEGMENT64_FIELDS: FieldTable = &[
    ("segname", 8, 16),
    ("vmaddr", 24, 8),
    ("vmsize", 32, 8),
    ("fileoff", 40, 8),
    ("filesize", 48, 8),
    ("maxprot", 56, 4),
    ("initprot", 60, 4),
    ("nsects", 64, 4),
    ("flags", 68, 4),
];

const SECTION32_FIELDS: FieldTable = &[
    ("sectname", 0, 16),
    ("segname", 16, 16),
    ("addr", 32, 4),
    ("size", 36, 4),
    ("offset", 40, 4),
    ("align", 44, 4),
    ("reloff", 48, 4),
    ("nreloc", 52, 4),
    ("flags", 56, 4),
    ("reserved1", 60, 4),
    ("reserved2", 64, 4),
];

const SECTION64_FIELDS: FieldTable = &[
    ("sectname", 0, 16),
    ("segname", 16, 16),
    ("addr", 32, 8),
    ("size", 40, 8),
    ("offset", 48, 4),
    ("align", 52, 4),
    ("reloff", 56, 4),
    ("nreloc", 60, 4),
    ("flags", 64, 4),
    ("reserved1", 68, 4),
    ("reserved2", 72, 4),
    ("reserved3", 76, 4),
];

const SYMTAB_FIELDS: FieldTable = &[
    ("symoff", 8, 4),
    ("nsyms", 12, 4),
    ("stroff", 16, 4),
    ("strsize", 20, 4),
];

const DYSYMTAB_FIELDS: FieldTable = &[
    ("ilocalsym", 8, 4),
    ("nlocalsym", 12, 4),
    ("iextdefsym", 16, 4),
    ("nextdefsym", 20, 4),
    ("iundefsym", 24, 4),
    ("nundefsym", 28, 4),
    ("tocoff", 32, 4),
    ("ntoc", 36, 4),
    ("modtaboff", 40, 4),
    ("nmodtab", 44, 4),
    ("extrefsymoff", 48, 4),
    ("nextrefsyms", 52, 4),
    ("indirectsymoff", 56, 4),
    ("nindirectsyms", 60, 4),
    ("extreloff", 64, 4),
    ("nextrel", 68, 4),
    ("locreloff", 72, 4),
    ("nlocrel", 76, 4),
];

const DYLIB_FIELDS: FieldTable = &[
    ("name_offset", 8, 4),
    ("timestamp", 12, 4),
    ("current_version", 16, 4),
    ("compatibility_version", 20, 4),
];

const PATH_FIELDS: FieldTable = &[("path_offset", 8, 4)];

const UUID_FIELDS: FieldTable = &[("uuid", 8, 16)];

const MAIN_FIELDS: FieldTable = &[("entryoff", 8, 8), ("stacksize", 16, 8)];

const LINKEDIT_FIELDS: FieldTable = &[("dataoff", 8, 4), ("datasize", 12, 4)];

const DYLD_INFO_FIELDS: FieldTable = &[
    ("rebase_off", 8, 4),
    ("rebase_size", 12, 4),
    ("bind_off", 16, 4),
    ("bind_size", 20, 4),
    ("weak_bind_off", 24, 4),
    ("weak_bind_size", 28, 4),
    ("lazy_bind_off", 32, 4),
    ("lazy_bind_size", 36, 4),
    ("export_off", 40, 4),
    ("export_size", 44, 4),
];

const VERSION_MIN_FIELDS: FieldTable = &[("version", 8, 4), ("sdk", 12, 4)];

const BUILD_VERSION_FIELDS: FieldTable = &[
    ("platform", 8, 4),
    ("minos", 12, 4),
    ("sdk", 16, 4),
    ("ntools", 20, 4),
];

const SOURCE_VERSION_FIELDS: FieldTable = &[("version", 8, 8)];

const ENCRYPTION32_FIELDS: FieldTable = &[("cryptoff", 8, 4), ("cryptsize", 12, 4), ("cryptid", 16, 4)];

const ENCRYPTION64_FIELDS: FieldTable = &[
    ("cryptoff", 8, 4),
    ("cryptsize", 12, 4),
    ("cryptid", 16, 4),
    ("pad", 20, 4),
];

const BUILD_TOOL_SIZE: u64 = 8;

const DYLD_INFO_PAIRS: &[(&str, &str, &str)] = &[
    ("Rebase", "rebase_off", "rebase_size"),
    ("Bind", "bind_off", "bind_size"),
    ("Weak Bind", "weak_bind_off", "weak_bind_size"),
    ("Lazy Bind", "lazy_bind_off", "lazy_bind_size"),
    ("Export", "export_off", "export_size"),
];

fn is_dylib_command(cmd: u32) -> bool {
    matches!(
        cmd,
        LC_LOAD_DYLIB
            | LC_ID_DYLIB
            | LC_LOAD_WEAK_DYLIB
            | LC_REEXPORT_DYLIB
            | LC_LAZY_LOAD_DYLIB
            | LC_LOAD_UPWARD_DYLIB
    )
}

fn is_linkedit_command(cmd: u32) -> bool {
    matches!(
        cmd,
        LC_CODE_SIGNATURE
            | LC_SEGMENT_SPLIT_INFO
            | LC_FUNCTION_STARTS
            | LC_DATA_IN_CODE
            | LC_DYLIB_CODE_SIGN_DRS
            | LC_LINKER_OPTIMIZATION_HINT
            | LC_DYLD_EXPORTS_TRIE
            | LC_DYLD_CHAINED_FIXUPS
    )
}

fn command_body_fields(cmd: u32) -> FieldTable {
    match cmd {
        LC_SEGMENT => SEGMENT32_FIELDS,
        LC_SEGMENT_64 => SEGMENT64_FIELDS,
        LC_SYMTAB => SYMTAB_FIELDS,
        LC_DYSYMTAB => DYSYMTAB_FIELDS,
        LC_LOAD_DYLINKER | LC_ID_DYLINKER | LC_RPATH | LC_DYLD_ENVIRONMENT => PATH_FIELDS,
        LC_UUID => UUID_FIELDS,
        LC_MAIN => MAIN_FIELDS,
        LC_DYLD_INFO | LC_DYLD_INFO_ONLY => DYLD_INFO_FIELDS,
        LC_VERSION_MIN_MACOSX
        | LC_VERSION_MIN_IPHONEOS
        | LC_VERSION_MIN_TVOS
        | LC_VERSION_MIN_WATCHOS => VERSION_MIN_FIELDS,
        LC_BUILD_VERSION => BUILD_VERSION_FIELDS,
        LC_SOURCE_VERSION => SOURCE_VERSION_FIELDS,
        LC_ENCRYPTION_INFO => ENCRYPTION32_FIELDS,
        LC_ENCRYPTION_INFO_64 => ENCRYPTION64_FIELDS,
        c if is_dylib_command(c) => DYLIB_FIELDS,
        c if is_linkedit_command(c) => LINKEDIT_FIELDS,
        _ => &[],
    }
}

/// Everything the load-command walk produced.
#[derive(Debug)]
pub struct LoadCommands {
    /// The "Load Commands" container with one record per command.
    pub region: Region,
    pub segments: Vec<Segment>,
    pub entry_offset: Option<u64>,
    pub uuid: Option<String>,
    pub dylibs: Vec<String>,
}

/// Walk `ncmds` load commands by `cmdsize`.
///
/// A command smaller than 8 bytes or running past the buffer ends the walk;
/// everything decoded up to that point is kept.
pub fn parse_load_commands(data: &[u8], header: &MachHeader) -> LoadCommands {
    let start = header.size();
    let mut cursor = start;
    let mut out = LoadCommands {
        region: Region::new("Load Commands", start, 0, RegionKind::Header),
        segments: Vec::new(),
        entry_offset: None,
        uuid: None,
        dylibs: Vec::new(),
    };
    let mut records = Vec::new();

    for index in 0..header.ncmds {
        let at = to_usize(cursor);
        let (Some(cmd), Some(cmdsize)) = (
            data.read_u32_at(at, header.endian),
            data.read_u32_at(at.saturating_add(4), header.endian),
        ) else {
            warn!(index, offset = cursor, "load command header past end of data");
            break;
        };
        let cmdsize = u64::from(cmdsize);
        if cmdsize < LOAD_COMMAND_MIN_SIZE {
            warn!(index, cmdsize, "load command smaller than its own header");
            break;
        }
        if cursor + cmdsize > data.len() as u64 {
            warn!(index, cmdsize, offset = cursor, "load command runs past end of data");
            break;
        }
        records.push(decode_command(data, header, cursor, cmd, cmdsize, &mut out));
        cursor += cmdsize;
    }

    if cursor > header.commands_end() {
        warn!(
            walked = cursor - start,
            declared = header.sizeofcmds,
            "load commands exceed sizeofcmds"
        );
    }
    debug!(
        commands = records.len(),
        segments = out.segments.len(),
        "mach-o load commands"
    );

    out.region.size = u64::from(header.sizeofcmds).max(cursor - start);
    out.region.description = Some(format!("{} commands", records.len()));
    for record in records {
        out.region.push_child(record);
    }
    out
}

fn decode_command(
    data: &[u8],
    header: &MachHeader,
    offset: u64,
    cmd: u32,
    cmdsize: u64,
    out: &mut LoadCommands,
) -> Region {
    let endian = header.endian;
    let name = name_or_hex(load_command_name(cmd), cmd);
    let body: Vec<_> = command_body_fields(cmd)
        .iter()
        .copied()
        .filter(|&(_, rel, size)| rel + size <= cmdsize)
        .collect();

    let mut fields = int_fields(data, offset, COMMAND_FIELDS, endian);
    describe(&mut fields, "cmd", name.clone());
    fields.extend(int_fields(data, offset, &body, endian));
    let get = |fields: &[Region], field: &str| field_value(fields, field).unwrap_or(0);

    let mut region = Region::new(name.clone(), offset, cmdsize, RegionKind::Record);

    match cmd {
        LC_SEGMENT | LC_SEGMENT_64 => {
            let segname = data
                .read_fixed_str_at(to_usize(offset + 8), 16)
                .unwrap_or_default();
            set_text(&mut fields, "segname", segname.clone());
            let maxprot = get(&fields, "maxprot") as u32;
            let initprot = get(&fields, "initprot") as u32;
            describe(&mut fields, "maxprot", VmProt::from_bits_truncate(maxprot).short());
            describe(&mut fields, "initprot", VmProt::from_bits_truncate(initprot).short());

            let mut segment = Segment {
                command_offset: offset,
                segname: segname.clone(),
                vmaddr: get(&fields, "vmaddr"),
                vmsize: get(&fields, "vmsize"),
                fileoff: get(&fields, "fileoff"),
                filesize: get(&fields, "filesize"),
                maxprot,
                initprot,
                nsects: get(&fields, "nsects") as u32,
                flags: get(&fields, "flags") as u32,
                sections: Vec::new(),
            };
            let headers = parse_sections(data, header, offset, cmdsize, &mut segment);
            fields.extend(headers);

            region.name = format!("{} ({})", name, segname);
            region = region
                .with_description(segment.protection())
                .with_detail("Segment", segname)
                .with_detail("VM Address", format!("{:#x}", segment.vmaddr))
                .with_detail("VM Size", format!("{:#x}", segment.vmsize))
                .with_detail("File Offset", format!("{:#x}", segment.fileoff))
                .with_detail("File Size", format!("{:#x}", segment.filesize))
                .with_detail("Protection", segment.protection())
                .with_detail("Sections", segment.sections.len().to_string());
            out.segments.push(segment);
        }
        LC_MAIN => {
            let entry = get(&fields, "entryoff");
            out.entry_offset = Some(entry);
            region = region
                .with_detail("Entry Offset", format!("{:#x}", entry))
                .with_detail("Stack Size", format!("{:#x}", get(&fields, "stacksize")));
        }
        LC_UUID => {
            if let Some(bytes) = data.read_slice_at(to_usize(offset + 8), 16) {
                let uuid = format_uuid(bytes);
                set_text(&mut fields, "uuid", uuid.clone());
                region = region.with_description(uuid.clone()).with_detail("UUID", uuid.clone());
                out.uuid = Some(uuid);
            }
        }
        LC_SYMTAB => {
            region = region
                .with_detail("Symbols", get(&fields, "nsyms").to_string())
                .with_detail("Symbol Table Offset", format!("{:#x}", get(&fields, "symoff")))
                .with_detail("String Table Offset", format!("{:#x}", get(&fields, "stroff")))
                .with_detail("String Table Size", format!("{:#x}", get(&fields, "strsize")));
        }
        LC_DYSYMTAB => {
            region = region
                .with_detail("Local Symbols", get(&fields, "nlocalsym").to_string())
                .with_detail("External Symbols", get(&fields, "nextdefsym").to_string())
                .with_detail("Undefined Symbols", get(&fields, "nundefsym").to_string())
                .with_detail("Indirect Symbols", get(&fields, "nindirectsyms").to_string());
        }
        LC_DYLD_INFO | LC_DYLD_INFO_ONLY => {
            for &(label, off, size) in DYLD_INFO_PAIRS {
                let size = get(&fields, size);
                if size > 0 {
                    region = region.with_detail(
                        label,
                        format!("{:#x} ({} bytes)", get(&fields, off), size),
                    );
                }
            }
        }
        LC_VERSION_MIN_MACOSX
        | LC_VERSION_MIN_IPHONEOS
        | LC_VERSION_MIN_TVOS
        | LC_VERSION_MIN_WATCHOS => {
            let version = format_version(get(&fields, "version") as u32);
            let sdk = format_version(get(&fields, "sdk") as u32);
            describe(&mut fields, "version", version.clone());
            describe(&mut fields, "sdk", sdk.clone());
            region = region
                .with_description(version.clone())
                .with_detail("Minimum OS", version)
                .with_detail("SDK", sdk);
        }
        LC_BUILD_VERSION => {
            let platform = get(&fields, "platform") as u32;
            let platform = name_or_hex(platform_name(platform), platform);
            let minos = format_version(get(&fields, "minos") as u32);
            let sdk = format_version(get(&fields, "sdk") as u32);
            describe(&mut fields, "platform", platform.clone());
            describe(&mut fields, "minos", minos.clone());
            describe(&mut fields, "sdk", sdk.clone());
            region = region
                .with_description(format!("{} {}", platform, minos))
                .with_detail("Platform", platform)
                .with_detail("Minimum OS", minos)
                .with_detail("SDK", sdk);

            let ntools = get(&fields, "ntools");
            for i in 0..ntools {
                let at = offset + 24 + i * BUILD_TOOL_SIZE;
                if at + BUILD_TOOL_SIZE > offset + cmdsize {
                    break;
                }
                let (Some(tool), Some(version)) = (
                    data.read_u32_at(to_usize(at), endian),
                    data.read_u32_at(to_usize(at + 4), endian),
                ) else {
                    break;
                };
                let label = format!(
                    "{} {}",
                    name_or_hex(build_tool_name(tool), tool),
                    format_version(version)
                );
                region = region.with_detail(format!("Tool {}", i), label.clone());
                fields.push(
                    Region::new(format!("Tool {}", i), at, BUILD_TOOL_SIZE, RegionKind::TableEntry)
                        .with_description(label)
                        .with_children(int_fields(
                            data,
                            at,
                            &[("tool", 0, 4), ("version", 4, 4)],
                            endian,
                        )),
                );
            }
        }
        LC_SOURCE_VERSION => {
            let version = format_source_version(get(&fields, "version"));
            describe(&mut fields, "version", version.clone());
            region = region.with_description(version.clone()).with_detail("Version", version);
        }
        LC_ENCRYPTION_INFO | LC_ENCRYPTION_INFO_64 => {
            let encrypted = get(&fields, "cryptid") != 0;
            region = region
                .with_description(if encrypted { "encrypted" } else { "not encrypted" })
                .with_detail("Crypt Offset", format!("{:#x}", get(&fields, "cryptoff")))
                .with_detail("Crypt Size", format!("{:#x}", get(&fields, "cryptsize")))
                .with_detail("Encrypted", if encrypted { "yes" } else { "no" });
        }
        c if is_dylib_command(c) => {
            if let Some((path, string_field)) =
                lc_str(data, offset, cmdsize, get(&fields, "name_offset"), "name")
            {
                fields.push(string_field);
                region = region
                    .with_description(path.clone())
                    .with_detail("Path", path.clone())
                    .with_detail(
                        "Current Version",
                        format_version(get(&fields, "current_version") as u32),
                    )
                    .with_detail(
                        "Compatibility Version",
                        format_version(get(&fields, "compatibility_version") as u32),
                    );
                out.dylibs.push(path);
            }
        }
        LC_LOAD_DYLINKER | LC_ID_DYLINKER | LC_RPATH | LC_DYLD_ENVIRONMENT => {
            if let Some((path, string_field)) =
                lc_str(data, offset, cmdsize, get(&fields, "path_offset"), "path")
            {
                fields.push(string_field);
                region = region.with_description(path.clone()).with_detail("Path", path);
            }
        }
        c if is_linkedit_command(c) => {
            region = region
                .with_detail("Data Offset", format!("{:#x}", get(&fields, "dataoff")))
                .with_detail("Data Size", format!("{:#x}", get(&fields, "datasize")));
        }
        _ => {
            if load_command_name(cmd).is_none() {
                debug!(cmd, offset, "unknown load command");
            }
        }
    }

    region.with_children(fields)
}

/// Embedded `lc_str`: a NUL-terminated string at a command-relative offset.
fn lc_str(
    data: &[u8],
    offset: u64,
    cmdsize: u64,
    rel: u64,
    label: &str,
) -> Option<(String, Region)> {
    if rel < LOAD_COMMAND_MIN_SIZE || rel >= cmdsize {
        return None;
    }
    let text = data.read_cstring_at(to_usize(offset + rel), to_usize(cmdsize - rel))?;
    let field = Region::new(label, offset + rel, cmdsize - rel, RegionKind::Field).with_value(text.clone());
    Some((text, field))
}

fn format_uuid(bytes: &[u8]) -> String {
    let hex = hex::encode_upper(bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Decode the section headers that follow a segment command, bounded by `cmdsize`.
fn parse_sections(
    data: &[u8],
    header: &MachHeader,
    command_offset: u64,
    cmdsize: u64,
    segment: &mut Segment,
) -> Vec<Region> {
    let (segment_size, section_size, table) = if header.is_64 {
        (72, SECTION64_SIZE, SECTION64_FIELDS)
    } else {
        (56, SECTION32_SIZE, SECTION32_FIELDS)
    };
    let mut regions = Vec::new();
    let command_end = command_offset + cmdsize;

    for i in 0..u64::from(segment.nsects) {
        let at = command_offset + segment_size + i * section_size;
        if at + section_size > command_end {
            warn!(
                segment = %segment.segname,
                declared = segment.nsects,
                decoded = i,
                "section headers overrun segment command"
            );
            break;
        }
        let mut fields = int_fields(data, at, table, header.endian);
        let sectname = data.read_fixed_str_at(to_usize(at), 16).unwrap_or_default();
        let segname = data
            .read_fixed_str_at(to_usize(at + 16), 16)
            .unwrap_or_default();
        set_text(&mut fields, "sectname", sectname.clone());
        set_text(&mut fields, "segname", segname.clone());

        let get = |name: &str| field_value(&fields, name).unwrap_or(0);
        let section = Section {
            entry_offset: at,
            sectname,
            segname,
            addr: get("addr"),
            size: get("size"),
            offset: get("offset") as u32,
            align: get("align") as u32,
            reloff: get("reloff") as u32,
            nreloc: get("nreloc") as u32,
            flags: get("flags") as u32,
        };

        let attributes = flag_names(&section.attributes());
        let flags_text = if attributes.is_empty() {
            section.type_label()
        } else {
            format!("{}, {}", section.type_label(), attributes)
        };
        describe(&mut fields, "flags", flags_text.clone());
        describe(&mut fields, "align", format!("2^{}", section.align));

        regions.push(
            Region::new(
                format!("Section Header: {}", section.sectname),
                at,
                section_size,
                RegionKind::TableEntry,
            )
            .with_description(section.type_label())
            .with_detail("Address", format!("{:#x}", section.addr))
            .with_detail("Size", format!("{:#x}", section.size))
            .with_detail("Offset", format!("{:#x}", section.offset))
            .with_detail("Flags", flags_text)
            .with_children(fields),
        );
        segment.sections.push(section);
    }
    regions
}
