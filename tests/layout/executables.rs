use crate::common::*;
use binlayout::{to_file_offset, to_virtual_address, FileFormat};

#[test]
fn pe_sections_feed_the_mapper() {
    let parsed = parse_bytes(pe32(), "tiny.exe");
    let names: Vec<_> = parsed.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![".text", ".data"]);

    assert_eq!(to_virtual_address(0x210, &parsed.sections), Some(0x1010));
    assert_eq!(to_virtual_address(0x400, &parsed.sections), Some(0x2000));
    assert_eq!(to_virtual_address(0x40, &parsed.sections), Some(0x40));
    // raw padding past .text's virtual size
    assert_eq!(to_virtual_address(0x390, &parsed.sections), None);
    assert_eq!(to_file_offset(0x1010, &parsed.sections), Some(0x210));
}

#[test]
fn pe_overlay_closes_the_file() {
    let mut data = pe32();
    data.extend_from_slice(&[0x42; 0x80]);
    let len = data.len() as u64;
    let parsed = parse_bytes(data, "overlay.exe");
    let last = parsed.regions.last().unwrap();
    assert_eq!(last.name, "Overlay");
    assert_eq!((last.offset, last.end()), (0x600, len));
    assert_eq!(to_virtual_address(0x610, &parsed.sections), None);
}

#[test]
fn pe_unknown_optional_magic_keeps_walking() {
    let mut data = pe32();
    // ROM image magic
    data[0x98..0x9A].copy_from_slice(&0x107u16.to_le_bytes());
    let parsed = parse_bytes(data, "rom.exe");
    assert!(parsed.is_valid, "{:?}", parsed.error);

    let nt = parsed.regions.iter().find(|r| r.name == "NT Headers").unwrap();
    let opt = nt.children.iter().find(|r| r.name == "Optional Header").unwrap();
    assert_eq!(opt.description.as_deref(), Some("Unknown magic 0x0107"));

    let names: Vec<_> = parsed.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![".text", ".data"]);
    assert!(parsed.regions.iter().any(|r| r.name == "Section Headers"));
}

#[test]
fn pe_short_optional_header_keeps_walking() {
    let parsed = parse_bytes(pe32_short_optional(0x40), "short.exe");
    assert!(parsed.is_valid, "{:?}", parsed.error);

    let table = parsed.regions.iter().find(|r| r.name == "Section Headers").unwrap();
    assert_eq!(table.offset, 0x98 + 0x40);
    assert_eq!(parsed.sections.len(), 2);
    assert_eq!(to_virtual_address(0x210, &parsed.sections), Some(0x1010));
}

#[test]
fn elf32_big_endian_tables() {
    let parsed = parse_bytes(elf32_be(), "tiny.ppc");
    assert!(parsed.is_valid, "{:?}", parsed.error);
    assert_eq!(parsed.format, FileFormat::Elf);

    let header = &parsed.regions[0];
    assert_eq!(header.name, "ELF Header");
    assert_eq!(header.size, 52);
    assert_eq!(header.details.get("Class"), Some("ELF32"));
    assert_eq!(header.details.get("Data"), Some("big-endian"));
    assert_eq!(header.details.get("Entry Point"), Some("0x10000100"));

    let phdrs = parsed.regions.iter().find(|r| r.name == "Program Headers").unwrap();
    assert_eq!((phdrs.offset, phdrs.size), (52, 64));
    assert_eq!(phdrs.children.len(), 2);
    let load = &phdrs.children[0];
    assert_eq!(load.name, "Program Header 0: PT_LOAD");
    let vaddr = load.children.iter().find(|f| f.name == "p_vaddr").unwrap();
    assert_eq!((vaddr.offset, vaddr.size), (52 + 8, 4));
    assert_eq!(vaddr.value.as_ref().and_then(|v| v.as_int()), Some(0x1000_0000));
    assert_eq!(phdrs.children[1].description.as_deref(), Some("/lib/ld.so.1"));

    let shdrs = parsed.regions.iter().find(|r| r.name == "Section Headers").unwrap();
    assert_eq!(shdrs.offset, 0x140);
    assert!(shdrs.children.iter().any(|r| r.name == "Section Header: .shstrtab"));

    let text = parsed.regions.iter().find(|r| r.name == "Section: .text").unwrap();
    assert_eq!((text.offset, text.size), (0x100, 0x20));
    assert_eq!(parsed.sections.len(), 1);
    assert_eq!(parsed.sections[0].name, ".text");
    assert_eq!(to_virtual_address(0x108, &parsed.sections), Some(0x1000_0108));
}

#[test]
fn elf_names_come_from_the_string_table() {
    let parsed = parse_bytes(elf64(), "tiny");
    assert_eq!(parsed.format, FileFormat::Elf);
    assert!(parsed.regions.iter().any(|r| r.name == "Section: .text"));
    let text = &parsed.sections[0];
    assert_eq!(text.name, ".text");
    assert_eq!(to_virtual_address(0x108, &parsed.sections), Some(0x401008));
}

#[test]
fn elf_nobits_section_has_no_data_region() {
    let mut data = elf64();
    // retype .text as SHT_NOBITS
    let text = 0x140 + 64;
    data[text + 4..text + 8].copy_from_slice(&8u32.to_le_bytes());
    let parsed = parse_bytes(data, "bss");
    assert!(parsed.regions.iter().all(|r| r.name != "Section: .text"));
}

#[test]
fn macho_header_and_segments() {
    let parsed = parse_bytes(macho64(0x0100_000C), "tiny.macho");
    assert!(parsed.is_valid);
    let header = &parsed.regions[0];
    assert_eq!(header.name, "Mach-O Header");
    assert_eq!(header.details.get("Entry Offset"), Some("0x300"));

    let text = parsed
        .sections
        .iter()
        .find(|s| s.name.ends_with("__text"))
        .unwrap();
    assert_eq!(text.file_offset, 0x300);
    assert_eq!(to_virtual_address(0x310, &parsed.sections), Some(0x1_0000_0310));
}

#[test]
fn macho_overrunning_load_command_keeps_partial_list() {
    let mut data = macho64(0x0100_000C);
    // __DATA claims to run far past the buffer
    data[32 + 152 + 4..32 + 152 + 8].copy_from_slice(&0x10_0000u32.to_le_bytes());
    let parsed = parse_bytes(data, "broken.macho");
    assert!(parsed.is_valid);
    let commands = parsed
        .regions
        .iter()
        .find(|r| r.name == "Load Commands")
        .unwrap();
    assert_eq!(commands.children.len(), 1);
}
