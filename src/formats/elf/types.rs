//! Core ELF types and constants

use crate::formats::utils::Endian;
use bitflags::bitflags;

/// ELF magic number
pub const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
pub const EI_NIDENT: usize = 16;

pub const PT_LOAD: u32 = 1;
pub const PT_INTERP: u32 = 3;
pub const SHT_NULL: u32 = 0;
pub const SHT_NOBITS: u32 = 8;
pub const SHN_XINDEX: u32 = 0xFFFF;
pub const PN_XNUM: u32 = 0xFFFF;

/// ELF class (32-bit or 64-bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32 = 1,
    Elf64 = 2,
}

impl ElfClass {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            1 => Some(ElfClass::Elf32),
            2 => Some(ElfClass::Elf64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElfClass::Elf32 => "ELF32",
            ElfClass::Elf64 => "ELF64",
        }
    }

    /// Width of an address or offset field.
    pub fn word(self) -> u64 {
        match self {
            ElfClass::Elf32 => 4,
            ElfClass::Elf64 => 8,
        }
    }

    pub fn header_size(self) -> u64 {
        match self {
            ElfClass::Elf32 => 52,
            ElfClass::Elf64 => 64,
        }
    }

    pub fn phdr_size(self) -> u64 {
        match self {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 56,
        }
    }

    pub fn shdr_size(self) -> u64 {
        match self {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        }
    }
}

/// ELF data encoding (endianness)
pub fn endian_from_u8(val: u8) -> Option<Endian> {
    match val {
        1 => Some(Endian::Little),
        2 => Some(Endian::Big),
        _ => None,
    }
}

pub fn file_type_name(e_type: u16) -> Option<&'static str> {
    Some(match e_type {
        0 => "No file type",
        1 => "Relocatable",
        2 => "Executable",
        3 => "Shared object",
        4 => "Core dump",
        _ => return None,
    })
}

pub fn machine_name(e_machine: u16) -> Option<&'static str> {
    Some(match e_machine {
        0 => "None",
        2 => "SPARC",
        3 => "Intel 80386",
        8 => "MIPS",
        20 => "PowerPC",
        21 => "PowerPC64",
        22 => "IBM S/390",
        40 => "ARM",
        42 => "SuperH",
        43 => "SPARC V9",
        50 => "Intel IA-64",
        62 => "AMD x86-64",
        183 => "AArch64",
        243 => "RISC-V",
        247 => "Linux BPF",
        258 => "LoongArch",
        _ => return None,
    })
}

pub fn osabi_name(osabi: u8) -> Option<&'static str> {
    Some(match osabi {
        0 => "UNIX System V",
        1 => "HP-UX",
        2 => "NetBSD",
        3 => "Linux",
        6 => "Solaris",
        7 => "AIX",
        8 => "IRIX",
        9 => "FreeBSD",
        12 => "OpenBSD",
        97 => "ARM",
        255 => "Standalone",
        _ => return None,
    })
}

pub fn segment_type_name(p_type: u32) -> Option<&'static str> {
    Some(match p_type {
        0 => "PT_NULL",
        1 => "PT_LOAD",
        2 => "PT_DYNAMIC",
        3 => "PT_INTERP",
        4 => "PT_NOTE",
        5 => "PT_SHLIB",
        6 => "PT_PHDR",
        7 => "PT_TLS",
        0x6474_e550 => "PT_GNU_EH_FRAME",
        0x6474_e551 => "PT_GNU_STACK",
        0x6474_e552 => "PT_GNU_RELRO",
        0x6474_e553 => "PT_GNU_PROPERTY",
        _ => return None,
    })
}

pub fn section_type_name(sh_type: u32) -> Option<&'static str> {
    Some(match sh_type {
        0 => "SHT_NULL",
        1 => "SHT_PROGBITS",
        2 => "SHT_SYMTAB",
        3 => "SHT_STRTAB",
        4 => "SHT_RELA",
        5 => "SHT_HASH",
        6 => "SHT_DYNAMIC",
        7 => "SHT_NOTE",
        8 => "SHT_NOBITS",
        9 => "SHT_REL",
        10 => "SHT_SHLIB",
        11 => "SHT_DYNSYM",
        14 => "SHT_INIT_ARRAY",
        15 => "SHT_FINI_ARRAY",
        16 => "SHT_PREINIT_ARRAY",
        17 => "SHT_GROUP",
        18 => "SHT_SYMTAB_SHNDX",
        0x6fff_fff6 => "SHT_GNU_HASH",
        0x6fff_fffd => "SHT_GNU_VERDEF",
        0x6fff_fffe => "SHT_GNU_VERNEED",
        0x6fff_ffff => "SHT_GNU_VERSYM",
        _ => return None,
    })
}

bitflags! {
    /// Segment permissions (p_flags)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        const R = 0x4;
        const W = 0x2;
        const X = 0x1;
    }
}

bitflags! {
    /// Section attributes (sh_flags)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u64 {
        const WRITE = 0x1;
        const ALLOC = 0x2;
        const EXECINSTR = 0x4;
        const MERGE = 0x10;
        const STRINGS = 0x20;
        const INFO_LINK = 0x40;
        const LINK_ORDER = 0x80;
        const OS_NONCONFORMING = 0x100;
        const GROUP = 0x200;
        const TLS = 0x400;
        const COMPRESSED = 0x800;
    }
}

/// ELF file header, with every pointer-width field widened to `u64` and
/// extended numbering already resolved.
#[derive(Debug, Clone)]
pub struct ElfHeader {
    pub class: ElfClass,
    pub endian: Endian,
    pub osabi: u8,
    pub e_type: u16,
    pub e_machine: u16,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u32,
    pub e_shentsize: u16,
    pub e_shnum: u64,
    pub e_shstrndx: u32,
}

/// Program header
#[derive(Debug, Clone)]
pub struct ProgramHeader {
    pub index: usize,
    /// File offset of this table entry
    pub entry_offset: u64,
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl ProgramHeader {
    pub fn type_label(&self) -> String {
        crate::formats::utils::name_or_hex(segment_type_name(self.p_type), self.p_type)
    }

    pub fn flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.p_flags)
    }
}

/// Section header
#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub index: usize,
    /// File offset of this table entry
    pub entry_offset: u64,
    pub name: String,
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

impl SectionHeader {
    pub fn flags(&self) -> SectionFlags {
        SectionFlags::from_bits_truncate(self.sh_flags)
    }

    pub fn is_alloc(&self) -> bool {
        self.flags().contains(SectionFlags::ALLOC)
    }

    /// Bytes this section occupies in the file.
    pub fn file_size(&self) -> u64 {
        if self.sh_type == SHT_NOBITS || self.sh_type == SHT_NULL {
            0
        } else {
            self.sh_size
        }
    }

    /// Display label; unnamed sections fall back to their index.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("[{}]", self.index)
        } else {
            self.name.clone()
        }
    }
}
