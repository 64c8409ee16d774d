//! Mach-O constants, name tables and decoded header structures

use crate::formats::utils::Endian;
use bitflags::bitflags;

// Magic numbers, as read big-endian from the first four bytes.
pub const MH_MAGIC: u32 = 0xFEED_FACE;
pub const MH_CIGAM: u32 = 0xCEFA_EDFE;
pub const MH_MAGIC_64: u32 = 0xFEED_FACF;
pub const MH_CIGAM_64: u32 = 0xCFFA_EDFE;
pub const FAT_MAGIC: u32 = 0xCAFE_BABE;
pub const FAT_CIGAM: u32 = 0xBEBA_FECA;
pub const FAT_MAGIC_64: u32 = 0xCAFE_BABF;
pub const FAT_CIGAM_64: u32 = 0xBFBA_FECA;

pub const HEADER32_SIZE: u64 = 28;
pub const HEADER64_SIZE: u64 = 32;
pub const SECTION32_SIZE: u64 = 68;
pub const SECTION64_SIZE: u64 = 80;
pub const LOAD_COMMAND_MIN_SIZE: u64 = 8;

// Load commands
pub const LC_REQ_DYLD: u32 = 0x8000_0000;
pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_THREAD: u32 = 0x4;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const LC_DYSYMTAB: u32 = 0xB;
pub const LC_LOAD_DYLIB: u32 = 0xC;
pub const LC_ID_DYLIB: u32 = 0xD;
pub const LC_LOAD_DYLINKER: u32 = 0xE;
pub const LC_ID_DYLINKER: u32 = 0xF;
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
pub const LC_SEGMENT_64: u32 = 0x19;
pub const LC_UUID: u32 = 0x1B;
pub const LC_RPATH: u32 = 0x1C | LC_REQ_DYLD;
pub const LC_CODE_SIGNATURE: u32 = 0x1D;
pub const LC_SEGMENT_SPLIT_INFO: u32 = 0x1E;
pub const LC_REEXPORT_DYLIB: u32 = 0x1F | LC_REQ_DYLD;
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
pub const LC_ENCRYPTION_INFO: u32 = 0x21;
pub const LC_DYLD_INFO: u32 = 0x22;
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x23 | LC_REQ_DYLD;
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
pub const LC_FUNCTION_STARTS: u32 = 0x26;
pub const LC_DYLD_ENVIRONMENT: u32 = 0x27;
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
pub const LC_DATA_IN_CODE: u32 = 0x29;
pub const LC_SOURCE_VERSION: u32 = 0x2A;
pub const LC_DYLIB_CODE_SIGN_DRS: u32 = 0x2B;
pub const LC_ENCRYPTION_INFO_64: u32 = 0x2C;
pub const LC_LINKER_OPTIMIZATION_HINT: u32 = 0x2E;
pub const LC_VERSION_MIN_TVOS: u32 = 0x2F;
pub const LC_VERSION_MIN_WATCHOS: u32 = 0x30;
pub const LC_BUILD_VERSION: u32 = 0x32;
pub const LC_DYLD_EXPORTS_TRIE: u32 = 0x33 | LC_REQ_DYLD;
pub const LC_DYLD_CHAINED_FIXUPS: u32 = 0x34 | LC_REQ_DYLD;

pub fn load_command_name(cmd: u32) -> Option<&'static str> {
    Some(match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        0x3 => "LC_SYMSEG",
        LC_THREAD => "LC_THREAD",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        0x6 => "LC_LOADFVMLIB",
        0x7 => "LC_IDFVMLIB",
        0x8 => "LC_IDENT",
        0x9 => "LC_FVMFILE",
        0xA => "LC_PREPAGE",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        LC_ID_DYLINKER => "LC_ID_DYLINKER",
        0x10 => "LC_PREBOUND_DYLIB",
        0x11 => "LC_ROUTINES",
        0x12 => "LC_SUB_FRAMEWORK",
        0x13 => "LC_SUB_UMBRELLA",
        0x14 => "LC_SUB_CLIENT",
        0x15 => "LC_SUB_LIBRARY",
        0x16 => "LC_TWOLEVEL_HINTS",
        0x17 => "LC_PREBIND_CKSUM",
        LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        0x1A => "LC_ROUTINES_64",
        LC_UUID => "LC_UUID",
        LC_RPATH => "LC_RPATH",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        LC_SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO",
        LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
        LC_LAZY_LOAD_DYLIB => "LC_LAZY_LOAD_DYLIB",
        LC_ENCRYPTION_INFO => "LC_ENCRYPTION_INFO",
        LC_DYLD_INFO => "LC_DYLD_INFO",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        LC_LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        LC_DYLD_ENVIRONMENT => "LC_DYLD_ENVIRONMENT",
        LC_MAIN => "LC_MAIN",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        LC_DYLIB_CODE_SIGN_DRS => "LC_DYLIB_CODE_SIGN_DRS",
        LC_ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64",
        0x2D => "LC_LINKER_OPTION",
        LC_LINKER_OPTIMIZATION_HINT => "LC_LINKER_OPTIMIZATION_HINT",
        LC_VERSION_MIN_TVOS => "LC_VERSION_MIN_TVOS",
        LC_VERSION_MIN_WATCHOS => "LC_VERSION_MIN_WATCHOS",
        0x31 => "LC_NOTE",
        LC_BUILD_VERSION => "LC_BUILD_VERSION",
        LC_DYLD_EXPORTS_TRIE => "LC_DYLD_EXPORTS_TRIE",
        LC_DYLD_CHAINED_FIXUPS => "LC_DYLD_CHAINED_FIXUPS",
        0x8000_0035 => "LC_FILESET_ENTRY",
        _ => return None,
    })
}

pub fn cpu_type_name(cputype: u32) -> Option<&'static str> {
    Some(match cputype {
        1 => "VAX",
        6 => "MC680x0",
        7 => "x86",
        0x0100_0007 => "x86_64",
        10 => "MC98000",
        11 => "HPPA",
        12 => "ARM",
        0x0100_000C => "ARM64",
        0x0200_000C => "ARM64_32",
        13 => "MC88000",
        14 => "SPARC",
        15 => "i860",
        18 => "PowerPC",
        0x0100_0012 => "PowerPC64",
        _ => return None,
    })
}

pub fn cpu_subtype_name(cputype: u32, cpusubtype: u32) -> Option<&'static str> {
    // High byte carries capability bits (e.g. CPU_SUBTYPE_LIB64).
    let sub = cpusubtype & 0x00FF_FFFF;
    Some(match (cputype, sub) {
        (0x0100_0007, 3) | (7, 3) | (0x0100_000C, 0) | (12, 0) => "ALL",
        (0x0100_0007, 8) => "x86_64h",
        (0x0100_000C, 1) => "ARM64v8",
        (0x0100_000C, 2) => "ARM64E",
        (12, 6) => "ARMv6",
        (12, 9) => "ARMv7",
        (12, 11) => "ARMv7s",
        (12, 12) => "ARMv7k",
        _ => return None,
    })
}

pub fn file_type_name(filetype: u32) -> Option<&'static str> {
    Some(match filetype {
        1 => "MH_OBJECT",
        2 => "MH_EXECUTE",
        3 => "MH_FVMLIB",
        4 => "MH_CORE",
        5 => "MH_PRELOAD",
        6 => "MH_DYLIB",
        7 => "MH_DYLINKER",
        8 => "MH_BUNDLE",
        9 => "MH_DYLIB_STUB",
        10 => "MH_DSYM",
        11 => "MH_KEXT_BUNDLE",
        12 => "MH_FILESET",
        _ => return None,
    })
}

pub fn platform_name(platform: u32) -> Option<&'static str> {
    Some(match platform {
        1 => "macOS",
        2 => "iOS",
        3 => "tvOS",
        4 => "watchOS",
        5 => "bridgeOS",
        6 => "Mac Catalyst",
        7 => "iOS Simulator",
        8 => "tvOS Simulator",
        9 => "watchOS Simulator",
        10 => "DriverKit",
        11 => "visionOS",
        12 => "visionOS Simulator",
        _ => return None,
    })
}

pub fn build_tool_name(tool: u32) -> Option<&'static str> {
    Some(match tool {
        1 => "clang",
        2 => "swift",
        3 => "ld",
        4 => "lld",
        _ => return None,
    })
}

pub fn section_type_name(section_type: u32) -> Option<&'static str> {
    Some(match section_type {
        0x00 => "S_REGULAR",
        0x01 => "S_ZEROFILL",
        0x02 => "S_CSTRING_LITERALS",
        0x03 => "S_4BYTE_LITERALS",
        0x04 => "S_8BYTE_LITERALS",
        0x05 => "S_LITERAL_POINTERS",
        0x06 => "S_NON_LAZY_SYMBOL_POINTERS",
        0x07 => "S_LAZY_SYMBOL_POINTERS",
        0x08 => "S_SYMBOL_STUBS",
        0x09 => "S_MOD_INIT_FUNC_POINTERS",
        0x0A => "S_MOD_TERM_FUNC_POINTERS",
        0x0B => "S_COALESCED",
        0x0C => "S_GB_ZEROFILL",
        0x0D => "S_INTERPOSING",
        0x0E => "S_16BYTE_LITERALS",
        0x0F => "S_DTRACE_DOF",
        0x10 => "S_LAZY_DYLIB_SYMBOL_POINTERS",
        0x11 => "S_THREAD_LOCAL_REGULAR",
        0x12 => "S_THREAD_LOCAL_ZEROFILL",
        0x13 => "S_THREAD_LOCAL_VARIABLES",
        0x14 => "S_THREAD_LOCAL_VARIABLE_POINTERS",
        0x15 => "S_THREAD_LOCAL_INIT_FUNCTION_POINTERS",
        _ => return None,
    })
}

/// Version packed as 16.8.8 bits.
pub fn format_version(v: u32) -> String {
    format!("{}.{}.{}", v >> 16, (v >> 8) & 0xFF, v & 0xFF)
}

/// `A.B.C.D.E` packed as 24.10.10.10.10 bits.
pub fn format_source_version(v: u64) -> String {
    format!(
        "{}.{}.{}.{}.{}",
        (v >> 40) & 0xFF_FFFF,
        (v >> 30) & 0x3FF,
        (v >> 20) & 0x3FF,
        (v >> 10) & 0x3FF,
        v & 0x3FF
    )
}

bitflags! {
    /// mach_header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        const NOUNDEFS = 0x1;
        const INCRLINK = 0x2;
        const DYLDLINK = 0x4;
        const BINDATLOAD = 0x8;
        const PREBOUND = 0x10;
        const SPLIT_SEGS = 0x20;
        const LAZY_INIT = 0x40;
        const TWOLEVEL = 0x80;
        const FORCE_FLAT = 0x100;
        const NOMULTIDEFS = 0x200;
        const NOFIXPREBINDING = 0x400;
        const PREBINDABLE = 0x800;
        const ALLMODSBOUND = 0x1000;
        const SUBSECTIONS_VIA_SYMBOLS = 0x2000;
        const CANONICAL = 0x4000;
        const WEAK_DEFINES = 0x8000;
        const BINDS_TO_WEAK = 0x10000;
        const ALLOW_STACK_EXECUTION = 0x20000;
        const ROOT_SAFE = 0x40000;
        const SETUID_SAFE = 0x80000;
        const NO_REEXPORTED_DYLIBS = 0x100000;
        const PIE = 0x200000;
        const DEAD_STRIPPABLE_DYLIB = 0x400000;
        const HAS_TLV_DESCRIPTORS = 0x800000;
        const NO_HEAP_EXECUTION = 0x1000000;
        const APP_EXTENSION_SAFE = 0x2000000;
        const NLIST_OUTOFSYNC_WITH_DYLDINFO = 0x4000000;
        const SIM_SUPPORT = 0x8000000;
        const DYLIB_IN_CACHE = 0x80000000;
    }
}

bitflags! {
    /// Segment protection (vm_prot_t)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmProt: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

bitflags! {
    /// Section attribute bits (upper 24 bits of section flags)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionAttributes: u32 {
        const PURE_INSTRUCTIONS = 0x8000_0000;
        const NO_TOC = 0x4000_0000;
        const STRIP_STATIC_SYMS = 0x2000_0000;
        const NO_DEAD_STRIP = 0x1000_0000;
        const LIVE_SUPPORT = 0x0800_0000;
        const SELF_MODIFYING_CODE = 0x0400_0000;
        const DEBUG = 0x0200_0000;
        const SOME_INSTRUCTIONS = 0x400;
        const EXT_RELOC = 0x200;
        const LOC_RELOC = 0x100;
    }
}

impl VmProt {
    /// `rwx`-style rendering, e.g. `r-x`.
    pub fn short(self) -> String {
        format!(
            "{}{}{}",
            if self.contains(VmProt::READ) { 'r' } else { '-' },
            if self.contains(VmProt::WRITE) { 'w' } else { '-' },
            if self.contains(VmProt::EXECUTE) { 'x' } else { '-' },
        )
    }
}

/// Word size and byte order selected by a thin Mach-O magic.
pub fn classify_magic(magic_be: u32) -> Option<(bool, Endian)> {
    match magic_be {
        MH_MAGIC => Some((false, Endian::Big)),
        MH_CIGAM => Some((false, Endian::Little)),
        MH_MAGIC_64 => Some((true, Endian::Big)),
        MH_CIGAM_64 => Some((true, Endian::Little)),
        _ => None,
    }
}

/// Constant name for a thin Mach-O magic read big-endian.
pub fn magic_name(magic_be: u32) -> Option<&'static str> {
    Some(match magic_be {
        MH_MAGIC => "MH_MAGIC",
        MH_CIGAM => "MH_CIGAM",
        MH_MAGIC_64 => "MH_MAGIC_64",
        MH_CIGAM_64 => "MH_CIGAM_64",
        _ => return None,
    })
}

/// mach_header / mach_header_64
#[derive(Debug, Clone)]
pub struct MachHeader {
    pub magic: u32,
    pub is_64: bool,
    pub endian: Endian,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
}

impl MachHeader {
    pub fn size(&self) -> u64 {
        if self.is_64 {
            HEADER64_SIZE
        } else {
            HEADER32_SIZE
        }
    }

    /// End of the declared load-command area.
    pub fn commands_end(&self) -> u64 {
        self.size() + u64::from(self.sizeofcmds)
    }

    pub fn cpu_label(&self) -> String {
        cpu_label(self.cputype, self.cpusubtype)
    }

    pub fn header_flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_truncate(self.flags)
    }
}

/// CPU name with its subtype when the pair is known, e.g. `ARM64 (ARM64E)`.
pub fn cpu_label(cputype: u32, cpusubtype: u32) -> String {
    let cpu = crate::formats::utils::name_or_hex(cpu_type_name(cputype), cputype);
    match cpu_subtype_name(cputype, cpusubtype) {
        Some(sub) if sub != "ALL" => format!("{} ({})", cpu, sub),
        _ => cpu,
    }
}

/// section / section_64
#[derive(Debug, Clone)]
pub struct Section {
    /// File offset of the section header
    pub entry_offset: u64,
    pub sectname: String,
    pub segname: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
}

impl Section {
    pub fn section_type(&self) -> u32 {
        self.flags & 0xFF
    }

    pub fn attributes(&self) -> SectionAttributes {
        SectionAttributes::from_bits_truncate(self.flags & 0xFFFF_FF00)
    }

    /// Zero-fill sections occupy memory but no file bytes.
    pub fn is_zerofill(&self) -> bool {
        matches!(self.section_type(), 0x01 | 0x0C | 0x12)
    }

    pub fn file_size(&self) -> u64 {
        if self.is_zerofill() || self.offset == 0 {
            0
        } else {
            self.size
        }
    }

    pub fn label(&self) -> String {
        format!("{},{}", self.segname, self.sectname)
    }

    pub fn type_label(&self) -> String {
        crate::formats::utils::name_or_hex(section_type_name(self.section_type()), self.section_type())
    }
}

/// segment_command / segment_command_64
#[derive(Debug, Clone)]
pub struct Segment {
    /// File offset of the load command
    pub command_offset: u64,
    pub segname: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
    pub sections: Vec<Section>,
}

impl Segment {
    pub fn protection(&self) -> String {
        format!(
            "{}/{}",
            VmProt::from_bits_truncate(self.initprot).short(),
            VmProt::from_bits_truncate(self.maxprot).short()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::utils::flag_names;

    #[test]
    fn test_classify_magic() {
        assert_eq!(classify_magic(MH_CIGAM_64), Some((true, Endian::Little)));
        assert_eq!(classify_magic(MH_MAGIC), Some((false, Endian::Big)));
        assert_eq!(magic_name(MH_CIGAM_64), Some("MH_CIGAM_64"));
        assert_eq!(magic_name(MH_MAGIC), Some("MH_MAGIC"));
        assert_eq!(magic_name(FAT_MAGIC), None);
        assert_eq!(classify_magic(FAT_MAGIC), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(load_command_name(LC_MAIN), Some("LC_MAIN"));
        assert_eq!(load_command_name(0x7777), None);
        assert_eq!(cpu_label(0x0100_000C, 2), "ARM64 (ARM64E)");
        assert_eq!(cpu_label(0x0100_0007, 3), "x86_64");
        assert_eq!(cpu_label(99, 0), "0x63");
        assert_eq!(format_version(0x000D_0100), "13.1.0");
        assert_eq!(format_source_version((1 << 40) | (2 << 30)), "1.2.0.0.0");
    }

    #[test]
    fn test_flags() {
        assert_eq!(
            flag_names(&HeaderFlags::from_bits_truncate(0x0020_0085)),
            "NOUNDEFS, DYLDLINK, TWOLEVEL, PIE"
        );
        assert_eq!(VmProt::from_bits_truncate(5).short(), "r-x");
    }

    #[test]
    fn test_zerofill_sections_have_no_file_bytes() {
        let mut section = Section {
            entry_offset: 0,
            sectname: "__bss".into(),
            segname: "__DATA".into(),
            addr: 0x1000,
            size: 0x200,
            offset: 0,
            align: 3,
            reloff: 0,
            nreloc: 0,
            flags: 0x1,
        };
        assert!(section.is_zerofill());
        assert_eq!(section.file_size(), 0);
        section.flags = 0x8000_0400;
        section.offset = 0x4000;
        assert_eq!(section.file_size(), 0x200);
        assert_eq!(section.type_label(), "S_REGULAR");
        assert_eq!(section.label(), "__DATA,__bss");
    }
}
