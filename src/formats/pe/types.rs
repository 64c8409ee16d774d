//! Core PE data types and structures

use bitflags::bitflags;

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32PLUS_MAGIC: u16 = 0x20B;

pub const DOS_HEADER_SIZE: usize = 64;
pub const COFF_HEADER_SIZE: u64 = 20;
pub const SECTION_HEADER_SIZE: u64 = 40;
pub const MAX_DATA_DIRECTORIES: usize = 16;

pub const IMAGE_DIRECTORY_ENTRY_SECURITY: usize = 4;

pub const DATA_DIRECTORY_NAMES: [&str; MAX_DATA_DIRECTORIES] = [
    "Export Table",
    "Import Table",
    "Resource Table",
    "Exception Table",
    "Certificate Table",
    "Base Relocation Table",
    "Debug",
    "Architecture",
    "Global Ptr",
    "TLS Table",
    "Load Config Table",
    "Bound Import",
    "IAT",
    "Delay Import Descriptor",
    "CLR Runtime Header",
    "Reserved",
];

/// Machine types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Machine {
    Unknown,
    I386,   // 0x014c
    X86_64, // 0x8664
    Arm,    // 0x01c0
    Arm64,  // 0xaa64
    ArmNT,  // 0x01c4
    IA64,   // 0x0200
    EBC,    // 0x0ebc
    RiscV64,
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            0x014c => Self::I386,
            0x8664 => Self::X86_64,
            0x01c0 => Self::Arm,
            0xaa64 => Self::Arm64,
            0x01c4 => Self::ArmNT,
            0x0200 => Self::IA64,
            0x0ebc => Self::EBC,
            0x5064 => Self::RiscV64,
            0 => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

impl Machine {
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::Unknown => "Unknown",
            Self::I386 => "Intel 386",
            Self::X86_64 => "AMD64 (x86-64)",
            Self::Arm => "ARM",
            Self::Arm64 => "ARM64",
            Self::ArmNT => "ARM Thumb-2",
            Self::IA64 => "Intel Itanium",
            Self::EBC => "EFI Byte Code",
            Self::RiscV64 => "RISC-V 64",
            Self::Other(_) => return None,
        })
    }
}

/// Subsystem types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Unknown,
    Native,                 // 1
    WindowsGui,             // 2
    WindowsCui,             // 3
    Os2Cui,                 // 5
    PosixCui,               // 7
    WindowsCeGui,           // 9
    EfiApplication,         // 10
    EfiBootServiceDriver,   // 11
    EfiRuntimeDriver,       // 12
    EfiRom,                 // 13
    Xbox,                   // 14
    WindowsBootApplication, // 16
    Other(u16),
}

impl From<u16> for Subsystem {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Native,
            2 => Self::WindowsGui,
            3 => Self::WindowsCui,
            5 => Self::Os2Cui,
            7 => Self::PosixCui,
            9 => Self::WindowsCeGui,
            10 => Self::EfiApplication,
            11 => Self::EfiBootServiceDriver,
            12 => Self::EfiRuntimeDriver,
            13 => Self::EfiRom,
            14 => Self::Xbox,
            16 => Self::WindowsBootApplication,
            other => Self::Other(other),
        }
    }
}

impl Subsystem {
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::Unknown => "Unknown",
            Self::Native => "Native",
            Self::WindowsGui => "Windows GUI",
            Self::WindowsCui => "Windows Console",
            Self::Os2Cui => "OS/2 Console",
            Self::PosixCui => "POSIX Console",
            Self::WindowsCeGui => "Windows CE GUI",
            Self::EfiApplication => "EFI Application",
            Self::EfiBootServiceDriver => "EFI Boot Service Driver",
            Self::EfiRuntimeDriver => "EFI Runtime Driver",
            Self::EfiRom => "EFI ROM",
            Self::Xbox => "Xbox",
            Self::WindowsBootApplication => "Windows Boot Application",
            Self::Other(_) => return None,
        })
    }
}

bitflags! {
    /// COFF file header characteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileCharacteristics: u16 {
        const RELOCS_STRIPPED = 0x0001;
        const EXECUTABLE_IMAGE = 0x0002;
        const LINE_NUMS_STRIPPED = 0x0004;
        const LOCAL_SYMS_STRIPPED = 0x0008;
        const AGGRESSIVE_WS_TRIM = 0x0010;
        const LARGE_ADDRESS_AWARE = 0x0020;
        const BYTES_REVERSED_LO = 0x0080;
        const MACHINE_32BIT = 0x0100;
        const DEBUG_STRIPPED = 0x0200;
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;
        const NET_RUN_FROM_SWAP = 0x0800;
        const SYSTEM = 0x1000;
        const DLL = 0x2000;
        const UP_SYSTEM_ONLY = 0x4000;
        const BYTES_REVERSED_HI = 0x8000;
    }
}

bitflags! {
    /// Optional header DllCharacteristics
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DllCharacteristics: u16 {
        const HIGH_ENTROPY_VA = 0x0020;
        const DYNAMIC_BASE = 0x0040;
        const FORCE_INTEGRITY = 0x0080;
        const NX_COMPAT = 0x0100;
        const NO_ISOLATION = 0x0200;
        const NO_SEH = 0x0400;
        const NO_BIND = 0x0800;
        const APPCONTAINER = 0x1000;
        const WDM_DRIVER = 0x2000;
        const GUARD_CF = 0x4000;
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}

bitflags! {
    /// Section header characteristics. Alignment nibble is not a flag and is omitted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionCharacteristics: u32 {
        const CNT_CODE = 0x0000_0020;
        const CNT_INITIALIZED_DATA = 0x0000_0040;
        const CNT_UNINITIALIZED_DATA = 0x0000_0080;
        const LNK_INFO = 0x0000_0200;
        const LNK_REMOVE = 0x0000_0800;
        const LNK_COMDAT = 0x0000_1000;
        const GPREL = 0x0000_8000;
        const LNK_NRELOC_OVFL = 0x0100_0000;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_NOT_CACHED = 0x0400_0000;
        const MEM_NOT_PAGED = 0x0800_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}

/// The DOS header fields the parser acts on.
#[derive(Debug, Clone, Copy)]
pub struct DosHeader {
    pub e_magic: u16,
    pub e_lfanew: u32,
}

/// COFF header (20 bytes)
#[derive(Debug, Clone, Copy)]
pub struct CoffHeader {
    pub machine: Machine,
    pub machine_raw: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Data directory entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0 || self.size != 0
    }
}

/// Optional header fields shared by PE32 and PE32+, widened to `u64`.
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    pub magic: u16,
    pub address_of_entry_point: u32,
    pub image_base: u64,
    pub subsystem: Subsystem,
    pub dll_characteristics: u16,
    pub number_of_rva_and_sizes: u32,
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    pub fn is_64bit(&self) -> bool {
        self.magic == PE32PLUS_MAGIC
    }

    pub fn directory(&self, index: usize) -> Option<DataDirectory> {
        self.data_directories.get(index).copied()
    }
}

/// Section header
#[derive(Debug, Clone)]
pub struct SectionHeader {
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
    /// File offset of this 40-byte header
    pub header_offset: u64,
}

impl SectionHeader {
    pub fn flags(&self) -> SectionCharacteristics {
        SectionCharacteristics::from_bits_truncate(self.characteristics)
    }

    /// In-memory size; zero `VirtualSize` falls back to the raw size.
    pub fn mapped_size(&self) -> u32 {
        if self.virtual_size == 0 {
            self.size_of_raw_data
        } else {
            self.virtual_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::utils::flag_names;

    #[test]
    fn test_machine_from_u16() {
        assert_eq!(Machine::from(0x014c), Machine::I386);
        assert_eq!(Machine::from(0x8664), Machine::X86_64);
        assert_eq!(Machine::from(0xaa64), Machine::Arm64);
        assert_eq!(Machine::from(0x9999), Machine::Other(0x9999));
        assert_eq!(Machine::from(0x9999).name(), None);
    }

    #[test]
    fn test_subsystem_from_u16() {
        assert_eq!(Subsystem::from(2), Subsystem::WindowsGui);
        assert_eq!(Subsystem::from(3).name(), Some("Windows Console"));
        assert_eq!(Subsystem::from(99), Subsystem::Other(99));
    }

    #[test]
    fn test_flag_decoding_drops_unknown_bits() {
        let flags = FileCharacteristics::from_bits_truncate(0x2022);
        assert_eq!(flag_names(&flags), "EXECUTABLE_IMAGE, LARGE_ADDRESS_AWARE, DLL");

        let scn = SectionCharacteristics::from_bits_truncate(0x6050_0020);
        assert_eq!(flag_names(&scn), "CNT_CODE, MEM_EXECUTE, MEM_READ");
    }
}
