//! The parse result handed to consumers.

use crate::core::region::Region;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which parser produced a [`ParsedFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileFormat {
    /// Portable Executable (Windows)
    Pe,
    /// Executable and Linkable Format
    Elf,
    /// Single-architecture Mach-O
    MachO,
    /// Fat/Universal Mach-O
    FatMachO,
    Png,
    Jpeg,
    /// ISO base media file format (MP4, HEIC, AVIF, ...)
    Isobmff,
}

impl FileFormat {
    pub fn name(self) -> &'static str {
        match self {
            FileFormat::Pe => "PE",
            FileFormat::Elf => "ELF",
            FileFormat::MachO => "Mach-O",
            FileFormat::FatMachO => "Mach-O Universal",
            FileFormat::Png => "PNG",
            FileFormat::Jpeg => "JPEG",
            FileFormat::Isobmff => "ISOBMFF",
        }
    }

    /// Executable formats carry a section table usable for address mapping.
    pub fn is_executable(self) -> bool {
        matches!(
            self,
            FileFormat::Pe | FileFormat::Elf | FileFormat::MachO | FileFormat::FatMachO
        )
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One section or segment, flattened for offset ↔ address mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMetadata {
    pub name: String,
    pub virtual_address: u64,
    pub virtual_size: u64,
    pub file_offset: u64,
    pub file_size: u64,
}

impl SectionMetadata {
    pub fn file_end(&self) -> u64 {
        self.file_offset.saturating_add(self.file_size)
    }
}

/// A parsed artifact. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedFile {
    pub name: String,
    pub size: u64,
    #[serde(skip)]
    pub data: Bytes,
    /// Top-level region forest, ascending by offset.
    pub regions: Vec<Region>,
    /// Flat section/segment table across every architecture slice.
    pub sections: Vec<SectionMetadata>,
    pub format: FileFormat,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ParsedFile {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Regions containing `offset`, outermost first.
    ///
    /// At each level the last matching sibling wins, so a field inside a
    /// header is preferred over an overlapping data region that starts earlier.
    pub fn regions_at(&self, offset: u64) -> Vec<&Region> {
        let mut path = Vec::new();
        let mut level: &[Region] = &self.regions;
        while let Some(region) = level.iter().rev().find(|r| r.contains_offset(offset)) {
            path.push(region);
            level = &region.children;
        }
        path
    }

    /// Total number of regions in the forest.
    pub fn region_count(&self) -> usize {
        self.regions.iter().map(Region::count).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::RegionKind;

    fn sample() -> ParsedFile {
        let header = Region::new("Header", 0, 0x40, RegionKind::Header).with_children(vec![
            Region::field("Magic", 0, 2, "MZ"),
            Region::field("Pointer", 0x3C, 4, 0x80u32),
        ]);
        let data = Region::new("Section: .text", 0x200, 0x100, RegionKind::Data);
        ParsedFile {
            name: "sample.bin".into(),
            size: 0x300,
            data: Bytes::from(vec![0u8; 0x300]),
            regions: vec![header, data],
            sections: Vec::new(),
            format: FileFormat::Pe,
            is_valid: true,
            error: None,
        }
    }

    #[test]
    fn test_regions_at_returns_path() {
        let file = sample();
        let path: Vec<_> = file.regions_at(0x3D).iter().map(|r| r.name.as_str()).collect();
        assert_eq!(path, vec!["Header", "Pointer"]);

        let path: Vec<_> = file.regions_at(0x250).iter().map(|r| r.name.as_str()).collect();
        assert_eq!(path, vec!["Section: .text"]);

        assert!(file.regions_at(0x100).is_empty());
    }

    #[test]
    fn test_region_count_and_json() {
        let file = sample();
        assert_eq!(file.region_count(), 4);
        let json = file.to_json().unwrap();
        assert!(json.contains("\"Section: .text\""));
        assert!(!json.contains("\"error\""));
        assert!(!json.contains("\"data\""));
    }
}
