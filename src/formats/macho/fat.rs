//! Fat/Universal Mach-O wrapper
//!
//! Each architecture slice is parsed as an independent Mach-O and its
//! regions and section offsets are shifted into absolute file coordinates.

use crate::core::{Region, RegionKind};
use crate::error::ParseError;
use crate::formats::macho::types::*;
use crate::formats::utils::{clamp_span, to_usize, Endian, ReadExt};
use crate::formats::{describe, int_fields, Layout, ParseOptions};
use tracing::{debug, warn};

/// Above this the leading `CAFEBABE` is far more likely a Java class file.
pub const MAX_FAT_ARCHS: u32 = 32;

const FAT_HEADER_SIZE: u64 = 8;
const FAT_ARCH_SIZE: u64 = 20;
const FAT_ARCH64_SIZE: u64 = 32;

const FAT_HEADER_FIELDS: &[(&str, u64, u64)] = &[("magic", 0, 4), ("nfat_arch", 4, 4)];

const FAT_ARCH_FIELDS: &[(&str, u64, u64)] = &[
    ("cputype", 0, 4),
    ("cpusubtype", 4, 4),
    ("offset", 8, 4),
    ("size", 12, 4),
    ("align", 16, 4),
];

const FAT_ARCH64_FIELDS: &[(&str, u64, u64)] = &[
    ("cputype", 0, 4),
    ("cpusubtype", 4, 4),
    ("offset", 8, 8),
    ("size", 16, 8),
    ("align", 24, 4),
    ("reserved", 28, 4),
];

/// fat_arch / fat_arch_64
#[derive(Debug, Clone)]
pub struct FatArch {
    pub index: usize,
    /// File offset of this table entry
    pub entry_offset: u64,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub offset: u64,
    pub size: u64,
    pub align: u32,
}

impl FatArch {
    pub fn cpu_label(&self) -> String {
        cpu_label(self.cputype, self.cpusubtype)
    }
}

/// fat_header plus its architecture table.
#[derive(Debug, Clone)]
pub struct FatHeader {
    pub magic: u32,
    pub is_64: bool,
    pub endian: Endian,
    pub nfat_arch: u32,
    pub archs: Vec<FatArch>,
}

impl FatHeader {
    fn entry_size(&self) -> u64 {
        if self.is_64 {
            FAT_ARCH64_SIZE
        } else {
            FAT_ARCH_SIZE
        }
    }

    /// End of the header and the entries actually decoded.
    pub fn table_end(&self) -> u64 {
        FAT_HEADER_SIZE + self.archs.len() as u64 * self.entry_size()
    }
}

/// Decode the fat header and architecture table.
///
/// Fat headers are big-endian on disk; the byte-swapped magics are accepted
/// and read little-endian.
pub fn parse_fat_header(data: &[u8]) -> Result<FatHeader, ParseError> {
    if data.len() < FAT_HEADER_SIZE as usize {
        return Err(ParseError::truncated("fat header", 0, FAT_HEADER_SIZE, data.len()));
    }
    let magic = data.read_u32_be_at(0).unwrap_or(0);
    let (is_64, endian) = match magic {
        FAT_MAGIC => (false, Endian::Big),
        FAT_CIGAM => (false, Endian::Little),
        FAT_MAGIC_64 => (true, Endian::Big),
        FAT_CIGAM_64 => (true, Endian::Little),
        _ => {
            return Err(ParseError::structural(
                0,
                format!("Invalid fat magic {:#010x}", magic),
            ))
        }
    };
    let nfat_arch = data.read_u32_at(4, endian).unwrap_or(0);
    if nfat_arch == 0 || nfat_arch > MAX_FAT_ARCHS {
        return Err(ParseError::structural(
            4,
            format!("Implausible fat architecture count {}", nfat_arch),
        ));
    }

    let mut header = FatHeader {
        magic,
        is_64,
        endian,
        nfat_arch,
        archs: Vec::with_capacity(nfat_arch as usize),
    };
    let entry_size = header.entry_size();

    for index in 0..nfat_arch as usize {
        let at = FAT_HEADER_SIZE + index as u64 * entry_size;
        if data.read_slice_at(to_usize(at), entry_size as usize).is_none() {
            warn!(index, declared = nfat_arch, "fat architecture table truncated");
            break;
        }
        let u32_at = |rel: u64| data.read_u32_at(to_usize(at + rel), endian).unwrap_or(0);
        let (offset, size, align) = if is_64 {
            let u64_at = |rel: u64| data.read_u64_at(to_usize(at + rel), endian).unwrap_or(0);
            (u64_at(8), u64_at(16), u32_at(24))
        } else {
            (u64::from(u32_at(8)), u64::from(u32_at(12)), u32_at(16))
        };
        header.archs.push(FatArch {
            index,
            entry_offset: at,
            cputype: u32_at(0),
            cpusubtype: u32_at(4),
            offset,
            size,
            align,
        });
    }
    Ok(header)
}

/// Parse a Fat/Universal Mach-O into a [`Layout`].
pub fn parse(data: &[u8], options: &ParseOptions) -> Layout {
    let mut layout = Layout::default();
    if let Err(e) = parse_into(data, options, &mut layout) {
        layout.fail(e);
    }
    layout
}

fn parse_into(data: &[u8], options: &ParseOptions, layout: &mut Layout) -> Result<(), ParseError> {
    let header = parse_fat_header(data)?;
    debug!(archs = header.archs.len(), fat64 = header.is_64, "fat mach-o");
    layout.regions.push(fat_header_region(data, &header));

    let mut archs: Vec<&FatArch> = header.archs.iter().collect();
    archs.sort_by_key(|arch| arch.offset);

    let mut claimed_until = header.table_end();
    for arch in archs {
        if arch.offset < claimed_until {
            warn!(
                slice = arch.index,
                offset = arch.offset,
                "slice overlaps the fat header or a previous slice"
            );
            continue;
        }
        if arch.offset >= data.len() as u64 || arch.size == 0 {
            warn!(slice = arch.index, offset = arch.offset, size = arch.size, "slice outside file");
            continue;
        }
        let size = clamp_span(data.len(), arch.offset, arch.size);
        if size < arch.size {
            warn!(slice = arch.index, declared = arch.size, available = size, "slice truncated");
        }
        claimed_until = arch.offset + size;

        let bytes = &data[arch.offset as usize..(arch.offset + size) as usize];
        let (region, sections) = parse_slice(bytes, arch, size, options);
        layout.regions.push(region);
        layout.sections.extend(sections);
    }
    Ok(())
}

fn parse_slice(
    bytes: &[u8],
    arch: &FatArch,
    size: u64,
    options: &ParseOptions,
) -> (Region, Vec<crate::core::SectionMetadata>) {
    let mut inner = Layout::default();
    let mut region = Region::new(
        format!("Slice {}: {}", arch.index, arch.cpu_label()),
        arch.offset,
        size,
        RegionKind::Record,
    )
    .with_detail("CPU", arch.cpu_label())
    .with_detail("Offset", format!("{:#x}", arch.offset))
    .with_detail("Size", format!("{:#x}", arch.size));

    if let Err(e) = super::parse_into(bytes, &options.macho, &mut inner) {
        warn!(slice = arch.index, error = %e, "slice failed to parse");
        region.description = Some(format!("Invalid slice: {}", e));
    }

    // Slice-relative offsets (fileoff, section offsets) are rebased onto the slice start.
    for child in &mut inner.regions {
        rebase(child, arch.offset);
    }
    inner.regions.sort_by_key(|r| r.offset);
    for section in &mut inner.sections {
        section.file_offset = section.file_offset.saturating_add(arch.offset);
    }
    (region.with_children(inner.regions), inner.sections)
}

/// Shift a region tree by `delta` bytes.
fn rebase(root: &mut Region, delta: u64) {
    let mut stack = vec![root];
    while let Some(region) = stack.pop() {
        region.offset = region.offset.saturating_add(delta);
        stack.extend(region.children.iter_mut());
    }
}

fn fat_header_region(data: &[u8], header: &FatHeader) -> Region {
    let table = if header.is_64 {
        FAT_ARCH64_FIELDS
    } else {
        FAT_ARCH_FIELDS
    };
    let mut fields = int_fields(data, 0, FAT_HEADER_FIELDS, header.endian);
    describe(
        &mut fields,
        "magic",
        if header.is_64 { "FAT_MAGIC_64" } else { "FAT_MAGIC" },
    );

    let entries = header.archs.iter().map(|arch| {
        let mut arch_fields = int_fields(data, arch.entry_offset, table, header.endian);
        describe(&mut arch_fields, "cputype", arch.cpu_label());
        describe(&mut arch_fields, "align", format!("2^{}", arch.align));
        Region::new(
            format!("Architecture {}: {}", arch.index, arch.cpu_label()),
            arch.entry_offset,
            header.entry_size(),
            RegionKind::TableEntry,
        )
        .with_detail("Offset", format!("{:#x}", arch.offset))
        .with_detail("Size", format!("{:#x}", arch.size))
        .with_detail("Alignment", format!("2^{}", arch.align))
        .with_children(arch_fields)
    });
    fields.extend(entries);

    Region::new("Fat Header", 0, header.table_end(), RegionKind::Header)
        .with_description(format!("{} architectures", header.archs.len()))
        .with_detail("Architectures", header.nfat_arch.to_string())
        .with_detail("Format", if header.is_64 { "fat64" } else { "fat" })
        .with_children(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::macho::tests::tiny_macho64;

    fn fat_binary() -> Vec<u8> {
        let mut d = vec![0u8; 0x2500];
        d[0..4].copy_from_slice(&FAT_MAGIC.to_be_bytes());
        d[4..8].copy_from_slice(&2u32.to_be_bytes());
        let entries: [(u32, u32, u32); 2] = [(0x0100_000C, 0, 0x1000), (0x0100_0007, 3, 0x2000)];
        for (i, (cpu, sub, offset)) in entries.iter().enumerate() {
            let at = 8 + i * 20;
            d[at..at + 4].copy_from_slice(&cpu.to_be_bytes());
            d[at + 4..at + 8].copy_from_slice(&sub.to_be_bytes());
            d[at + 8..at + 12].copy_from_slice(&offset.to_be_bytes());
            d[at + 12..at + 16].copy_from_slice(&0x500u32.to_be_bytes());
            d[at + 16..at + 20].copy_from_slice(&12u32.to_be_bytes());
        }
        let arm = tiny_macho64();
        let mut x86 = tiny_macho64();
        x86[4..8].copy_from_slice(&0x0100_0007u32.to_le_bytes());
        d[0x1000..0x1500].copy_from_slice(&arm);
        d[0x2000..0x2500].copy_from_slice(&x86);
        d
    }

    #[test]
    fn test_parse_fat_header() {
        let data = fat_binary();
        let header = parse_fat_header(&data).unwrap();
        assert_eq!(header.archs.len(), 2);
        assert_eq!(header.archs[1].offset, 0x2000);
        assert_eq!(header.archs[1].cpu_label(), "x86_64");
        assert_eq!(header.table_end(), 48);
    }

    #[test]
    fn test_slices_use_absolute_offsets() {
        let data = fat_binary();
        let layout = parse(&data, &ParseOptions::default());
        assert!(layout.error.is_none());

        let names: Vec<_> = layout.regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Fat Header", "Slice 0: ARM64", "Slice 1: x86_64"]);

        let slice = &layout.regions[2];
        assert_eq!((slice.offset, slice.size), (0x2000, 0x500));
        assert_eq!(slice.children[0].name, "Mach-O Header");
        assert_eq!(slice.children[0].offset, 0x2000);
        for child in &slice.children {
            assert!(slice.contains(child), "{} escapes its slice", child.name);
        }

        // Rebasing adds the slice offset to slice-relative file offsets.
        assert_eq!(layout.sections.len(), 4);
        assert_eq!(layout.sections[0].file_offset, 0x1300);
        assert_eq!(layout.sections[2].file_offset, 0x2300);
        assert!(slice
            .children
            .iter()
            .any(|c| c.name == "Section: __TEXT,__text" && c.offset == 0x2300));
    }

    #[test]
    fn test_overlapping_slice_is_skipped() {
        let mut data = fat_binary();
        data[8 + 20 + 8..8 + 20 + 12].copy_from_slice(&0x1200u32.to_be_bytes());
        let layout = parse(&data, &ParseOptions::default());
        let slices = layout
            .regions
            .iter()
            .filter(|r| r.name.starts_with("Slice"))
            .count();
        assert_eq!(slices, 1);
    }

    #[test]
    fn test_java_class_is_not_fat() {
        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(&FAT_MAGIC.to_be_bytes());
        data[4..8].copy_from_slice(&0x0000_0034u32.to_be_bytes());
        let layout = parse(&data, &ParseOptions::default());
        assert!(matches!(layout.error, Some(ParseError::Structural { .. })));
    }

    #[test]
    fn test_broken_slice_is_absorbed() {
        let mut data = fat_binary();
        data[0x2000..0x2004].copy_from_slice(b"JUNK");
        let layout = parse(&data, &ParseOptions::default());
        assert!(layout.error.is_none());
        let slice = &layout.regions[2];
        assert!(slice
            .description
            .as_deref()
            .unwrap()
            .starts_with("Invalid slice"));
        assert!(slice.children.is_empty());
    }
}
