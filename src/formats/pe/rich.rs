//! PE Rich Header decoding.
//!
//! Structure:
//! - Starts with 'DanS' (0x536E6144) followed by 3 null DWORDs padding
//! - Contains pairs of DWORDs: [ProductID|BuildID][UseCount]
//! - Ends with 'Rich' (0x68636952) followed by XOR key/checksum
//! - Everything except 'Rich' and key is XORed with the key

use crate::core::{Region, RegionKind};
use crate::formats::utils::ReadExt;
use tracing::debug;

const RICH_MARKER: &[u8; 4] = b"Rich";
const DANS_MARKER: u32 = 0x536E_6144;

/// A single Rich Header entry representing a compiler/tool usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichEntry {
    /// File offset of the encoded pair
    pub offset: usize,
    pub product_id: u16,
    pub build_id: u16,
    pub use_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RichHeader {
    /// File offset of the `DanS` marker
    pub offset: usize,
    /// Bytes from `DanS` through the XOR key
    pub size: usize,
    pub xor_key: u32,
    pub entries: Vec<RichEntry>,
}

/// Find and decode the Rich Header inside `data[start..end]`.
pub fn parse_rich_header(data: &[u8], start: usize, end: usize) -> Option<RichHeader> {
    let end = end.min(data.len());
    if start >= end {
        return None;
    }
    let rich_pos = start + memchr::memmem::find(&data[start..end], RICH_MARKER)?;
    let xor_key = data.read_u32_le_at(rich_pos + 4)?;

    // Work backwards from Rich, XORing with key to find DanS
    let mut dans_pos = None;
    let mut pos = rich_pos.checked_sub(4)?;
    while pos >= start {
        if data.read_u32_le_at(pos)? ^ xor_key == DANS_MARKER {
            dans_pos = Some(pos);
            break;
        }
        if pos < start + 4 {
            break;
        }
        pos -= 4;
    }
    let dans_pos = dans_pos?;

    let mut entries = Vec::new();
    let mut pos = dans_pos + 16;
    while pos + 8 <= rich_pos {
        let comp_id = data.read_u32_le_at(pos)? ^ xor_key;
        let use_count = data.read_u32_le_at(pos + 4)? ^ xor_key;
        let product_id = (comp_id >> 16) as u16;
        let build_id = (comp_id & 0xFFFF) as u16;
        if product_id != 0 || build_id != 0 {
            entries.push(RichEntry {
                offset: pos,
                product_id,
                build_id,
                use_count,
            });
        }
        pos += 8;
    }

    debug!(offset = dans_pos, entries = entries.len(), "rich header");
    Some(RichHeader {
        offset: dans_pos,
        size: rich_pos + 8 - dans_pos,
        xor_key,
        entries,
    })
}

/// Known Microsoft toolchain product ids.
fn product_name(product_id: u16) -> Option<&'static str> {
    Some(match product_id {
        0x01 => "Import",
        0x02 => "Linker",
        0x03 => "Cvtres",
        0x06 => "Cvtpgd",
        0x07 => "Ltcg",
        0x0a => "Pogo_PGO",
        0x5d => "Utc1310_C",
        0x5e => "Utc1310_CPP",
        0x5f => "Masm710",
        0x6d => "Utc1400_C",
        0x6e => "Utc1400_CPP",
        0x78 => "Linker800",
        0x83 => "Utc1500_C",
        0x84 => "Utc1500_CPP",
        0x91 => "Linker900",
        0x93 => "Utc1600_C",
        0x94 => "Utc1600_CPP",
        0x9a => "Cvtres1000",
        0x9d => "Linker1000",
        0xaa => "Utc1700_C",
        0xab => "Utc1700_CPP",
        0xce => "Utc1800_C",
        0xcf => "Utc1800_CPP",
        0xdb => "Linker1200",
        0xff => "Cvtres1400",
        0x0102 => "Linker1400",
        0x0103 => "Masm1400",
        0x0104 => "Utc1900_C",
        0x0105 => "Utc1900_CPP",
        _ => return None,
    })
}

/// Region for the Rich Header, if one sits inside the DOS stub.
pub fn rich_header_region(data: &[u8], start: usize, end: usize) -> Option<Region> {
    let rich = parse_rich_header(data, start, end)?;
    let mut region = Region::new(
        "Rich Header",
        rich.offset as u64,
        rich.size as u64,
        RegionKind::Record,
    )
    .with_description(format!("{} toolchain entries", rich.entries.len()))
    .with_detail("XOR Key", format!("{:#010x}", rich.xor_key));
    region.push_child(Region::field("DanS", rich.offset as u64, 4, "DanS"));

    for (i, entry) in rich.entries.iter().enumerate() {
        let product = product_name(entry.product_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Product {:#x}", entry.product_id));
        let summary = format!("{} build {} x{}", product, entry.build_id, entry.use_count);
        region.details.insert(format!("Entry {}", i), summary.clone());
        region.push_child(
            Region::new(format!("Entry {}", i), entry.offset as u64, 8, RegionKind::TableEntry)
                .with_description(summary),
        );
    }

    let marker_offset = (rich.offset + rich.size - 8) as u64;
    region.push_child(Region::field("Rich", marker_offset, 4, "Rich"));
    region.push_child(Region::field("XOR Key", marker_offset + 4, 4, rich.xor_key));
    Some(region)
}
