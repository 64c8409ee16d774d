//! File offset ↔ virtual address translation over a flat section table.
//!
//! This is a heuristic: offsets before the first section are assumed to be
//! header bytes mapped 1:1, and anything else outside a section is unmapped.

use crate::core::SectionMetadata;

/// Virtual address for a raw file offset, if it can be mapped.
pub fn to_virtual_address(offset: u64, sections: &[SectionMetadata]) -> Option<u64> {
    for section in sections {
        if section.file_size == 0 {
            continue;
        }
        if offset >= section.file_offset && offset < section.file_end() {
            let delta = offset - section.file_offset;
            if delta < section.virtual_size {
                return section.virtual_address.checked_add(delta);
            }
        }
    }

    let first = sections
        .iter()
        .filter(|s| s.file_size > 0)
        .map(|s| s.file_offset)
        .min()?;
    (offset < first).then_some(offset)
}

/// Raw file offset backing a virtual address, if any section maps it from file bytes.
pub fn to_file_offset(address: u64, sections: &[SectionMetadata]) -> Option<u64> {
    sections.iter().find_map(|section| {
        let delta = address.checked_sub(section.virtual_address)?;
        if delta < section.virtual_size && delta < section.file_size {
            section.file_offset.checked_add(delta)
        } else {
            None
        }
    })
}
