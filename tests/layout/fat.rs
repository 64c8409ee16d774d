use crate::common::*;
use binlayout::{check_invariants, FileFormat, Region};

const ARM64: u32 = 0x0100_000C;
const X86_64: u32 = 0x0100_0007;

fn slices(regions: &[Region]) -> Vec<&Region> {
    regions
        .iter()
        .filter(|r| r.name.starts_with("Slice "))
        .collect()
}

fn walk(root: &Region) -> Vec<&Region> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(region) = stack.pop() {
        out.push(region);
        stack.extend(region.children.iter());
    }
    out
}

#[test]
fn every_slice_gets_a_disjoint_region() {
    let parsed = parse_bytes(fat(&[ARM64, X86_64], &[0x1000, 0x2000]), "universal");
    assert_eq!(parsed.format, FileFormat::FatMachO);
    assert!(parsed.is_valid);

    let slices = slices(&parsed.regions);
    assert_eq!(slices.len(), 2);
    assert!(slices[0].end() <= slices[1].offset);
    assert_eq!((slices[0].offset, slices[0].size), (0x1000, 0x500));
    assert_eq!((slices[1].offset, slices[1].size), (0x2000, 0x500));
}

// Rebasing assumes slice-internal file offsets are relative to the slice start.
#[test]
fn nested_regions_are_rebased_into_their_slice() {
    let parsed = parse_bytes(fat(&[ARM64, X86_64], &[0x1000, 0x2000]), "universal");
    for slice in slices(&parsed.regions) {
        let inner = walk(slice);
        assert!(inner.len() > 1);
        for region in inner {
            assert!(
                region.offset >= slice.offset && region.end() <= slice.end(),
                "{} escapes {}",
                region.name,
                slice.name
            );
        }
        let header = &slice.children[0];
        assert_eq!(header.name, "Mach-O Header");
        assert_eq!(header.offset, slice.offset);
    }

    let text_offsets: Vec<_> = parsed
        .sections
        .iter()
        .filter(|s| s.name.ends_with("__text"))
        .map(|s| s.file_offset)
        .collect();
    assert_eq!(text_offsets, vec![0x1300, 0x2300]);
    assert!(check_invariants(&parsed).is_empty());
}

#[test]
fn overlapping_slice_is_dropped() {
    let mut data = fat(&[ARM64, X86_64], &[0x1000, 0x2000]);
    // second slice now starts inside the first
    data[8 + 20 + 8..8 + 20 + 12].copy_from_slice(&0x1200u32.to_be_bytes());
    let parsed = parse_bytes(data, "overlap");
    assert_eq!(slices(&parsed.regions).len(), 1);
}
