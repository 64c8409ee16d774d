use crate::common::*;
use binlayout::{detect_many, FileFormat, ParseOptions};
use bytes::Bytes;

#[test]
fn fixtures_are_routed_to_their_parser() {
    let cases = [
        (pe32(), FileFormat::Pe),
        (elf64(), FileFormat::Elf),
        (macho64(0x0100_000C), FileFormat::MachO),
        (fat(&[0x0100_000C], &[0x1000]), FileFormat::FatMachO),
        (png(), FileFormat::Png),
        (jpeg(), FileFormat::Jpeg),
        (mp4(), FileFormat::Isobmff),
    ];
    for (data, format) in cases {
        let parsed = parse_bytes(data, "fixture");
        assert_eq!(parsed.format, format);
        assert!(parsed.is_valid, "{}: {:?}", format, parsed.error);
        assert!(parsed.error.is_none());
        assert!(!parsed.regions.is_empty());
    }
}

#[test]
fn unknown_magic_falls_back_to_pe_and_fails_cleanly() {
    for junk in [
        b"GIF89a\x01\x00".to_vec(),
        vec![0u8; 3],
        Vec::new(),
        (0..=255u8).rev().collect(),
    ] {
        let parsed = parse_bytes(junk, "junk");
        assert_eq!(parsed.format, FileFormat::Pe);
        assert!(!parsed.is_valid);
        assert!(parsed.error.as_deref().is_some_and(|e| !e.is_empty()));
    }
}

#[test]
fn corrupt_headers_keep_partial_regions() {
    let mut data = pe32();
    data[0x80..0x84].copy_from_slice(b"NE\0\0");
    let parsed = parse_bytes(data, "corrupt.exe");
    assert!(!parsed.is_valid);
    assert_eq!(parsed.regions[0].name, "DOS Header");
}

#[test]
fn palette_only_changes_colors() {
    let dark = binlayout::detect(Bytes::from(elf64()), "a", binlayout::Palette::Dark);
    let light = binlayout::detect(Bytes::from(elf64()), "a", binlayout::Palette::Light);
    assert_eq!(dark.regions.len(), light.regions.len());
    for (d, l) in dark.regions.iter().zip(&light.regions) {
        assert_eq!((d.offset, d.size, &d.name), (l.offset, l.size, &l.name));
        assert_ne!(d.color, l.color);
    }
}

#[test]
fn parallel_detection_matches_sequential() {
    let inputs = vec![
        ("pe".to_string(), Bytes::from(pe32())),
        ("elf".to_string(), Bytes::from(elf64())),
        ("png".to_string(), Bytes::from(png())),
    ];
    let parsed = detect_many(inputs, &ParseOptions::default());
    let formats: Vec<_> = parsed.iter().map(|p| p.format).collect();
    assert_eq!(formats, vec![FileFormat::Pe, FileFormat::Elf, FileFormat::Png]);
    assert_eq!(parsed[1].regions, parse_bytes(elf64(), "elf").regions);
}
