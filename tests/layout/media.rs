use crate::common::*;
use binlayout::FileFormat;

#[test]
fn png_chunks_consume_length_plus_overhead() {
    let data = png();
    let parsed = parse_bytes(data.clone(), "tiny.png");
    assert_eq!(parsed.format, FileFormat::Png);

    let chunks: Vec<_> = parsed
        .regions
        .iter()
        .filter(|r| r.name.starts_with("Chunk: "))
        .collect();
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        let at = chunk.offset as usize;
        let declared = u32::from_be_bytes(data[at..at + 4].try_into().unwrap()) as u64;
        assert_eq!(chunk.size, declared + 12, "{}", chunk.name);
    }
    assert_eq!(chunks.last().unwrap().name, "Chunk: IEND");
}

#[test]
fn png_walk_stops_at_iend() {
    let mut data = png();
    data.extend(png_chunk(b"tEXt", b"after\0end"));
    let len = data.len() as u64;
    let parsed = parse_bytes(data, "trailing.png");
    assert!(parsed.regions.iter().all(|r| r.name != "Chunk: tEXt"));
    let last = parsed.regions.last().unwrap();
    assert_eq!(last.name, "Trailing Data");
    assert_eq!(last.end(), len);
}

#[test]
fn png_truncated_chunk_is_clamped() {
    let mut data = png();
    data.truncate(8 + 25 + 10);
    let len = data.len() as u64;
    let parsed = parse_bytes(data, "cut.png");
    assert!(parsed.regions.iter().all(|r| r.end() <= len));
    assert!(parsed.regions.iter().any(|r| r.name == "Chunk: IHDR"));
}

#[test]
fn jpeg_scan_data_is_located() {
    let data = jpeg();
    let parsed = parse_bytes(data.clone(), "tiny.jpg");
    assert!(parsed.is_valid);
    let names: Vec<_> = parsed.regions.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["SOI", "APP0", "SOF0", "SOS", "Entropy Data", "EOI"]);

    let entropy = &parsed.regions[4];
    assert_eq!((entropy.offset, entropy.size), (43, 7));
    let sof = &parsed.regions[2];
    assert_eq!(sof.details.get("Width"), Some("8"));
    assert_eq!(sof.details.get("Height"), Some("8"));
    assert_eq!(parsed.regions[5].end(), data.len() as u64);
}

#[test]
fn isobmff_tree_is_nested() {
    let data = mp4();
    let parsed = parse_bytes(data.clone(), "tiny.mp4");
    assert_eq!(parsed.format, FileFormat::Isobmff);
    let names: Vec<_> = parsed.regions.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Box: ftyp", "Box: moov", "Box: mdat"]);

    assert_eq!(parsed.regions[0].details.get("Major Brand"), Some("mp42"));
    let moov = &parsed.regions[1];
    let mvhd = moov.children.iter().find(|c| c.name == "Box: mvhd").unwrap();
    assert_eq!(mvhd.details.get("Timescale"), Some("600"));
    assert_eq!(mvhd.details.get("Duration"), Some("1200"));
    let trak = moov.children.iter().find(|c| c.name == "Box: trak").unwrap();
    assert!(trak.children.iter().any(|c| c.name == "Box: tkhd"));

    let mdat = &parsed.regions[2];
    assert!(mdat.children.iter().all(|c| !c.name.starts_with("Box: ")));
    assert_eq!(mdat.end(), data.len() as u64);
}
