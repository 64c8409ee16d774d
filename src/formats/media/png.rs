//! PNG chunk walker

use crate::core::{Region, RegionKind};
use crate::error::ParseError;
use crate::formats::media::trailing_region;
use crate::formats::utils::{clamp_span, fourcc, name_or_hex, Endian, ReadExt};
use crate::formats::{describe, int_fields, set_text, Layout};
use tracing::{debug, warn};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Length, type and CRC around every chunk's data.
pub const CHUNK_OVERHEAD: u64 = 12;

const IHDR_FIELDS: &[(&str, u64, u64)] = &[
    ("Width", 0, 4),
    ("Height", 4, 4),
    ("Bit Depth", 8, 1),
    ("Color Type", 9, 1),
    ("Compression", 10, 1),
    ("Filter", 11, 1),
    ("Interlace", 12, 1),
];

const PHYS_FIELDS: &[(&str, u64, u64)] = &[
    ("Pixels Per Unit X", 0, 4),
    ("Pixels Per Unit Y", 4, 4),
    ("Unit", 8, 1),
];

pub fn color_type_name(color_type: u8) -> Option<&'static str> {
    Some(match color_type {
        0 => "Grayscale",
        2 => "Truecolor",
        3 => "Indexed-color",
        4 => "Grayscale with alpha",
        6 => "Truecolor with alpha",
        _ => return None,
    })
}

pub fn interlace_name(method: u8) -> Option<&'static str> {
    Some(match method {
        0 => "None",
        1 => "Adam7",
        _ => return None,
    })
}

fn chunk_description(kind: &[u8]) -> &'static str {
    match kind {
        b"IHDR" => "Image header",
        b"PLTE" => "Palette",
        b"IDAT" => "Image data",
        b"IEND" => "Image trailer",
        b"tEXt" => "Textual data",
        b"zTXt" => "Compressed textual data",
        b"iTXt" => "International textual data",
        b"pHYs" => "Physical pixel dimensions",
        b"gAMA" => "Image gamma",
        b"cHRM" => "Primary chromaticities",
        b"sRGB" => "Standard RGB color space",
        b"iCCP" => "Embedded ICC profile",
        b"tIME" => "Last modification time",
        b"bKGD" => "Background color",
        b"tRNS" => "Transparency",
        b"eXIf" => "Exif metadata",
        b"acTL" => "Animation control",
        b"fcTL" => "Frame control",
        b"fdAT" => "Frame data",
        _ if kind.first().is_some_and(|b| b.is_ascii_uppercase()) => "Critical chunk",
        _ => "Ancillary chunk",
    }
}

/// Walk the chunk stream until `IEND` or the first chunk that does not fit.
pub fn parse(data: &[u8]) -> Layout {
    let mut layout = Layout::default();
    if let Err(e) = parse_into(data, &mut layout) {
        layout.fail(e);
    }
    layout
}

fn parse_into(data: &[u8], layout: &mut Layout) -> Result<(), ParseError> {
    let signature = data
        .read_slice_at(0, PNG_SIGNATURE.len())
        .ok_or_else(|| ParseError::truncated("PNG signature", 0, 8, data.len()))?;
    if signature != PNG_SIGNATURE {
        return Err(ParseError::structural(0, "Invalid PNG signature"));
    }
    layout.regions.push(
        Region::new("PNG Signature", 0, 8, RegionKind::Header).with_value(hex::encode_upper(signature)),
    );

    let len = data.len() as u64;
    let mut cursor = 8u64;
    let mut chunks = 0usize;
    let mut seen_end = false;

    while cursor < len {
        let Some(header) = data.read_slice_at(cursor as usize, 8) else {
            warn!(offset = cursor, "truncated chunk header");
            break;
        };
        let length = u64::from(u32::from_be_bytes([header[0], header[1], header[2], header[3]]));
        let kind = [header[4], header[5], header[6], header[7]];
        let declared = length + CHUNK_OVERHEAD;
        let size = clamp_span(data.len(), cursor, declared);
        if size < declared {
            warn!(
                chunk = %fourcc(&kind),
                offset = cursor,
                declared,
                available = size,
                "chunk runs past end of data"
            );
        }

        layout.regions.push(chunk_region(data, cursor, length, &kind, size));
        chunks += 1;
        cursor += size;
        if size < declared {
            break;
        }
        if &kind == b"IEND" {
            seen_end = true;
            break;
        }
    }

    debug!(chunks, seen_end, "png chunks");
    if seen_end {
        layout.regions.extend(trailing_region(data, cursor));
    } else {
        warn!("no IEND chunk");
    }
    Ok(())
}

fn chunk_region(data: &[u8], offset: u64, length: u64, kind: &[u8; 4], size: u64) -> Region {
    let name = fourcc(kind);
    let data_start = offset + 8;

    let mut children = int_fields(data, offset, &[("Length", 0, 4), ("Type", 4, 4)], Endian::Big);
    set_text(&mut children, "Type", name.clone());

    let mut region = Region::new(format!("Chunk: {}", name), offset, size, RegionKind::Record)
        .with_description(chunk_description(kind));

    let payload_len = clamp_span(data.len(), data_start, length);
    if payload_len > 0 {
        let payload = &data[data_start as usize..(data_start + payload_len) as usize];
        let (payload_region, details) = decode_payload(data, kind, data_start, payload);
        children.push(payload_region);
        for (label, value) in details {
            region = region.with_detail(label, value);
        }
    }

    let crc_offset = data_start + length;
    if let Some(crc) = data.read_u32_be_at(crc_offset as usize) {
        children.push(Region::field("CRC", crc_offset, 4, crc).with_description(format!("{:#010x}", crc)));
    }
    region.with_children(children)
}

fn decode_payload(
    data: &[u8],
    kind: &[u8; 4],
    start: u64,
    payload: &[u8],
) -> (Region, Vec<(&'static str, String)>) {
    let mut region = Region::new("Data", start, payload.len() as u64, RegionKind::Data);
    let mut details = Vec::new();

    match kind {
        b"IHDR" => {
            let mut fields = int_fields(data, start, IHDR_FIELDS, Endian::Big);
            if let (Some(width), Some(height)) = (payload.read_u32_be_at(0), payload.read_u32_be_at(4)) {
                details.push(("Width", width.to_string()));
                details.push(("Height", height.to_string()));
                region.description = Some(format!("{}x{}", width, height));
            }
            if let Some(depth) = payload.read_u8_at(8) {
                details.push(("Bit Depth", depth.to_string()));
            }
            if let Some(color) = payload.read_u8_at(9) {
                let label = name_or_hex(color_type_name(color), color);
                describe(&mut fields, "Color Type", label.clone());
                details.push(("Color Type", label));
            }
            if let Some(interlace) = payload.read_u8_at(12) {
                let label = name_or_hex(interlace_name(interlace), interlace);
                describe(&mut fields, "Interlace", label.clone());
                details.push(("Interlace", label));
            }
            region = region.with_children(fields);
        }
        b"tEXt" => {
            let keyword_len = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
            // tEXt is Latin-1.
            let keyword: String = payload[..keyword_len].iter().map(|&b| b as char).collect();
            let text: String = payload
                .get(keyword_len + 1..)
                .unwrap_or_default()
                .iter()
                .map(|&b| b as char)
                .collect();
            region.description = Some(keyword.clone());
            details.push(("Keyword", keyword));
            details.push(("Text", text));
        }
        b"pHYs" => {
            let mut fields = int_fields(data, start, PHYS_FIELDS, Endian::Big);
            if let (Some(x), Some(y), Some(unit)) = (
                payload.read_u32_be_at(0),
                payload.read_u32_be_at(4),
                payload.read_u8_at(8),
            ) {
                let unit_name = if unit == 1 { "meter" } else { "unknown" };
                describe(&mut fields, "Unit", unit_name);
                details.push(("Pixels Per Unit", format!("{} x {} per {}", x, y, unit_name)));
                if unit == 1 {
                    // 0.0254 m per inch
                    details.push(("DPI", format!("{:.0} x {:.0}", x as f64 * 0.0254, y as f64 * 0.0254)));
                }
            }
            region = region.with_children(fields);
        }
        b"gAMA" => {
            if let Some(gamma) = payload.read_u32_be_at(0) {
                let value = format!("{:.5}", f64::from(gamma) / 100_000.0);
                region = region
                    .with_children(vec![Region::field("Gamma", start, 4, gamma)])
                    .with_description(value.clone());
                details.push(("Gamma", value));
            }
        }
        b"IDAT" => {
            region.description = Some("zlib stream".into());
        }
        _ => {}
    }
    (region, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        out
    }

    fn tiny_png() -> Vec<u8> {
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&16u32.to_be_bytes());
        ihdr.extend_from_slice(&9u32.to_be_bytes());
        ihdr.extend_from_slice(&[8, 6, 0, 0, 1]);

        let mut d = PNG_SIGNATURE.to_vec();
        d.extend(chunk(b"IHDR", &ihdr));
        d.extend(chunk(b"gAMA", &45455u32.to_be_bytes()));
        d.extend(chunk(b"tEXt", b"Title\0hello"));
        d.extend(chunk(b"IDAT", &[0x78, 0x9C, 0x01, 0x02]));
        d.extend(chunk(b"IEND", &[]));
        d
    }

    #[test]
    fn test_chunk_walk() {
        let data = tiny_png();
        let layout = parse(&data);
        assert!(layout.error.is_none());
        let names: Vec<_> = layout.regions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "PNG Signature",
                "Chunk: IHDR",
                "Chunk: gAMA",
                "Chunk: tEXt",
                "Chunk: IDAT",
                "Chunk: IEND"
            ]
        );
        // Each chunk is its data length plus 12 bytes.
        assert_eq!(layout.regions[1].size, 13 + 12);
        assert_eq!(layout.regions[5].size, 12);
        assert_eq!(layout.regions[5].end(), data.len() as u64);
    }

    #[test]
    fn test_ihdr_decode() {
        let layout = parse(&tiny_png());
        let ihdr = &layout.regions[1];
        assert_eq!(ihdr.details.get("Width"), Some("16"));
        assert_eq!(ihdr.details.get("Height"), Some("9"));
        assert_eq!(ihdr.details.get("Color Type"), Some("Truecolor with alpha"));
        assert_eq!(ihdr.details.get("Interlace"), Some("Adam7"));
        let names: Vec<_> = ihdr.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Length", "Type", "Data", "CRC"]);
    }

    #[test]
    fn test_ancillary_decodes() {
        let layout = parse(&tiny_png());
        assert_eq!(layout.regions[2].details.get("Gamma"), Some("0.45455"));
        assert_eq!(layout.regions[3].details.get("Keyword"), Some("Title"));
        assert_eq!(layout.regions[3].details.get("Text"), Some("hello"));
    }

    #[test]
    fn test_walk_stops_at_iend() {
        let mut data = tiny_png();
        let end = data.len() as u64;
        data.extend(chunk(b"tEXt", b"after\0end"));
        let layout = parse(&data);
        assert!(!layout.regions.iter().any(|r| r.offset == end && r.name.starts_with("Chunk")));
        let trailing = layout.regions.last().unwrap();
        assert_eq!(trailing.name, "Trailing Data");
        assert_eq!(trailing.offset, end);
    }

    #[test]
    fn test_truncated_chunk_is_clamped() {
        let data = tiny_png();
        let cut = &data[..8 + 12 + 13 + 10];
        let layout = parse(cut);
        assert!(layout.error.is_none());
        let last = layout.regions.last().unwrap();
        assert_eq!(last.name, "Chunk: gAMA");
        assert_eq!(last.end(), cut.len() as u64);
    }

    #[test]
    fn test_bad_signature() {
        let layout = parse(b"\x89PNX\r\n\x1a\n");
        assert!(matches!(layout.error, Some(ParseError::Structural { .. })));
        let layout = parse(b"\x89PN");
        assert!(matches!(layout.error, Some(ParseError::Truncated { .. })));
    }
}
