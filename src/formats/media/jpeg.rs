//! JPEG marker-segment walker

use crate::core::{Region, RegionKind};
use crate::error::ParseError;
use crate::formats::media::trailing_region;
use crate::formats::utils::{clamp_span, Endian, ReadExt};
use crate::formats::{describe, int_fields, Layout};
use memchr::memchr;
use tracing::{debug, warn};

pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const TEM: u8 = 0x01;

/// Markers with no length field.
pub fn is_standalone(marker: u8) -> bool {
    matches!(marker, 0xD0..=0xD7 | SOI | EOI | TEM)
}

fn is_sof(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Short marker mnemonic, e.g. `SOF0`, `APP1`, `RST3`.
pub fn marker_name(marker: u8) -> String {
    match marker {
        0xC4 => "DHT".into(),
        0xC8 => "JPG".into(),
        0xCC => "DAC".into(),
        m @ 0xC0..=0xCF => format!("SOF{}", m - 0xC0),
        m @ 0xD0..=0xD7 => format!("RST{}", m - 0xD0),
        SOI => "SOI".into(),
        EOI => "EOI".into(),
        SOS => "SOS".into(),
        0xDB => "DQT".into(),
        0xDC => "DNL".into(),
        0xDD => "DRI".into(),
        0xDE => "DHP".into(),
        0xDF => "EXP".into(),
        m @ 0xE0..=0xEF => format!("APP{}", m - 0xE0),
        m @ 0xF0..=0xFD => format!("JPG{}", m - 0xF0),
        0xFE => "COM".into(),
        TEM => "TEM".into(),
        m => format!("{:#04x}", m),
    }
}

fn marker_description(marker: u8) -> Option<&'static str> {
    Some(match marker {
        0xC0 => "Baseline DCT",
        0xC1 => "Extended sequential DCT",
        0xC2 => "Progressive DCT",
        0xC3 => "Lossless",
        0xC5 => "Differential sequential DCT",
        0xC6 => "Differential progressive DCT",
        0xC7 => "Differential lossless",
        0xC9 => "Extended sequential DCT, arithmetic",
        0xCA => "Progressive DCT, arithmetic",
        0xCB => "Lossless, arithmetic",
        0xC4 => "Huffman tables",
        0xDB => "Quantization tables",
        0xDD => "Restart interval",
        SOS => "Start of scan",
        SOI => "Start of image",
        EOI => "End of image",
        0xFE => "Comment",
        _ => return None,
    })
}

/// Walk marker segments from SOI to EOI.
pub fn parse(data: &[u8]) -> Layout {
    let mut layout = Layout::default();
    if let Err(e) = parse_into(data, &mut layout) {
        layout.fail(e);
    }
    layout
}

fn parse_into(data: &[u8], layout: &mut Layout) -> Result<(), ParseError> {
    let soi = data
        .read_slice_at(0, 2)
        .ok_or_else(|| ParseError::truncated("JPEG SOI marker", 0, 2, data.len()))?;
    if soi != [0xFF, SOI] {
        return Err(ParseError::structural(0, "Missing JPEG SOI marker"));
    }

    let len = data.len();
    let mut cursor = 0usize;
    let mut segments = 0usize;
    let mut ended = false;

    while cursor < len {
        if data[cursor] != 0xFF {
            // Garbage between segments: resynchronise on the next 0xFF.
            let next = memchr(0xFF, &data[cursor..]).map(|i| cursor + i).unwrap_or(len);
            warn!(offset = cursor, skipped = next - cursor, "bytes outside any marker segment");
            layout.regions.push(Region::new(
                "Unrecognized Data",
                cursor as u64,
                (next - cursor) as u64,
                RegionKind::Unclassified,
            ));
            cursor = next;
            continue;
        }

        // FF FF ... is fill before the real marker byte.
        let mut at = cursor;
        while at + 1 < len && data[at + 1] == 0xFF {
            at += 1;
        }
        let Some(marker) = data.read_u8_at(at + 1) else {
            warn!(offset = cursor, "dangling 0xFF at end of data");
            break;
        };
        if marker == 0x00 {
            // Stuffed byte outside a scan; not a marker.
            cursor = at + 2;
            continue;
        }

        if is_standalone(marker) {
            let size = (at + 2 - cursor) as u64;
            layout.regions.push(
                Region::new(marker_name(marker), cursor as u64, size, RegionKind::Record)
                    .with_value(u64::from(u16::from_be_bytes([0xFF, marker])))
                    .with_description(marker_description(marker).unwrap_or("Restart marker")),
            );
            segments += 1;
            cursor = at + 2;
            if marker == EOI {
                ended = true;
                break;
            }
            continue;
        }

        let Some(length) = data.read_u16_be_at(at + 2) else {
            warn!(offset = at, marker = %marker_name(marker), "segment length past end of data");
            break;
        };
        if length < 2 {
            warn!(offset = at, length, "segment length smaller than its own field");
            break;
        }
        let declared = (at + 2 - cursor) as u64 + u64::from(length);
        let size = clamp_span(len, cursor as u64, declared);
        layout
            .regions
            .push(segment_region(data, cursor, at, marker, length, size));
        segments += 1;
        cursor += size as usize;
        if size < declared {
            warn!(offset = at, marker = %marker_name(marker), "segment runs past end of data");
            break;
        }

        if marker == SOS {
            let end = entropy_end(data, cursor);
            if end > cursor {
                layout.regions.push(
                    Region::new(
                        "Entropy Data",
                        cursor as u64,
                        (end - cursor) as u64,
                        RegionKind::Data,
                    )
                    .with_description("Entropy-coded scan data"),
                );
            }
            cursor = end;
        }
    }

    debug!(segments, ended, "jpeg markers");
    if ended {
        layout.regions.extend(trailing_region(data, cursor as u64));
    } else {
        warn!("no EOI marker");
    }
    Ok(())
}

/// End of entropy-coded data: the first `FF` not followed by `00` (stuffing)
/// or `D0..=D7` (restart markers).
pub fn entropy_end(data: &[u8], start: usize) -> usize {
    let mut pos = start;
    while let Some(i) = memchr(0xFF, &data[pos..]) {
        let ff = pos + i;
        match data.get(ff + 1) {
            Some(0x00) | Some(0xD0..=0xD7) => pos = ff + 2,
            Some(_) => return ff,
            None => return data.len(),
        }
        if pos >= data.len() {
            return data.len();
        }
    }
    data.len()
}

fn segment_region(
    data: &[u8],
    start: usize,
    at: usize,
    marker: u8,
    length: u16,
    size: u64,
) -> Region {
    let name = marker_name(marker);
    let payload_start = at + 4;
    let payload_end = (start as u64 + size) as usize;
    let payload = data.get(payload_start..payload_end).unwrap_or_default();

    let mut children = Vec::new();
    if at > start {
        children.push(Region::new(
            "Fill Bytes",
            start as u64,
            (at - start) as u64,
            RegionKind::Unclassified,
        ));
    }
    children.push(Region::field(
        "Marker",
        at as u64,
        2,
        u16::from_be_bytes([0xFF, marker]),
    ));
    children.push(Region::field("Length", at as u64 + 2, 2, length));

    let mut region = Region::new(name, start as u64, size, RegionKind::Record);
    if let Some(description) = marker_description(marker) {
        region.description = Some(description.to_string());
    }

    let fields = match marker {
        m if is_sof(m) => decode_sof(data, payload_start, payload, &mut region),
        0xE0 => decode_app0(data, payload_start, payload, &mut region),
        0xE1 => decode_app1(payload, &mut region),
        0xDB => {
            region = region.with_detail("Tables", count_dqt(payload).to_string());
            Vec::new()
        }
        0xC4 => {
            region = region.with_detail("Tables", count_dht(payload).to_string());
            Vec::new()
        }
        0xDD => {
            if let Some(interval) = payload.read_u16_be_at(0) {
                region = region.with_detail("Interval", interval.to_string());
            }
            int_fields(data, payload_start as u64, &[("Restart Interval", 0, 2)], Endian::Big)
        }
        SOS => {
            if let Some(components) = payload.read_u8_at(0) {
                region = region.with_detail("Components", components.to_string());
            }
            int_fields(data, payload_start as u64, &[("Components", 0, 1)], Endian::Big)
        }
        0xFE => {
            let text = String::from_utf8_lossy(payload).into_owned();
            region = region.with_detail("Comment", text);
            Vec::new()
        }
        _ => Vec::new(),
    };

    if !payload.is_empty() {
        let payload_region = Region::new(
            "Payload",
            payload_start as u64,
            payload.len() as u64,
            RegionKind::Data,
        )
        .with_children(fields);
        children.push(payload_region);
    }
    region.with_children(children)
}

fn decode_sof(data: &[u8], start: usize, payload: &[u8], region: &mut Region) -> Vec<Region> {
    let mut fields = int_fields(
        data,
        start as u64,
        &[("Precision", 0, 1), ("Height", 1, 2), ("Width", 3, 2), ("Components", 5, 1)],
        Endian::Big,
    );
    if let (Some(precision), Some(height), Some(width), Some(components)) = (
        payload.read_u8_at(0),
        payload.read_u16_be_at(1),
        payload.read_u16_be_at(3),
        payload.read_u8_at(5),
    ) {
        region.details.insert("Width", width.to_string());
        region.details.insert("Height", height.to_string());
        region.details.insert("Precision", format!("{} bits", precision));
        region.details.insert("Components", components.to_string());
        describe(&mut fields, "Precision", format!("{} bits", precision));

        for i in 0..usize::from(components) {
            let rel = 6 + i * 3;
            let Some(component) = payload.read_slice_at(rel, 3) else {
                break;
            };
            fields.push(
                Region::new(
                    format!("Component {}", component[0]),
                    (start + rel) as u64,
                    3,
                    RegionKind::TableEntry,
                )
                .with_description(format!(
                    "sampling {}x{}, quant table {}",
                    component[1] >> 4,
                    component[1] & 0x0F,
                    component[2]
                )),
            );
        }
    }
    fields
}

fn decode_app0(data: &[u8], start: usize, payload: &[u8], region: &mut Region) -> Vec<Region> {
    if payload.starts_with(b"JFIF\0") {
        region.details.insert("Identifier", "JFIF");
        let mut fields = int_fields(
            data,
            start as u64,
            &[
                ("Identifier", 0, 5),
                ("Version Major", 5, 1),
                ("Version Minor", 6, 1),
                ("Units", 7, 1),
                ("X Density", 8, 2),
                ("Y Density", 10, 2),
            ],
            Endian::Big,
        );
        if let (Some(major), Some(minor)) = (payload.read_u8_at(5), payload.read_u8_at(6)) {
            region.details.insert("Version", format!("{}.{:02}", major, minor));
        }
        if let (Some(units), Some(x), Some(y)) = (
            payload.read_u8_at(7),
            payload.read_u16_be_at(8),
            payload.read_u16_be_at(10),
        ) {
            let unit = match units {
                0 => "aspect ratio",
                1 => "dots per inch",
                2 => "dots per cm",
                _ => "unknown",
            };
            describe(&mut fields, "Units", unit);
            region.details.insert("Density", format!("{} x {} {}", x, y, unit));
        }
        fields
    } else if payload.starts_with(b"JFXX\0") {
        region.details.insert("Identifier", "JFXX");
        Vec::new()
    } else {
        Vec::new()
    }
}

fn decode_app1(payload: &[u8], region: &mut Region) -> Vec<Region> {
    if payload.starts_with(b"Exif\0\0") {
        region.details.insert("Identifier", "Exif");
        if let Some(order) = payload.read_slice_at(6, 2) {
            let order = match order {
                b"II" => "little-endian (II)",
                b"MM" => "big-endian (MM)",
                _ => "unknown",
            };
            region.details.insert("TIFF Byte Order", order);
        }
    } else if payload.starts_with(b"http://ns.adobe.com/xap/1.0/\0") {
        region.details.insert("Identifier", "XMP");
    }
    Vec::new()
}

/// Quantization tables: one precision/id byte, then 64 entries of 1 or 2 bytes.
fn count_dqt(payload: &[u8]) -> usize {
    let mut pos = 0;
    let mut tables = 0;
    while let Some(pq_tq) = payload.read_u8_at(pos) {
        let entry = if pq_tq >> 4 == 0 { 64 } else { 128 };
        pos += 1 + entry;
        if pos > payload.len() {
            break;
        }
        tables += 1;
    }
    tables
}

/// Huffman tables: class/id byte, 16 code-length counts, then the symbols.
fn count_dht(payload: &[u8]) -> usize {
    let mut pos = 0;
    let mut tables = 0;
    while let Some(counts) = payload.read_slice_at(pos + 1, 16) {
        let symbols: usize = counts.iter().map(|&c| usize::from(c)).sum();
        pos += 17 + symbols;
        if pos > payload.len() {
            break;
        }
        tables += 1;
    }
    tables
}
