//! ISO base media file format (MP4, MOV, HEIC, AVIF) box walker
//!
//! Boxes nest arbitrarily deep on hostile input, so the tree is built from a
//! flat node list driven by an explicit work stack rather than recursion.

use crate::core::{Region, RegionKind};
use crate::error::ParseError;
use crate::formats::media::trailing_region;
use crate::formats::utils::{fourcc, Endian, ReadExt};
use crate::formats::{int_fields, set_text, Layout, ParseOptions};
use tracing::{debug, warn};

const BOX_HEADER_SIZE: u64 = 8;
const LARGE_BOX_HEADER_SIZE: u64 = 16;
const UUID_SIZE: u64 = 16;
const FULL_BOX_HEADER_SIZE: u64 = 4;

/// Boxes whose payload is itself a sequence of boxes.
pub const CONTAINER_TYPES: &[&[u8; 4]] = &[
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"dinf", b"edts", b"udta", b"meta", b"iprp",
    b"ipco", b"mvex", b"moof", b"traf", b"mfra", b"sinf", b"schi",
];

pub fn is_container(kind: &[u8; 4]) -> bool {
    CONTAINER_TYPES.contains(&kind)
}

pub fn box_description(kind: &[u8; 4]) -> Option<&'static str> {
    Some(match kind {
        b"ftyp" => "File type",
        b"moov" => "Movie",
        b"mvhd" => "Movie header",
        b"trak" => "Track",
        b"tkhd" => "Track header",
        b"mdia" => "Media",
        b"mdhd" => "Media header",
        b"hdlr" => "Handler reference",
        b"minf" => "Media information",
        b"stbl" => "Sample table",
        b"stsd" => "Sample descriptions",
        b"dinf" => "Data information",
        b"edts" => "Edit list container",
        b"udta" => "User data",
        b"meta" => "Metadata",
        b"iprp" => "Item properties",
        b"ipco" => "Item property container",
        b"ispe" => "Image spatial extents",
        b"iinf" => "Item information",
        b"iloc" => "Item locations",
        b"pitm" => "Primary item",
        b"mvex" => "Movie extends",
        b"moof" => "Movie fragment",
        b"traf" => "Track fragment",
        b"mfra" => "Movie fragment random access",
        b"sinf" => "Protection scheme information",
        b"schi" => "Scheme information",
        b"mdat" => "Media data",
        b"free" | b"skip" => "Free space",
        b"uuid" => "User extension",
        _ => return None,
    })
}

/// Decoded box header.
#[derive(Debug, Clone)]
pub struct BoxHeader {
    pub offset: u64,
    pub kind: [u8; 4],
    /// Total size, header included, after resolving `size == 0` / `size == 1`.
    pub size: u64,
    pub header_size: u64,
    /// Declared size ran past the enclosing range and was clamped.
    pub truncated: bool,
    pub large: bool,
}

impl BoxHeader {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn payload_start(&self) -> u64 {
        self.offset + self.header_size
    }
}

/// Read one box header at `offset` inside `[offset, limit)`.
pub fn read_box_header(data: &[u8], offset: u64, limit: u64) -> Result<BoxHeader, ParseError> {
    if offset + BOX_HEADER_SIZE > limit {
        return Err(ParseError::truncated("box header", offset, BOX_HEADER_SIZE, data.len()));
    }
    let at = offset as usize;
    let size32 = data
        .read_u32_be_at(at)
        .ok_or_else(|| ParseError::truncated("box header", offset, BOX_HEADER_SIZE, data.len()))?;
    let kind_bytes = data
        .read_slice_at(at + 4, 4)
        .ok_or_else(|| ParseError::truncated("box header", offset, BOX_HEADER_SIZE, data.len()))?;
    let kind = [kind_bytes[0], kind_bytes[1], kind_bytes[2], kind_bytes[3]];

    let (mut size, mut header_size, large) = match size32 {
        0 => (limit - offset, BOX_HEADER_SIZE, false),
        1 => {
            if offset + LARGE_BOX_HEADER_SIZE > limit {
                return Err(ParseError::truncated(
                    "box largesize",
                    offset,
                    LARGE_BOX_HEADER_SIZE,
                    data.len(),
                ));
            }
            let large = data.read_u64_be_at(at + 8).unwrap_or(0);
            (large, LARGE_BOX_HEADER_SIZE, true)
        }
        n => (u64::from(n), BOX_HEADER_SIZE, false),
    };
    if &kind == b"uuid" {
        header_size += UUID_SIZE;
    }
    if size < header_size {
        return Err(ParseError::structural(
            offset,
            format!("Box '{}' size {} is smaller than its header", fourcc(&kind), size),
        ));
    }
    let truncated = offset.saturating_add(size) > limit;
    if truncated {
        size = limit - offset;
        if size < header_size {
            return Err(ParseError::truncated("box header", offset, header_size, data.len()));
        }
    }
    Ok(BoxHeader {
        offset,
        kind,
        size,
        header_size,
        truncated,
        large,
    })
}

/// One pending range of sibling boxes.
struct Pending {
    start: u64,
    end: u64,
    depth: usize,
    parent: Option<usize>,
}

/// Walk the box tree.
pub fn parse(data: &[u8], options: &ParseOptions) -> Layout {
    let mut layout = Layout::default();
    if let Err(e) = parse_into(data, options, &mut layout) {
        layout.fail(e);
    }
    layout
}

fn parse_into(data: &[u8], options: &ParseOptions, layout: &mut Layout) -> Result<(), ParseError> {
    let len = data.len() as u64;
    // The first box must frame cleanly or this is not ISOBMFF at all.
    read_box_header(data, 0, len)?;

    let mut nodes: Vec<Region> = Vec::new();
    let mut parents: Vec<Option<usize>> = Vec::new();
    let mut stack = vec![Pending {
        start: 0,
        end: len,
        depth: 0,
        parent: None,
    }];
    let mut top_level_end = 0;

    while let Some(range) = stack.pop() {
        let mut cursor = range.start;
        while cursor < range.end {
            let header = match read_box_header(data, cursor, range.end) {
                Ok(h) => h,
                Err(e) => {
                    warn!(offset = cursor, depth = range.depth, error = %e, "stopping box walk");
                    break;
                }
            };
            if header.truncated {
                warn!(
                    kind = %fourcc(&header.kind),
                    offset = header.offset,
                    "box runs past its parent; clamped"
                );
            }

            let index = nodes.len();
            nodes.push(box_region(data, &header));
            parents.push(range.parent);

            if is_container(&header.kind) {
                let mut payload = header.payload_start();
                if &header.kind == b"meta" {
                    payload += FULL_BOX_HEADER_SIZE;
                }
                if range.depth + 1 >= options.max_box_depth {
                    warn!(
                        kind = %fourcc(&header.kind),
                        depth = range.depth,
                        "box nesting too deep; not descending"
                    );
                } else if payload < header.end() {
                    stack.push(Pending {
                        start: payload,
                        end: header.end(),
                        depth: range.depth + 1,
                        parent: Some(index),
                    });
                }
            }

            cursor = header.end();
            if range.parent.is_none() {
                top_level_end = cursor;
            }
            if header.truncated {
                break;
            }
        }
    }
    debug!(boxes = nodes.len(), "isobmff boxes");

    layout.regions.extend(assemble(nodes, parents));
    layout.regions.extend(trailing_region(data, top_level_end));
    Ok(())
}

/// Turn the flat node list into a forest. Children always have larger
/// indices than their parent, so one reverse pass sees every child first.
fn assemble(nodes: Vec<Region>, parents: Vec<Option<usize>>) -> Vec<Region> {
    let mut pending: Vec<Vec<Region>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    let mut slots: Vec<Option<Region>> = nodes.into_iter().map(Some).collect();

    for index in (0..slots.len()).rev() {
        let Some(mut region) = slots[index].take() else {
            continue;
        };
        let mut children = std::mem::take(&mut pending[index]);
        children.sort_by_key(|c| c.offset);
        for child in children {
            region.push_child(child);
        }
        match parents[index] {
            Some(parent) => pending[parent].push(region),
            None => roots.push(region),
        }
    }
    roots.sort_by_key(|r| r.offset);
    roots
}

fn box_region(data: &[u8], header: &BoxHeader) -> Region {
    let name = fourcc(&header.kind);
    let mut fields = int_fields(data, header.offset, &[("size", 0, 4), ("type", 4, 4)], Endian::Big);
    set_text(&mut fields, "type", name.clone());
    if header.large {
        fields.extend(int_fields(data, header.offset, &[("largesize", 8, 8)], Endian::Big));
    }

    let mut region = Region::new(format!("Box: {}", name), header.offset, header.size, RegionKind::Record)
        .with_detail("Size", header.size.to_string());
    if let Some(description) = box_description(&header.kind) {
        region.description = Some(description.to_string());
    }

    let payload = header.payload_start();
    let body_end = header.end() as usize;
    let body = data.get(payload as usize..body_end).unwrap_or_default();

    match &header.kind {
        b"uuid" => {
            let at = header.payload_start() - UUID_SIZE;
            if let Some(usertype) = data.read_slice_at(at as usize, UUID_SIZE as usize) {
                let text = hex::encode(usertype);
                fields.push(Region::new("usertype", at, UUID_SIZE, RegionKind::Field).with_value(text.clone()));
                region = region.with_detail("Extended Type", text);
            }
        }
        b"ftyp" | b"styp" => {
            let mut brand_fields = int_fields(
                data,
                payload,
                &[("major_brand", 0, 4), ("minor_version", 4, 4)],
                Endian::Big,
            );
            if let Some(major) = body.read_slice_at(0, 4) {
                set_text(&mut brand_fields, "major_brand", fourcc(major));
                region = region.with_detail("Major Brand", fourcc(major));
            }
            if let Some(minor) = body.read_u32_be_at(4) {
                region = region.with_detail("Minor Version", minor.to_string());
            }
            let compatible: Vec<String> = body
                .get(8..)
                .unwrap_or_default()
                .chunks_exact(4)
                .map(fourcc)
                .collect();
            if !compatible.is_empty() {
                region = region.with_detail("Compatible Brands", compatible.join(", "));
                brand_fields.push(
                    Region::new(
                        "compatible_brands",
                        payload + 8,
                        compatible.len() as u64 * 4,
                        RegionKind::Field,
                    )
                    .with_value(compatible.join(", ")),
                );
            }
            fields.extend(brand_fields);
        }
        b"meta" => {
            fields.extend(full_box_fields(data, payload));
        }
        b"hdlr" => {
            fields.extend(full_box_fields(data, payload));
            fields.extend(int_fields(data, payload, &[("pre_defined", 4, 4), ("handler_type", 8, 4)], Endian::Big));
            if let Some(handler) = body.read_slice_at(8, 4) {
                set_text(&mut fields, "handler_type", fourcc(handler));
                region = region
                    .with_description(format!("Handler reference ({})", fourcc(handler)))
                    .with_detail("Handler", fourcc(handler));
            }
            // name: NUL-terminated after three reserved words
            if let Some(name) = body.read_cstring_at(24, body.len().saturating_sub(24)) {
                if !name.is_empty() {
                    region = region.with_detail("Name", name);
                }
            }
        }
        b"mvhd" | b"mdhd" => {
            fields.extend(full_box_fields(data, payload));
            let version = body.read_u8_at(0).unwrap_or(0);
            let table: &[(&str, u64, u64)] = if version == 1 {
                &[("creation_time", 4, 8), ("modification_time", 12, 8), ("timescale", 20, 4), ("duration", 24, 8)]
            } else {
                &[("creation_time", 4, 4), ("modification_time", 8, 4), ("timescale", 12, 4), ("duration", 16, 4)]
            };
            let timing = int_fields(data, payload, table, Endian::Big);
            let timescale = crate::formats::field_value(&timing, "timescale");
            let duration = crate::formats::field_value(&timing, "duration");
            if let (Some(timescale), Some(duration)) = (timescale, duration) {
                region = region
                    .with_detail("Timescale", timescale.to_string())
                    .with_detail("Duration", duration.to_string());
                if timescale > 0 {
                    region = region.with_detail(
                        "Duration (s)",
                        format!("{:.3}", duration as f64 / timescale as f64),
                    );
                }
            }
            fields.extend(timing);
        }
        b"tkhd" => {
            fields.extend(full_box_fields(data, payload));
            let version = body.read_u8_at(0).unwrap_or(0);
            let table: &[(&str, u64, u64)] = if version == 1 {
                &[("creation_time", 4, 8), ("modification_time", 12, 8), ("track_ID", 20, 4)]
            } else {
                &[("creation_time", 4, 4), ("modification_time", 8, 4), ("track_ID", 12, 4)]
            };
            let ids = int_fields(data, payload, table, Endian::Big);
            if let Some(track) = crate::formats::field_value(&ids, "track_ID") {
                region = region.with_detail("Track ID", track.to_string());
            }
            fields.extend(ids);
        }
        b"ispe" => {
            fields.extend(full_box_fields(data, payload));
            fields.extend(int_fields(data, payload, &[("image_width", 4, 4), ("image_height", 8, 4)], Endian::Big));
            if let (Some(w), Some(h)) = (body.read_u32_be_at(4), body.read_u32_be_at(8)) {
                region = region
                    .with_description(format!("{}x{}", w, h))
                    .with_detail("Width", w.to_string())
                    .with_detail("Height", h.to_string());
            }
        }
        b"mdat" => {
            region = region.with_detail("Payload Size", (header.size - header.header_size).to_string());
        }
        _ => {}
    }
    region.with_children(fields)
}

fn full_box_fields(data: &[u8], payload: u64) -> Vec<Region> {
    int_fields(data, payload, &[("version", 0, 1), ("flags", 1, 3)], Endian::Big)
}
