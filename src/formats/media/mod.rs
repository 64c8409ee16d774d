//! Container-image parsers: PNG, JPEG and ISOBMFF (MP4/HEIC/AVIF).
//!
//! These formats are record streams rather than table-driven executables,
//! so each parser walks records front to back and stops at the terminator
//! or the first record it cannot frame.

pub mod isobmff;
pub mod jpeg;
pub mod png;

use crate::core::{Region, RegionKind};
use crate::entropy::describe_entropy;

/// Bytes after the format's terminating record.
pub(crate) fn trailing_region(data: &[u8], from: u64) -> Option<Region> {
    let len = data.len() as u64;
    if from >= len {
        return None;
    }
    Some(
        Region::new("Trailing Data", from, len - from, RegionKind::Unclassified)
            .with_detail("Size", (len - from).to_string())
            .with_detail("Entropy", describe_entropy(&data[from as usize..])),
    )
}
