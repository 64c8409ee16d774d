//! Bounds-checked primitive readers shared by every format parser.
//!
//! Every read returns `None` instead of panicking when it would cross the
//! end of the buffer, so parsers can treat truncation as an ordinary branch.

use bitflags::Flags;

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn name(self) -> &'static str {
        match self {
            Endian::Little => "little-endian",
            Endian::Big => "big-endian",
        }
    }
}

/// Extension trait for reading primitive types from byte slices
pub trait ReadExt {
    fn read_slice_at(&self, offset: usize, len: usize) -> Option<&[u8]>;

    #[inline(always)]
    fn read_u8_at(&self, offset: usize) -> Option<u8> {
        self.read_slice_at(offset, 1).map(|b| b[0])
    }

    #[inline(always)]
    fn read_u16_at(&self, offset: usize, endian: Endian) -> Option<u16> {
        let bytes: [u8; 2] = self.read_slice_at(offset, 2)?.try_into().ok()?;
        Some(match endian {
            Endian::Little => u16::from_le_bytes(bytes),
            Endian::Big => u16::from_be_bytes(bytes),
        })
    }

    #[inline(always)]
    fn read_u32_at(&self, offset: usize, endian: Endian) -> Option<u32> {
        let bytes: [u8; 4] = self.read_slice_at(offset, 4)?.try_into().ok()?;
        Some(match endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    #[inline(always)]
    fn read_u64_at(&self, offset: usize, endian: Endian) -> Option<u64> {
        let bytes: [u8; 8] = self.read_slice_at(offset, 8)?.try_into().ok()?;
        Some(match endian {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        })
    }

    #[inline(always)]
    fn read_u16_le_at(&self, offset: usize) -> Option<u16> {
        self.read_u16_at(offset, Endian::Little)
    }

    #[inline(always)]
    fn read_u32_le_at(&self, offset: usize) -> Option<u32> {
        self.read_u32_at(offset, Endian::Little)
    }

    #[inline(always)]
    fn read_u64_le_at(&self, offset: usize) -> Option<u64> {
        self.read_u64_at(offset, Endian::Little)
    }

    #[inline(always)]
    fn read_u16_be_at(&self, offset: usize) -> Option<u16> {
        self.read_u16_at(offset, Endian::Big)
    }

    #[inline(always)]
    fn read_u32_be_at(&self, offset: usize) -> Option<u32> {
        self.read_u32_at(offset, Endian::Big)
    }

    #[inline(always)]
    fn read_u64_be_at(&self, offset: usize) -> Option<u64> {
        self.read_u64_at(offset, Endian::Big)
    }

    /// NUL-terminated string, bounded by `max_len` and the end of the buffer.
    fn read_cstring_at(&self, offset: usize, max_len: usize) -> Option<String>;

    /// Fixed-width, NUL-padded name field (section and segment names).
    fn read_fixed_str_at(&self, offset: usize, len: usize) -> Option<String> {
        let slice = self.read_slice_at(offset, len)?;
        let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        Some(String::from_utf8_lossy(&slice[..end]).into_owned())
    }
}

impl ReadExt for [u8] {
    #[inline(always)]
    fn read_slice_at(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.get(offset..end)
    }

    fn read_cstring_at(&self, offset: usize, max_len: usize) -> Option<String> {
        if offset >= self.len() {
            return None;
        }
        let end = offset.saturating_add(max_len).min(self.len());
        let slice = &self[offset..end];
        let len = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        Some(String::from_utf8_lossy(&slice[..len]).into_owned())
    }
}

/// Widen a file-supplied value to an index, saturating on narrow targets.
#[inline(always)]
pub fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Number of bytes of `[offset, offset + size)` actually present in a buffer of `data_len` bytes.
#[inline]
pub fn clamp_span(data_len: usize, offset: u64, size: u64) -> u64 {
    (data_len as u64).saturating_sub(offset).min(size)
}

/// Render a four-character code, escaping anything that is not printable ASCII.
pub fn fourcc(bytes: &[u8]) -> String {
    if !bytes.is_empty() && bytes.iter().all(|b| (0x20..0x7F).contains(b)) {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        format!("0x{}", hex::encode_upper(bytes))
    }
}

/// Comma-joined names of the known flags set in `flags`.
///
/// Unknown bits have no name and are left out.
pub fn flag_names<F: Flags>(flags: &F) -> String {
    flags
        .iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name from a lookup table, or the raw value in hex.
pub fn name_or_hex<T>(name: Option<&str>, value: T) -> String
where
    T: std::fmt::LowerHex,
{
    match name {
        Some(n) => n.to_string(),
        None => format!("{:#x}", value),
    }
}
