//! Overlay detection and analysis for PE and ELF files.
//!
//! Overlays are data appended after the official end of a binary file,
//! commonly used for self-extracting archives, installers, and digital signatures.

use crate::core::{Region, RegionKind};
use crate::entropy::describe_entropy;
use sha2::{Digest, Sha256};
use std::fmt;

/// Known overlay formats that can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayFormat {
    Zip,
    Cab,
    SevenZip,
    Rar,
    Nsis,
    InnoSetup,
    SquashFs,
    /// Authenticode WIN_CERTIFICATE or bare PKCS#7 SignedData
    Certificate,
}

impl fmt::Display for OverlayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zip => "ZIP archive",
            Self::Cab => "Microsoft Cabinet",
            Self::SevenZip => "7-Zip archive",
            Self::Rar => "RAR archive",
            Self::Nsis => "NSIS installer",
            Self::InnoSetup => "Inno Setup installer",
            Self::SquashFs => "SquashFS image",
            Self::Certificate => "Certificate (PKCS#7)",
        })
    }
}

const PKCS7_SIGNED_DATA_OID: [u8; 11] = [
    0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02,
];

/// Recognize the leading bytes of an overlay.
pub fn detect_overlay_format(data: &[u8]) -> Option<OverlayFormat> {
    if data.len() >= 4 {
        match &data[..4] {
            b"PK\x03\x04" | b"PK\x05\x06" | b"PK\x07\x08" => return Some(OverlayFormat::Zip),
            b"MSCF" => return Some(OverlayFormat::Cab),
            b"7z\xBC\xAF" => return Some(OverlayFormat::SevenZip),
            b"Rar!" => return Some(OverlayFormat::Rar),
            b"hsqs" | b"sqsh" => return Some(OverlayFormat::SquashFs),
            _ => {}
        }
    }

    if is_signature(data) {
        return Some(OverlayFormat::Certificate);
    }

    let head = &data[..data.len().min(0x1000)];
    if memchr::memmem::find(head, b"NullsoftInst").is_some()
        || memchr::memmem::find(head, b"NSIS").is_some()
    {
        return Some(OverlayFormat::Nsis);
    }
    if memchr::memmem::find(head, b"Inno Setup").is_some() || data.starts_with(b"zlb\x1A") {
        return Some(OverlayFormat::InnoSetup);
    }

    None
}

fn is_signature(data: &[u8]) -> bool {
    // WIN_CERTIFICATE: dwLength, wRevision = 0x0200, wCertificateType = PKCS_SIGNED_DATA
    if data.len() >= 8 {
        let length = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        let revision = u16::from_le_bytes([data[4], data[5]]);
        let cert_type = u16::from_le_bytes([data[6], data[7]]);
        if revision == 0x0200 && cert_type == 0x0002 && length >= 8 && length <= data.len() {
            return true;
        }
    }

    // DER SEQUENCE wrapping a SignedData content type
    if data.first() == Some(&0x30) {
        let head = &data[..data.len().min(64)];
        return memchr::memmem::find(head, &PKCS7_SIGNED_DATA_OID).is_some();
    }

    false
}

pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Build the "Overlay" region for bytes past the end of every top-level region.
///
/// Returns `None` when the known structures already reach the end of the file.
pub fn overlay_region(data: &[u8], regions: &[Region]) -> Option<Region> {
    let start = regions.iter().map(Region::end).max()?;
    let len = data.len() as u64;
    if start >= len {
        return None;
    }

    let bytes = &data[start as usize..];
    let mut region = Region::new("Overlay", start, len - start, RegionKind::Unclassified)
        .with_detail("Size", format!("{} bytes", bytes.len()))
        .with_detail("Entropy", describe_entropy(bytes))
        .with_detail("SHA-256", calculate_sha256(bytes));
    if let Some(format) = detect_overlay_format(bytes) {
        region.description = Some(format.to_string());
        region = region.with_detail("Format", format.to_string());
    }
    Some(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_format_detection() {
        assert_eq!(
            detect_overlay_format(b"PK\x03\x04some other data"),
            Some(OverlayFormat::Zip)
        );
        assert_eq!(
            detect_overlay_format(b"MSCFsome other data"),
            Some(OverlayFormat::Cab)
        );
        assert_eq!(
            detect_overlay_format(b"7z\xBC\xAF\x27\x1C"),
            Some(OverlayFormat::SevenZip)
        );
        assert_eq!(detect_overlay_format(b"Rar!\x1a\x07"), Some(OverlayFormat::Rar));
        assert_eq!(
            detect_overlay_format(b"\x00\x00Nullsoft\xEF\xBE\xAD\xDENullsoftInst"),
            Some(OverlayFormat::Nsis)
        );
        assert_eq!(detect_overlay_format(b"plain trailing text"), None);
    }

    #[test]
    fn test_win_certificate_detection() {
        let mut cert = vec![0x10, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00];
        cert.extend_from_slice(&[0u8; 8]);
        assert_eq!(detect_overlay_format(&cert), Some(OverlayFormat::Certificate));

        let mut der = vec![0x30, 0x82, 0x01, 0x00];
        der.extend_from_slice(&PKCS7_SIGNED_DATA_OID);
        assert_eq!(detect_overlay_format(&der), Some(OverlayFormat::Certificate));
    }

    #[test]
    fn test_sha256_calculation() {
        assert_eq!(
            calculate_sha256(b"test data"),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_overlay_region_past_last_structure() {
        let mut data = vec![0u8; 32];
        data.extend_from_slice(b"PK\x03\x04archive");
        let regions = vec![
            Region::new("Header", 0, 16, RegionKind::Header),
            Region::new("Body", 16, 16, RegionKind::Data),
        ];

        let overlay = overlay_region(&data, &regions).unwrap();
        assert_eq!(overlay.offset, 32);
        assert_eq!(overlay.size, 11);
        assert_eq!(overlay.details.get("Format"), Some("ZIP archive"));
        assert_eq!(overlay.details.get("SHA-256").map(str::len), Some(64));

        assert!(overlay_region(&data[..32], &regions).is_none());
        assert!(overlay_region(&data, &[]).is_none());
    }
}
