use crate::common::*;
use binlayout::io::error::IoError;
use binlayout::io::{load_file, parse_path, IOLimits};
use binlayout::{FileFormat, ParseOptions};
use std::io::Write;
use tempfile::NamedTempFile;

fn temp_with(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn parse_path_round_trips_a_fixture() {
    let file = temp_with(&macho64(0x0100_000C));
    let parsed = parse_path(file.path(), &IOLimits::default(), &ParseOptions::default()).unwrap();
    assert_eq!(parsed.format, FileFormat::MachO);
    assert_eq!(parsed.size, 0x500);
    assert_eq!(parsed.data(), &macho64(0x0100_000C)[..]);
}

#[test]
fn size_limit_is_enforced_before_parsing() {
    let file = temp_with(&pe32());
    let limits = IOLimits { max_file_size: 0x100 };
    assert!(matches!(
        load_file(file.path(), &limits),
        Err(IoError::FileTooLarge { limit: 0x100, found: 0x600 })
    ));
}
