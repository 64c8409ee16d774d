//! binlayout: structural region maps for executables and media containers.
//!
//! [`detect`] sniffs a buffer's signature and runs the matching parser,
//! producing a [`ParsedFile`] whose region forest describes every byte range
//! the format declares. [`search`](search::search) scans the same buffer and
//! maps hits back to virtual addresses through the file's section table.
//!
//! Parsing is total: malformed input yields a `ParsedFile` with
//! `is_valid == false` and an error message rather than a panic or `Err`.

/// Core data types module
pub mod core;
pub mod detect;
pub mod entropy;
pub mod error;
pub mod formats;
pub mod io;
pub mod logging;
pub mod mapper;
pub mod search;

pub use crate::core::{
    check_invariants, FileFormat, InvariantViolation, Palette, ParsedFile, Region, RegionKind,
    RegionValue, SectionMetadata,
};
pub use detect::{detect, detect_many, detect_with_options};
pub use error::{ParseError, SearchError};
pub use formats::{MachOOptions, ParseOptions};
pub use mapper::{to_file_offset, to_virtual_address};
pub use search::{search, CancelToken, SearchMode, SearchOptions, SearchResult};
