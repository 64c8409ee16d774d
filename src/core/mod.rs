//! Core data types shared by every parser.
//!
//! Parsers emit [`Region`] trees; the detector wraps them into a
//! [`ParsedFile`] and paints them with the active [`Palette`].

pub mod palette;
pub mod parsed;
pub mod region;
pub mod validate;

pub use palette::Palette;
pub use parsed::{FileFormat, ParsedFile, SectionMetadata};
pub use region::{Details, Region, RegionKind, RegionValue};
pub use validate::{check_invariants, InvariantViolation};
