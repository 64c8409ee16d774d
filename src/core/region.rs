//! Region types: the normalized tree every format parser emits into.
//!
//! A [`Region`] describes one structurally meaningful byte range of a file.
//! Regions nest; a child's range always lies within its parent's range,
//! which [`Region::push_child`] enforces by clamping. Siblings are kept in
//! ascending offset order but may overlap (an ELF segment that includes its
//! own program header table, for example).

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

/// Structural classification of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RegionKind {
    /// A fixed header block (DOS header, ELF header, Mach-O header, ...).
    Header,
    /// One entry of a section/segment/architecture table.
    TableEntry,
    /// File-backed section or segment contents.
    Data,
    /// A self-describing record: load command, box, chunk or marker.
    Record,
    /// A single scalar field.
    Field,
    /// Bytes with no structural interpretation (stubs, overlays, padding).
    Unclassified,
}

/// Interpreted contents of a scalar field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionValue {
    Int(u64),
    Text(String),
}

impl RegionValue {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for RegionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{:#x}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

macro_rules! impl_int_value {
    ($($t:ty),*) => {
        $(impl From<$t> for RegionValue {
            fn from(v: $t) -> Self {
                Self::Int(v as u64)
            }
        })*
    };
}

impl_int_value!(u8, u16, u32, u64);

impl From<String> for RegionValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for RegionValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Ordered label → interpreted value mapping.
///
/// Serialized as a JSON object whose keys keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Details(Vec<(String, String)>);

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair. An existing label is overwritten in place.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == label) {
            Some(slot) => slot.1 = value,
            None => self.0.push((label, value)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Details {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// One node of the region forest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub name: String,
    pub offset: u64,
    pub size: u64,
    pub kind: RegionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<RegionValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Details::is_empty")]
    pub details: Details,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Region>,
    /// Display color, assigned by the palette once parsing finishes.
    pub color: &'static str,
}

impl Region {
    pub fn new(name: impl Into<String>, offset: u64, size: u64, kind: RegionKind) -> Self {
        Self {
            name: name.into(),
            offset,
            size,
            kind,
            value: None,
            description: None,
            details: Details::new(),
            children: Vec::new(),
            color: "",
        }
    }

    /// A scalar field region carrying its decoded value.
    pub fn field(
        name: impl Into<String>,
        offset: u64,
        size: u64,
        value: impl Into<RegionValue>,
    ) -> Self {
        Self::new(name, offset, size, RegionKind::Field).with_value(value)
    }

    pub fn with_value(mut self, value: impl Into<RegionValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_detail(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(label, value);
        self
    }

    pub fn with_children(mut self, children: Vec<Region>) -> Self {
        for child in children {
            self.push_child(child);
        }
        self
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.offset && offset < self.end()
    }

    pub fn contains(&self, other: &Region) -> bool {
        other.offset >= self.offset && other.end() <= self.end()
    }

    /// Append a child, clamping it (and its own subtree) into this region's range.
    pub fn push_child(&mut self, mut child: Region) {
        clamp_tree(&mut child, self.offset, self.end());
        self.children.push(child);
    }

    /// Number of regions in this subtree, including `self`.
    pub fn count(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(region) = stack.pop() {
            total += 1;
            stack.extend(region.children.iter());
        }
        total
    }
}

/// Clamp `root` into `[lo, hi)` and every descendant into its clamped parent.
pub(crate) fn clamp_tree(root: &mut Region, lo: u64, hi: u64) {
    let mut stack: Vec<(&mut Region, u64, u64)> = vec![(root, lo, hi)];
    while let Some((region, lo, hi)) = stack.pop() {
        let start = region.offset.clamp(lo, hi);
        let end = region.end().clamp(start, hi);
        region.offset = start;
        region.size = end - start;
        let children = &mut region.children;
        stack.extend(children.iter_mut().map(|c| (c, start, end)));
    }
}
