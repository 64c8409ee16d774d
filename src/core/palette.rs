//! Display palettes.
//!
//! Colors are purely cosmetic. They are assigned after a parse completes so
//! that format parsers never need to know which theme is active.

use crate::core::region::{Region, RegionKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Palette {
    #[default]
    Dark,
    Light,
}

const DARK: [&str; 6] = [
    "#569CD6", // header
    "#C586C0", // table entry
    "#4EC9B0", // data
    "#DCDCAA", // record
    "#9CDCFE", // field
    "#808080", // unclassified
];

const LIGHT: [&str; 6] = [
    "#0451A5", "#AF00DB", "#267F99", "#795E26", "#001080", "#6A6A6A",
];

impl Palette {
    pub fn color_for(self, kind: RegionKind) -> &'static str {
        let table = match self {
            Palette::Dark => &DARK,
            Palette::Light => &LIGHT,
        };
        let idx = match kind {
            RegionKind::Header => 0,
            RegionKind::TableEntry => 1,
            RegionKind::Data => 2,
            RegionKind::Record => 3,
            RegionKind::Field => 4,
            RegionKind::Unclassified => 5,
        };
        table[idx]
    }

    /// Assign a color to every region in the forest.
    pub fn paint(self, regions: &mut [Region]) {
        let mut stack: Vec<&mut Region> = regions.iter_mut().collect();
        while let Some(region) = stack.pop() {
            region.color = self.color_for(region.kind);
            stack.extend(region.children.iter_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_reaches_every_level() {
        let mut regions = vec![Region::new("Header", 0, 16, RegionKind::Header)
            .with_children(vec![Region::field("Magic", 0, 4, 0u32)])];
        Palette::Light.paint(&mut regions);
        assert_eq!(regions[0].color, "#0451A5");
        assert_eq!(regions[0].children[0].color, "#001080");
    }

    #[test]
    fn test_palettes_differ() {
        for kind in [
            RegionKind::Header,
            RegionKind::TableEntry,
            RegionKind::Data,
            RegionKind::Record,
            RegionKind::Field,
            RegionKind::Unclassified,
        ] {
            assert_ne!(Palette::Dark.color_for(kind), Palette::Light.color_for(kind));
        }
    }
}
