//! Structural invariant checks over a region forest.
//!
//! Every region must fit inside the file and inside its parent. Sibling
//! order and overlap are not checked; both are legitimate in the formats
//! we parse.

use crate::core::parsed::ParsedFile;
use crate::core::region::Region;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A region extends past the end of the file.
    OutOfBounds {
        path: String,
        end: u64,
        file_size: u64,
    },
    /// A child is not contained in its parent.
    EscapesParent {
        path: String,
        parent: (u64, u64),
        child: (u64, u64),
    },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds {
                path,
                end,
                file_size,
            } => write!(f, "{path}: ends at {end:#x}, file is {file_size:#x} bytes"),
            Self::EscapesParent {
                path,
                parent,
                child,
            } => write!(
                f,
                "{path}: [{:#x}, {:#x}) escapes parent [{:#x}, {:#x})",
                child.0, child.1, parent.0, parent.1
            ),
        }
    }
}

/// Walk the forest and collect every violation.
pub fn check_invariants(file: &ParsedFile) -> Vec<InvariantViolation> {
    check_regions(&file.regions, file.size)
}

pub fn check_regions(regions: &[Region], file_size: u64) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut stack: Vec<(&Region, Option<&Region>, String)> = regions
        .iter()
        .map(|r| (r, None, r.name.clone()))
        .collect();

    while let Some((region, parent, path)) = stack.pop() {
        if region.end() > file_size || region.offset.checked_add(region.size).is_none() {
            violations.push(InvariantViolation::OutOfBounds {
                path: path.clone(),
                end: region.end(),
                file_size,
            });
        }
        if let Some(parent) = parent {
            if !parent.contains(region) {
                violations.push(InvariantViolation::EscapesParent {
                    path: path.clone(),
                    parent: (parent.offset, parent.end()),
                    child: (region.offset, region.end()),
                });
            }
        }
        for child in &region.children {
            stack.push((child, Some(region), format!("{path} / {}", child.name)));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::region::RegionKind;

    #[test]
    fn test_clean_forest_has_no_violations() {
        let regions = vec![Region::new("A", 0, 8, RegionKind::Header)
            .with_children(vec![Region::field("B", 4, 4, 1u32)])];
        assert!(check_regions(&regions, 8).is_empty());
    }

    #[test]
    fn test_reports_out_of_bounds_and_escape() {
        let mut parent = Region::new("A", 0, 8, RegionKind::Header);
        // bypass push_child to build a deliberately broken tree
        parent.children.push(Region::field("B", 6, 4, 1u32));
        let violations = check_regions(&[parent], 9);

        assert_eq!(violations.len(), 2);
        assert!(violations
            .iter()
            .any(|v| matches!(v, InvariantViolation::OutOfBounds { end: 10, .. })));
        assert!(violations.iter().any(|v| matches!(
            v,
            InvariantViolation::EscapesParent { path, .. } if path == "A / B"
        )));
    }
}
