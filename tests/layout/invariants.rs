use crate::common::*;
use binlayout::{check_invariants, ParsedFile, Region};

fn fixtures() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("pe", pe32()),
        ("elf", elf64()),
        ("elf32be", elf32_be()),
        ("pe-short-optional", pe32_short_optional(0x40)),
        ("macho", macho64(0x0100_000C)),
        ("fat", fat(&[0x0100_000C, 0x0100_0007], &[0x1000, 0x2000])),
        ("png", png()),
        ("jpeg", jpeg()),
        ("mp4", mp4()),
    ]
}

fn assert_sorted(parsed: &ParsedFile) {
    let offsets: Vec<_> = parsed.regions.iter().map(|r| r.offset).collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted, "{}", parsed.name);
}

fn all_colored(root: &Region) -> bool {
    let mut stack = vec![root];
    while let Some(region) = stack.pop() {
        if region.color.is_empty() {
            return false;
        }
        stack.extend(region.children.iter());
    }
    true
}

#[test]
fn well_formed_fixtures_hold_every_invariant() {
    for (name, data) in fixtures() {
        let parsed = parse_bytes(data, name);
        assert!(parsed.is_valid, "{}: {:?}", name, parsed.error);
        assert!(check_invariants(&parsed).is_empty(), "{}", name);
        assert_sorted(&parsed);
        assert!(parsed.regions.iter().all(all_colored), "{}", name);
    }
}

#[test]
fn truncated_fixtures_stay_in_bounds() {
    for (name, data) in fixtures() {
        for cut in [1, 7, 16, 33, 64, 200, data.len() / 2, data.len() - 1] {
            if cut >= data.len() {
                continue;
            }
            let parsed = parse_bytes(data[..cut].to_vec(), name);
            assert!(
                check_invariants(&parsed).is_empty(),
                "{} cut at {}",
                name,
                cut
            );
            if !parsed.is_valid {
                assert!(parsed.error.is_some());
            }
        }
    }
}

#[test]
fn bit_flipped_fixtures_never_panic() {
    for (name, data) in fixtures() {
        for at in (0..data.len()).step_by(7) {
            let mut mutated = data.clone();
            mutated[at] ^= 0xFF;
            let parsed = parse_bytes(mutated, name);
            assert!(check_invariants(&parsed).is_empty(), "{} flip at {}", name, at);
        }
    }
}

#[test]
fn json_output_has_the_documented_shape() {
    let parsed = parse_bytes(pe32(), "tiny.exe");
    let value: serde_json::Value = serde_json::from_str(&parsed.to_json().unwrap()).unwrap();
    assert_eq!(value["name"], "tiny.exe");
    assert_eq!(value["is_valid"], true);
    assert_eq!(value["format"], "Pe");
    assert!(value["regions"][0]["offset"].is_u64());
    assert!(value.get("data").is_none());
}
