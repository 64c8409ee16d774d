#![no_main]
use binlayout::{check_invariants, detect, Palette};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let parsed = detect(Bytes::copy_from_slice(data), "<fuzz>", Palette::Dark);
    assert!(check_invariants(&parsed).is_empty());
});
