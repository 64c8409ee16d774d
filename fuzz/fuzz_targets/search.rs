#![no_main]
use binlayout::search::{search_bytes, SearchMode, SearchOptions};
use libfuzzer_sys::fuzz_target;

// First byte picks the mode, the next 16 bytes (lossily decoded) are the query.
fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let split = rest.len().min(16);
    let (query, haystack) = rest.split_at(split);
    let query = String::from_utf8_lossy(query);
    let mode = match selector % 3 {
        0 => SearchMode::Hex,
        1 => SearchMode::Ascii,
        _ => SearchMode::Unicode,
    };
    let regex = selector & 0x80 != 0;
    if let Ok(results) = search_bytes(haystack, &[], &query, mode, regex, &SearchOptions::default()) {
        for result in results {
            assert!(result.offset + result.size <= haystack.len() as u64);
        }
    }
});
