use crate::common::*;
use binlayout::search::{search_with_options, REGEX_MAX_BUFFER};
use binlayout::{search, CancelToken, SearchError, SearchMode, SearchOptions};

#[test]
fn hex_mz_is_found_at_offset_zero() {
    let parsed = parse_bytes(pe32(), "tiny.exe");
    let results = search(&parsed, "4D5A", SearchMode::Hex, false).unwrap();
    assert_eq!(results[0].offset, 0);
    assert_eq!(results[0].size, 2);
    // header bytes map 1:1
    assert_eq!(results[0].virtual_address, Some(0));

    let spaced = search(&parsed, "0x4D 0x5A", SearchMode::Hex, false).unwrap();
    assert_eq!(spaced, results);
}

#[test]
fn unique_ascii_literal_yields_one_result() {
    let parsed = parse_bytes(pe32(), "tiny.exe");
    let query = "Hello, layout!";
    let results = search(&parsed, query, SearchMode::Ascii, false).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].size, query.len() as u64);
    assert_eq!(results[0].offset, 0x210);
    assert_eq!(results[0].virtual_address, Some(0x1010));
    assert_eq!(results[0].matched_text.as_deref(), Some(query));
}

#[test]
fn zero_matches_is_not_an_error() {
    let parsed = parse_bytes(elf64(), "tiny");
    let results = search(&parsed, "no such text", SearchMode::Ascii, false).unwrap();
    assert!(results.is_empty());
}

#[test]
fn regex_over_large_buffer_is_refused() {
    let parsed = parse_bytes(vec![0u8; REGEX_MAX_BUFFER as usize + 16], "huge.bin");
    for query in ["a", ".*", "[", "\\x00+"] {
        let err = search(&parsed, query, SearchMode::Ascii, true).unwrap_err();
        assert!(matches!(err, SearchError::RegexTooLarge { .. }), "{}", query);
        assert!(err.is_input_error());
    }
}

#[test]
fn regex_reports_offsets_in_bytes() {
    let parsed = parse_bytes(elf64(), "tiny");
    let results = search(&parsed, r"\.[a-z]+", SearchMode::Ascii, true).unwrap();
    let texts: Vec<_> = results
        .iter()
        .filter_map(|r| r.matched_text.as_deref())
        .collect();
    assert_eq!(texts, vec![".text", ".shstrtab"]);
    assert_eq!(results[0].offset, 0x121);
}

#[test]
fn malformed_queries_are_input_errors() {
    let parsed = parse_bytes(png(), "tiny.png");
    let cases = [
        ("4D5", SearchMode::Hex, false),
        ("GG", SearchMode::Hex, false),
        ("", SearchMode::Ascii, false),
        ("IEND", SearchMode::Unicode, true),
        ("(", SearchMode::Ascii, true),
    ];
    for (query, mode, regex) in cases {
        let err = search(&parsed, query, mode, regex).unwrap_err();
        assert!(err.is_input_error(), "{:?}", err);
    }
}

#[test]
fn unicode_query_matches_utf16le() {
    let mut data = png();
    data.extend("IDAT".encode_utf16().flat_map(u16::to_le_bytes));
    let parsed = parse_bytes(data, "wide.png");
    let results = search(&parsed, "IDAT", SearchMode::Unicode, false).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].size, 8);
}

#[test]
fn cancelled_search_returns_cancelled() {
    let parsed = parse_bytes(pe32(), "tiny.exe");
    let token = CancelToken::new();
    let options = SearchOptions::with_cancel(token.clone());
    token.cancel();
    let err = search_with_options(&parsed, "MZ", SearchMode::Ascii, false, &options).unwrap_err();
    assert_eq!(err, SearchError::Cancelled);
}
