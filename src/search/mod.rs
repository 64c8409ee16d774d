//! Byte, text and regex search over a parsed file's raw buffer.
//!
//! Matches come back ascending by offset, annotated with a virtual address
//! when the file carries a section table, and capped at [`MAX_RESULTS`].
//! Long scans poll a [`CancelToken`] and an optional deadline so an
//! interactive caller can abandon them.

use crate::core::{ParsedFile, SectionMetadata};
use crate::error::SearchError;
use crate::mapper::to_virtual_address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Hard cap on results returned by one search.
pub const MAX_RESULTS: usize = 2000;
/// Largest buffer a regex search will run over.
pub const REGEX_MAX_BUFFER: u64 = 50 * 1024 * 1024;
/// Bytes scanned between cancellation checks.
pub const DEFAULT_CHECK_INTERVAL: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Hex byte string such as `4D 5A 90 00`
    Hex,
    /// One byte per character (Latin-1)
    Ascii,
    /// UTF-16LE
    Unicode,
}

impl SearchMode {
    pub fn name(self) -> &'static str {
        match self {
            SearchMode::Hex => "hex",
            SearchMode::Ascii => "ascii",
            SearchMode::Unicode => "unicode",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(SearchMode::Hex),
            "ascii" | "text" => Ok(SearchMode::Ascii),
            "unicode" | "utf16" | "utf-16" => Ok(SearchMode::Unicode),
            other => Err(format!("unknown search mode '{}'", other)),
        }
    }
}

/// One match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub offset: u64,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_address: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_text: Option<String>,
}

/// Cloneable cancellation flag shared between a caller and a running scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Search limits and cancellation hooks.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results: usize,
    /// Bytes scanned between cancellation checks. Regex scans start with a
    /// window of this size and double it while no match turns up.
    pub check_interval: usize,
    /// Wall-clock budget for the whole scan.
    pub deadline: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: MAX_RESULTS,
            check_interval: DEFAULT_CHECK_INTERVAL,
            deadline: None,
            cancel: None,
        }
    }
}

impl SearchOptions {
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..Self::default()
        }
    }
}

/// Polled from scan loops; fails once the caller cancels or time runs out.
struct ScanBudget<'a> {
    start: Instant,
    deadline: Option<Duration>,
    cancel: Option<&'a CancelToken>,
}

impl<'a> ScanBudget<'a> {
    fn new(options: &'a SearchOptions) -> Self {
        Self {
            start: Instant::now(),
            deadline: options.deadline,
            cancel: options.cancel.as_ref(),
        }
    }

    fn check(&self) -> Result<(), SearchError> {
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            debug!(elapsed_ms = self.start.elapsed().as_millis() as u64, "search cancelled");
            return Err(SearchError::Cancelled);
        }
        if let Some(limit) = self.deadline {
            if self.start.elapsed() >= limit {
                debug!(limit_ms = limit.as_millis() as u64, "search timed out");
                return Err(SearchError::TimedOut);
            }
        }
        Ok(())
    }
}

/// Search a parsed file with default limits.
pub fn search(
    file: &ParsedFile,
    query: &str,
    mode: SearchMode,
    use_regex: bool,
) -> Result<Vec<SearchResult>, SearchError> {
    search_with_options(file, query, mode, use_regex, &SearchOptions::default())
}

pub fn search_with_options(
    file: &ParsedFile,
    query: &str,
    mode: SearchMode,
    use_regex: bool,
    options: &SearchOptions,
) -> Result<Vec<SearchResult>, SearchError> {
    let sections: &[SectionMetadata] = if file.format.is_executable() {
        &file.sections
    } else {
        &[]
    };
    search_bytes(file.data(), sections, query, mode, use_regex, options)
}

/// Search a raw buffer. `sections` may be empty, in which case no match
/// carries a virtual address.
///
/// The regex flag only applies to ASCII mode: hex queries are always
/// literal, and unicode + regex is rejected.
pub fn search_bytes(
    data: &[u8],
    sections: &[SectionMetadata],
    query: &str,
    mode: SearchMode,
    use_regex: bool,
    options: &SearchOptions,
) -> Result<Vec<SearchResult>, SearchError> {
    let budget = ScanBudget::new(options);
    let mut results = match (mode, use_regex) {
        (SearchMode::Unicode, true) => return Err(SearchError::UnicodeRegexUnsupported),
        (SearchMode::Ascii, true) => regex_scan(data, query, options, &budget)?,
        (SearchMode::Hex, _) => {
            let needle = parse_hex_query(query)?;
            literal_scan(data, &needle, None, options, &budget)?
        }
        (SearchMode::Ascii, false) => {
            let needle = encode_latin1(query)?;
            literal_scan(data, &needle, Some(query), options, &budget)?
        }
        (SearchMode::Unicode, false) => {
            let needle = encode_utf16le(query)?;
            literal_scan(data, &needle, Some(query), options, &budget)?
        }
    };

    if !sections.is_empty() {
        for result in &mut results {
            result.virtual_address = to_virtual_address(result.offset, sections);
        }
    }
    debug!(%mode, use_regex, matches = results.len(), "search finished");
    Ok(results)
}

/// Strip whitespace and `0x` prefixes, then decode pairs of hex digits.
pub fn parse_hex_query(query: &str) -> Result<Vec<u8>, SearchError> {
    let compact: String = query.split_whitespace().collect();
    let digits = compact.replace("0x", "").replace("0X", "");
    if digits.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    hex::decode(&digits).map_err(|e| SearchError::InvalidHex(format!("{} ({})", query.trim(), e)))
}

/// One byte per character; anything above U+00FF has no single-byte form.
pub fn encode_latin1(query: &str) -> Result<Vec<u8>, SearchError> {
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    query
        .chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| SearchError::UnrepresentableChar(c)))
        .collect()
}

pub fn encode_utf16le(query: &str) -> Result<Vec<u8>, SearchError> {
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    Ok(query.encode_utf16().flat_map(u16::to_le_bytes).collect())
}

fn latin1_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Every (possibly overlapping) occurrence of `needle`, found by jumping
/// between occurrences of its first byte.
fn literal_scan(
    data: &[u8],
    needle: &[u8],
    text: Option<&str>,
    options: &SearchOptions,
    budget: &ScanBudget<'_>,
) -> Result<Vec<SearchResult>, SearchError> {
    let mut results = Vec::new();
    let Some(&first) = needle.first() else {
        return Err(SearchError::EmptyQuery);
    };
    if needle.len() > data.len() || options.max_results == 0 {
        return Ok(results);
    }

    let last_start = data.len() - needle.len();
    let step = options.check_interval.max(1);
    let mut block = 0;
    while block <= last_start {
        budget.check()?;
        let block_end = block.saturating_add(step).min(last_start + 1);
        for candidate in memchr::memchr_iter(first, &data[block..block_end]) {
            let at = block + candidate;
            if &data[at..at + needle.len()] == needle {
                results.push(SearchResult {
                    offset: at as u64,
                    size: needle.len() as u64,
                    virtual_address: None,
                    matched_text: text.map(str::to_string),
                });
                if results.len() >= options.max_results {
                    debug!(cap = options.max_results, "result cap reached");
                    return Ok(results);
                }
            }
        }
        block = block_end;
    }
    Ok(results)
}

/// Rewrite a pattern so characters U+0080..=U+00FF match the single byte
/// they name rather than their UTF-8 encoding.
fn latin1_pattern(query: &str) -> Result<String, SearchError> {
    let mut pattern = String::with_capacity(query.len());
    for c in query.chars() {
        match u32::from(c) {
            0..=0x7F => pattern.push(c),
            0x80..=0xFF => pattern.push_str(&format!("\\x{:02X}", u32::from(c))),
            _ => return Err(SearchError::UnrepresentableChar(c)),
        }
    }
    Ok(pattern)
}

fn regex_scan(
    data: &[u8],
    query: &str,
    options: &SearchOptions,
    budget: &ScanBudget<'_>,
) -> Result<Vec<SearchResult>, SearchError> {
    let size = data.len() as u64;
    if size > REGEX_MAX_BUFFER {
        return Err(SearchError::RegexTooLarge {
            size,
            limit: REGEX_MAX_BUFFER,
        });
    }
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let re = regex::bytes::RegexBuilder::new(&latin1_pattern(query)?)
        .unicode(false)
        .build()
        .map_err(|e| SearchError::InvalidRegex(e.to_string()))?;

    budget.check()?;
    let mut results = Vec::new();
    let step = options.check_interval.max(1);
    let mut window = step;
    let mut pos = 0;
    let mut next_check = step;

    // Search a doubling prefix window, polling the budget between windows.
    // The full haystack is searched only once the window holds a match.
    while pos < data.len() {
        if results.len() >= options.max_results {
            debug!(cap = options.max_results, "result cap reached");
            break;
        }
        let end = pos.saturating_add(window).min(data.len());
        if end < data.len() && re.find_at(&data[..end], pos).is_none() {
            budget.check()?;
            next_check = end.saturating_add(step);
            window = window.saturating_mul(2);
            continue;
        }
        let Some(m) = re.find_at(data, pos) else {
            break;
        };
        window = step;
        if m.is_empty() {
            pos = m.end() + 1;
        } else {
            results.push(SearchResult {
                offset: m.start() as u64,
                size: m.len() as u64,
                virtual_address: None,
                matched_text: Some(latin1_text(m.as_bytes())),
            });
            pos = m.end();
        }
        if pos >= next_check {
            budget.check()?;
            next_check = pos.saturating_add(step);
        }
    }
    Ok(results)
}
