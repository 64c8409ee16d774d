//! Shannon entropy over byte slices.
//!
//! Used to annotate section data and overlays: values close to 8.0 usually
//! mean compressed or encrypted content.

/// Calculates the Shannon entropy of a byte slice.
///
/// Returns a value between 0.0 and 8.0, where:
/// - 0.0 represents no randomness (e.g., all bytes are the same)
/// - 8.0 represents maximum randomness (uniform distribution)
#[inline]
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut histogram = [0usize; 256];
    for &byte in data {
        histogram[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;
    for &count in &histogram {
        if count == 0 {
            continue;
        }
        let p = (count as f64) / len;
        entropy -= p * p.log2();
    }

    entropy
}

/// Coarse label for an entropy value.
pub fn entropy_label(entropy: f64) -> &'static str {
    if entropy >= 7.2 {
        "high (compressed or encrypted)"
    } else if entropy >= 5.0 {
        "medium"
    } else if entropy > 0.0 {
        "low"
    } else {
        "uniform"
    }
}

/// Entropy formatted for a details table, e.g. `"6.21 (medium)"`.
pub fn describe_entropy(data: &[u8]) -> String {
    let e = shannon_entropy(data);
    format!("{:.2} ({})", e, entropy_label(e))
}
