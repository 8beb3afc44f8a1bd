//! Hexadecimal helpers used by the TPM reader and the digest engine.
//!
//! Rendering is always uppercase. Parsing accepts either case and ignores
//! surrounding whitespace as well as embedded spaces and line breaks.
//!
//! # Example
//!
//! ```rust
//! use fingerprint::hex_format::{bytes_to_hex, hex_to_bytes, is_valid_hex};
//!
//! assert_eq!(bytes_to_hex(&[0x00, 0xc1]), "00C1");
//! assert_eq!(hex_to_bytes("00 c1"), None); // odd raw length
//! assert_eq!(hex_to_bytes("00c1"), Some(vec![0x00, 0xc1]));
//! assert!(!is_valid_hex("ZZ"));
//! ```

use regex::Regex;
use std::sync::OnceLock;

use crate::fingerprint::LINE_TERMINATOR;

static HEX_PATTERN: OnceLock<Regex> = OnceLock::new();

fn hex_pattern() -> &'static Regex {
    HEX_PATTERN.get_or_init(|| Regex::new(r"^[A-Fa-f0-9]*$").expect("hex pattern is valid"))
}

/// Strip surrounding whitespace, then every carriage return, line feed and space.
pub fn normalize(hex: &str) -> String {
    hex.trim()
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | ' '))
        .collect()
}

/// Check whether `hex` is a valid hex string.
///
/// Character content is checked on the normalized text, but the even-length
/// check counts the characters of the raw input. `"A1 B2"` is therefore
/// rejected (five raw characters) while `"A1B2 "` is accepted.
pub fn is_valid_hex(hex: &str) -> bool {
    hex_pattern().is_match(&normalize(hex)) && hex.chars().count() % 2 == 0
}

/// Render bytes as contiguous uppercase hex digits.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes).trim_end().to_string()
}

/// Render bytes as uppercase hex digit pairs separated by single spaces.
pub fn bytes_to_hex_spaced(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        out.push_str(&format!("{:02X} ", byte));
    }
    out.trim_end().to_string()
}

/// Decode a hex string into bytes.
///
/// Returns `None` when the input fails [`is_valid_hex`], or when the
/// normalized text cannot be split into whole digit pairs.
pub fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    if !is_valid_hex(hex) {
        return None;
    }
    hex::decode(normalize(hex)).ok()
}

/// Re-flow a hex string with a CRLF break after every `group_bytes` bytes.
///
/// No break follows the final group. A `group_bytes` of zero disables
/// grouping. Returns `None` for invalid input.
pub fn format_breaks(hex: &str, group_bytes: usize) -> Option<String> {
    if !is_valid_hex(hex) {
        return None;
    }

    let normalized = normalize(hex);
    let group_chars = group_bytes * 2;
    if group_chars == 0 {
        return Some(normalized);
    }

    let groups: Vec<&str> = normalized
        .as_bytes()
        .chunks(group_chars)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();

    Some(groups.join(LINE_TERMINATOR))
}
