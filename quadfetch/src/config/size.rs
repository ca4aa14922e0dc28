//! Byte sizes written the way people write them ("64MB", "512 k").

use thiserror::Error;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const GIB: usize = 1024 * MIB;

/// Units accepted after the number, longest spelling first.
const UNITS: &[(&str, usize)] = &[
    ("GB", GIB),
    ("G", GIB),
    ("MB", MIB),
    ("M", MIB),
    ("KB", KIB),
    ("K", KIB),
    ("B", 1),
    ("", 1),
];

/// A size string that could not be read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid size '{input}': {reason}")]
pub struct SizeParseError {
    input: String,
    reason: &'static str,
}

impl SizeParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Parse a size such as `"64MB"`, `"512 k"` or `"1048576"` into bytes.
///
/// Units are binary (`1K` is 1024 bytes) and case-insensitive.
///
/// ```
/// use quadfetch::config::parse_size;
///
/// assert_eq!(parse_size("64MB").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(parse_size("512 k").unwrap(), 512 * 1024);
/// assert_eq!(parse_size("300").unwrap(), 300);
/// ```
pub fn parse_size(input: &str) -> Result<usize, SizeParseError> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(SizeParseError::new(input, "expected a number"));
    }

    let unit = unit.trim().to_ascii_uppercase();
    let multiplier = UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, multiplier)| *multiplier)
        .ok_or_else(|| SizeParseError::new(input, "unit must be B, K, KB, M, MB, G or GB"))?;

    digits
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| SizeParseError::new(input, "value is too large"))
}

/// Render `bytes` with the largest unit that divides it exactly.
///
/// ```
/// use quadfetch::config::format_size;
///
/// assert_eq!(format_size(64 * 1024 * 1024), "64MB");
/// assert_eq!(format_size(1536), "1536");
/// ```
pub fn format_size(bytes: usize) -> String {
    [("GB", GIB), ("MB", MIB), ("KB", KIB)]
        .iter()
        .find(|(_, unit)| bytes >= *unit && bytes % unit == 0)
        .map(|(name, unit)| format!("{}{}", bytes / unit, name))
        .unwrap_or_else(|| bytes.to_string())
}
