//! Conversions from attribute text to numbers.
//!
//! None of these fail: unreadable input is logged and replaced by a fallback.

use crate::defaults::FALLBACK_COLOR;

/// Parse a comma-separated list into exactly `count` floats.
///
/// Empty parts read as zero, short lists are padded with zeros and long lists
/// are truncated. A part that is not a finite number turns the whole result
/// into zeros.
pub fn parse_float_array(text: &str, count: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(count);

    for part in text.split(',').take(count) {
        let part = part.trim();
        if part.is_empty() {
            values.push(0.0);
            continue;
        }
        match part.parse::<f32>() {
            Ok(value) if value.is_finite() => values.push(value),
            _ => {
                log::warn!("Invalid number '{}' in '{}', using zeros", part, text);
                return vec![0.0; count];
            }
        }
    }

    values.resize(count, 0.0);
    values
}

/// Parse `0xRRGGBB`, `#RRGGBB`, `RRGGBB` or the 3-digit shorthand of any of them.
pub fn parse_hex_color(text: &str) -> u32 {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .or_else(|| trimmed.strip_prefix('#'))
        .unwrap_or(trimmed);

    let expanded: String = if digits.len() == 3 {
        digits.chars().flat_map(|c| [c, c]).collect()
    } else {
        digits.to_string()
    };

    if expanded.is_empty() || !expanded.chars().all(|c| c.is_ascii_hexdigit()) {
        log::warn!("Invalid color '{}', using {:#08x}", text, FALLBACK_COLOR);
        return FALLBACK_COLOR;
    }

    u32::from_str_radix(&expanded, 16).unwrap_or_else(|e| {
        log::warn!("Invalid color '{}' ({}), using {:#08x}", text, e, FALLBACK_COLOR);
        FALLBACK_COLOR
    })
}

/// A finite number, or `None`.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A number truncated toward zero, so `"500.7"` reads as `500`.
pub fn parse_integer(text: &str) -> Option<i64> {
    parse_number(text).map(|v| v.trunc() as i64)
}

pub fn parse_flag(text: &str) -> bool {
    text.trim() == "true"
}
