//! Cell-level coercion shared by the loader and the normalizer.

use chrono::NaiveDate;
use std::borrow::Cow;

const CURRENCY_SYMBOLS: [char; 7] = ['$', '€', '£', '¥', '₹', '₦', '¢'];

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse a sales amount: drop thousands separators, currency symbols and
/// whitespace, then require what remains to be a finite number.
/// "$1,234.50" → 1234.5 | " 610 " → 610.0 | "12abc" → None
pub fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let value: f64 = cleaned.parse().ok()?;
    value.is_finite().then_some(value)
}

/// Parse a date against each format in order; the first match wins.
pub fn parse_date<S: AsRef<str>>(s: &str, formats: &[S]) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt.as_ref()).ok())
}

/// Index of the first alias present in `headers`.
///
/// Priority follows the alias list, not header order.
pub fn resolve_column<S: AsRef<str>>(headers: &[&str], aliases: &[S]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        let alias = alias.as_ref();
        headers.iter().position(|h| h.trim() == alias)
    })
}

/// Decode an uploaded file. UTF-8 (BOM stripped) or, failing that, ISO-8859-1.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

pub fn join_aliases<S: AsRef<str>>(aliases: &[S]) -> String {
    aliases
        .iter()
        .map(|a| a.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
