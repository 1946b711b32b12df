// Utility helpers for parsing and number formatting.
//
// This module centralizes the "dirty" CSV/number/date handling so the
// rest of the code can assume clean, typed values.
use chrono::{NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Timestamp layout of the `InvoiceDate` column, e.g. `12/1/2010 8:26`.
pub const INVOICE_DATE_FORMAT: &str = "%m/%d/%Y %H:%M";

/// Decode ISO-8859-1 bytes. Every byte maps to the code point of the same
/// value, so this never fails.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// A field counts as missing when it is absent, blank, or the textual
/// not-a-number marker that spreadsheet exports write for empty numbers.
pub fn is_missing(s: Option<&str>) -> bool {
    match s.map(str::trim) {
        None => true,
        Some(s) => s.is_empty() || s.eq_ignore_ascii_case("nan"),
    }
}

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports (commas, spaces).
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters other than an
///   exponent marker.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed, including
///   non-finite results.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_i64_safe(s: Option<&str>) -> Option<i64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i64>().ok()
}

/// Coerce a decimal-looking identifier (`17850` or `17850.0`) to an integer.
/// Values with a fractional part are rejected rather than truncated.
pub fn parse_integral(s: Option<&str>) -> Option<i64> {
    if let Some(v) = parse_i64_safe(s) {
        return Some(v);
    }
    let v = parse_f64_safe(s)?;
    if v.fract() != 0.0 || v < i64::MIN as f64 || v > i64::MAX as f64 {
        return None;
    }
    Some(v as i64)
}

/// Parse an invoice timestamp and drop the time of day.
pub fn parse_invoice_date(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(s, INVOICE_DATE_FORMAT)
        .ok()
        .map(|dt| dt.date())
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimal places plus locale-aware thousands separators
    // (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
