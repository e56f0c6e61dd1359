//! Minor/major currency unit conversions.
//!
//! Aggregation always happens on integer minor units. Major units only appear
//! at the presentation boundary or when reading an external format that
//! stores them.

/// Presentation value, e.g. `22171 -> 221.71`.
pub fn minor_to_major(minor: i64) -> f64 {
    minor as f64 / 100.0
}

/// Exact decimal rendering, e.g. `22171 -> "221.71"`, `-5 -> "-0.05"`.
pub fn format_major(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parses a plain decimal major-unit string (`"221.71"`, `"-3"`, `"0.5"`) into
/// minor units without going through floating point. Returns `None` for
/// exponent notation, more than two significant fractional digits, or
/// overflow.
pub fn parse_major_to_minor(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let significant = frac.trim_end_matches('0');
    if significant.len() > 2 {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let cents: i64 = format!("{significant:0<2}").parse().ok()?;
    let value = whole.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_boundary_dollars() {
        let total: i64 = [10000_i64, 9671, 2500].iter().sum();
        assert_eq!(total, 22171);
        assert_eq!(minor_to_major(total), 221.71);
        assert_eq!(format_major(total), "221.71");
    }

    #[test]
    fn format_major_pads_and_signs() {
        assert_eq!(format_major(0), "0.00");
        assert_eq!(format_major(7), "0.07");
        assert_eq!(format_major(-5), "-0.05");
        assert_eq!(format_major(1_242_000), "12420.00");
    }

    #[test]
    fn parse_major_is_exact() {
        assert_eq!(parse_major_to_minor("221.71"), Some(22171));
        assert_eq!(parse_major_to_minor("12420"), Some(1_242_000));
        assert_eq!(parse_major_to_minor("0.5"), Some(50));
        assert_eq!(parse_major_to_minor(".25"), Some(25));
        assert_eq!(parse_major_to_minor("-3.10"), Some(-310));
        assert_eq!(parse_major_to_minor("19.990"), Some(1999));
        assert_eq!(parse_major_to_minor("1.005"), None);
        assert_eq!(parse_major_to_minor("1e3"), None);
        assert_eq!(parse_major_to_minor(""), None);
    }
}
