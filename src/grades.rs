//! Grade-string parsing.
//!
//! Moodle formats grades for display: `"85.00 %"`, `"17.00 / 20.00"`,
//! `"8.50"`, or `"-"` when ungraded. A fraction is recognised before a bare
//! number so `"12/20"` reads as 60, not 12. Results are clamped to
//! `[0, 100]`; anything without a number is 0.

use regex::Regex;
use std::sync::LazyLock;

static FRACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d+(?:\.\d+)?)\s*/\s*(-?\d+(?:\.\d+)?)").expect("fraction regex is valid")
});
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number regex is valid"));

/// Parse a display-formatted grade into a percentage.
pub fn parse_grade(raw: &str) -> f64 {
    let normalized = raw.replace(',', ".");
    let score = if let Some(caps) = FRACTION_RE.captures(&normalized) {
        let num: f64 = caps[1].parse().unwrap_or(0.0);
        let denom: f64 = caps[2].parse().unwrap_or(0.0);
        let denom = if denom == 0.0 { 1.0 } else { denom };
        num / denom * 100.0
    } else if let Some(m) = NUMBER_RE.find(&normalized) {
        m.as_str().parse().unwrap_or(0.0)
    } else {
        0.0
    };
    clamp_score(score)
}

/// Parse a grade that may arrive as a JSON number or string.
pub fn parse_grade_value(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => clamp_score(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => parse_grade(s),
        _ => 0.0,
    }
}

pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_strings() {
        assert_eq!(parse_grade("85.00 %"), 85.0);
        assert_eq!(parse_grade("72,5 %"), 72.5);
        assert_eq!(parse_grade("100"), 100.0);
    }

    #[test]
    fn test_fraction_is_converted_to_percentage() {
        assert_eq!(parse_grade("12/20"), 60.0);
        assert_eq!(parse_grade("17.00 / 20.00"), 85.0);
        assert_eq!(parse_grade("3 / 0"), 100.0);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(parse_grade("-5 %"), 0.0);
        assert_eq!(parse_grade("130.00 %"), 100.0);
        assert_eq!(parse_grade_value(&serde_json::json!(250)), 100.0);
    }

    #[test]
    fn test_ungraded_is_zero() {
        assert_eq!(parse_grade("-"), 0.0);
        assert_eq!(parse_grade(""), 0.0);
        assert_eq!(parse_grade_value(&serde_json::Value::Null), 0.0);
    }
}
