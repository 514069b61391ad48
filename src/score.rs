//! # Score Normalizer
//! Maps the many upstream "heat" encodings (`523.1万`, `3千万`, `1.2kw`,
//! `"12,345"`, plain numbers) onto one canonical non-negative integer.
//!
//! Pure and infallible: anything unparseable yields `0`.

use serde_json::Value;

/// A heat value as the upstream reported it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawScore {
    Number(f64),
    Text(String),
}

impl RawScore {
    /// Non-zero numbers and non-blank strings are present; anything else is
    /// absent, so a `0` defers to the next heat field.
    pub fn from_json(v: &Value) -> Option<RawScore> {
        match v {
            Value::Number(n) => n.as_f64().filter(|f| *f != 0.0).map(RawScore::Number),
            Value::String(s) if !s.trim().is_empty() => Some(RawScore::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<&str> for RawScore {
    fn from(s: &str) -> Self {
        RawScore::Text(s.to_string())
    }
}

impl From<f64> for RawScore {
    fn from(n: f64) -> Self {
        RawScore::Number(n)
    }
}

impl From<u64> for RawScore {
    fn from(n: u64) -> Self {
        RawScore::Number(n as f64)
    }
}

/// Unit tiers in priority order; the first tier with a marker present wins.
const UNITS: [(&[&str], f64); 3] = [
    (&["亿"], 100_000_000.0),
    (&["千万", "kw"], 10_000_000.0),
    (&["万", "w"], 10_000.0),
];

/// Canonical score for an optional raw value.
pub fn normalize_score(raw: Option<&RawScore>) -> u64 {
    match raw {
        None => 0,
        Some(RawScore::Number(n)) => floor_to_score(*n),
        Some(RawScore::Text(s)) => parse_score_text(s),
    }
}

/// Parse a textual heat value such as `"8.3万"` or `"1,024 热度"`.
pub fn parse_score_text(raw: &str) -> u64 {
    let text = raw.trim().to_lowercase();
    if text.is_empty() {
        return 0;
    }

    let (multiplier, rest) = strip_unit(&text);

    let numeric: String = rest
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match leading_float(&numeric) {
        Some(v) => floor_to_score(v * multiplier),
        None => 0,
    }
}

/// Find the highest-priority unit marker, returning its multiplier and the
/// text with that marker removed.
fn strip_unit(text: &str) -> (f64, String) {
    for (markers, mult) in UNITS {
        if let Some(marker) = markers.iter().copied().find(|m| text.contains(*m)) {
            return (mult, text.replace(marker, ""));
        }
    }
    (1.0, text.to_string())
}

/// Longest `digits[.digits]` prefix as a float; `None` when there is no digit.
fn leading_float(s: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() {
            seen_digit = true;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
        } else {
            break;
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    s[..end].parse::<f64>().ok()
}

fn floor_to_score(v: f64) -> u64 {
    if !v.is_finite() || v <= 0.0 {
        return 0;
    }
    v.floor() as u64
}
