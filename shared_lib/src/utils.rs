use sha2::{Digest, Sha256};

/// Reduces the numeric portion of `value` modulo `modulus` one digit at a time,
/// which keeps very long identifiers from overflowing. A value without digits
/// counts as zero.
pub fn digits_mod(value: &str, modulus: usize) -> usize {
    if modulus == 0 {
        return 0;
    }
    value
        .chars()
        .filter_map(|c| c.to_digit(10))
        .fold(0usize, |acc, d| (acc * 10 + d as usize) % modulus)
}

/// Lenient number parsing for values typed by a voice agent ("2 adultos", " 3 ").
/// Anything except digits, `.` and `-` is dropped before parsing, and a value
/// left with nothing counts as zero. `None` for null, the empty string, and
/// leftovers that still do not parse ("1.2.3", "-").
pub fn normalize_number(value: &serde_json::Value) -> Option<f64> {
    let raw = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) if s.is_empty() => return None,
        serde_json::Value::Number(n) => return n.as_f64().filter(|f| f.is_finite()),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return Some(0.0);
    }

    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Whole numbers without a fractional part, everything else as is: `2`, `2.5`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e21 {
        return format!("{value:.0}");
    }
    value.to_string()
}

/// Trimmed, non-empty string form of a JSON scalar.
pub fn clean_string(value: &serde_json::Value) -> Option<String> {
    let s = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Splits a full name into first and last name. An explicit last name wins,
/// otherwise the first word is the first name and the rest is the last name.
pub fn split_name(full: &str, last: Option<&str>) -> (String, String) {
    if let Some(last) = last.map(str::trim).filter(|l| !l.is_empty()) {
        return (full.trim().to_string(), last.to_string());
    }

    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

/// Strips quotes and line breaks that tend to sneak into copy-pasted tokens.
pub fn clean_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\'' | '"'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Compares two secrets by their SHA-256 digests so the comparison does not
/// short-circuit on the first differing byte of the raw input.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

pub fn duration_to_ms_string(duration: std::time::Duration) -> String {
    let milliseconds = duration.as_secs_f64() * 1000.0;
    format!("{milliseconds:.2}ms")
}
