use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Value the game data uses for "no text here".
pub const PLACEHOLDER: &str = "-";

static THINK_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:/no_think|<think>)|</think>$").expect("think marker"));

/// A field value worth translating: non-empty and not the placeholder.
pub fn is_translatable(text: &str) -> bool {
    !text.is_empty() && text != PLACEHOLDER
}

/// Textual form of a record value; `None` for null, arrays and objects.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// String field of a JSON record, empty when absent or not a string.
pub fn str_field<'a>(record: &'a Value, field: &str) -> &'a str {
    record.get(field).and_then(Value::as_str).unwrap_or("")
}

/// Splits a backend reply into translation lines, dropping blank lines and
/// reasoning markers some chat models emit around their answer.
pub fn reply_lines(reply: &str) -> Vec<String> {
    reply
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !THINK_MARKER_RE.is_match(l))
        .map(str::to_string)
        .collect()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Order-preserving dedup; the first occurrence of each text wins.
pub fn dedup_preserving_order(texts: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    texts
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
