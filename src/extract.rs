//! Extraction of structured data from free-text agent replies.
//!
//! Agents answer in natural language and are asked to wrap the machine readable part of their
//! reply in tags such as `<decision> ... </decision>`. Two steps turn a reply into data:
//!
//! 1. [`tagged`] isolates the content of the last `<tag>` region.
//! 2. [`parse_lenient`] turns that content into a JSON value, trying in order:
//!    - **strict**: the text is valid JSON;
//!    - **relaxed literal**: the text is a literal written in a scripting-language style
//!      (single quoted strings, `True`/`False`/`None`, trailing commas);
//!    - **recovery**: the first bracketed span of the text is cut out of surrounding prose or
//!      code fences, bare object keys are quoted, and the relaxed rules are applied again.
//!
//!    The first step that succeeds wins. When all three fail the result is `None`, which
//!    callers turn into their single "invalid" outcome.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<pre>[{,]\s*)(?P<key>[A-Za-z_][A-Za-z0-9_ ]*?)\s*:"#).expect("valid regex")
});
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*(?P<close>[}\]])").expect("valid regex"));

/// Content of the last `<tag> ... </tag>` region of `text`, trimmed.
///
/// Returns `None` when the opening tag is absent or is not followed by its closing tag.
pub fn tagged(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.rfind(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim().to_owned())
}

/// Parse `text` into JSON, falling back from strict to relaxed to recovery parsing.
pub fn parse_lenient(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    if let Some(value) = parse_relaxed(text) {
        return Some(value);
    }
    parse_recovered(text)
}

/// Normalise a parsed decision into a list of records.
///
/// A single object is wrapped into a one element list. Anything that is not a non-empty list of
/// objects is rejected with a message meant for the agent.
pub fn as_records(value: Value) -> Result<Vec<Value>, String> {
    const SHAPE: &str = "Incorrect format for the decision. Make sure to use the form list[dict] (a single list containing only dicts).";
    match value {
        Value::Object(_) => Ok(vec![value]),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            Ok(items)
        }
        _ => Err(SHAPE.to_owned()),
    }
}

fn parse_relaxed(text: &str) -> Option<Value> {
    let requoted = requote_literal(text);
    let cleaned = TRAILING_COMMA.replace_all(&requoted, "$close");
    serde_json::from_str(&cleaned).ok()
}

fn parse_recovered(text: &str) -> Option<Value> {
    let span = bracketed_span(text)?;
    let requoted = requote_literal(span);
    let keyed = BARE_KEY.replace_all(&requoted, r#"$pre"$key":"#);
    let cleaned = TRAILING_COMMA.replace_all(&keyed, "$close");
    serde_json::from_str(&cleaned).ok()
}

/// From the first `[` or `{` to the last matching closer.
fn bracketed_span(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// Rewrite single quoted strings as JSON strings and literal keywords as JSON keywords.
///
/// Double quoted strings are copied untouched.
fn requote_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut word = String::new();

    fn flush(word: &mut String, out: &mut String) {
        match word.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            _ => out.push_str(word),
        }
        word.clear();
    }

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush(&mut word, &mut out);
        match c {
            '"' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    match inner {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            '\'' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                if escaped == '\'' {
                                    out.push('\'');
                                } else {
                                    out.push('\\');
                                    out.push(escaped);
                                }
                            }
                        }
                        '\'' => break,
                        '"' => out.push_str("\\\""),
                        _ => out.push(inner),
                    }
                }
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    flush(&mut word, &mut out);
    out
}

/// Look up `key` in a record, falling back to the record's first value.
pub(crate) fn field<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    record.get(key).or_else(|| record.values().next())
}
