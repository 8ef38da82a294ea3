//! Structured text component flattening and legacy formatting codes.
//!
//! Chat packets carry a JSON component tree; the bridge only cares about
//! the concatenated text. Legacy color/style codes (a section sign followed
//! by one code character) may be embedded in any text node.

use serde_json::Value;

/// The legacy formatting escape character.
pub const LEGACY_CODE_CHAR: char = '\u{a7}';

/// Flatten a component tree to its concatenated text.
///
/// Handles the `text` + `extra` shape; plain strings and arrays of
/// components are accepted as well. Unknown shapes contribute nothing.
pub fn flatten_component(value: &Value) -> String {
    let mut out = String::new();
    append_component(value, &mut out);
    out
}

fn append_component(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            for item in items {
                append_component(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
            }
            if let Some(extra) = map.get("extra") {
                append_component(extra, out);
            }
        }
        _ => {}
    }
}

/// Flatten a chat packet body: JSON when it parses, the raw string when
/// it does not. Chat never errors on malformed bodies.
pub fn flatten_chat_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => flatten_component(&value),
        Err(_) => body.to_string(),
    }
}

/// Flatten a disconnect reason the same way; reasons are routinely sent
/// as bare strings by older server builds.
pub fn flatten_reason(raw: &str) -> String {
    flatten_chat_body(raw)
}

/// Strip legacy formatting codes, removing the escape character and the
/// code character that follows it.
pub fn strip_legacy_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == LEGACY_CODE_CHAR {
            // Drop the code character too; a trailing escape is dropped alone.
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_text_and_extra() {
        let component = json!({
            "text": "Guild > ",
            "extra": [
                {"text": "[MVP+] ", "color": "gold"},
                {"text": "Foo"},
                ": hello"
            ]
        });
        assert_eq!(flatten_component(&component), "Guild > [MVP+] Foo: hello");
    }

    #[test]
    fn test_flatten_nested_extra() {
        let component = json!({
            "text": "a",
            "extra": [{"text": "b", "extra": [{"text": "c"}]}]
        });
        assert_eq!(flatten_component(&component), "abc");
    }

    #[test]
    fn test_flatten_plain_string_body() {
        assert_eq!(flatten_chat_body("not json at all"), "not json at all");
    }

    #[test]
    fn test_flatten_bare_json_string() {
        assert_eq!(flatten_chat_body(r#""just text""#), "just text");
    }

    #[test]
    fn test_strip_legacy_codes() {
        assert_eq!(
            strip_legacy_codes("\u{a7}2Guild > \u{a7}6[MVP+] Foo\u{a7}r: hi"),
            "Guild > [MVP+] Foo: hi"
        );
    }

    #[test]
    fn test_strip_trailing_escape() {
        assert_eq!(strip_legacy_codes("dangling\u{a7}"), "dangling");
    }

    #[test]
    fn test_strip_leaves_plain_text_alone() {
        assert_eq!(strip_legacy_codes("no codes here"), "no codes here");
    }
}
