//! Pulls the JSON payload out of free-form model output.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

const FENCE: &str = "```";

/// Returns the slice of `text` most likely to hold the JSON payload.
///
/// A fenced code block wins when one is present. Otherwise the span from the
/// first `{` or `[` to the last matching closer is used, and failing that the
/// trimmed text. With several unrelated fragments outside a fence the
/// outermost span is returned, which may not parse.
pub fn extract_json_payload(text: &str) -> &str {
    if let Some(inner) = fenced_block(text) {
        return inner;
    }
    if let Some(span) = outer_json_span(text) {
        return span;
    }
    text.trim()
}

pub fn parse_json_payload(text: &str) -> Result<Value> {
    let payload = extract_json_payload(text);
    if payload.is_empty() {
        anyhow::bail!("AI response contained no JSON payload");
    }
    serde_json::from_str(payload).with_context(|| {
        format!(
            "AI response is not valid JSON: {}",
            payload.chars().take(160).collect::<String>()
        )
    })
}

pub fn parse_draft<T: DeserializeOwned>(draft: Value) -> Result<T> {
    serde_json::from_value(draft).context("AI response does not match the expected document shape")
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];
    let body_start = match after_open.find('\n') {
        Some(newline) if is_language_tag(&after_open[..newline]) => newline + 1,
        _ => 0,
    };
    let body = &after_open[body_start..];
    let close = body.find(FENCE)?;
    Some(body[..close].trim())
}

fn is_language_tag(candidate: &str) -> bool {
    candidate
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn outer_json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn fenced_block_inner_content_is_returned() {
        let text = "Orçamento:\n```json\n{\"steps\": [], \"summary\": \"ok\"}\n```\nObrigado!";
        assert_eq!(
            extract_json_payload(text),
            "{\"steps\": [], \"summary\": \"ok\"}"
        );
    }

    #[test]
    fn fence_without_language_tag() {
        let text = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json_payload(text), "[1, 2, 3]");
        assert_eq!(extract_json_payload("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn braces_span_first_opener_to_last_closer() {
        let text = "Claro! {\"amount\": 50, \"nested\": {\"x\": 1}} Espero que ajude.";
        assert_eq!(
            extract_json_payload(text),
            "{\"amount\": 50, \"nested\": {\"x\": 1}}"
        );
        assert_eq!(extract_json_payload("lista: [\"a\", \"b\"] fim"), "[\"a\", \"b\"]");
    }

    #[test]
    fn unclosed_fence_falls_back_to_brace_span() {
        let text = "```json\n{\"a\": 1}";
        assert_eq!(extract_json_payload(text), "{\"a\": 1}");
    }

    #[test]
    fn plain_text_is_trimmed() {
        assert_eq!(extract_json_payload("  sem json  \n"), "sem json");
        assert_eq!(extract_json_payload(""), "");
    }

    #[test]
    fn parse_reports_empty_and_invalid_payloads() {
        let empty = parse_json_payload("   ").err().map(|err| err.to_string());
        assert_eq!(empty.as_deref(), Some("AI response contained no JSON payload"));
        assert!(parse_json_payload("{\"a\": }").is_err());
    }

    #[test]
    fn multiple_fragments_take_outermost_span() {
        let text = "{\"a\": 1} e também {\"b\": 2}";
        assert_eq!(extract_json_payload(text), text);
        assert!(parse_json_payload(text).is_err());
    }

    #[test]
    fn parse_returns_value() -> anyhow::Result<()> {
        let value = parse_json_payload(
            "```json\n{\"amount\":50,\"description\":\"Reparo torneira\"}\n```",
        )?;
        assert_eq!(value, json!({"amount": 50, "description": "Reparo torneira"}));
        Ok(())
    }
}
