//! Request logging formatter

use crate::api::ChatRequest;

/// Format a chat request log line in compact format
pub fn format_request_log(request: &ChatRequest) -> String {
    let mut parts = vec![
        format!("model={}", request.model),
        format!("msgs={}", request.messages.len()),
    ];

    if request.stream {
        parts.push("stream".to_string());
    }

    if let Some(msg) = extract_first_user_message(&request.messages) {
        parts.push(format!("\"{}\"", msg));
    }

    format!("→ {}", parts.join(" "))
}

/// Format the log line for a `GET ?message=` request
pub fn format_simple_request_log(model: &str, message: &str) -> String {
    format!(
        "→ model={} msgs=1 \"{}\"",
        model,
        truncate_message(&normalize_whitespace(message))
    )
}

/// Extract and format the first user message with truncation
fn extract_first_user_message(messages: &[serde_json::Value]) -> Option<String> {
    let msg = messages
        .iter()
        .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("user"))?;

    let content = extract_message_content(msg)?;
    Some(truncate_message(&normalize_whitespace(&content)))
}

/// Extract text content from a message (handles string or array content)
fn extract_message_content(msg: &serde_json::Value) -> Option<String> {
    let content = msg.get("content")?;

    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }

    let texts: Vec<&str> = content
        .as_array()?
        .iter()
        .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    if texts.is_empty() {
        None
    } else {
        Some(texts.join(" "))
    }
}

/// Collapse newlines, tabs and runs of spaces into single spaces
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most 100 chars: the first 25, " ... ", then the last 75
fn truncate_message(s: &str) -> String {
    const MAX_TOTAL: usize = 100;
    const PREFIX_LEN: usize = 25;
    const SUFFIX_LEN: usize = 75;
    const ELLIPSIS: &str = " ... ";

    let char_count = s.chars().count();
    if char_count <= MAX_TOTAL {
        return s.to_string();
    }

    let prefix: String = s.chars().take(PREFIX_LEN).collect();
    let suffix: String = s.chars().skip(char_count - SUFFIX_LEN).collect();

    format!("{}{}{}", prefix, ELLIPSIS, suffix)
}
