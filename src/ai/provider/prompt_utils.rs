//! Request and response helpers shared by HTTP providers.

use crate::constants::network as net_constants;

/// Shorten an HTTP error body for inclusion in a provider error message.
///
/// Whitespace runs collapse to a single space; long bodies are cut on a char
/// boundary and suffixed with an ellipsis.
pub fn error_body_excerpt(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= net_constants::MAX_ERROR_BODY_CHARS {
        return collapsed;
    }
    let mut excerpt: String = collapsed
        .chars()
        .take(net_constants::MAX_ERROR_BODY_CHARS)
        .collect();
    excerpt.push('…');
    excerpt
}

/// Extract the human-readable message from a JSON error payload.
///
/// Handles the `{"error": "..."}` shape (Ollama) and the
/// `{"error": {"message": "...", "code": 429}}` shape (Google APIs).
pub fn json_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    match error {
        serde_json::Value::String(message) => Some(message.clone()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}
