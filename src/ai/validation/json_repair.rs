//! JSON Extraction for Model Output
//!
//! Small models asked for a JSON object often wrap it in code fences, add a
//! sentence before or after it, or stop mid-object. This module recovers the
//! first JSON object from such text.
//!
//! Repairs, in order:
//! - Markdown code fence wrapping (```json ... ```)
//! - JSON embedded in explanatory text
//! - Trailing commas
//! - Missing closing braces/brackets and an unterminated final string

use serde_json::Value;
use tracing::debug;

/// Extract and parse the first JSON value from model output
///
/// Returns `None` when nothing JSON-shaped can be recovered.
pub fn extract_json_from_response(content: &str) -> Option<Value> {
    JsonRepairer::new().parse_or_repair(content).map(|(value, _)| value)
}

/// JSON repair strategies
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRepairer;

impl JsonRepairer {
    pub fn new() -> Self {
        Self
    }

    /// Parse JSON, attempting repair if initial parse fails
    ///
    /// Returns (Value, was_repaired)
    pub fn parse_or_repair(&self, raw: &str) -> Option<(Value, bool)> {
        let cleaned = strip_code_fences(raw.trim().trim_start_matches('\u{feff}'));

        if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
            return Some((value, false));
        }

        let candidate = embedded_json(cleaned).unwrap_or(cleaned);
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            debug!("JSON extracted from mixed content");
            return Some((value, true));
        }

        let repaired = close_open_structures(&remove_trailing_commas(candidate));
        match serde_json::from_str::<Value>(&repaired) {
            Ok(value) => {
                debug!("JSON repaired");
                Some((value, true))
            }
            Err(e) => {
                debug!(error = %e, "JSON could not be recovered");
                None
            }
        }
    }
}

fn strip_code_fences(s: &str) -> &str {
    let mut body = s;
    if body.starts_with("```") {
        body = match body.find('\n') {
            Some(newline) => &body[newline + 1..],
            None => body.trim_start_matches('`'),
        };
    }
    body.trim_end().trim_end_matches("```").trim()
}

/// Structural view of one character while scanning JSON text
enum Token {
    Open(char),
    Close(char),
    Other,
}

/// Walk `s`, calling `visit` with each structural token outside strings.
///
/// Returns whether the scan ended inside a string literal.
fn scan(s: &str, mut visit: impl FnMut(usize, Token) -> bool) -> bool {
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        let token = match ch {
            '\\' if in_string => {
                escape = true;
                continue;
            }
            '"' => {
                in_string = !in_string;
                Token::Other
            }
            '{' | '[' if !in_string => Token::Open(ch),
            '}' | ']' if !in_string => Token::Close(ch),
            _ => Token::Other,
        };
        if !visit(i, token) {
            break;
        }
    }
    in_string
}

/// Slice of the first balanced object or array inside `s`
fn embedded_json(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let body = &s[start..];
    let mut depth = 0usize;
    let mut end = None;
    scan(body, |i, token| {
        match token {
            Token::Open(_) => depth += 1,
            Token::Close(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(i + 1);
                    return false;
                }
            }
            Token::Other => {}
        }
        true
    });
    Some(match end {
        Some(end) => &body[..end],
        // Unbalanced: hand the tail to the closer
        None => body,
    })
}

/// Drop commas directly followed by `]` or `}`
fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    for (i, &ch) in chars.iter().enumerate() {
        if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }
        result.push(ch);
    }
    result
}

/// Close an unterminated string and every unclosed bracket, innermost first
fn close_open_structures(s: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let in_string = scan(s, |_, token| {
        match token {
            Token::Open('{') => stack.push('}'),
            Token::Open(_) => stack.push(']'),
            Token::Close(_) => {
                stack.pop();
            }
            Token::Other => {}
        }
        true
    });

    let mut result = s.trim_end().trim_end_matches(',').to_string();
    if in_string {
        result.push('"');
    }
    while let Some(closer) = stack.pop() {
        result.push(closer);
    }
    result
}
