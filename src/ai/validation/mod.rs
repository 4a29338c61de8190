//! Validator Output Parsing
//!
//! Turns the free-form text a validator model returns into a
//! [`ValidationResult`]. Parsing is explicit and never fails: output that
//! cannot be read as a verdict becomes a negative verdict.
//!
//! Accepted shapes:
//! - `{"is_valid": bool, "reason": str, "confidence": number}`
//! - the same object fenced in markdown or surrounded by prose
//! - `is_valid` given as `"true"` / `"yes"` strings, confidence as a string

mod json_repair;

pub use json_repair::{JsonRepairer, extract_json_from_response};

use serde_json::Value;

use crate::types::ValidationResult;

/// Reason attached to a verdict whose text could not be parsed
pub const UNPARSEABLE_REASON: &str = "validator produced unparseable output";

const DEFAULT_CONFIDENCE: f32 = 0.8;

/// Parse validator model output into a verdict
pub fn parse_verdict(raw: &str) -> ValidationResult {
    match extract_json_from_response(raw).as_ref().and_then(verdict_from_value) {
        Some(verdict) => verdict,
        None => ValidationResult::invalid(UNPARSEABLE_REASON, 0.0),
    }
}

fn verdict_from_value(value: &Value) -> Option<ValidationResult> {
    let object = value.as_object()?;

    let is_valid = match object.get("is_valid")? {
        Value::Bool(b) => *b,
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => true,
            "false" | "no" => false,
            _ => return None,
        },
        _ => return None,
    };

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(if is_valid {
            "Validator accepted the input"
        } else {
            "Validator rejected the input"
        })
        .to_string();

    let confidence = match object.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as f32),
        Some(Value::String(s)) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .unwrap_or(DEFAULT_CONFIDENCE);

    Some(if is_valid {
        ValidationResult::valid(reason, confidence)
    } else {
        ValidationResult::invalid(reason, confidence)
    })
}
