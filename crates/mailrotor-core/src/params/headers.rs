//! Custom-header storage formats
//!
//! Server rows store custom headers as JSON. The current shape is an
//! array of `{"name": …, "value": …}` objects; older rows carry a plain
//! object map or a `Name: Value` line blob. All three parse to the same
//! header list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single custom header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parse any supported stored header shape. Entries that do not fit the
/// shape are skipped rather than failing the whole message.
pub fn parse_headers_format(stored: &Value) -> Vec<Header> {
    match stored {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?.trim();
                let value = item.get("value")?.as_str()?.trim();
                if name.is_empty() {
                    return None;
                }
                Some(Header::new(name, value))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, value)| {
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                let value = match value {
                    Value::String(s) => s.trim().to_string(),
                    Value::Null => return None,
                    other => other.to_string(),
                };
                Some(Header::new(name, value))
            })
            .collect(),
        Value::String(blob) => blob
            .lines()
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some(Header::new(name, value.trim()))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Flatten parsed headers into name/value pairs.
pub fn parse_headers_into_key_value(headers: &[Header]) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect()
}
