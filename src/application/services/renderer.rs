//! Placeholder rendering for outbound message bodies.
//!
//! Pure string-to-string expansion, no I/O. The template is scanned once,
//! left to right; substituted text is never rescanned, so a value that
//! happens to contain `{{...}}` stays literal in the output. Placeholders
//! that resolve to nothing are left verbatim rather than silently dropped.

use std::collections::HashMap;

use crate::domain::models::Contact;

/// Result of the stricter rendering mode: the expanded body plus every
/// placeholder that could not be resolved, in scan order.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub body: String,
    pub unresolved: Vec<String>,
}

/// Expands a template against one contact and the broadcast-level
/// personalization payload. Recognized placeholders:
/// `{{name}}`, `{{id}}`, `{{custom_<key>}}`, `{{batch_<key>}}`.
pub fn render(
    template: &str,
    contact: &Contact,
    batch: &HashMap<String, serde_json::Value>,
) -> String {
    render_with_warnings(template, contact, batch).body
}

/// Like [`render`], but also reports unresolved placeholders so callers
/// can warn about typos in templates before a broadcast goes out.
pub fn render_with_warnings(
    template: &str,
    contact: &Contact,
    batch: &HashMap<String, serde_json::Value>,
) -> Rendered {
    let mut body = String::with_capacity(template.len());
    let mut unresolved = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        body.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match resolve(key, contact, batch) {
                    Some(value) => body.push_str(&value),
                    None => {
                        body.push_str("{{");
                        body.push_str(key);
                        body.push_str("}}");
                        unresolved.push(key.to_string());
                    }
                }
                rest = &after[end + 2..];
            }
            // Unterminated opener: emit the tail as-is.
            None => {
                body.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    body.push_str(rest);

    Rendered { body, unresolved }
}

fn resolve(
    key: &str,
    contact: &Contact,
    batch: &HashMap<String, serde_json::Value>,
) -> Option<String> {
    match key {
        "name" => Some(contact.name.clone().unwrap_or_default()),
        "id" => Some(contact.external_id.clone()),
        _ => {
            if let Some(field) = key.strip_prefix("custom_") {
                contact.custom_fields.get(field).map(display_value)
            } else if let Some(field) = key.strip_prefix("batch_") {
                batch.get(field).map(display_value)
            } else {
                None
            }
        }
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
